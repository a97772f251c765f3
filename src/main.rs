use args::{parse_args, Args};
use hooker::{
    config::{Config, ConfigError},
    context::HookContext,
    server::{signal::ShutdownSignal, HookServer, ServerError},
    sync::git::Git2Backend,
};
use log::{debug, info, warn, SetLoggerError};
use logger::init_logger;
use std::{path::Path, process, thread};
use thiserror::Error;

mod args;
mod logger;

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom error for the fatal errors of the binary.
#[derive(Debug, Error)]
pub enum MainError {
    #[error("Timezone offset cannot be determined for the logger.")]
    FailedLoggerTimezones,
    #[error("Cannot initialize logger: {0}.")]
    FailedLogger(#[from] SetLoggerError),
    #[error("Config failed: {0}.")]
    Config(#[from] ConfigError),
    #[error("Server failed: {0}.")]
    Server(#[from] ServerError),
}

fn main() {
    let args = parse_args();

    if args.version {
        println!("{NAME} {VERSION}");
        return;
    }

    if let Err(err) = run(args) {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), MainError> {
    init_logger(&args)?;
    info!("{NAME} {VERSION} - webhook deployment.");

    let config = Config::load(args.config.as_deref().map(Path::new), args.overrides())?;
    if !config.hook_path.is_dir() {
        warn!(
            "The hook path {} is not a directory (yet), every request will fail until it is.",
            config.hook_path.display()
        );
    }
    debug!("Looking up repositories in {}.", config.hook_path.display());

    let address = config.address();
    let server = HookServer::bind(&address, HookContext::new(config, Box::new(Git2Backend)))?;
    info!("Starting server on {address}.");

    let stopper = server.stopper();
    thread::spawn(move || ShutdownSignal::new().listen(&stopper));

    server.listen();
    info!("Server stopped.");

    Ok(())
}
