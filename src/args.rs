use gumdrop::Options;
use hooker::config::ConfigLayer;
use std::path::PathBuf;

/// Update git repositories under a directory when a push webhook arrives.
#[derive(Debug, Options)]
pub struct Args {
    /// The configuration file with HookPath, Host and Port (default: config.toml, if it exists).
    #[options(meta = "FILE")]
    pub config: Option<String>,

    /// The directory under which the repositories are, one for every request path.
    #[options(no_short, meta = "DIR")]
    pub hook_path: Option<String>,

    /// The address to bind the HTTP server to (default: 0.0.0.0).
    #[options(no_short, meta = "HOST")]
    pub host: Option<String>,

    /// The port of the HTTP server (default: 8080).
    #[options(meta = "PORT")]
    pub port: Option<u16>,

    /// Increase verbosity, can be set multiple times (-v debug, -vv tracing)
    #[options(count)]
    pub verbose: u8,

    /// Only print error messages.
    #[options()]
    pub quiet: bool,

    /// Print the current version.
    #[options(short = "V")]
    pub version: bool,

    /// Print this help.
    #[options()]
    pub help: bool,
}

impl Args {
    /// The values given on the command line, which override the config file.
    pub fn overrides(&self) -> ConfigLayer {
        ConfigLayer {
            hook_path: self.hook_path.as_ref().map(PathBuf::from),
            host: self.host.clone(),
            port: self.port,
        }
    }
}

pub fn parse_args() -> Args {
    Args::parse_args_default_or_exit()
}
