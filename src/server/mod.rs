use crate::{
    context::HookContext,
    hook::{self, HookResponse},
};
use log::{debug, error, warn};
use std::{
    net::SocketAddr,
    sync::Arc,
    thread::{self, JoinHandle},
};
use thiserror::Error;
use tiny_http::{Method, Request, Response, Server};

/// Stop the server on termination signals.
pub mod signal;

/// A custom error for describing the error cases of the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The address is invalid or the port is already used.
    #[error("cannot start server on {0}: {1}")]
    CannotBind(String, String),
}

/// A minimal HTTP 1.1 server, which updates a repository on every POST request.
///
/// The path of the request is the path of the repository under the hook root.
/// Every request runs on its own thread, but the updates themselves run one at a time.
pub struct HookServer {
    server: Arc<Server>,
    context: Arc<HookContext>,
}

/// Stops a running [HookServer] from another thread.
#[derive(Clone)]
pub struct ServerStopper(Arc<Server>);

impl ServerStopper {
    /// Stop accepting requests. The running requests are still finished.
    pub fn stop(&self) {
        self.0.unblock();
    }
}

impl HookServer {
    /// Bind to an address, for example "0.0.0.0:8080" or "127.0.0.1:0".
    pub fn bind(address: &str, context: HookContext) -> Result<Self, ServerError> {
        let server = Server::http(address)
            .map_err(|err| ServerError::CannotBind(address.to_string(), err.to_string()))?;

        Ok(HookServer {
            server: Arc::new(server),
            context: Arc::new(context),
        })
    }

    /// The address the server is listening on, useful if the port was 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    pub fn stopper(&self) -> ServerStopper {
        ServerStopper(Arc::clone(&self.server))
    }

    /// Answer requests until the server is stopped, then wait for the running ones.
    pub fn listen(&self) {
        let mut handles: Vec<JoinHandle<()>> = vec![];
        for request in self.server.incoming_requests() {
            handles.retain(|handle| !handle.is_finished());

            let context = Arc::clone(&self.context);
            handles.push(thread::spawn(move || respond(&context, request)));
        }

        debug!("Waiting for {} running requests.", handles.len());
        for handle in handles {
            if handle.join().is_err() {
                error!("A request failed unexpectedly.");
            }
        }
    }
}

fn respond(context: &HookContext, mut request: Request) {
    debug!("Received request on {} {}.", request.method(), request.url());

    let response = if *request.method() == Method::Post {
        let url = request.url().to_string();
        hook::handle(context, &url, request.as_reader())
    } else {
        HookResponse::method_not_allowed()
    };

    let HookResponse { status, body } = response;
    if let Err(err) = request.respond(Response::from_string(body).with_status_code(status)) {
        warn!("Cannot send response: {err}.");
    }
}
