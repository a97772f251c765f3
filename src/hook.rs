use crate::{
    context::HookContext,
    payload::{normalize_reader, PayloadError},
    sync::{CommitId, SyncError},
    target::{resolve, RepositoryTarget, TargetError},
};
use log::{debug, error, info, warn};
use std::io::Read;
use thiserror::Error;

/// A custom error for every way a webhook can fail.
#[derive(Debug, Error)]
pub enum HookError {
    /// The body is not a webhook that we know.
    #[error("invalid payload: {0}")]
    MalformedPayload(#[from] PayloadError),
    /// The webhook is valid, but the change is not on master. Nothing to do.
    #[error("ignoring changeset on '{path}', not a change on master ({reference})")]
    IgnoredNotMaster { path: String, reference: String },
    /// There is no directory for the request path.
    #[error("{0}")]
    NotFound(TargetError),
    /// There is a directory for the request path, but it is not a repository.
    #[error("{0}")]
    Forbidden(TargetError),
    /// The repository exists, but it cannot be updated.
    #[error("could not update repository '{0}': {1}")]
    SyncFailed(RepositoryTarget, SyncError),
}

impl From<TargetError> for HookError {
    fn from(value: TargetError) -> Self {
        if value.is_forbidden() {
            HookError::Forbidden(value)
        } else {
            HookError::NotFound(value)
        }
    }
}

impl HookError {
    /// The HTTP status to answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            HookError::NotFound(_) => 404,
            HookError::Forbidden(_) => 403,
            HookError::MalformedPayload(_)
            | HookError::IgnoredNotMaster { .. }
            | HookError::SyncFailed(_, _) => 500,
        }
    }
}

/// The status and body of an HTTP answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookResponse {
    pub status: u16,
    pub body: String,
}

impl HookResponse {
    pub fn ok() -> Self {
        HookResponse {
            status: 200,
            body: String::from("ok"),
        }
    }

    pub fn method_not_allowed() -> Self {
        HookResponse {
            status: 405,
            body: String::from("Method Not Allowed"),
        }
    }
}

impl From<&HookError> for HookResponse {
    /// Existing webhook senders expect the status code repeated in the body.
    fn from(value: &HookError) -> Self {
        let status = value.status_code();
        HookResponse {
            status,
            body: status.to_string(),
        }
    }
}

/// Parse the webhook and if master changed, update the repository under the request path.
///
/// Only one repository is looked up and updated at a time, other calls wait
/// until the running one is finished.
pub fn process<R: Read>(
    context: &HookContext,
    request_path: &str,
    body: R,
) -> Result<CommitId, HookError> {
    let event = normalize_reader(body)?;
    debug!("Received {} webhook on '{request_path}'.", event.schema());

    if !event.is_master() {
        return Err(HookError::IgnoredNotMaster {
            path: request_path.to_string(),
            reference: event.changed_ref().unwrap_or("not master").to_string(),
        });
    }

    let root = &context.config().hook_path;
    context.serialized(|| -> Result<CommitId, HookError> {
        let target = resolve(root, request_path)?;
        info!("Updating repository '{target}'.");
        let commit = context
            .synchronizer()
            .sync(&target)
            .map_err(|err| HookError::SyncFailed(target.clone(), err))?;
        info!("Repository '{target}' updated to {}.", commit.short());

        Ok(commit)
    })
}

/// Process the webhook and log the outcome, returning the answer to send.
pub fn handle<R: Read>(context: &HookContext, request_path: &str, body: R) -> HookResponse {
    match process(context, request_path, body) {
        Ok(_) => HookResponse::ok(),
        Err(err) => {
            match &err {
                HookError::IgnoredNotMaster { .. } => info!("{err}."),
                HookError::MalformedPayload(_)
                | HookError::NotFound(_)
                | HookError::Forbidden(_) => warn!("{err}."),
                HookError::SyncFailed(_, _) => error!("{err}."),
            }
            HookResponse::from(&err)
        }
    }
}
