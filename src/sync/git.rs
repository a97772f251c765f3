use super::{credentials::FetchCredentials, BackendError, CommitId, GitBackend, GitRepository};
use git2::{build::CheckoutBuilder, FetchOptions, Oid, RemoteCallbacks, Repository};
use log::trace;
use std::path::Path;

impl From<git2::Error> for BackendError {
    fn from(value: git2::Error) -> Self {
        BackendError(value.message().to_string())
    }
}

/// Opens repositories on disk with libgit2.
pub struct Git2Backend;

impl GitBackend for Git2Backend {
    fn open(&self, path: &Path) -> Result<Box<dyn GitRepository>, BackendError> {
        let repo = Repository::open(path)?;

        Ok(Box::new(Git2Repository { repo }))
    }
}

/// A repository opened with libgit2.
pub struct Git2Repository {
    repo: Repository,
}

impl Git2Repository {
    fn find_commit(&self, commit: &CommitId) -> Result<git2::Commit<'_>, BackendError> {
        let oid = Oid::from_str(commit.as_str())?;

        Ok(self.repo.find_commit(oid)?)
    }
}

impl GitRepository for Git2Repository {
    fn find_remote(&self, name: &str) -> Result<(), BackendError> {
        self.repo.find_remote(name)?;

        Ok(())
    }

    // Inspired from: https://github.com/rust-lang/git2-rs/blob/master/examples/fetch.rs
    fn fetch(&self, remote: &str) -> Result<(), BackendError> {
        let mut remote = self.repo.find_remote(remote)?;

        let mut credentials = FetchCredentials::new(self.repo.config()?);
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |url, username, allowed| {
            credentials.next(url, username, allowed)
        });

        let mut opts = FetchOptions::new();
        opts.remote_callbacks(callbacks);

        // No refspecs given, so the ones configured for the remote are used.
        remote.fetch::<&str>(&[], Some(&mut opts), None)?;

        let stats = remote.stats();
        trace!(
            "Received {} objects ({} bytes).",
            stats.received_objects(),
            stats.received_bytes()
        );

        Ok(())
    }

    fn resolve_reference(&self, name: &str) -> Result<CommitId, BackendError> {
        let reference = self.repo.find_reference(name)?;
        let commit = reference.peel_to_commit()?;

        Ok(CommitId::from(commit.id().to_string()))
    }

    fn merge(&self, commit: &CommitId) -> Result<(), BackendError> {
        let oid = Oid::from_str(commit.as_str())?;
        let annotated = self.repo.find_annotated_commit(oid)?;
        self.repo.merge(&[&annotated], None, None)?;

        Ok(())
    }

    fn checkout_tree(&self, commit: &CommitId) -> Result<(), BackendError> {
        let tree = self.find_commit(commit)?.tree()?;
        self.repo
            .checkout_tree(tree.as_object(), Some(CheckoutBuilder::new().force()))?;

        Ok(())
    }

    fn set_reference(&self, name: &str, commit: &CommitId) -> Result<(), BackendError> {
        let target = self.find_commit(commit)?.id();
        let msg = format!("Reset: Setting {name} to id: {commit}");
        self.repo.reference(name, target, true, &msg)?;

        Ok(())
    }

    fn set_head(&self, name: &str) -> Result<(), BackendError> {
        self.repo.set_head(name)?;

        Ok(())
    }

    fn cleanup_state(&self) -> Result<(), BackendError> {
        self.repo.cleanup_state()?;

        Ok(())
    }
}
