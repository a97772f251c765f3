use crate::{payload::MASTER_REF, target::RepositoryTarget};
use log::{debug, trace, warn};
use mockall::automock;
use std::{
    fmt::{self, Display},
    path::Path,
};
use thiserror::Error;

/// Synchronization with libgit2.
pub mod git;

mod credentials;

/// The only remote that is fetched.
pub const REMOTE_NAME: &str = "origin";
/// The local copy of the remote master, which is updated by the fetch.
pub const TRACKING_REF: &str = "refs/remotes/origin/master";

/// The hexadecimal id of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitId(String);

impl CommitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first seven characters of the id, like git shows it.
    pub fn short(&self) -> &str {
        self.0.get(0..7).unwrap_or(&self.0)
    }
}

impl From<String> for CommitId {
    fn from(value: String) -> Self {
        CommitId(value)
    }
}

impl From<&str> for CommitId {
    fn from(value: &str) -> Self {
        CommitId(value.to_string())
    }
}

impl Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An error coming from the underlying git implementation.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct BackendError(pub String);

/// A repository opened by a [GitBackend], exposing the primitives the synchronization is built from.
#[automock]
pub trait GitRepository {
    /// Check that the remote exists.
    fn find_remote(&self, name: &str) -> Result<(), BackendError>;
    /// Fetch the remote with its configured refspecs.
    fn fetch(&self, remote: &str) -> Result<(), BackendError>;
    /// Resolve a reference to the commit it points to.
    fn resolve_reference(&self, name: &str) -> Result<CommitId, BackendError>;
    /// Merge the commit into the current checkout, leaving the merge state behind.
    fn merge(&self, commit: &CommitId) -> Result<(), BackendError>;
    /// Overwrite the index and the working tree with the tree of the commit.
    fn checkout_tree(&self, commit: &CommitId) -> Result<(), BackendError>;
    /// Create or overwrite a reference to point to the commit.
    fn set_reference(&self, name: &str, commit: &CommitId) -> Result<(), BackendError>;
    /// Point HEAD to the reference.
    fn set_head(&self, name: &str) -> Result<(), BackendError>;
    /// Remove any merge, cherry-pick or rebase state.
    fn cleanup_state(&self) -> Result<(), BackendError>;
}

/// Opens repositories, so tests can swap libgit2 out.
#[automock]
pub trait GitBackend: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn GitRepository>, BackendError>;
}

/// The steps of a synchronization, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    Open,
    RemoteLookup,
    Fetch,
    TrackingRefLookup,
    Merge,
    Checkout,
    RefUpdate,
    Cleanup,
}

impl SyncStep {
    pub fn name(&self) -> &'static str {
        match self {
            SyncStep::Open => "open",
            SyncStep::RemoteLookup => "remote-lookup",
            SyncStep::Fetch => "fetch",
            SyncStep::TrackingRefLookup => "tracking-ref-lookup",
            SyncStep::Merge => "merge",
            SyncStep::Checkout => "checkout",
            SyncStep::RefUpdate => "ref-update",
            SyncStep::Cleanup => "cleanup",
        }
    }
}

impl Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A failed synchronization: the step it stopped at and why.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("step {step} failed: {cause}")]
pub struct SyncError {
    pub step: SyncStep,
    pub cause: BackendError,
}

trait AtStep<T> {
    fn at(self, step: SyncStep) -> Result<T, SyncError>;
}

impl<T> AtStep<T> for Result<T, BackendError> {
    fn at(self, step: SyncStep) -> Result<T, SyncError> {
        self.map_err(|cause| SyncError { step, cause })
    }
}

/// Forces the master of a repository to be the same as the master of `origin`.
///
/// Local commits and uncommitted changes are thrown away, there is no rollback.
/// The synchronizer does not lock: callers have to make sure that only one
/// synchronization runs at a time (see [crate::context::HookContext::serialized]).
pub struct Synchronizer {
    backend: Box<dyn GitBackend>,
}

impl Synchronizer {
    pub fn new(backend: Box<dyn GitBackend>) -> Self {
        Synchronizer { backend }
    }

    /// Fetch `origin` and reset master, HEAD and the working tree to `origin/master`.
    /// Returns the commit that the repository points to after the update.
    pub fn sync(&self, target: &RepositoryTarget) -> Result<CommitId, SyncError> {
        trace!("Opening repository {target}.");
        let repo = self.backend.open(target.path()).at(SyncStep::Open)?;

        repo.find_remote(REMOTE_NAME).at(SyncStep::RemoteLookup)?;

        debug!("Fetching {REMOTE_NAME} for {target}.");
        repo.fetch(REMOTE_NAME).at(SyncStep::Fetch)?;

        let commit = repo
            .resolve_reference(TRACKING_REF)
            .at(SyncStep::TrackingRefLookup)?;
        debug!("{TRACKING_REF} is at {commit}.");

        // The merge result does not matter, we reset to the fetched commit regardless.
        repo.merge(&commit).at(SyncStep::Merge)?;

        trace!("Checking out {} in {target}.", commit.short());
        repo.checkout_tree(&commit).at(SyncStep::Checkout)?;

        repo.set_reference(MASTER_REF, &commit)
            .at(SyncStep::RefUpdate)?;
        repo.set_head(MASTER_REF).at(SyncStep::RefUpdate)?;

        if let Err(err) = repo.cleanup_state().at(SyncStep::Cleanup) {
            warn!("Repository {target} is updated, but {err}.");
        }

        Ok(commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::resolve;
    use log::Level;
    use mockall::{predicate::eq, Sequence};
    use std::{error::Error, fs, path::PathBuf};

    const COMMIT: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

    fn create_target() -> Result<(PathBuf, RepositoryTarget), Box<dyn Error>> {
        use rand::distributions::{Alphanumeric, DistString};

        let id = Alphanumeric.sample_string(&mut rand::thread_rng(), 16);
        let root = PathBuf::from(format!("test_directories/{id}"));
        fs::create_dir_all(root.join("demo/.git"))?;
        let target = resolve(&root, "/demo")?;

        Ok((root, target))
    }

    fn failing(message: &str) -> BackendError {
        BackendError(message.to_string())
    }

    /// A repository mock that succeeds until the given step, which fails.
    /// Steps after the failing one have no expectations, so calling them panics.
    fn repository_failing_at(step: Option<SyncStep>) -> MockGitRepository {
        let mut repo = MockGitRepository::new();
        let fails = |s: SyncStep| step == Some(s);
        let reached = |s: SyncStep| step.map_or(true, |step| s as u8 <= step as u8);

        if reached(SyncStep::RemoteLookup) {
            let fail = fails(SyncStep::RemoteLookup);
            repo.expect_find_remote()
                .with(eq(REMOTE_NAME))
                .times(1)
                .returning(move |_| if fail { Err(failing("no remote")) } else { Ok(()) });
        }
        if reached(SyncStep::Fetch) {
            let fail = fails(SyncStep::Fetch);
            repo.expect_fetch()
                .with(eq(REMOTE_NAME))
                .times(1)
                .returning(move |_| if fail { Err(failing("network")) } else { Ok(()) });
        }
        if reached(SyncStep::TrackingRefLookup) {
            let fail = fails(SyncStep::TrackingRefLookup);
            repo.expect_resolve_reference()
                .with(eq(TRACKING_REF))
                .times(1)
                .returning(move |_| {
                    if fail {
                        Err(failing("no such reference"))
                    } else {
                        Ok(CommitId::from(COMMIT))
                    }
                });
        }
        if reached(SyncStep::Merge) {
            let fail = fails(SyncStep::Merge);
            repo.expect_merge()
                .with(eq(CommitId::from(COMMIT)))
                .times(1)
                .returning(move |_| if fail { Err(failing("merge")) } else { Ok(()) });
        }
        if reached(SyncStep::Checkout) {
            let fail = fails(SyncStep::Checkout);
            repo.expect_checkout_tree()
                .with(eq(CommitId::from(COMMIT)))
                .times(1)
                .returning(move |_| if fail { Err(failing("checkout")) } else { Ok(()) });
        }
        if reached(SyncStep::RefUpdate) {
            let fail = fails(SyncStep::RefUpdate);
            repo.expect_set_reference()
                .with(eq(MASTER_REF), eq(CommitId::from(COMMIT)))
                .times(1)
                .returning(move |_, _| if fail { Err(failing("locked")) } else { Ok(()) });
            if !fail {
                repo.expect_set_head()
                    .with(eq(MASTER_REF))
                    .times(1)
                    .returning(|_| Ok(()));
            }
        }
        if reached(SyncStep::Cleanup) {
            let fail = fails(SyncStep::Cleanup);
            repo.expect_cleanup_state()
                .times(1)
                .returning(move || if fail { Err(failing("cleanup")) } else { Ok(()) });
        }

        repo
    }

    fn backend_with(repo: MockGitRepository) -> MockGitBackend {
        let mut backend = MockGitBackend::new();
        backend
            .expect_open()
            .times(1)
            .return_once(move |_| Ok(Box::new(repo) as Box<dyn GitRepository>));
        backend
    }

    #[test]
    fn it_should_run_every_step_in_order() -> Result<(), Box<dyn Error>> {
        let (root, target) = create_target()?;
        let mut seq = Sequence::new();

        let mut repo = MockGitRepository::new();
        repo.expect_find_remote()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        repo.expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        repo.expect_resolve_reference()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommitId::from(COMMIT)));
        repo.expect_merge()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        repo.expect_checkout_tree()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        repo.expect_set_reference()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        repo.expect_set_head()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        repo.expect_cleanup_state()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let synchronizer = Synchronizer::new(Box::new(backend_with(repo)));
        let commit = synchronizer.sync(&target)?;
        assert_eq!(CommitId::from(COMMIT), commit);

        fs::remove_dir_all(root)?;

        Ok(())
    }

    #[test]
    fn it_should_open_the_target_path() -> Result<(), Box<dyn Error>> {
        let (root, target) = create_target()?;
        let expected = target.path().to_path_buf();

        let repo = repository_failing_at(None);
        let mut backend = MockGitBackend::new();
        backend
            .expect_open()
            .with(eq(expected))
            .times(1)
            .return_once(move |_| Ok(Box::new(repo) as Box<dyn GitRepository>));

        let synchronizer = Synchronizer::new(Box::new(backend));
        assert_eq!(Ok(CommitId::from(COMMIT)), synchronizer.sync(&target));

        fs::remove_dir_all(root)?;

        Ok(())
    }

    #[test]
    fn it_should_fail_if_the_repository_cannot_be_opened() -> Result<(), Box<dyn Error>> {
        let (root, target) = create_target()?;

        let mut backend = MockGitBackend::new();
        backend
            .expect_open()
            .times(1)
            .returning(|_| Err(failing("corrupt")));

        let synchronizer = Synchronizer::new(Box::new(backend));
        let error = synchronizer.sync(&target).err().unwrap();
        assert_eq!(SyncStep::Open, error.step);
        assert_eq!("step open failed: corrupt", error.to_string());

        fs::remove_dir_all(root)?;

        Ok(())
    }

    #[test]
    fn it_should_stop_at_the_first_failing_step() -> Result<(), Box<dyn Error>> {
        let (root, target) = create_target()?;

        for step in [
            SyncStep::RemoteLookup,
            SyncStep::Fetch,
            SyncStep::TrackingRefLookup,
            SyncStep::Merge,
            SyncStep::Checkout,
            SyncStep::RefUpdate,
        ] {
            let repo = repository_failing_at(Some(step));
            let synchronizer = Synchronizer::new(Box::new(backend_with(repo)));

            let error = synchronizer.sync(&target).err().unwrap();
            assert_eq!(step, error.step, "{error} should fail at {step}");
        }

        fs::remove_dir_all(root)?;

        Ok(())
    }

    #[test]
    fn it_should_fail_the_ref_update_if_head_cannot_be_set() -> Result<(), Box<dyn Error>> {
        let (root, target) = create_target()?;

        let mut repo = MockGitRepository::new();
        repo.expect_find_remote().returning(|_| Ok(()));
        repo.expect_fetch().returning(|_| Ok(()));
        repo.expect_resolve_reference()
            .returning(|_| Ok(CommitId::from(COMMIT)));
        repo.expect_merge().returning(|_| Ok(()));
        repo.expect_checkout_tree().returning(|_| Ok(()));
        repo.expect_set_reference().returning(|_, _| Ok(()));
        repo.expect_set_head()
            .times(1)
            .returning(|_| Err(failing("HEAD is locked")));

        let synchronizer = Synchronizer::new(Box::new(backend_with(repo)));
        let error = synchronizer.sync(&target).err().unwrap();
        assert_eq!(SyncStep::RefUpdate, error.step);

        fs::remove_dir_all(root)?;

        Ok(())
    }

    #[test]
    fn it_should_succeed_and_warn_if_the_cleanup_fails() -> Result<(), Box<dyn Error>> {
        testing_logger::setup();
        let (root, target) = create_target()?;

        let repo = repository_failing_at(Some(SyncStep::Cleanup));
        let synchronizer = Synchronizer::new(Box::new(backend_with(repo)));
        assert_eq!(Ok(CommitId::from(COMMIT)), synchronizer.sync(&target));

        testing_logger::validate(|logs| {
            let warnings: Vec<_> = logs.iter().filter(|l| l.level == Level::Warn).collect();
            assert_eq!(1, warnings.len());
            assert!(warnings[0].body.contains("step cleanup failed: cleanup"));
        });

        fs::remove_dir_all(root)?;

        Ok(())
    }

    #[test]
    fn it_should_shorten_commit_ids() {
        assert_eq!("4b825dc", CommitId::from(COMMIT).short());
        assert_eq!("abc", CommitId::from("abc").short());
    }
}
