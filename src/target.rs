use std::{
    fmt::{self, Display},
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// The directory which marks a working tree as a git repository.
pub const METADATA_DIRECTORY: &str = ".git";

/// A custom error describing why a request path cannot be synchronized.
#[derive(Debug, Error)]
pub enum TargetError {
    /// Nothing exists on the path (or it cannot be accessed).
    #[error("invalid repository '{0}': {1}")]
    Missing(PathBuf, std::io::Error),
    /// The path exists, but it is a file.
    #[error("not a directory: '{0}'")]
    NotADirectory(PathBuf),
    /// The directory exists, but there is no `.git` inside.
    #[error("not a git repository: '{0}'")]
    NotARepository(PathBuf),
    /// The `.git` inside the directory is a file (e.g. a worktree or submodule link).
    #[error(".git is a file, not a repository: '{0}'")]
    MetadataNotADirectory(PathBuf),
    /// A path segment is not valid percent-encoded UTF-8, or it decodes to a slash.
    #[error("invalid request path segment '{0}'")]
    InvalidSegment(String),
}

impl TargetError {
    /// The path exists, but it is not something we are allowed to touch.
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            TargetError::NotARepository(_) | TargetError::MetadataNotADirectory(_)
        )
    }
}

/// A directory under the hook root, which was checked to contain a git repository.
///
/// It is constructed for every request, because repositories can be added
/// or removed under the hook root while the daemon is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryTarget {
    path: PathBuf,
}

impl RepositoryTarget {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Display for RepositoryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

fn decode_segment(segment: &str) -> Result<String, TargetError> {
    let decoded =
        urlencoding::decode(segment).map_err(|_| TargetError::InvalidSegment(segment.to_string()))?;
    if decoded.contains('/') {
        return Err(TargetError::InvalidSegment(segment.to_string()));
    }

    Ok(decoded.into_owned())
}

/// Clean an URL path the same way as a browser would: every segment is percent-decoded,
/// empty and `.` segments are dropped and `..` removes the previous segment,
/// but never goes above the root. Query strings and fragments are not part of the path.
pub fn clean_request_path(request_path: &str) -> Result<PathBuf, TargetError> {
    let path = request_path
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    let mut segments: Vec<String> = vec![];
    for segment in path.split('/') {
        let segment = decode_segment(segment)?;
        match segment.as_str() {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    Ok(segments.iter().collect())
}

/// Join the request path to the hook root and check that it is a git repository.
pub fn resolve(root: &Path, request_path: &str) -> Result<RepositoryTarget, TargetError> {
    let path = root.join(clean_request_path(request_path)?);

    // Metadata follows symlinks, linking repositories into the root is allowed.
    let metadata = fs::metadata(&path).map_err(|err| TargetError::Missing(path.clone(), err))?;
    if !metadata.is_dir() {
        return Err(TargetError::NotADirectory(path));
    }

    let metadata_directory = path.join(METADATA_DIRECTORY);
    let metadata = fs::metadata(&metadata_directory)
        .map_err(|_| TargetError::NotARepository(path.clone()))?;
    if !metadata.is_dir() {
        return Err(TargetError::MetadataNotADirectory(path));
    }

    Ok(RepositoryTarget { path })
}
