//! Read access to repository contents.
//!
//! Only the CI builder adapter needs this: it reads the build manifest at
//! the pushed commit.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::payload::Repository;

/// Errors reading a file from a repository.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("repository {0} does not exist")]
    NotFound(String),

    #[error("commit {0} does not exist")]
    CommitNotFound(String),

    #[error("{path} does not exist at {commit}")]
    FileNotFound { path: String, commit: String },

    #[error("invalid path {0:?}")]
    InvalidPath(String),

    #[error("git failed: {0}")]
    Git(String),

    #[error("failed to run git: {0}")]
    Io(#[source] io::Error),
}

/// Reads files from repositories at a given commit.
#[async_trait]
pub trait RepositoryReader: Send + Sync {
    /// Returns the contents of `path` at `commit`.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError`] when the repository, commit or file is missing,
    /// or the backend fails.
    async fn read_file(
        &self,
        repo: &Repository,
        commit: &str,
        path: &str,
    ) -> Result<Vec<u8>, RepoError>;
}

/// Reads bare repositories laid out as `<root>/<owner>/<name>.git` using
/// the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCliReader {
    root: PathBuf,
}

impl GitCliReader {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn git_dir(&self, repo: &Repository) -> Result<PathBuf, RepoError> {
        let (owner, name) = if repo.owner.login.is_empty() {
            repo.full_name
                .split_once('/')
                .ok_or_else(|| RepoError::InvalidPath(repo.full_name.clone()))?
        } else {
            (repo.owner.login.as_str(), repo.name.as_str())
        };

        for part in [owner, name] {
            if part.is_empty() || part.contains('/') || part.contains('\\') || part.starts_with('.')
            {
                return Err(RepoError::InvalidPath(format!("{owner}/{name}")));
            }
        }

        Ok(self.root.join(owner).join(format!("{name}.git")))
    }
}

#[async_trait]
impl RepositoryReader for GitCliReader {
    async fn read_file(
        &self,
        repo: &Repository,
        commit: &str,
        path: &str,
    ) -> Result<Vec<u8>, RepoError> {
        let git_dir = self.git_dir(repo)?;
        if !git_dir.is_dir() {
            return Err(RepoError::NotFound(repo.full_name.clone()));
        }
        if commit.is_empty() || commit.starts_with('-') {
            return Err(RepoError::CommitNotFound(commit.to_string()));
        }

        let output = Command::new("git")
            .arg("--git-dir")
            .arg(&git_dir)
            .arg("show")
            .arg(format!("{commit}:{path}"))
            .output()
            .await
            .map_err(RepoError::Io)?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("does not exist in") || stderr.contains("exists on disk, but not in") {
            Err(RepoError::FileNotFound {
                path: path.to_string(),
                commit: commit.to_string(),
            })
        } else if stderr.contains("invalid object name")
            || stderr.contains("bad revision")
            || stderr.contains("unknown revision")
        {
            Err(RepoError::CommitNotFound(commit.to_string()))
        } else {
            Err(RepoError::Git(stderr.trim().to_string()))
        }
    }
}

/// In-memory reader for tests.
#[cfg(test)]
pub mod mock {
    use std::collections::HashMap;

    use super::*;

    /// Serves files keyed by `(commit, path)`; unknown commits and paths
    /// produce the matching not-found errors.
    #[derive(Debug, Default)]
    pub struct MockReader {
        files: HashMap<(String, String), Vec<u8>>,
    }

    impl MockReader {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_file(mut self, commit: &str, path: &str, content: &str) -> Self {
            self.files
                .insert((commit.into(), path.into()), content.as_bytes().to_vec());
            self
        }
    }

    #[async_trait]
    impl RepositoryReader for MockReader {
        async fn read_file(
            &self,
            _repo: &Repository,
            commit: &str,
            path: &str,
        ) -> Result<Vec<u8>, RepoError> {
            if let Some(content) = self.files.get(&(commit.to_string(), path.to_string())) {
                return Ok(content.clone());
            }
            if self.files.keys().any(|(c, _)| c == commit) {
                Err(RepoError::FileNotFound {
                    path: path.into(),
                    commit: commit.into(),
                })
            } else {
                Err(RepoError::CommitNotFound(commit.into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::User;

    fn repo(owner: &str, name: &str) -> Repository {
        Repository {
            name: name.into(),
            full_name: format!("{owner}/{name}"),
            owner: User {
                login: owner.into(),
                ..User::default()
            },
            ..Repository::default()
        }
    }

    #[tokio::test]
    async fn missing_repository_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let reader = GitCliReader::new(dir.path());

        let err = reader
            .read_file(&repo("alice", "widgets"), "abc123", ".build.yml")
            .await
            .unwrap_err();

        assert!(matches!(err, RepoError::NotFound(name) if name == "alice/widgets"));
    }

    #[tokio::test]
    async fn traversal_in_owner_is_rejected() {
        let reader = GitCliReader::new("/srv/git");

        let err = reader
            .read_file(&repo("..", "widgets"), "abc123", ".build.yml")
            .await
            .unwrap_err();

        assert!(matches!(err, RepoError::InvalidPath(_)));
    }

    #[test]
    fn git_dir_falls_back_to_full_name() {
        let reader = GitCliReader::new("/srv/git");
        let mut r = repo("alice", "widgets");
        r.owner.login.clear();

        assert_eq!(
            reader.git_dir(&r).unwrap(),
            PathBuf::from("/srv/git/alice/widgets.git")
        );
    }

    #[tokio::test]
    async fn mock_reader_distinguishes_commit_and_file() {
        let reader = mock::MockReader::new().with_file("c1", ".build.yml", "image: alpine");
        let r = repo("a", "b");

        assert!(reader.read_file(&r, "c1", ".build.yml").await.is_ok());
        assert!(matches!(
            reader.read_file(&r, "c1", "other.yml").await,
            Err(RepoError::FileNotFound { .. })
        ));
        assert!(matches!(
            reader.read_file(&r, "c2", ".build.yml").await,
            Err(RepoError::CommitNotFound(_))
        ));
    }
}
