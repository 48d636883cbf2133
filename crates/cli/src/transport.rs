use async_trait::async_trait;
use engine_core::{error::FetchError, transport::Transport};
use model::{core::repository::Repository, records::outcome::FileContent};
use sha2::{Digest, Sha256};
use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};
use tracing::debug;

/// Serves files from a local mirror laid out as `<root>/<owner>/<repo>/<path>`.
#[derive(Debug, Clone)]
pub struct FsTransport {
    root: PathBuf,
}

impl FsTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves a repository-relative path, refusing anything that would escape the mirror.
    fn resolve(&self, repo: &Repository, path: &str) -> Result<PathBuf, FetchError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(FetchError::Forbidden(format!(
                "path '{path}' escapes the repository root"
            )));
        }

        Ok(self.root.join(&repo.owner).join(&repo.name).join(relative))
    }
}

#[async_trait]
impl Transport for FsTransport {
    async fn fetch(&self, repo: &Repository, path: &str) -> Result<FileContent, FetchError> {
        let file = self.resolve(repo, path)?;
        let target = format!("{}:{path}", repo.full_name);

        let content = match tokio::fs::read_to_string(&file).await {
            Ok(content) => content,
            Err(err) => {
                return Err(match err.kind() {
                    ErrorKind::NotFound => FetchError::NotFound(target),
                    ErrorKind::PermissionDenied => FetchError::Forbidden(target),
                    _ => FetchError::Transient(format!("{target}: {err}")),
                });
            }
        };

        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        debug!(file = %file.display(), bytes = content.len(), "Read mirrored file");
        Ok(FileContent::new(content, hash))
    }
}
