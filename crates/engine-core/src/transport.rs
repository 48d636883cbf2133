use crate::error::FetchError;
use async_trait::async_trait;
use model::{
    core::repository::Repository, execution::quota::QuotaSnapshot, records::outcome::FileContent,
};

/// Remote-repository client that issues the actual network call.
///
/// Implementations live outside the engine; every `fetch` is a suspension
/// point and the only place the scheduler waits on the network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, repo: &Repository, path: &str) -> Result<FileContent, FetchError>;

    /// Quota signals observed on the most recent response, if the remote reports them.
    fn current_quota(&self) -> Option<QuotaSnapshot> {
        None
    }
}
