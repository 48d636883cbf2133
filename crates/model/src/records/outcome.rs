use crate::records::work_item::WorkItem;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// Fetched manifest content and its transport metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    pub content: String,
    pub content_hash: String,
    pub size_bytes: u64,
}

impl FileContent {
    pub fn new(content: impl Into<String>, content_hash: impl Into<String>) -> Self {
        let content = content.into();
        let size_bytes = content.len() as u64;
        Self {
            content,
            content_hash: content_hash.into(),
            size_bytes,
        }
    }
}

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The repository or file does not exist.
    NotFound,
    /// The repository is private or access was denied.
    Forbidden,
    /// The repository is archived and archived targets are excluded.
    Archived,
    /// The quota was exhausted and retries ran out.
    RateLimited,
    /// Network or server-side failure that outlived its retries.
    Transient,
}

impl FailureKind {
    /// Terminal failures are never retried and say something about the target itself.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FailureKind::NotFound | FailureKind::Forbidden | FailureKind::Archived
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "not_found",
            FailureKind::Forbidden => "forbidden",
            FailureKind::Archived => "archived",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Transient => "transient",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

/// Final recorded result of a work item.
///
/// When an item is retried, the outcome reflects the last attempt and
/// `attempts` counts every try.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub item: WorkItem,
    pub success: bool,
    pub error: Option<Failure>,
    pub cache_hit: bool,
    pub bytes: u64,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<FileContent>,
}

impl Outcome {
    pub fn succeeded(
        item: WorkItem,
        content: FileContent,
        cache_hit: bool,
        elapsed: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            item,
            success: true,
            error: None,
            cache_hit,
            bytes: content.size_bytes,
            elapsed,
            attempts,
            content: Some(content),
        }
    }

    pub fn failed(
        item: WorkItem,
        kind: FailureKind,
        message: impl Into<String>,
        elapsed: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            item,
            success: false,
            error: Some(Failure {
                kind,
                message: message.into(),
            }),
            cache_hit: false,
            bytes: 0,
            elapsed,
            attempts,
            content: None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn is_terminal_failure(&self) -> bool {
        self.failure_kind().is_some_and(|k| k.is_terminal())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
