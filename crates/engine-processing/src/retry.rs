use engine_core::{error::FetchError, retry::RetryDisposition};
use model::records::outcome::FailureKind;

pub fn classify_fetch_error(err: &FetchError) -> RetryDisposition {
    match err {
        FetchError::NotFound(_) => RetryDisposition::Stop,
        FetchError::Forbidden(_) => RetryDisposition::Stop,
        FetchError::RateLimited {
            retry_after: Some(wait),
        } => RetryDisposition::RetryAfter(*wait),
        FetchError::RateLimited { retry_after: None } => RetryDisposition::Retry,
        FetchError::Transient(_) => RetryDisposition::Retry,
    }
}

pub fn failure_kind(err: &FetchError) -> FailureKind {
    match err {
        FetchError::NotFound(_) => FailureKind::NotFound,
        FetchError::Forbidden(_) => FailureKind::Forbidden,
        FetchError::RateLimited { .. } => FailureKind::RateLimited,
        FetchError::Transient(_) => FailureKind::Transient,
    }
}
