//! Explicit deadlines for outbound calls.
//!
//! Expiry is returned as data ([`TimedOut`]) so call sites can treat it as
//! "not ready" with an ordinary match.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// A bounded wait elapsed before the call finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("timed out after {}s", .after.as_secs())]
pub struct TimedOut {
    pub after: Duration,
}

/// Run `future` with a deadline. The future is dropped (cancelled) on expiry.
pub async fn within<F>(deadline: Duration, future: F) -> Result<F::Output, TimedOut>
where
    F: Future,
{
    tokio::time::timeout(deadline, future)
        .await
        .map_err(|_| TimedOut { after: deadline })
}
