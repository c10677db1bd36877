//! Cooperative cancellation for database round-trips
//!
//! The TDS stream is not cancel-safe: dropping a request after it was sent
//! leaves its reply unread on the shared client. Cancellation is therefore
//! only observed between round-trips, never in the middle of one.

use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::{ServiceError, ServiceResult};

/// Fail with `Cancelled` once `token` has fired
pub(crate) fn checkpoint(token: &CancellationToken) -> ServiceResult<()> {
    if token.is_cancelled() {
        tracing::debug!("operation cancelled");
        return Err(ServiceError::Cancelled);
    }
    Ok(())
}

/// Run `fut` to completion unless `token` already fired.
///
/// A cancel that arrives while `fut` is in flight discards its result and
/// returns `Cancelled`. Callers only commit results to their state after this
/// returns `Ok`, so a cancelled operation leaves them untouched.
pub(crate) async fn run_cancellable<T, F>(token: &CancellationToken, fut: F) -> ServiceResult<T>
where
    F: Future<Output = ServiceResult<T>>,
{
    checkpoint(token)?;
    let result = fut.await;
    checkpoint(token)?;
    result
}
