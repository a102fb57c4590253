// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded retry with exponential backoff for infrastructure errors.
//!
//! Only errors the taxonomy marks retryable are retried; semantic errors,
//! admission errors, and timeouts return on the first attempt. A pending
//! cancellation also stops the loop.

use std::future::Future;
use std::time::Duration;

use sibyl_core::SibylError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Run `op`, retrying up to `max_retries` extra attempts on retryable
/// errors with delays of `base_delay * 2^attempt`.
pub async fn with_retry<T, F, Fut>(
    max_retries: u32,
    base_delay: Duration,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, SibylError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SibylError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries && !cancel.is_cancelled() => {
                let delay = base_delay * 2u32.saturating_pow(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e,
                      "infrastructure error, backing off before retry");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
