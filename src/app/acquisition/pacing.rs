// SPDX-License-Identifier: GPL-3.0-only

//! UX pacing helpers

use std::future::Future;
use std::time::Duration;

/// Run `work` and a `minimum` timer together; resolve once both are done
///
/// A decode that finishes early is held back until the timer fires. A
/// decode that outlasts the timer resolves as soon as it finishes.
pub async fn paced<F: Future>(minimum: Duration, work: F) -> F::Output {
    let (output, ()) = tokio::join!(work, tokio::time::sleep(minimum));
    output
}

/// Bound `work` by an optional watchdog
///
/// `None` waits forever. On expiry the future is dropped; blocking work it
/// spawned keeps running and its result is discarded.
pub async fn watchdog<F: Future>(
    limit: Option<Duration>,
    work: F,
) -> Result<F::Output, tokio::time::error::Elapsed> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, work).await,
        None => Ok(work.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Instant, sleep};

    const MIN: Duration = Duration::from_millis(800);

    #[tokio::test(start_paused = true)]
    async fn test_fast_work_waits_for_minimum() {
        let start = Instant::now();
        let value = paced(MIN, async {
            sleep(Duration::from_millis(10)).await;
            7
        })
        .await;
        assert_eq!(value, 7);
        let elapsed = start.elapsed();
        assert!(elapsed >= MIN && elapsed < MIN + Duration::from_millis(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_work_adds_no_delay() {
        let start = Instant::now();
        paced(MIN, sleep(Duration::from_millis(1500))).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1500));
        assert!(elapsed < Duration::from_millis(1505));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog() {
        let never = std::future::pending::<()>();
        assert!(watchdog(Some(Duration::from_secs(5)), never).await.is_err());
        assert_eq!(watchdog(None, async { 3 }).await.unwrap(), 3);
    }
}
