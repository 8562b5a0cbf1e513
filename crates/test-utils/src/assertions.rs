//! Polling assertions for async tests.

use std::time::Duration;

use tokio::time::{Instant, sleep};

/// Default polling interval for [`assert_eventually`].
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls a condition until it returns true or the timeout expires.
///
/// Use it instead of fixed sleeps when waiting on a background task, such
/// as the ACL mode monitor flipping the capability flag.
///
/// Returns `true` if the condition became true before the timeout.
///
/// # Example
///
/// ```no_run
/// use std::sync::{
///     Arc,
///     atomic::{AtomicBool, Ordering},
/// };
/// use std::time::Duration;
/// use warden_test_utils::assert_eventually;
///
/// # async fn example() {
/// let upgraded = Arc::new(AtomicBool::new(false));
/// let flag = upgraded.clone();
/// tokio::spawn(async move {
///     tokio::time::sleep(Duration::from_millis(50)).await;
///     flag.store(true, Ordering::SeqCst);
/// });
///
/// let result = assert_eventually(Duration::from_millis(200), || upgraded.load(Ordering::SeqCst)).await;
/// assert!(result, "flag should be set");
/// # }
/// ```
pub async fn assert_eventually<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(DEFAULT_POLL_INTERVAL).await;
    }

    // Final check after timeout
    condition()
}
