use std::{fmt::Debug, future::Future, time::Duration};

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Runs `f` until it succeeds, at most `attempts` times
///
/// After failed attempt number `n`, waits `delay * 2^(n-1)` before trying
/// again. Returns the last error once all attempts failed.
pub async fn retry<T, E, F, Fut>(attempts: u32, delay: Duration, mut f: F) -> Result<T, E>
where
    E: Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(res) => return Ok(res),
            Err(err) if attempt >= attempts => return Err(err),
            Err(err) => {
                let wait = delay.saturating_mul(2u32.saturating_pow(attempt - 1));
                tracing::warn!(?err, attempt, ?wait, "attempt failed, retrying");
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn backs_off_exponentially() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let res: Result<(), &str> = retry(3, Duration::from_secs(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("nope")
        })
        .await;
        assert_eq!(res, Err("nope"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second, none after the last
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_millis(3100), "waited {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_success() {
        let calls = AtomicU32::new(0);
        let res = retry(5, Duration::from_millis(100), || async {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Err("flaky"),
                n => Ok(n),
            }
        })
        .await;
        assert_eq!(res, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);
        let res: Result<(), &str> = retry(0, Duration::from_secs(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("nope")
        })
        .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
