use std::time::Duration;

use stratamem_shared::AppError;

/// Default attempt budget for oracle calls.
const MAX_ATTEMPTS: u32 = 3;

/// Base delay doubled after every failed attempt.
const BASE_DELAY: Duration = Duration::from_millis(500);

/// Run an oracle call with bounded exponential backoff.
///
/// Retries every error the same way; the callers that need to
/// distinguish invalid input from transient failures do so before
/// entering the retry loop.
pub async fn with_retry<T, F, Fut>(op_name: &str, mut f: F) -> Result<T, AppError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, AppError>>,
{
  let mut delay = BASE_DELAY;

  for attempt in 1..=MAX_ATTEMPTS {
    match f().await {
      Ok(value) => return Ok(value),
      Err(err) if attempt < MAX_ATTEMPTS => {
        tracing::warn!(
          op = op_name,
          attempt,
          delay_ms = delay.as_millis() as u64,
          error = %err,
          "retrying after failure"
        );
        tokio::time::sleep(delay).await;
        delay *= 2;
      }
      Err(err) => {
        tracing::error!(op = op_name, attempts = MAX_ATTEMPTS, error = %err, "giving up");
        return Err(err);
      }
    }
  }

  unreachable!("retry loop always returns")
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};

  use anyhow::anyhow;

  use super::*;

  #[tokio::test(start_paused = true)]
  async fn succeeds_after_transient_failures() {
    let calls = AtomicU32::new(0);
    let result = with_retry("test", || {
      let n = calls.fetch_add(1, Ordering::SeqCst);
      async move {
        if n < 2 {
          Err(AppError::new(anyhow!("transient")))
        } else {
          Ok(42)
        }
      }
    })
    .await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn gives_up_after_max_attempts() {
    let calls = AtomicU32::new(0);
    let result: Result<(), _> = with_retry("test", || {
      calls.fetch_add(1, Ordering::SeqCst);
      async { Err(AppError::new(anyhow!("always"))) }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }
}
