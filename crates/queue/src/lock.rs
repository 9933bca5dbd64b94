use std::time::Duration;

use redis::{Script, aio::ConnectionManager};
use stratamem_shared::AppError;
use tracing::warn;
use uuid::Uuid;

/// Release only if the token still matches; a lock that expired and was
/// re-acquired elsewhere must not be deleted by the old holder.
const RELEASE_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
";

/// Per-group advisory lock. The ingestion pipeline holds it across
/// boundary detection so two in-flight calls for the same group cannot
/// both cut a MemCell.
#[derive(Clone)]
pub struct GroupLock {
  conn: ConnectionManager,
  release_script: Script,
}

pub struct LockGuard {
  key: String,
  token: String,
}

impl GroupLock {
  pub fn new(conn: ConnectionManager) -> Self {
    Self {
      conn,
      release_script: Script::new(RELEASE_SCRIPT),
    }
  }

  fn key(group_id: &str) -> String {
    format!("lock:memorize:{group_id}")
  }

  /// Try to take the lock, retrying until `wait` elapses. The lock
  /// auto-expires after `ttl` in case a holder dies mid-flight.
  pub async fn acquire(
    &self,
    group_id: &str,
    ttl: Duration,
    wait: Duration,
  ) -> Result<Option<LockGuard>, AppError> {
    let key = Self::key(group_id);
    let token = Uuid::new_v4().to_string();
    let deadline = tokio::time::Instant::now() + wait;

    loop {
      let mut conn = self.conn.clone();
      let acquired: Option<String> = redis::cmd("SET")
        .arg(&key)
        .arg(&token)
        .arg("NX")
        .arg("PX")
        .arg(ttl.as_millis() as u64)
        .query_async(&mut conn)
        .await?;

      if acquired.is_some() {
        return Ok(Some(LockGuard { key, token }));
      }
      if tokio::time::Instant::now() >= deadline {
        warn!(group_id, "timed out waiting for group lock");
        return Ok(None);
      }
      tokio::time::sleep(Duration::from_millis(50)).await;
    }
  }

  pub async fn release(&self, guard: LockGuard) -> Result<(), AppError> {
    let mut conn = self.conn.clone();
    let _: i64 = self
      .release_script
      .key(&guard.key)
      .arg(&guard.token)
      .invoke_async(&mut conn)
      .await?;
    Ok(())
  }
}
