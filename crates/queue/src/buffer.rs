use redis::aio::ConnectionManager;
use stratamem_shared::{AppError, RawMessage};
use tracing::debug;

/// Most recent messages kept per group.
const MAX_LENGTH: usize = 1000;

/// Per-conversation rolling message cache on a capped Redis list.
/// Reads come back in chronological order; appends beyond `MAX_LENGTH`
/// push the oldest messages out.
#[derive(Clone)]
pub struct ConversationBuffer {
  conn: ConnectionManager,
}

impl ConversationBuffer {
  pub fn new(conn: ConnectionManager) -> Self {
    Self { conn }
  }

  fn key(group_id: &str) -> String {
    format!("cb:{group_id}")
  }

  /// Fetch up to `limit` most recent messages, oldest first.
  pub async fn get(&self, group_id: &str, limit: usize) -> Result<Vec<RawMessage>, AppError> {
    let mut conn = self.conn.clone();
    let raw: Vec<String> = redis::cmd("LRANGE")
      .arg(Self::key(group_id))
      .arg(-(limit as i64))
      .arg(-1)
      .query_async(&mut conn)
      .await?;

    raw
      .iter()
      .map(|entry| serde_json::from_str(entry).map_err(AppError::from))
      .collect()
  }

  pub async fn append(&self, group_id: &str, messages: &[RawMessage]) -> Result<(), AppError> {
    if messages.is_empty() {
      return Ok(());
    }

    let mut conn = self.conn.clone();
    let key = Self::key(group_id);

    let mut pipe = redis::pipe();
    pipe.atomic();
    let mut rpush = pipe.cmd("RPUSH");
    rpush.arg(&key);
    for message in messages {
      rpush.arg(serde_json::to_string(message)?);
    }
    rpush.ignore();
    pipe
      .cmd("LTRIM")
      .arg(&key)
      .arg(-(MAX_LENGTH as i64))
      .arg(-1)
      .ignore();
    let _: () = pipe.query_async(&mut conn).await?;

    debug!(group_id, appended = messages.len(), "buffered messages");
    Ok(())
  }

  pub async fn clear(&self, group_id: &str) -> Result<(), AppError> {
    let mut conn = self.conn.clone();
    let _: () = redis::cmd("DEL")
      .arg(Self::key(group_id))
      .query_async(&mut conn)
      .await?;
    debug!(group_id, "cleared conversation buffer");
    Ok(())
  }
}
