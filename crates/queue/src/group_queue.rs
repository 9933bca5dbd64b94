use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use redis::{Script, aio::ConnectionManager};
use sha2::{Digest, Sha256};
use stratamem_shared::{APP_ENV, AppError};
use tracing::{debug, info, warn};

use crate::{ItemCodec, QueueItem};

// ──────────────────────────────────────────────────
// Routing
// ──────────────────────────────────────────────────

/// Map a group key onto a fixed partition. The hash must be stable
/// across processes and nodes, so all traffic for one group serializes
/// onto one partition.
pub(crate) fn stable_partition(group_key: &str, num_partitions: u32) -> u32 {
  let digest = Sha256::digest(group_key.as_bytes());
  let head = u64::from_be_bytes(digest[..8].try_into().expect("sha256 digest is 32 bytes"));
  (head % u64::from(num_partitions)) as u32
}

/// Deterministic even distribution: owners sorted lexicographically,
/// partitions dealt round-robin. Every node computes the same table.
pub(crate) fn assign_round_robin(owners: &[String], num_partitions: u32) -> Vec<(u32, String)> {
  if owners.is_empty() {
    return Vec::new();
  }
  let mut sorted: Vec<&String> = owners.iter().collect();
  sorted.sort();

  (0..num_partitions)
    .map(|p| (p, sorted[p as usize % sorted.len()].clone()))
    .collect()
}

// ──────────────────────────────────────────────────
// Lua scripts
// ──────────────────────────────────────────────────

/// KEYS[1] = count, KEYS[2..] = all partition zsets.
/// ARGV = [max_total, partition_index, member, score].
/// Admission: reject only when the total is at the cap AND no partition
/// is empty (the empty-partition bypass prevents starvation).
const DELIVER_SCRIPT: &str = r"
local total = tonumber(redis.call('GET', KEYS[1]) or '0')
local max_total = tonumber(ARGV[1])
if total >= max_total then
  local has_empty = false
  for i = 2, #KEYS do
    if redis.call('ZCARD', KEYS[i]) == 0 then
      has_empty = true
      break
    end
  end
  if not has_empty then
    return 0
  end
end
local qkey = KEYS[tonumber(ARGV[2]) + 2]
redis.call('ZADD', qkey, ARGV[4], ARGV[3])
redis.call('INCR', KEYS[1])
return 1
";

/// KEYS = [partition zset, count]. ARGV = [cutoff score].
/// Pops everything ripe in one atomic step, score-ascending.
const POP_SCRIPT: &str = r"
local items = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
if #items > 0 then
  redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
  redis.call('DECRBY', KEYS[2], #items)
end
return items
";

// ──────────────────────────────────────────────────
// Manager
// ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GroupQueueConfig {
  pub key_prefix: String,
  pub num_partitions: u32,
  pub max_total: u64,
  pub inactive_threshold: Duration,
  pub codec: ItemCodec,
}

impl GroupQueueConfig {
  pub fn from_env(key_prefix: impl Into<String>) -> Self {
    Self {
      key_prefix: key_prefix.into(),
      num_partitions: APP_ENV.pgq_num_partitions,
      max_total: APP_ENV.pgq_max_total,
      inactive_threshold: Duration::from_secs(APP_ENV.pgq_inactive_sec),
      codec: ItemCodec::Json,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct QueueStats {
  pub num_partitions: u32,
  pub total_count: u64,
  pub messages_in_partitions: u64,
  pub non_empty_partitions: u32,
  pub max_partition_size: u64,
  pub min_partition_size: u64,
  pub owners: u64,
  pub delivered: u64,
  pub consumed: u64,
  pub rejected: u64,
}

/// Sharded, Redis-backed, score-ordered message queue with
/// consumer-owned partitions. All traffic for one `group_key` lands on
/// one partition; each partition has exactly one owner at a time.
pub struct GroupQueueManager {
  conn: ConnectionManager,
  config: GroupQueueConfig,
  deliver_script: Script,
  pop_script: Script,
  delivered: AtomicU64,
  consumed: AtomicU64,
  rejected: AtomicU64,
}

impl GroupQueueManager {
  pub fn new(conn: ConnectionManager, config: GroupQueueConfig) -> Self {
    info!(
      prefix = %config.key_prefix,
      partitions = config.num_partitions,
      max_total = config.max_total,
      "group queue manager ready"
    );
    Self {
      conn,
      config,
      deliver_script: Script::new(DELIVER_SCRIPT),
      pop_script: Script::new(POP_SCRIPT),
      delivered: AtomicU64::new(0),
      consumed: AtomicU64::new(0),
      rejected: AtomicU64::new(0),
    }
  }

  #[must_use]
  pub fn config(&self) -> &GroupQueueConfig {
    &self.config
  }

  #[must_use]
  pub fn partition_for(&self, group_key: &str) -> u32 {
    stable_partition(group_key, self.config.num_partitions)
  }

  fn partition_key(&self, partition: u32) -> String {
    format!("{}:q:{partition}", self.config.key_prefix)
  }

  fn owners_key(&self) -> String {
    format!("{}:owners", self.config.key_prefix)
  }

  fn assign_key(&self) -> String {
    format!("{}:assign", self.config.key_prefix)
  }

  fn count_key(&self) -> String {
    format!("{}:count", self.config.key_prefix)
  }

  // ──────────────────────────────────────────────────
  // Delivery
  // ──────────────────────────────────────────────────

  /// Route an item onto its group's partition. Returns `false` when
  /// admission control rejects it (queue full and no empty partition).
  pub async fn deliver(&self, group_key: &str, item: &QueueItem) -> Result<bool, AppError> {
    let partition = self.partition_for(group_key);
    let member = self.config.codec.encode(item)?;
    let score = Utc::now().timestamp_millis();

    let mut invocation = self.deliver_script.prepare_invoke();
    invocation.key(self.count_key());
    for p in 0..self.config.num_partitions {
      invocation.key(self.partition_key(p));
    }
    invocation
      .arg(self.config.max_total)
      .arg(partition)
      .arg(member.as_slice())
      .arg(score);

    let mut conn = self.conn.clone();
    let admitted: i64 = invocation.invoke_async(&mut conn).await?;

    if admitted == 1 {
      self.delivered.fetch_add(1, Ordering::Relaxed);
      debug!(group_key, partition, "delivered queue item");
      Ok(true)
    } else {
      self.rejected.fetch_add(1, Ordering::Relaxed);
      warn!(
        group_key,
        partition,
        max_total = self.config.max_total,
        "delivery rejected: queue full and no empty partition"
      );
      Ok(false)
    }
  }

  // ──────────────────────────────────────────────────
  // Consumption
  // ──────────────────────────────────────────────────

  /// Drain ripe items from every partition owned by `owner_id`.
  ///
  /// Items younger than `score_threshold` stay queued so that messages
  /// of the same in-flight episode are picked up together. Ordering
  /// within one partition is score-ascending.
  pub async fn get_messages(
    &self,
    owner_id: &str,
    score_threshold: Duration,
  ) -> Result<Vec<QueueItem>, AppError> {
    let owned = self.owned_partitions(owner_id).await?;
    if owned.is_empty() {
      return Ok(Vec::new());
    }

    let cutoff = Utc::now().timestamp_millis() - score_threshold.as_millis() as i64;
    let mut conn = self.conn.clone();
    let mut items = Vec::new();

    for partition in owned {
      let raw: Vec<Vec<u8>> = self
        .pop_script
        .key(self.partition_key(partition))
        .key(self.count_key())
        .arg(cutoff)
        .invoke_async(&mut conn)
        .await?;

      for bytes in raw {
        match self.config.codec.decode(&bytes) {
          Ok(item) => items.push(item),
          // A poison member is dropped rather than wedging the partition.
          Err(err) => warn!(partition, error = %err, "discarding undecodable queue item"),
        }
      }
    }

    if !items.is_empty() {
      self.consumed.fetch_add(items.len() as u64, Ordering::Relaxed);
      debug!(owner_id, count = items.len(), "consumed queue items");
    }

    // Consuming doubles as liveness.
    self.touch_owner(owner_id).await?;

    Ok(items)
  }

  async fn owned_partitions(&self, owner_id: &str) -> Result<Vec<u32>, AppError> {
    let mut conn = self.conn.clone();
    let assignments: HashMap<String, String> = redis::cmd("HGETALL")
      .arg(self.assign_key())
      .query_async(&mut conn)
      .await?;

    let mut owned: Vec<u32> = assignments
      .into_iter()
      .filter(|(_, owner)| owner == owner_id)
      .filter_map(|(p, _)| p.parse().ok())
      .collect();
    owned.sort_unstable();
    Ok(owned)
  }

  // ──────────────────────────────────────────────────
  // Ownership
  // ──────────────────────────────────────────────────

  async fn touch_owner(&self, owner_id: &str) -> Result<(), AppError> {
    let mut conn = self.conn.clone();
    let _: () = redis::cmd("ZADD")
      .arg(self.owners_key())
      .arg(Utc::now().timestamp_millis())
      .arg(owner_id)
      .query_async(&mut conn)
      .await?;
    Ok(())
  }

  pub async fn join_consumer(&self, owner_id: &str) -> Result<(), AppError> {
    self.touch_owner(owner_id).await?;
    info!(owner_id, "consumer joined");
    self.rebalance_partitions().await?;
    Ok(())
  }

  pub async fn exit_consumer(&self, owner_id: &str) -> Result<(), AppError> {
    let mut conn = self.conn.clone();
    let _: () = redis::cmd("ZREM")
      .arg(self.owners_key())
      .arg(owner_id)
      .query_async(&mut conn)
      .await?;
    info!(owner_id, "consumer exited");
    self.rebalance_partitions().await?;
    Ok(())
  }

  pub async fn keepalive_consumer(&self, owner_id: &str) -> Result<(), AppError> {
    self.touch_owner(owner_id).await?;
    self.rebalance_partitions().await?;
    Ok(())
  }

  /// Recompute the partition → owner table from the current owner set.
  /// Returns the new table grouped by owner.
  pub async fn rebalance_partitions(&self) -> Result<HashMap<String, Vec<u32>>, AppError> {
    let mut conn = self.conn.clone();
    let owners: Vec<String> = redis::cmd("ZRANGE")
      .arg(self.owners_key())
      .arg(0)
      .arg(-1)
      .query_async(&mut conn)
      .await?;

    let table = assign_round_robin(&owners, self.config.num_partitions);

    let mut pipe = redis::pipe();
    pipe.atomic();
    pipe.cmd("DEL").arg(self.assign_key()).ignore();
    if !table.is_empty() {
      let mut hset = pipe.cmd("HSET");
      hset.arg(self.assign_key());
      for (partition, owner) in &table {
        hset.arg(partition.to_string()).arg(owner);
      }
      hset.ignore();
    }
    let _: () = pipe.query_async(&mut conn).await?;

    let mut by_owner: HashMap<String, Vec<u32>> = HashMap::new();
    for (partition, owner) in table {
      by_owner.entry(owner).or_default().push(partition);
    }
    debug!(owners = by_owner.len(), "rebalanced partitions");
    Ok(by_owner)
  }

  /// Evict owners whose last keepalive is older than the inactivity
  /// threshold, then rebalance. Returns the evicted owner ids.
  pub async fn cleanup_inactive_owners(&self) -> Result<Vec<String>, AppError> {
    let horizon =
      Utc::now().timestamp_millis() - self.config.inactive_threshold.as_millis() as i64;

    let mut conn = self.conn.clone();
    let stale: Vec<String> = redis::cmd("ZRANGEBYSCORE")
      .arg(self.owners_key())
      .arg("-inf")
      .arg(horizon)
      .query_async(&mut conn)
      .await?;

    if stale.is_empty() {
      return Ok(stale);
    }

    let mut zrem = redis::cmd("ZREM");
    zrem.arg(self.owners_key());
    for owner in &stale {
      zrem.arg(owner);
    }
    let _: () = zrem.query_async(&mut conn).await?;

    warn!(evicted = ?stale, "evicted inactive owners");
    self.rebalance_partitions().await?;
    Ok(stale)
  }

  // ──────────────────────────────────────────────────
  // Introspection & maintenance
  // ──────────────────────────────────────────────────

  pub async fn stats(&self) -> Result<QueueStats, AppError> {
    let mut conn = self.conn.clone();

    let total_count: Option<u64> = redis::cmd("GET")
      .arg(self.count_key())
      .query_async(&mut conn)
      .await?;
    let owners: u64 = redis::cmd("ZCARD")
      .arg(self.owners_key())
      .query_async(&mut conn)
      .await?;

    let mut pipe = redis::pipe();
    for p in 0..self.config.num_partitions {
      pipe.cmd("ZCARD").arg(self.partition_key(p));
    }
    let sizes: Vec<u64> = pipe.query_async(&mut conn).await?;

    Ok(QueueStats {
      num_partitions: self.config.num_partitions,
      total_count: total_count.unwrap_or(0),
      messages_in_partitions: sizes.iter().sum(),
      non_empty_partitions: sizes.iter().filter(|&&s| s > 0).count() as u32,
      max_partition_size: sizes.iter().copied().max().unwrap_or(0),
      min_partition_size: sizes.iter().copied().min().unwrap_or(0),
      owners,
      delivered: self.delivered.load(Ordering::Relaxed),
      consumed: self.consumed.load(Ordering::Relaxed),
      rejected: self.rejected.load(Ordering::Relaxed),
    })
  }

  /// Drop every key of this manager. Intended for tests and operational
  /// resets, not the normal lifecycle.
  pub async fn force_reset(&self) -> Result<(), AppError> {
    let mut conn = self.conn.clone();
    let mut del = redis::cmd("DEL");
    del
      .arg(self.count_key())
      .arg(self.owners_key())
      .arg(self.assign_key());
    for p in 0..self.config.num_partitions {
      del.arg(self.partition_key(p));
    }
    let _: () = del.query_async(&mut conn).await?;
    Ok(())
  }

  /// Log queue health on an interval until the returned handle is
  /// aborted.
  pub fn spawn_stats_logger(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
    let manager = self;
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        match manager.stats().await {
          Ok(stats) => info!(
            prefix = %manager.config.key_prefix,
            total = stats.total_count,
            non_empty = stats.non_empty_partitions,
            max_partition = stats.max_partition_size,
            owners = stats.owners,
            delivered = stats.delivered,
            consumed = stats.consumed,
            rejected = stats.rejected,
            "group queue status"
          ),
          Err(err) => warn!(error = %err, "failed to read queue stats"),
        }
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::{assign_round_robin, stable_partition};

  #[test]
  fn partition_is_stable_across_calls() {
    for key in ["group_1", "group_42", "会话-7", ""] {
      let first = stable_partition(key, 50);
      for _ in 0..10 {
        assert_eq!(stable_partition(key, 50), first);
      }
      assert!(first < 50);
    }
  }

  #[test]
  fn partitions_are_reasonably_distributed() {
    let n = 50_u32;
    let mut counts = vec![0_u32; n as usize];
    for i in 0..1000 {
      counts[stable_partition(&format!("group_{i}"), n) as usize] += 1;
    }

    let expected = 1000 / n; // 20 per partition
    for (partition, &count) in counts.iter().enumerate() {
      assert!(
        count >= expected / 10 && count <= expected * 5,
        "partition {partition} got {count} keys"
      );
    }
  }

  #[test]
  fn rebalance_is_fair_for_seven_owners() {
    let owners: Vec<String> = (1..=7).map(|i| format!("consumer_{i}")).collect();
    let table = assign_round_robin(&owners, 50);
    assert_eq!(table.len(), 50);

    let mut per_owner: HashMap<&str, u32> = HashMap::new();
    for (_, owner) in &table {
      *per_owner.entry(owner.as_str()).or_default() += 1;
    }

    assert_eq!(per_owner.len(), 7);
    let max = per_owner.values().max().copied().unwrap();
    let min = per_owner.values().min().copied().unwrap();
    assert!(max - min <= 1, "max={max} min={min}");
    assert_eq!(per_owner.values().filter(|&&c| c == 8).count(), 1);
    assert_eq!(per_owner.values().filter(|&&c| c == 7).count(), 6);
  }

  #[test]
  fn rebalance_is_deterministic_regardless_of_input_order() {
    let forward: Vec<String> = (1..=5).map(|i| format!("c{i}")).collect();
    let mut reversed = forward.clone();
    reversed.reverse();

    assert_eq!(assign_round_robin(&forward, 50), assign_round_robin(&reversed, 50));
  }

  #[test]
  fn single_owner_takes_every_partition() {
    let owners = vec!["only".to_owned()];
    let table = assign_round_robin(&owners, 50);
    assert_eq!(table.len(), 50);
    assert!(table.iter().all(|(_, o)| o == "only"));
  }

  #[test]
  fn no_owners_means_no_assignments() {
    assert!(assign_round_robin(&[], 50).is_empty());
  }
}
