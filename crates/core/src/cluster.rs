use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use chrono::Utc;
use futures::future::BoxFuture;
use sea_orm::{
  ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, Set,
};
use serde::{Deserialize, Serialize};
use stratamem_ai::{cosine_similarity, embed};
use stratamem_entities::cluster_state;
use stratamem_shared::AppError;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::MemCell;

// ──────────────────────────────────────────────────
// Configuration
// ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ClusterManagerConfig {
  /// Minimum cosine similarity to join an existing cluster.
  pub similarity_threshold: f32,
  /// Clusters quieter than this are not considered for attachment.
  pub max_time_gap: chrono::Duration,
}

impl Default for ClusterManagerConfig {
  fn default() -> Self {
    Self {
      similarity_threshold: 0.65,
      max_time_gap: chrono::Duration::days(7),
    }
  }
}

// ──────────────────────────────────────────────────
// Per-group state
// ──────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
struct GroupClusterState {
  centroids: HashMap<String, Vec<f32>>,
  counts: HashMap<String, u64>,
  /// Milliseconds since epoch of each cluster's newest member.
  last_timestamp: HashMap<String, i64>,
  /// event_id → cluster_id; each event belongs to exactly one cluster.
  assignments: HashMap<String, String>,
  next_cluster_index: u32,
}

impl GroupClusterState {
  fn open_cluster(&mut self) -> String {
    let cluster_id = format!("cluster_{:03}", self.next_cluster_index);
    self.next_cluster_index += 1;
    cluster_id
  }

  /// Best cluster by centroid cosine similarity, excluding clusters
  /// whose last activity is farther than the time gap.
  fn find_best(
    &self,
    vector: &[f32],
    timestamp_ms: i64,
    config: &ClusterManagerConfig,
  ) -> Option<String> {
    let max_gap_ms = config.max_time_gap.num_milliseconds();
    let mut best: Option<(&String, f32)> = None;

    for (cluster_id, centroid) in &self.centroids {
      if let Some(&last) = self.last_timestamp.get(cluster_id) {
        if (timestamp_ms - last).abs() > max_gap_ms {
          continue;
        }
      }
      let similarity = cosine_similarity(centroid, vector);
      if best.is_none_or(|(_, s)| similarity > s) {
        best = Some((cluster_id, similarity));
      }
    }

    best
      .filter(|&(_, similarity)| similarity >= config.similarity_threshold)
      .map(|(cluster_id, _)| cluster_id.clone())
  }

  /// Record membership and fold the vector into the running-average
  /// centroid.
  fn attach(&mut self, event_id: &str, cluster_id: &str, vector: Option<&[f32]>, timestamp_ms: i64) {
    self
      .assignments
      .insert(event_id.to_owned(), cluster_id.to_owned());

    if let Some(vector) = vector {
      let count = self.counts.get(cluster_id).copied().unwrap_or(0);
      match self.centroids.get_mut(cluster_id) {
        Some(centroid) if count > 0 && centroid.len() == vector.len() => {
          let n = count as f32;
          for (c, &v) in centroid.iter_mut().zip(vector.iter()) {
            *c = (*c * n + v) / (n + 1.0);
          }
        }
        _ => {
          self.centroids.insert(cluster_id.to_owned(), vector.to_vec());
        }
      }
    }

    *self.counts.entry(cluster_id.to_owned()).or_insert(0) += 1;
    let entry = self.last_timestamp.entry(cluster_id.to_owned()).or_insert(timestamp_ms);
    *entry = (*entry).max(timestamp_ms);
  }

  fn cluster_size(&self, cluster_id: &str) -> u64 {
    self.counts.get(cluster_id).copied().unwrap_or(0)
  }
}

// ──────────────────────────────────────────────────
// Event port
// ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ClusterAssignment {
  pub group_id: String,
  pub memcell: MemCell,
  pub cluster_id: String,
  pub cluster_size: u64,
}

type SyncCallback = Box<dyn Fn(&ClusterAssignment) + Send + Sync>;
type AsyncCallback = Box<dyn Fn(ClusterAssignment) -> BoxFuture<'static, ()> + Send + Sync>;

enum Callback {
  Sync(SyncCallback),
  Async(AsyncCallback),
}

// ──────────────────────────────────────────────────
// Manager
// ──────────────────────────────────────────────────

/// Incremental centroid clustering of MemCells per group, with an
/// explicit callback port for downstream consumers (profile building).
/// State is persisted best-effort after every assignment and re-hydrated
/// on demand.
pub struct ClusterManager {
  db: DatabaseConnection,
  config: ClusterManagerConfig,
  states: Mutex<HashMap<String, GroupClusterState>>,
  callbacks: Vec<Callback>,
}

impl ClusterManager {
  pub fn new(db: DatabaseConnection, config: ClusterManagerConfig) -> Self {
    Self {
      db,
      config,
      states: Mutex::new(HashMap::new()),
      callbacks: Vec::new(),
    }
  }

  /// Register a synchronous callback. Panics are isolated.
  pub fn on_cluster_assigned(&mut self, callback: impl Fn(&ClusterAssignment) + Send + Sync + 'static) {
    self.callbacks.push(Callback::Sync(Box::new(callback)));
  }

  /// Register an asynchronous callback; it runs as its own task so a
  /// failure cannot affect clustering or sibling callbacks.
  pub fn on_cluster_assigned_async(
    &mut self,
    callback: impl Fn(ClusterAssignment) -> BoxFuture<'static, ()> + Send + Sync + 'static,
  ) {
    self.callbacks.push(Callback::Async(Box::new(callback)));
  }

  /// Cluster one MemCell. Returns the assigned cluster id.
  pub async fn assign(&self, memcell: &MemCell) -> Result<String, AppError> {
    let event_id = memcell.id.to_string();
    let timestamp_ms = memcell.timestamp.timestamp_millis();

    let vector = match embed(&memcell.representative_text()).await {
      Ok(vector) => Some(vector.as_slice().to_vec()),
      // An unembeddable cell still gets a (singleton) cluster.
      Err(err) => {
        warn!(event_id = %memcell.id, error = %err, "embedding failed, opening singleton cluster");
        None
      }
    };

    let (cluster_id, cluster_size, snapshot) = {
      let mut states = self.states.lock().await;
      if !states.contains_key(&memcell.group_id) {
        states.insert(memcell.group_id.clone(), self.load_state(&memcell.group_id).await?);
      }
      let state = states.get_mut(&memcell.group_id).expect("state just inserted");

      let cluster_id = vector
        .as_deref()
        .and_then(|v| state.find_best(v, timestamp_ms, &self.config))
        .unwrap_or_else(|| state.open_cluster());

      state.attach(&event_id, &cluster_id, vector.as_deref(), timestamp_ms);
      (cluster_id.clone(), state.cluster_size(&cluster_id), state.clone())
    };

    if let Err(err) = self.persist_state(&memcell.group_id, &snapshot).await {
      // Cluster state is rebuildable; persistence failure is not fatal.
      warn!(group_id = %memcell.group_id, error = %err, "cluster state persistence failed");
    }

    info!(
      group_id = %memcell.group_id,
      event_id = %memcell.id,
      cluster_id = %cluster_id,
      cluster_size,
      "memcell clustered"
    );

    let assignment = ClusterAssignment {
      group_id: memcell.group_id.clone(),
      memcell: memcell.clone(),
      cluster_id: cluster_id.clone(),
      cluster_size,
    };
    self.notify(&assignment);

    Ok(cluster_id)
  }

  fn notify(&self, assignment: &ClusterAssignment) {
    for callback in &self.callbacks {
      match callback {
        Callback::Sync(callback) => {
          let result = std::panic::catch_unwind(AssertUnwindSafe(|| callback(assignment)));
          if result.is_err() {
            warn!(cluster_id = %assignment.cluster_id, "cluster callback panicked");
          }
        }
        Callback::Async(callback) => {
          tokio::spawn(callback(assignment.clone()));
        }
      }
    }
  }

  async fn load_state(&self, group_id: &str) -> Result<GroupClusterState, AppError> {
    let row = cluster_state::Entity::find_by_id(group_id.to_owned())
      .one(&self.db)
      .await?;

    match row {
      Some(row) => match serde_json::from_value(row.state) {
        Ok(state) => Ok(state),
        // An unreadable snapshot starts fresh instead of wedging ingest.
        Err(err) => {
          warn!(group_id, error = %err, "discarding unreadable cluster state");
          Ok(GroupClusterState::default())
        }
      },
      None => {
        debug!(group_id, "no persisted cluster state, starting fresh");
        Ok(GroupClusterState::default())
      }
    }
  }

  async fn persist_state(&self, group_id: &str, state: &GroupClusterState) -> Result<(), AppError> {
    let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
    let value = serde_json::to_value(state)?;

    let existing = cluster_state::Entity::find_by_id(group_id.to_owned())
      .one(&self.db)
      .await?;

    if let Some(model) = existing {
      let mut active = model.into_active_model();
      active.state = Set(value);
      active.updated_at = Set(now);
      active.update(&self.db).await?;
    } else {
      let active = cluster_state::ActiveModel {
        group_id: Set(group_id.to_owned()),
        state: Set(value),
        updated_at: Set(now),
      };
      active.insert(&self.db).await?;
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn unit_x() -> Vec<f32> {
    vec![1.0, 0.0, 0.0]
  }

  fn unit_y() -> Vec<f32> {
    vec![0.0, 1.0, 0.0]
  }

  #[test]
  fn similar_vectors_share_a_cluster() {
    let config = ClusterManagerConfig::default();
    let mut state = GroupClusterState::default();

    let first = state.open_cluster();
    state.attach("e1", &first, Some(&unit_x()), 0);

    let near = vec![0.95, 0.1, 0.0];
    assert_eq!(state.find_best(&near, 1000, &config), Some(first.clone()));

    state.attach("e2", &first, Some(&near), 1000);
    assert_eq!(state.cluster_size(&first), 2);
  }

  #[test]
  fn dissimilar_vector_opens_a_new_cluster() {
    let config = ClusterManagerConfig::default();
    let mut state = GroupClusterState::default();

    let first = state.open_cluster();
    state.attach("e1", &first, Some(&unit_x()), 0);

    assert_eq!(state.find_best(&unit_y(), 1000, &config), None);
  }

  #[test]
  fn stale_clusters_are_not_candidates() {
    let config = ClusterManagerConfig::default();
    let mut state = GroupClusterState::default();

    let first = state.open_cluster();
    state.attach("e1", &first, Some(&unit_x()), 0);

    // Same direction but eight days later.
    let eight_days_ms = 8 * 24 * 3600 * 1000;
    assert_eq!(state.find_best(&unit_x(), eight_days_ms, &config), None);
  }

  #[test]
  fn centroid_is_a_running_average() {
    let mut state = GroupClusterState::default();
    let cluster = state.open_cluster();
    state.attach("e1", &cluster, Some(&[1.0, 0.0]), 0);
    state.attach("e2", &cluster, Some(&[0.0, 1.0]), 1);

    let centroid = &state.centroids[&cluster];
    assert!((centroid[0] - 0.5).abs() < 1e-6);
    assert!((centroid[1] - 0.5).abs() < 1e-6);
  }

  #[test]
  fn each_event_maps_to_exactly_one_cluster() {
    let mut state = GroupClusterState::default();
    let a = state.open_cluster();
    let b = state.open_cluster();
    state.attach("e1", &a, Some(&unit_x()), 0);
    state.attach("e1", &b, Some(&unit_y()), 1);

    assert_eq!(state.assignments.len(), 1);
    assert_eq!(state.assignments["e1"], b);
  }

  #[test]
  fn cluster_ids_are_sequential() {
    let mut state = GroupClusterState::default();
    assert_eq!(state.open_cluster(), "cluster_000");
    assert_eq!(state.open_cluster(), "cluster_001");
  }
}
