use std::sync::Arc;

use chrono::Utc;
use stratamem_ai::with_retry;
use stratamem_shared::{AppError, Scene};
use tracing::{debug, info, warn};

use crate::{
  ClusterAssignment, ClusterManager, MemoryStore, NewProfileMemory, extraction::extract_profile,
  get_scene, participants::is_bot_participant,
};

/// Clusters smaller than this don't carry enough signal for a profile.
const MIN_CLUSTER_SIZE: u64 = 5;

/// Episode narratives fed into one profile extraction.
const EPISODES_PER_PROFILE: u64 = 10;

/// Rebuilds per-(user, group) profiles whenever a cluster of related
/// MemCells grows past the minimum size. Subscribes to the cluster
/// manager's assignment port.
pub struct ProfileManager {
  store: MemoryStore,
  min_cluster_size: u64,
}

impl ProfileManager {
  pub fn new(store: MemoryStore) -> Self {
    Self {
      store,
      min_cluster_size: MIN_CLUSTER_SIZE,
    }
  }

  /// Hook this manager into the cluster assignment port. Runs as an
  /// async callback so profile extraction never blocks clustering.
  pub fn subscribe(self: Arc<Self>, clusters: &mut ClusterManager) {
    clusters.on_cluster_assigned_async(move |assignment| {
      let manager = Arc::clone(&self);
      Box::pin(async move {
        if let Err(err) = manager.handle_assignment(&assignment).await {
          warn!(
            group_id = %assignment.group_id,
            cluster_id = %assignment.cluster_id,
            error = %err,
            "profile refresh failed"
          );
        }
      })
    });
  }

  async fn handle_assignment(&self, assignment: &ClusterAssignment) -> Result<(), AppError> {
    if assignment.cluster_size < self.min_cluster_size {
      debug!(
        cluster_id = %assignment.cluster_id,
        size = assignment.cluster_size,
        "cluster below profile threshold"
      );
      return Ok(());
    }

    let scene = get_scene(&assignment.group_id, self.store.db()).await?;

    for user_id in &assignment.memcell.participants {
      if is_bot_participant(user_id) {
        continue;
      }
      if let Err(err) = self.refresh_profile(user_id, &assignment.group_id, scene).await {
        warn!(user_id, error = %err, "profile extraction failed for user");
      }
    }

    Ok(())
  }

  async fn refresh_profile(
    &self,
    user_id: &str,
    group_id: &str,
    scene: Scene,
  ) -> Result<(), AppError> {
    let episodes = self
      .store
      .recent_episodes_for_user(group_id, user_id, EPISODES_PER_PROFILE)
      .await?;
    if episodes.is_empty() {
      return Ok(());
    }

    let narratives: Vec<String> = episodes.iter().map(|e| e.episode.clone()).collect();
    let draft =
      with_retry("profile_extraction", || extract_profile(user_id, &narratives, scene)).await?;

    let scenario = if scene.is_assistant() { "assistant" } else { "group_chat" };
    let model = self
      .store
      .save_profile(NewProfileMemory {
        user_id: user_id.to_owned(),
        group_id: group_id.to_owned(),
        version: Utc::now().format("%Y-%m").to_string(),
        scenario: scenario.to_owned(),
        summary: draft.summary,
        interests: draft.interests,
        skills: draft.skills,
        traits: draft.traits,
      })
      .await?;

    info!(
      user_id,
      group_id,
      version = %model.version,
      "profile refreshed"
    );
    Ok(())
  }
}
