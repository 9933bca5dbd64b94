use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use sea_orm::Database;
use stratamem_core::{
  BoundaryDetector, ClusterManager, ClusterManagerConfig, IngestionPipeline, MemorizeRequest,
  ProfileManager, RetrievalEngine, MemoryStore,
};
use stratamem_migration::{Migrator, MigratorTrait};
use stratamem_queue::{
  ConversationBuffer, GroupLock, GroupQueueConfig, GroupQueueManager, QueueConsumer,
};
use stratamem_server::utils::{AppState, shutdown_signal};
use stratamem_server::server;
use stratamem_shared::{APP_ENV, AppError, RawMessage};
use stratamem_worker::ExtractionWorker;
use tracing_error::ErrorLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
    )
    .with(ErrorLayer::default())
    .with(tracing_subscriber::fmt::layer())
    .init();

  let db = Database::connect(APP_ENV.database_url.as_str()).await?;

  // Apply all pending migrations
  // https://www.sea-ql.org/SeaORM/docs/migration/running-migration/#migrating-programmatically
  Migrator::up(&db, None).await?;

  let redis_client = redis::Client::open(APP_ENV.redis_url.as_str())?;
  let redis_conn = ConnectionManager::new(redis_client).await?;

  let store = MemoryStore::new(db.clone());

  let mut clusters = ClusterManager::new(db.clone(), ClusterManagerConfig::default());
  Arc::new(ProfileManager::new(store.clone())).subscribe(&mut clusters);
  let clusters = Arc::new(clusters);

  let worker = ExtractionWorker::start(store.clone(), clusters);

  let pipeline = Arc::new(IngestionPipeline::new(
    db.clone(),
    ConversationBuffer::new(redis_conn.clone()),
    GroupLock::new(redis_conn.clone()),
    BoundaryDetector::default(),
    Arc::new(worker.handle()),
  ));
  let engine = RetrievalEngine::new(store);

  let queue = APP_ENV.ingest_via_queue.then(|| {
    Arc::new(GroupQueueManager::new(
      redis_conn,
      GroupQueueConfig::from_env("pgq:memorize"),
    ))
  });
  let _stats_logger = queue
    .as_ref()
    .map(|queue| Arc::clone(queue).spawn_stats_logger(Duration::from_secs(30)));

  let state = AppState::new(
    db,
    Arc::clone(&pipeline),
    engine,
    worker.handle(),
    queue.clone(),
  );

  if let Some(queue) = queue {
    let consumer = QueueConsumer::new(queue);
    let handler_pipeline = Arc::clone(&pipeline);
    let consumer_future = consumer.run(
      move |item| {
        let pipeline = Arc::clone(&handler_pipeline);
        async move {
          let message: RawMessage = serde_json::from_value(item.payload)?;
          let request = MemorizeRequest {
            group_id: item.group_key,
            group_name: None,
            new_messages: vec![message],
            kind: Default::default(),
          };
          pipeline.memorize(&request).await.map(|_| ())
        }
      },
      shutdown_signal(),
    );

    let _ = tokio::try_join!(server(state), consumer_future);
  } else {
    server(state).await?;
  }

  worker.stop(Duration::from_secs(30)).await;

  Ok(())
}
