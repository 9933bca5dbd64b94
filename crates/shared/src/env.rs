use std::env;
use std::str::FromStr;
use std::sync::LazyLock;

fn required_env(key: &str) -> String {
  env::var(key).expect(&format!("env {key} must be set"))
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
  env::var(key)
    .ok()
    .and_then(|v| v.parse().ok())
    .unwrap_or(default)
}

pub struct AppEnv {
  pub database_url: String,
  pub redis_url: String,
  pub openai_base_url: String,
  pub openai_api_key: String,
  pub openai_chat_model: String,
  pub openai_embedding_model: String,
  /// Fixed embedding dimension; vectors are truncated/normalized to this.
  pub embed_dim: usize,
  pub pgq_num_partitions: u32,
  pub pgq_max_total: u64,
  pub pgq_inactive_sec: u64,
  /// Items younger than this stay in the queue so one episode's messages
  /// are picked up together.
  pub pgq_score_threshold_ms: u64,
  pub ew_max_pending: usize,
  pub ew_task_deadline_sec: u64,
  pub llm_timeout_sec: u64,
  /// Route /memorize through the partitioned group queue instead of
  /// calling the ingestion pipeline inline.
  pub ingest_via_queue: bool,
  pub server_addr: String,
}

impl AppEnv {
  fn new() -> Self {
    dotenvy::dotenv().ok();

    Self {
      database_url: required_env("DATABASE_URL"),
      redis_url: required_env("REDIS_URL"),
      openai_base_url: required_env("OPENAI_BASE_URL"),
      openai_api_key: required_env("OPENAI_API_KEY"),
      openai_chat_model: required_env("OPENAI_CHAT_MODEL"),
      openai_embedding_model: required_env("OPENAI_EMBEDDING_MODEL"),
      embed_dim: env_or("EMBED_DIM", 1024),
      pgq_num_partitions: env_or("PGQ_NUM_PARTITIONS", 50),
      pgq_max_total: env_or("PGQ_MAX_TOTAL", 1000),
      pgq_inactive_sec: env_or("PGQ_INACTIVE_SEC", 300),
      pgq_score_threshold_ms: env_or("PGQ_SCORE_THRESHOLD_MS", 5000),
      ew_max_pending: env_or("EW_MAX_PENDING", 256),
      ew_task_deadline_sec: env_or("EW_TASK_DEADLINE_SEC", 120),
      llm_timeout_sec: env_or("LLM_TIMEOUT_SEC", 60),
      ingest_via_queue: env_or("INGEST_VIA_QUEUE", false),
      server_addr: env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_owned()),
    }
  }
}

pub static APP_ENV: LazyLock<AppEnv> = LazyLock::new(AppEnv::new);
