use std::time::Duration;

use anyhow::anyhow;
use async_openai::{Client, config::OpenAIConfig, types::embeddings::CreateEmbeddingRequestArgs};
use sea_orm::prelude::PgVector;
use stratamem_shared::{APP_ENV, AppError};

use crate::embed_shared::process_embedding;

pub async fn embed(input: &str) -> Result<PgVector, AppError> {
  let config = OpenAIConfig::new()
    .with_api_key(&APP_ENV.openai_api_key)
    .with_api_base(&APP_ENV.openai_base_url);

  let client = Client::with_config(config);

  let request = CreateEmbeddingRequestArgs::default()
    .model(&APP_ENV.openai_embedding_model)
    .input(input)
    .dimensions(APP_ENV.embed_dim as u32)
    .build()?;

  let deadline = Duration::from_secs(APP_ENV.llm_timeout_sec);
  let embedding = tokio::time::timeout(deadline, client.embeddings().create(request))
    .await
    .map_err(|_| anyhow!("embedding request timed out after {deadline:?}"))?
    .map(|r| r.data.into_iter())?
    .map(|e| e.embedding)
    .next_back()
    .ok_or_else(|| anyhow!("empty embedding"))?;

  let processed = process_embedding(embedding)?;
  Ok(PgVector::from(processed))
}
