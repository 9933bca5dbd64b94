use std::time::Duration;

use anyhow::anyhow;
use async_openai::types::chat::{
  ChatCompletionRequestMessage, CreateChatCompletionRequestArgs,
};
use stratamem_shared::{APP_ENV, AppError};

use crate::LlmConfig;

pub async fn generate_text(
  messages: Vec<ChatCompletionRequestMessage>,
) -> Result<String, AppError> {
  generate_text_with(&LlmConfig::default(), messages).await
}

pub async fn generate_text_with(
  config: &LlmConfig,
  messages: Vec<ChatCompletionRequestMessage>,
) -> Result<String, AppError> {
  let client = config.client();

  let request = CreateChatCompletionRequestArgs::default()
    .model(config.model())
    .messages(messages)
    .build()?;

  let deadline = Duration::from_secs(APP_ENV.llm_timeout_sec);
  tokio::time::timeout(deadline, client.chat().create(request))
    .await
    .map_err(|_| anyhow!("chat completion timed out after {deadline:?}"))?
    .map(|r| r.choices.into_iter())?
    .filter_map(|c| c.message.content)
    .next_back()
    .ok_or_else(|| anyhow!("empty message content").into())
}
