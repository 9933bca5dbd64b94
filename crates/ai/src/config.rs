use async_openai::{Client, config::OpenAIConfig};
use stratamem_shared::APP_ENV;

/// Chat endpoint selection. Defaults come from the environment; retrieval
/// requests may carry their own key/base/model.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
  pub api_key: Option<String>,
  pub base_url: Option<String>,
  pub model: Option<String>,
}

impl LlmConfig {
  pub(crate) fn client(&self) -> Client<OpenAIConfig> {
    let config = OpenAIConfig::new()
      .with_api_key(self.api_key.as_deref().unwrap_or(&APP_ENV.openai_api_key))
      .with_api_base(self.base_url.as_deref().unwrap_or(&APP_ENV.openai_base_url));

    Client::with_config(config)
  }

  pub(crate) fn model(&self) -> &str {
    self.model.as_deref().unwrap_or(&APP_ENV.openai_chat_model)
  }
}
