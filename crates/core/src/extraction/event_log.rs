use schemars::JsonSchema;
use serde::Deserialize;
use stratamem_ai::{
  ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
  ChatCompletionRequestUserMessage, generate_object,
};
use stratamem_shared::AppError;

use crate::MemCell;

use super::render_memcell;

#[derive(Debug, Deserialize, JsonSchema)]
struct EventLogOutput {
  /// Chronologically ordered atomic facts, one event each.
  facts: Vec<String>,
}

const EVENT_LOG_PROMPT: &str = "\
You break an episode down into an ordered event log for one user.

Each entry is one atomic fact: a single thing that happened, stated in \
one short sentence with the user as subject where possible \
(\"Alice booked the flight to Osaka\"). Keep chronological order. \
Skip pleasantries and filler. An empty list is valid when nothing \
happened worth logging.";

/// Extract the ordered atomic-fact log for `user_id` from an episode.
pub async fn extract_atomic_facts(
  memcell: &MemCell,
  episode: &str,
  user_id: &str,
) -> Result<Vec<String>, AppError> {
  let user_content = format!(
    "User: {user_id}\n\nEpisode:\n{episode}\n\nTranscript:\n{}",
    render_memcell(memcell)
  );

  let system = ChatCompletionRequestSystemMessage::from(EVENT_LOG_PROMPT);
  let user = ChatCompletionRequestUserMessage::from(user_content);

  let output = generate_object::<EventLogOutput>(
    vec![
      ChatCompletionRequestMessage::System(system),
      ChatCompletionRequestMessage::User(user),
    ],
    "event_log".to_owned(),
    Some("Chronological atomic facts for one user from an episode".to_owned()),
  )
  .await?;

  Ok(output.facts)
}
