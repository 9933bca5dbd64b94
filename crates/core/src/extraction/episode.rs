use schemars::JsonSchema;
use serde::Deserialize;
use stratamem_ai::{
  ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
  ChatCompletionRequestUserMessage, generate_object,
};
use stratamem_shared::AppError;

use crate::MemCell;

use super::render_memcell;

/// Narrative produced for one MemCell, group-scoped or from one
/// participant's perspective.
#[derive(Debug, Deserialize, JsonSchema, Clone)]
pub struct EpisodeDraft {
  /// Short topic label, a few words.
  pub subject: String,
  /// The full narrative of what happened, past tense, self-contained.
  pub episode: String,
  /// One-or-two sentence condensation of the narrative.
  pub summary: String,
}

const GROUP_EPISODE_PROMPT: &str = "\
You turn a bounded slice of conversation into an episodic memory.

Write a self-contained narrative of what happened in this conversation \
slice: who was involved, what was discussed or done, what was decided, \
and how it ended. Past tense, concrete, no meta commentary about the \
transcript itself. Keep every name, date, place and number that appears.

Also produce a short subject label and a one-or-two sentence summary.";

const PERSONAL_EPISODE_PROMPT: &str = "\
You turn a bounded slice of conversation into an episodic memory for one \
specific participant.

Write the narrative from that participant's point of view: what they \
said, asked, learned, agreed to, or experienced in this slice. Mention \
other participants only as they relate to this person. Past tense, \
concrete. Keep every name, date, place and number relevant to them.

Also produce a short subject label and a one-or-two sentence summary.";

/// Extract an episode narrative. `user_id = None` gives the group-scope
/// episode; otherwise the narrative is written for that participant.
pub async fn extract_episode(
  memcell: &MemCell,
  user_id: Option<&str>,
) -> Result<EpisodeDraft, AppError> {
  let (system_prompt, schema_name) = match user_id {
    None => (GROUP_EPISODE_PROMPT, "group_episode"),
    Some(_) => (PERSONAL_EPISODE_PROMPT, "personal_episode"),
  };

  let mut user_content = String::new();
  if let Some(user_id) = user_id {
    user_content.push_str(&format!("Write the episode for participant: {user_id}\n\n"));
  }
  user_content.push_str(&render_memcell(memcell));

  let system = ChatCompletionRequestSystemMessage::from(system_prompt);
  let user = ChatCompletionRequestUserMessage::from(user_content);

  generate_object::<EpisodeDraft>(
    vec![
      ChatCompletionRequestMessage::System(system),
      ChatCompletionRequestMessage::User(user),
    ],
    schema_name.to_owned(),
    Some("Episode narrative for a bounded conversation slice".to_owned()),
  )
  .await
}
