use schemars::JsonSchema;
use serde::Deserialize;
use stratamem_ai::{
  ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
  ChatCompletionRequestUserMessage, generate_object,
};
use stratamem_shared::{AppError, Scene};

/// Structured per-user summary built from a cluster of related episodes.
#[derive(Debug, Deserialize, JsonSchema, Clone)]
pub struct ProfileDraft {
  /// A few sentences describing who this user is in this conversation.
  pub summary: String,
  pub interests: Vec<String>,
  pub skills: Vec<String>,
  /// Stable personality or behavior traits.
  pub traits: Vec<String>,
}

const ASSISTANT_PROFILE_PROMPT: &str = "\
You maintain a profile of a user from their conversations with an \
assistant.

From the episodes below, describe: what this user is interested in, \
their preferences and habits, skills they demonstrate, and stable \
personality traits. Only include what the episodes support. Lists hold \
short phrases, not sentences.";

const GROUP_CHAT_PROFILE_PROMPT: &str = "\
You maintain a work profile of a user from group-chat episodes.

From the episodes below, describe: their role and responsibilities, \
projects and topics they engage with, skills they demonstrate, and how \
they collaborate. Only include what the episodes support. Lists hold \
short phrases, not sentences.";

/// Build a profile of `user_id` from the concatenated episode narratives
/// of one cluster. The scene selects what the profile focuses on.
pub async fn extract_profile(
  user_id: &str,
  episodes: &[String],
  scene: Scene,
) -> Result<ProfileDraft, AppError> {
  let system_prompt = if scene.is_assistant() {
    ASSISTANT_PROFILE_PROMPT
  } else {
    GROUP_CHAT_PROFILE_PROMPT
  };

  let user_content = format!("User: {user_id}\n\nEpisodes:\n{}", episodes.join("\n---\n"));

  let system = ChatCompletionRequestSystemMessage::from(system_prompt);
  let user = ChatCompletionRequestUserMessage::from(user_content);

  generate_object::<ProfileDraft>(
    vec![
      ChatCompletionRequestMessage::System(system),
      ChatCompletionRequestMessage::User(user),
    ],
    "user_profile".to_owned(),
    Some("Structured user profile from related episodes".to_owned()),
  )
  .await
}
