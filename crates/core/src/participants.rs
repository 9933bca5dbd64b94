/// Whether a participant id belongs to a bot rather than a human user.
/// Bots never get personal memories or cloned episodes.
#[must_use]
pub fn is_bot_participant(user_id: &str) -> bool {
  let lowered = user_id.to_lowercase();
  lowered.contains("bot") || lowered.contains("assistant")
}

#[cfg(test)]
mod tests {
  use super::is_bot_participant;

  #[test]
  fn recognizes_bot_ids() {
    assert!(is_bot_participant("bot_X"));
    assert!(is_bot_participant("Robot-7"));
    assert!(is_bot_participant("my_assistant"));
  }

  #[test]
  fn passes_human_ids() {
    assert!(!is_bot_participant("user_A"));
    assert!(!is_bot_participant("alice"));
  }
}
