use std::fmt::Write;
use std::time::Duration;

use chrono::TimeDelta;
use schemars::JsonSchema;
use serde::Deserialize;
use stratamem_ai::{
  ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
  ChatCompletionRequestUserMessage, generate_object,
};
use stratamem_shared::{AppError, MemCellKind, RawMessage};
use tracing::{debug, info, warn};

use crate::NewMemCell;

// ──────────────────────────────────────────────────
// Configuration
// ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BoundaryConfig {
  /// Below this many messages the LLM is not consulted unless a hard
  /// signal is present.
  pub min_messages: usize,
  /// Minimum elapsed time across the sequence for short sequences.
  pub min_elapsed: Duration,
  /// A silence of at least this long always ends the episode.
  pub hard_gap: Duration,
}

impl Default for BoundaryConfig {
  fn default() -> Self {
    Self {
      min_messages: 3,
      min_elapsed: Duration::from_secs(10 * 60),
      hard_gap: Duration::from_secs(4 * 60 * 60),
    }
  }
}

/// Phrases that mark an explicit topic hand-off.
const SUBJECT_SWITCH_MARKERS: &[&str] = &[
  "by the way",
  "speaking of",
  "anyway",
  "on another note",
  "换个话题",
  "顺便",
];

// ──────────────────────────────────────────────────
// Input / output
// ──────────────────────────────────────────────────

#[derive(Debug)]
pub struct BoundaryInput<'a> {
  pub history: &'a [RawMessage],
  pub new: &'a [RawMessage],
  pub group_id: &'a str,
  pub group_name: Option<&'a str>,
  pub kind: MemCellKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryStatus {
  /// A completed episode was cut; a MemCell draft accompanies it.
  Boundary,
  /// No boundary; keep accumulating.
  Continue,
  /// Evidence is insufficient or the oracle failed; keep accumulating
  /// and re-evaluate on the next batch.
  Wait,
}

// ──────────────────────────────────────────────────
// LLM decision payload
// ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
enum DecisionKind {
  /// The sequence contains a completed, self-contained episode.
  Boundary,
  /// The conversation is still flowing; no episode has completed.
  Continue,
  /// Cannot tell yet; more messages are needed.
  Wait,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct BoundaryDetectionOutput {
  decision: DecisionKind,
  /// Index (0-based, into the numbered transcript) of the last message
  /// of the completed episode. Only meaningful for "boundary".
  end_index: Option<i64>,
  /// Short topic label for the episode, when one exists.
  subject: Option<String>,
  /// One-or-two sentence summary of the episode.
  summary: Option<String>,
}

const BOUNDARY_SYSTEM_PROMPT: &str = "\
You segment a running conversation into self-contained episodes.

You are given a numbered transcript: earlier messages that are already \
accumulated, then the newly arrived ones. Decide whether the transcript \
contains a COMPLETED episode.

Signals to weigh:
- **Topic coherence**: did the subject of discussion change?
- **Intent change**: did the purpose shift? \
  (e.g., chatting → asking, discussing → deciding)
- **Temporal markers**: phrases like \"by the way\", \"anyway\", \
  \"speaking of\", \"换个话题\", \"顺便\" signal a hand-off.
- **Closure**: the thread reached a conclusion, agreement, or goodbye.

Output:
- **decision**: \"boundary\" if a completed episode exists, \"continue\" \
  if the conversation is clearly still on the same thread, \"wait\" if \
  you cannot tell yet.
- **end_index**: for \"boundary\", the number of the LAST message that \
  belongs to the completed episode. Otherwise null.
- **subject**: for \"boundary\", a short topic label. Otherwise null.
- **summary**: for \"boundary\", one or two sentences. Otherwise null.";

// ──────────────────────────────────────────────────
// Pure helpers
// ──────────────────────────────────────────────────

fn contains_subject_switch(content: &str) -> bool {
  let lowered = content.to_lowercase();
  SUBJECT_SWITCH_MARKERS.iter().any(|m| lowered.contains(m))
}

/// A hard boundary between two adjacent messages: long silence, UTC date
/// rollover, or an explicit subject switch opening the next message.
fn hard_signal_between(prev: &RawMessage, next: &RawMessage, config: &BoundaryConfig) -> bool {
  let gap = next.created_at - prev.created_at;
  gap >= TimeDelta::from_std(config.hard_gap).unwrap_or(TimeDelta::MAX)
    || next.created_at.date_naive() != prev.created_at.date_naive()
    || contains_subject_switch(&next.content)
}

/// Validate the LLM's end index against the history/new split.
///
/// The cut must reach at least the tail of the accumulated history —
/// a cut strictly inside history means the evidence that triggered it
/// predates the new messages, so we clamp and wait for more. An index
/// past the end clamps to the last message.
fn validate_end_index(end_index: i64, history_len: usize, seq_len: usize) -> Option<usize> {
  if end_index < 0 {
    return None;
  }
  let end = end_index as usize;
  if history_len > 0 && end < history_len - 1 {
    return None;
  }
  Some(end.min(seq_len - 1))
}

fn distinct_senders(messages: &[RawMessage]) -> Vec<String> {
  let mut seen = Vec::new();
  for message in messages {
    if !seen.contains(&message.sender_id) {
      seen.push(message.sender_id.clone());
    }
  }
  seen
}

fn render_transcript(messages: &[RawMessage]) -> String {
  let mut out = String::new();
  for (index, message) in messages.iter().enumerate() {
    let sender = message.sender_name.as_deref().unwrap_or(&message.sender_id);
    let _ = writeln!(
      out,
      "[{index}] {} {}: {}",
      message.created_at.format("%Y-%m-%d %H:%M:%S"),
      sender,
      message.content
    );
  }
  out
}

// ──────────────────────────────────────────────────
// Detector
// ──────────────────────────────────────────────────

/// Decides when an accumulated message sequence constitutes a completed
/// episode. Deterministic rules run first; the LLM is only consulted
/// when they are inconclusive.
#[derive(Debug, Default, Clone)]
pub struct BoundaryDetector {
  config: BoundaryConfig,
}

impl BoundaryDetector {
  pub fn new(config: BoundaryConfig) -> Self {
    Self { config }
  }

  pub async fn decide(
    &self,
    input: BoundaryInput<'_>,
  ) -> Result<(Option<NewMemCell>, BoundaryStatus), AppError> {
    if input.new.is_empty() {
      return Ok((None, BoundaryStatus::Continue));
    }

    let mut seq: Vec<RawMessage> = input
      .history
      .iter()
      .chain(input.new.iter())
      .cloned()
      .collect();
    seq.sort_by_key(|m| m.created_at);

    // Hard signal between the buffered tail and the first new message
    // cuts deterministically at the tail, no LLM involved.
    if let (Some(prev), Some(next)) = (input.history.last(), input.new.first()) {
      if hard_signal_between(prev, next, &self.config) {
        info!(
          group_id = input.group_id,
          history = input.history.len(),
          "hard boundary signal, cutting at buffered tail"
        );
        let cell = self.build_cell(&input, &seq[..input.history.len()], None, None);
        return Ok((Some(cell), BoundaryStatus::Boundary));
      }
    }

    // Too little evidence to be worth an oracle call.
    let elapsed = match (seq.first(), seq.last()) {
      (Some(first), Some(last)) => last.created_at - first.created_at,
      _ => TimeDelta::zero(),
    };
    if seq.len() < self.config.min_messages
      && elapsed < TimeDelta::from_std(self.config.min_elapsed).unwrap_or(TimeDelta::MAX)
    {
      return Ok((None, BoundaryStatus::Continue));
    }

    let system = ChatCompletionRequestSystemMessage::from(BOUNDARY_SYSTEM_PROMPT);
    let user = ChatCompletionRequestUserMessage::from(format!(
      "Accumulated messages: [0]..[{}]\nNew messages: [{}]..[{}]\n\nTranscript:\n{}",
      input.history.len().saturating_sub(1),
      input.history.len(),
      seq.len() - 1,
      render_transcript(&seq)
    ));

    let output = match generate_object::<BoundaryDetectionOutput>(
      vec![
        ChatCompletionRequestMessage::System(system),
        ChatCompletionRequestMessage::User(user),
      ],
      "episode_boundary".to_owned(),
      Some("Episode boundary decision over a conversation transcript".to_owned()),
    )
    .await
    {
      Ok(output) => output,
      // Transient oracle failures must not lose state: wait.
      Err(err) => {
        warn!(group_id = input.group_id, error = %err, "boundary detection failed, waiting");
        return Ok((None, BoundaryStatus::Wait));
      }
    };

    debug!(group_id = input.group_id, decision = ?output.decision, "boundary decision");

    match output.decision {
      DecisionKind::Continue => Ok((None, BoundaryStatus::Continue)),
      DecisionKind::Wait => Ok((None, BoundaryStatus::Wait)),
      DecisionKind::Boundary => {
        let Some(end) = output
          .end_index
          .and_then(|i| validate_end_index(i, input.history.len(), seq.len()))
        else {
          debug!(
            group_id = input.group_id,
            end_index = ?output.end_index,
            "boundary cut rejected, waiting for more evidence"
          );
          return Ok((None, BoundaryStatus::Wait));
        };

        let cell = self.build_cell(&input, &seq[..=end], output.subject, output.summary);
        Ok((Some(cell), BoundaryStatus::Boundary))
      }
    }
  }

  fn build_cell(
    &self,
    input: &BoundaryInput<'_>,
    messages: &[RawMessage],
    subject: Option<String>,
    summary: Option<String>,
  ) -> NewMemCell {
    NewMemCell {
      group_id: input.group_id.to_owned(),
      group_name: input.group_name.map(str::to_owned),
      participants: distinct_senders(messages),
      timestamp: messages
        .last()
        .map(|m| m.created_at)
        .unwrap_or_else(chrono::Utc::now),
      kind: input.kind,
      original_data: messages.to_vec(),
      summary,
      subject,
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration as ChronoDuration, TimeZone, Utc};

  use super::*;

  fn message(id: &str, sender: &str, content: &str, minutes: i64) -> RawMessage {
    RawMessage {
      message_id: id.to_owned(),
      group_id: "g1".to_owned(),
      sender_id: sender.to_owned(),
      sender_name: None,
      content: content.to_owned(),
      created_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
        + ChronoDuration::minutes(minutes),
      refers_to: vec![],
    }
  }

  #[test]
  fn gap_of_four_hours_is_a_hard_signal() {
    let config = BoundaryConfig::default();
    let prev = message("m1", "a", "let's plan the trip", 0);
    let next = message("m2", "a", "unrelated", 4 * 60);
    assert!(hard_signal_between(&prev, &next, &config));

    let close = message("m3", "a", "more planning", 30);
    assert!(!hard_signal_between(&prev, &close, &config));
  }

  #[test]
  fn date_rollover_is_a_hard_signal() {
    let config = BoundaryConfig::default();
    let prev = message("m1", "a", "good night", 13 * 60); // 23:00
    let next = message("m2", "a", "morning", 13 * 60 + 80); // 00:20 next day
    assert!(hard_signal_between(&prev, &next, &config));
  }

  #[test]
  fn subject_switch_marker_is_a_hard_signal() {
    let config = BoundaryConfig::default();
    let prev = message("m1", "a", "deploy is done", 0);
    let next = message("m2", "b", "By the way, lunch?", 1);
    assert!(hard_signal_between(&prev, &next, &config));
  }

  #[test]
  fn end_index_inside_history_is_rejected() {
    // history = 3 messages (indices 0..=2), seq = 4
    assert_eq!(validate_end_index(0, 3, 4), None);
    assert_eq!(validate_end_index(1, 3, 4), None);
    // the history tail itself is an acceptable cut
    assert_eq!(validate_end_index(2, 3, 4), Some(2));
    assert_eq!(validate_end_index(3, 3, 4), Some(3));
  }

  #[test]
  fn end_index_past_the_sequence_clamps() {
    assert_eq!(validate_end_index(17, 3, 4), Some(3));
    assert_eq!(validate_end_index(-1, 3, 4), None);
  }

  #[test]
  fn empty_history_accepts_any_cut_in_range() {
    assert_eq!(validate_end_index(0, 0, 2), Some(0));
    assert_eq!(validate_end_index(1, 0, 2), Some(1));
  }

  #[test]
  fn distinct_senders_preserves_first_seen_order() {
    let messages = vec![
      message("m1", "bob", "hi", 0),
      message("m2", "alice", "hey", 1),
      message("m3", "bob", "so", 2),
    ];
    assert_eq!(distinct_senders(&messages), vec!["bob", "alice"]);
  }

  #[tokio::test]
  async fn empty_new_messages_continue_without_oracle() {
    let detector = BoundaryDetector::default();
    let history = vec![message("m1", "a", "hello", 0)];
    let (cell, status) = detector
      .decide(BoundaryInput {
        history: &history,
        new: &[],
        group_id: "g1",
        group_name: None,
        kind: MemCellKind::Conversation,
      })
      .await
      .unwrap();
    assert!(cell.is_none());
    assert_eq!(status, BoundaryStatus::Continue);
  }

  #[tokio::test]
  async fn hard_gap_cuts_history_without_oracle() {
    let detector = BoundaryDetector::default();
    let history = vec![
      message("m1", "a", "first", 0),
      message("m2", "b", "second", 1),
      message("m3", "a", "third", 2),
    ];
    let new = vec![message("m4", "a", "a totally new topic", 5 * 60)];

    let (cell, status) = detector
      .decide(BoundaryInput {
        history: &history,
        new: &new,
        group_id: "g1",
        group_name: Some("demo"),
        kind: MemCellKind::Conversation,
      })
      .await
      .unwrap();

    assert_eq!(status, BoundaryStatus::Boundary);
    let cell = cell.unwrap();
    assert_eq!(cell.original_data.len(), 3);
    assert_eq!(cell.timestamp, history[2].created_at);
    assert_eq!(cell.participants, vec!["a", "b"]);
  }

  #[tokio::test]
  async fn short_fresh_sequences_accumulate() {
    let detector = BoundaryDetector::default();
    let history = vec![message("m1", "a", "hi", 0)];
    let new = vec![message("m2", "b", "hello", 1)];

    let (cell, status) = detector
      .decide(BoundaryInput {
        history: &history,
        new: &new,
        group_id: "g1",
        group_name: None,
        kind: MemCellKind::Conversation,
      })
      .await
      .unwrap();

    assert!(cell.is_none());
    assert_eq!(status, BoundaryStatus::Continue);
  }
}
