use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use stratamem_entities::mem_cell;
use stratamem_shared::{AppError, MemCellKind, RawMessage};
use uuid::Uuid;

/// Durable, immutable representation of one detected conversational
/// episode. `episode` and `subject` are back-filled by the extraction
/// worker once the group narrative exists.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MemCell {
  pub id: Uuid,
  pub group_id: String,
  pub group_name: Option<String>,
  pub participants: Vec<String>,
  pub timestamp: DateTime<Utc>,
  pub kind: MemCellKind,
  pub original_data: Vec<RawMessage>,
  pub summary: Option<String>,
  pub episode: Option<String>,
  pub subject: Option<String>,
}

/// A boundary-detector draft: a MemCell before persistence assigned it
/// an event id.
#[derive(Debug, Clone)]
pub struct NewMemCell {
  pub group_id: String,
  pub group_name: Option<String>,
  pub participants: Vec<String>,
  pub timestamp: DateTime<Utc>,
  pub kind: MemCellKind,
  pub original_data: Vec<RawMessage>,
  pub summary: Option<String>,
  pub subject: Option<String>,
}

impl NewMemCell {
  /// Persist the draft, assigning its event id.
  pub async fn insert(self, db: &DatabaseConnection) -> Result<MemCell, AppError> {
    let id = Uuid::now_v7();
    let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

    let active = mem_cell::ActiveModel {
      id: Set(id),
      group_id: Set(self.group_id.clone()),
      group_name: Set(self.group_name.clone()),
      participants: Set(self.participants.clone()),
      timestamp: Set(self.timestamp.into()),
      kind: Set(kind_to_str(self.kind).to_owned()),
      original_data: Set(serde_json::to_value(&self.original_data)?),
      summary: Set(self.summary.clone()),
      episode: Set(None),
      subject: Set(self.subject.clone()),
      created_at: Set(now),
    };
    active.insert(db).await?;

    Ok(MemCell {
      id,
      group_id: self.group_id,
      group_name: self.group_name,
      participants: self.participants,
      timestamp: self.timestamp,
      kind: self.kind,
      original_data: self.original_data,
      summary: self.summary,
      episode: None,
      subject: self.subject,
    })
  }
}

impl MemCell {
  pub fn from_model(model: mem_cell::Model) -> Result<Self, AppError> {
    Ok(Self {
      id: model.id,
      group_id: model.group_id,
      group_name: model.group_name,
      participants: model.participants,
      timestamp: model.timestamp.with_timezone(&Utc),
      kind: kind_from_str(&model.kind),
      original_data: serde_json::from_value(model.original_data)?,
      summary: model.summary,
      episode: model.episode,
      subject: model.subject,
    })
  }

  pub async fn get(id: Uuid, db: &DatabaseConnection) -> Result<Option<Self>, AppError> {
    let model = mem_cell::Entity::find_by_id(id).one(db).await?;
    model.map(Self::from_model).transpose()
  }

  /// Representative text for clustering: the narrative if extraction has
  /// run, else the boundary summary, else the raw contents.
  #[must_use]
  pub fn representative_text(&self) -> String {
    if let Some(episode) = self.episode.as_deref().filter(|s| !s.trim().is_empty()) {
      return episode.trim().to_owned();
    }
    if let Some(summary) = self.summary.as_deref().filter(|s| !s.trim().is_empty()) {
      return summary.trim().to_owned();
    }
    self
      .original_data
      .iter()
      .take(6)
      .map(|m| m.content.trim())
      .filter(|c| !c.is_empty())
      .collect::<Vec<_>>()
      .join("\n")
  }
}

fn kind_to_str(kind: MemCellKind) -> &'static str {
  match kind {
    MemCellKind::Conversation => "conversation",
    MemCellKind::Linkdoc => "linkdoc",
  }
}

fn kind_from_str(raw: &str) -> MemCellKind {
  match raw {
    "linkdoc" => MemCellKind::Linkdoc,
    _ => MemCellKind::Conversation,
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use stratamem_shared::RawMessage;

  use super::*;

  fn message(content: &str) -> RawMessage {
    RawMessage {
      message_id: "m1".into(),
      group_id: "g1".into(),
      sender_id: "u1".into(),
      sender_name: None,
      content: content.into(),
      created_at: Utc::now(),
      refers_to: vec![],
    }
  }

  fn cell() -> MemCell {
    MemCell {
      id: Uuid::now_v7(),
      group_id: "g1".into(),
      group_name: None,
      participants: vec!["u1".into()],
      timestamp: Utc::now(),
      kind: MemCellKind::Conversation,
      original_data: vec![message("hello"), message("world")],
      summary: None,
      episode: None,
      subject: None,
    }
  }

  #[test]
  fn representative_text_prefers_episode() {
    let mut c = cell();
    c.summary = Some("a summary".into());
    c.episode = Some("the narrative".into());
    assert_eq!(c.representative_text(), "the narrative");
  }

  #[test]
  fn representative_text_falls_back_to_summary_then_content() {
    let mut c = cell();
    c.summary = Some("a summary".into());
    assert_eq!(c.representative_text(), "a summary");

    c.summary = None;
    assert_eq!(c.representative_text(), "hello\nworld");
  }
}
