use std::fmt::Write;

use chrono::{DateTime, NaiveDate, Utc};

use crate::MemCell;

/// Compact transcript of a MemCell for extraction prompts.
pub fn render_memcell(memcell: &MemCell) -> String {
  let mut out = String::new();
  if let Some(name) = memcell.group_name.as_deref() {
    let _ = writeln!(out, "Conversation: {name}");
  }
  for message in &memcell.original_data {
    let sender = message.sender_name.as_deref().unwrap_or(&message.sender_id);
    let _ = writeln!(
      out,
      "{} {}: {}",
      message.created_at.format("%Y-%m-%d %H:%M:%S"),
      sender,
      message.content
    );
  }
  out
}

/// Parse an LLM-provided instant. Accepts RFC 3339 or a bare date
/// (interpreted as UTC midnight); anything else is treated as absent.
pub fn parse_loose_instant(raw: Option<&str>) -> Option<DateTime<Utc>> {
  let raw = raw?.trim();
  if raw.is_empty() {
    return None;
  }
  if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
    return Some(instant.with_timezone(&Utc));
  }
  NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
  use super::parse_loose_instant;

  #[test]
  fn parses_rfc3339_and_bare_dates() {
    let full = parse_loose_instant(Some("2026-01-15T10:00:00+08:00")).unwrap();
    assert_eq!(full.timezone(), chrono::Utc);

    let bare = parse_loose_instant(Some("2026-01-15")).unwrap();
    assert_eq!(bare.format("%H:%M:%S").to_string(), "00:00:00");
  }

  #[test]
  fn garbage_and_empty_become_none() {
    assert!(parse_loose_instant(None).is_none());
    assert!(parse_loose_instant(Some("")).is_none());
    assert!(parse_loose_instant(Some("next tuesday")).is_none());
  }
}
