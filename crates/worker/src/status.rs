use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde::Serialize;
use uuid::Uuid;

/// Terminal entries retained before the oldest are purged.
const RETAIN_FINISHED: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
  Pending,
  Processing,
  Completed,
  Failed,
}

impl RequestStatus {
  #[must_use]
  pub const fn is_terminal(self) -> bool {
    matches!(self, Self::Completed | Self::Failed)
  }
}

/// request_id → status, mutated only by the worker (and `submit` for the
/// initial pending entry). Terminal entries are eventually purged.
#[derive(Debug, Default)]
pub(crate) struct StatusMap {
  inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
  statuses: HashMap<Uuid, RequestStatus>,
  finished: VecDeque<Uuid>,
}

impl StatusMap {
  pub fn set(&self, request_id: Uuid, status: RequestStatus) {
    let mut inner = self.inner.lock().expect("status map poisoned");
    inner.statuses.insert(request_id, status);

    if status.is_terminal() {
      inner.finished.push_back(request_id);
      while inner.finished.len() > RETAIN_FINISHED {
        if let Some(oldest) = inner.finished.pop_front() {
          inner.statuses.remove(&oldest);
        }
      }
    }
  }

  pub fn get(&self, request_id: Uuid) -> Option<RequestStatus> {
    self
      .inner
      .lock()
      .expect("status map poisoned")
      .statuses
      .get(&request_id)
      .copied()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tracks_the_status_lifecycle() {
    let map = StatusMap::default();
    let id = Uuid::now_v7();

    assert_eq!(map.get(id), None);
    map.set(id, RequestStatus::Pending);
    assert_eq!(map.get(id), Some(RequestStatus::Pending));
    map.set(id, RequestStatus::Processing);
    map.set(id, RequestStatus::Completed);
    assert_eq!(map.get(id), Some(RequestStatus::Completed));
  }

  #[test]
  fn purges_oldest_terminal_entries_beyond_the_cap() {
    let map = StatusMap::default();
    let first = Uuid::now_v7();
    map.set(first, RequestStatus::Completed);

    for _ in 0..RETAIN_FINISHED {
      map.set(Uuid::now_v7(), RequestStatus::Failed);
    }

    assert_eq!(map.get(first), None);
  }

  #[test]
  fn pending_entries_are_never_purged() {
    let map = StatusMap::default();
    let pending = Uuid::now_v7();
    map.set(pending, RequestStatus::Pending);

    for _ in 0..RETAIN_FINISHED + 10 {
      map.set(Uuid::now_v7(), RequestStatus::Completed);
    }

    assert_eq!(map.get(pending), Some(RequestStatus::Pending));
  }
}
