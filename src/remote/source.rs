//! Seams between the engine and the network-bound remote account.
//!
//! One trait per hierarchy. The engine only ever talks to these traits, so
//! tests can drive the sync, search and refresh paths with in-process fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::model::{CalendarList, Event, Task, Tasklist};

/// Remote operations the calendar hierarchy needs.
#[async_trait]
pub trait CalendarSource: Send + Sync {
  /// All calendars of the signed-in account.
  async fn list_calendars(&self) -> Result<Vec<CalendarList>>;

  /// Events of one calendar, optionally filtered by text and bounded to a
  /// time window.
  async fn list_events(
    &self,
    calendar_id: &str,
    text: Option<&str>,
    time_min: Option<DateTime<Utc>>,
    time_max: Option<DateTime<Utc>>,
  ) -> Result<Vec<Event>>;

  /// Point fetch of one event. `Ok(None)` means the event no longer exists
  /// remotely (or came back unusable).
  async fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<Option<Event>>;
}

/// Remote operations the task hierarchy needs.
#[async_trait]
pub trait TaskSource: Send + Sync {
  /// All task lists of the signed-in account, with their revision stamps.
  async fn list_tasklists(&self) -> Result<Vec<Tasklist>>;

  /// Tasks of one list, bounded to a due-date window.
  async fn list_tasks(
    &self,
    tasklist_id: &str,
    due_min: Option<DateTime<Utc>>,
    due_max: Option<DateTime<Utc>>,
  ) -> Result<Vec<Task>>;

  /// Point fetch of one task. `Ok(None)` means the task no longer exists
  /// remotely (or came back unusable).
  async fn get_task(&self, tasklist_id: &str, task_id: &str) -> Result<Option<Task>>;
}
