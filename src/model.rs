//! Domain model shared by the store, the remote bindings and the providers.

use chrono::{DateTime, Utc};

/// A calendar as listed by the remote account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarList {
  pub id: String,
  pub summary: String,
  /// Packed ARGB display color
  pub color: Option<u32>,
}

/// A single calendar event, keyed by `(id, calendar_id)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
  pub id: String,
  pub calendar_id: String,
  pub summary: String,
  pub description: Option<String>,
  pub location: Option<String>,
  pub start: DateTime<Utc>,
  pub end: DateTime<Utc>,
  /// False for all-day events, where only the dates are meaningful
  pub include_time: bool,
  /// Canonical web view of the event
  pub url: String,
  pub attendees: Vec<String>,
}

/// A task list as listed by the remote account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tasklist {
  pub id: String,
  pub title: String,
  /// Remote last-modified stamp, used to skip unchanged lists during sync
  pub updated: DateTime<Utc>,
}

/// A single task, keyed by `(id, tasklist_id)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
  pub id: String,
  pub tasklist_id: String,
  pub title: String,
  pub notes: Option<String>,
  pub due: DateTime<Utc>,
  pub completed: bool,
  /// Canonical web view of the task
  pub url: String,
}

/// When an item occupies the agenda.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemTime {
  /// A span with a start and end instant
  Span {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    include_time: bool,
  },
  /// A deadline with no duration
  Due(DateTime<Utc>),
}

impl ItemTime {
  /// The instant results are ordered by: the start of a span, or the due
  /// instant of a deadline.
  pub fn primary(&self) -> DateTime<Utc> {
    match self {
      ItemTime::Span { start, .. } => *start,
      ItemTime::Due(due) => *due,
    }
  }
}

/// Denormalized caller-facing row: a child item joined with its parent
/// collection's display metadata, so callers never need a second lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgendaItem {
  pub parent_id: String,
  pub item_id: String,
  pub title: String,
  pub description: Option<String>,
  pub list_name: Option<String>,
  pub color: Option<u32>,
  pub location: Option<String>,
  pub attendees: Vec<String>,
  pub completed: bool,
  pub url: String,
  pub time: ItemTime,
}

impl AgendaItem {
  pub fn from_event(event: Event, list_name: Option<String>, color: Option<u32>) -> Self {
    Self {
      parent_id: event.calendar_id,
      item_id: event.id,
      title: event.summary,
      description: event.description,
      list_name,
      color,
      location: event.location,
      attendees: event.attendees,
      completed: false,
      url: event.url,
      time: ItemTime::Span {
        start: event.start,
        end: event.end,
        include_time: event.include_time,
      },
    }
  }

  pub fn from_task(task: Task, list_name: Option<String>) -> Self {
    Self {
      parent_id: task.tasklist_id,
      item_id: task.id,
      title: task.title,
      description: task.notes,
      list_name,
      color: None,
      location: None,
      attendees: Vec::new(),
      completed: task.completed,
      url: task.url,
      time: ItemTime::Due(task.due),
    }
  }
}
