//! Serde-deserializable types matching the Google Calendar and Tasks API
//! responses, plus the mapping into domain types.
//!
//! Mapping drops any item missing a required field (id, title, canonical
//! link, resolvable time). That is a hard validation rule: a malformed
//! remote item is never cached and never returned.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Deserialize;
use url::Url;

use crate::model::{CalendarList, Event, Task, Tasklist};

/// Parse "#RRGGBB" into a packed ARGB value.
fn parse_color(hex: &str) -> Option<u32> {
  let hex = hex.strip_prefix('#')?;
  u32::from_str_radix(hex, 16).ok().map(|rgb| rgb | 0xFF00_0000)
}

// ============================================================================
// Calendar API
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiCalendarListResponse {
  #[serde(default)]
  pub items: Vec<ApiCalendarListEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCalendarListEntry {
  pub id: Option<String>,
  pub summary: Option<String>,
  #[serde(rename = "summaryOverride")]
  pub summary_override: Option<String>,
  #[serde(rename = "backgroundColor")]
  pub background_color: Option<String>,
}

impl ApiCalendarListEntry {
  pub fn into_calendar(self) -> Option<CalendarList> {
    Some(CalendarList {
      id: self.id?,
      summary: self.summary_override.or(self.summary)?,
      color: self.background_color.as_deref().and_then(parse_color),
    })
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiEventsResponse {
  #[serde(default)]
  pub items: Vec<ApiEvent>,
}

#[derive(Debug, Deserialize)]
pub struct ApiEvent {
  pub id: Option<String>,
  pub summary: Option<String>,
  pub description: Option<String>,
  pub location: Option<String>,
  pub start: Option<ApiEventTime>,
  pub end: Option<ApiEventTime>,
  #[serde(default)]
  pub attendees: Vec<ApiAttendee>,
  #[serde(rename = "htmlLink")]
  pub html_link: Option<String>,
}

/// An event boundary: either a timed instant or an all-day date.
#[derive(Debug, Deserialize)]
pub struct ApiEventTime {
  pub date: Option<NaiveDate>,
  #[serde(rename = "dateTime")]
  pub date_time: Option<DateTime<Utc>>,
}

impl ApiEventTime {
  /// All-day dates resolve to local midnight.
  fn resolve(&self) -> Option<DateTime<Utc>> {
    if let Some(at) = self.date_time {
      return Some(at);
    }
    self
      .date?
      .and_hms_opt(0, 0, 0)?
      .and_local_timezone(Local)
      .earliest()
      .map(|at| at.with_timezone(&Utc))
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiAttendee {
  #[serde(rename = "displayName")]
  pub display_name: Option<String>,
}

impl ApiEvent {
  pub fn into_event(self, calendar_id: &str) -> Option<Event> {
    let start = self.start?;
    let end = self.end?;
    // Timed events carry dateTime on both ends, all-day events carry dates
    // on both ends. Anything else is malformed.
    let include_time = match (
      &start.date_time,
      &end.date_time,
      &start.date,
      &end.date,
    ) {
      (Some(_), Some(_), _, _) => true,
      (None, None, Some(_), Some(_)) => false,
      _ => return None,
    };

    let url = self.html_link.filter(|link| Url::parse(link).is_ok())?;

    Some(Event {
      id: self.id?,
      calendar_id: calendar_id.to_string(),
      summary: self.summary?,
      description: self.description,
      location: self.location,
      start: start.resolve()?,
      end: end.resolve()?,
      include_time,
      url,
      attendees: self
        .attendees
        .into_iter()
        .filter_map(|a| a.display_name)
        .collect(),
    })
  }
}

// ============================================================================
// Tasks API
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiTaskListsResponse {
  #[serde(default)]
  pub items: Vec<ApiTaskList>,
}

#[derive(Debug, Deserialize)]
pub struct ApiTaskList {
  pub id: Option<String>,
  pub title: Option<String>,
  pub updated: Option<DateTime<Utc>>,
}

impl ApiTaskList {
  pub fn into_tasklist(self) -> Option<Tasklist> {
    Some(Tasklist {
      id: self.id?,
      title: self.title?,
      updated: self.updated?,
    })
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiTasksResponse {
  #[serde(default)]
  pub items: Vec<ApiTask>,
}

#[derive(Debug, Deserialize)]
pub struct ApiTask {
  pub id: Option<String>,
  pub title: Option<String>,
  pub notes: Option<String>,
  pub due: Option<DateTime<Utc>>,
  /// Completion timestamp; present exactly when the task is completed
  pub completed: Option<String>,
  #[serde(rename = "webViewLink")]
  pub web_view_link: Option<String>,
}

impl ApiTask {
  pub fn into_task(self, tasklist_id: &str) -> Option<Task> {
    let url = self.web_view_link.filter(|link| Url::parse(link).is_ok())?;

    Some(Task {
      id: self.id?,
      tasklist_id: tasklist_id.to_string(),
      title: self.title?,
      notes: self.notes,
      due: self.due?,
      completed: self.completed.is_some(),
      url,
    })
  }
}
