//! REST bindings for the Google Calendar and Tasks APIs.
//!
//! One client implements both hierarchy source traits. Responses are
//! narrowed with `fields=` projections and capped page sizes; mapping into
//! domain types drops malformed items (see `api_types`).

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::api_types::{
  ApiCalendarListResponse, ApiEvent, ApiEventsResponse, ApiTask, ApiTaskListsResponse,
  ApiTasksResponse,
};
use super::auth::Auth;
use super::source::{CalendarSource, TaskSource};
use crate::config::Config;
use crate::model::{CalendarList, Event, Task, Tasklist};

const EVENT_FIELDS: &str = "items(id,summary,description,location,start,end,attendees,htmlLink)";
const TASK_FIELDS: &str = "items(id,title,notes,due,completed,webViewLink)";
const PAGE_SIZE: &str = "20";

/// Google API client for the signed-in account.
#[derive(Clone)]
pub struct GoogleClient {
  http: reqwest::Client,
  token: Option<String>,
  calendar_base: Url,
  tasks_base: Url,
}

impl GoogleClient {
  pub fn new(config: &Config, auth: &Auth) -> Result<Self> {
    let http = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(5))
      .timeout(Duration::from_secs(10))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let calendar_base = Url::parse(&config.google.calendar_api_url)
      .map_err(|e| eyre!("Invalid calendar API URL: {}", e))?;
    let tasks_base = Url::parse(&config.google.tasks_api_url)
      .map_err(|e| eyre!("Invalid tasks API URL: {}", e))?;

    Ok(Self {
      http,
      token: auth.access_token().map(String::from),
      calendar_base,
      tasks_base,
    })
  }

  fn endpoint(&self, base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url
      .path_segments_mut()
      .map_err(|_| eyre!("Invalid API base URL: {}", base))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  async fn get(&self, url: Url) -> Result<reqwest::Response> {
    let token = self
      .token
      .as_deref()
      .ok_or_else(|| eyre!("Not signed in to a Google account"))?;

    self
      .http
      .get(url)
      .bearer_auth(token)
      .send()
      .await
      .map_err(|e| eyre!("Request failed: {}", e))
  }

  async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
    let response = self
      .get(url)
      .await?
      .error_for_status()
      .map_err(|e| eyre!("Request failed: {}", e))?;

    response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse response: {}", e))
  }
}

fn rfc3339(at: DateTime<Utc>) -> String {
  at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl CalendarSource for GoogleClient {
  async fn list_calendars(&self) -> Result<Vec<CalendarList>> {
    let mut url = self.endpoint(&self.calendar_base, &["users", "me", "calendarList"])?;
    url
      .query_pairs_mut()
      .append_pair("fields", "items(id,summary,summaryOverride,backgroundColor)");

    let response: ApiCalendarListResponse = self.get_json(url).await?;
    Ok(
      response
        .items
        .into_iter()
        .filter_map(|entry| entry.into_calendar())
        .collect(),
    )
  }

  async fn list_events(
    &self,
    calendar_id: &str,
    text: Option<&str>,
    time_min: Option<DateTime<Utc>>,
    time_max: Option<DateTime<Utc>>,
  ) -> Result<Vec<Event>> {
    let mut url = self.endpoint(&self.calendar_base, &["calendars", calendar_id, "events"])?;
    {
      let mut query = url.query_pairs_mut();
      if let Some(text) = text {
        query.append_pair("q", text);
      }
      if let Some(min) = time_min {
        query.append_pair("timeMin", &rfc3339(min));
      }
      if let Some(max) = time_max {
        query.append_pair("timeMax", &rfc3339(max));
      }
      query.append_pair("maxResults", PAGE_SIZE);
      query.append_pair("fields", EVENT_FIELDS);
    }

    let response: ApiEventsResponse = self.get_json(url).await?;
    Ok(
      response
        .items
        .into_iter()
        .filter_map(|event| event.into_event(calendar_id))
        .collect(),
    )
  }

  async fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<Option<Event>> {
    let url = self.endpoint(
      &self.calendar_base,
      &["calendars", calendar_id, "events", event_id],
    )?;

    let response = self.get(url).await?;
    if response.status() == StatusCode::NOT_FOUND || response.status() == StatusCode::GONE {
      return Ok(None);
    }
    let response = response
      .error_for_status()
      .map_err(|e| eyre!("Request failed: {}", e))?;

    let event: ApiEvent = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse response: {}", e))?;

    Ok(event.into_event(calendar_id))
  }
}

#[async_trait]
impl TaskSource for GoogleClient {
  async fn list_tasklists(&self) -> Result<Vec<Tasklist>> {
    let mut url = self.endpoint(&self.tasks_base, &["users", "@me", "lists"])?;
    url
      .query_pairs_mut()
      .append_pair("fields", "items(id,title,updated)");

    let response: ApiTaskListsResponse = self.get_json(url).await?;
    Ok(
      response
        .items
        .into_iter()
        .filter_map(|list| list.into_tasklist())
        .collect(),
    )
  }

  async fn list_tasks(
    &self,
    tasklist_id: &str,
    due_min: Option<DateTime<Utc>>,
    due_max: Option<DateTime<Utc>>,
  ) -> Result<Vec<Task>> {
    let mut url = self.endpoint(&self.tasks_base, &["lists", tasklist_id, "tasks"])?;
    {
      let mut query = url.query_pairs_mut();
      if let Some(min) = due_min {
        query.append_pair("dueMin", &rfc3339(min));
      }
      if let Some(max) = due_max {
        query.append_pair("dueMax", &rfc3339(max));
      }
      query.append_pair("showHidden", "true");
      query.append_pair("maxResults", PAGE_SIZE);
      query.append_pair("fields", TASK_FIELDS);
    }

    let response: ApiTasksResponse = self.get_json(url).await?;
    Ok(
      response
        .items
        .into_iter()
        .filter_map(|task| task.into_task(tasklist_id))
        .collect(),
    )
  }

  async fn get_task(&self, tasklist_id: &str, task_id: &str) -> Result<Option<Task>> {
    let url = self.endpoint(&self.tasks_base, &["lists", tasklist_id, "tasks", task_id])?;

    let response = self.get(url).await?;
    if response.status() == StatusCode::NOT_FOUND || response.status() == StatusCode::GONE {
      return Ok(None);
    }
    let response = response
      .error_for_status()
      .map_err(|e| eyre!("Request failed: {}", e))?;

    let task: ApiTask = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse response: {}", e))?;

    Ok(task.into_task(tasklist_id))
  }
}
