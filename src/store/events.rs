//! Store operations for the calendar hierarchy.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, types::ToSql};
use std::collections::BTreeSet;

use super::{from_millis, to_millis, Store};
use crate::model::{AgendaItem, CalendarList, Event, ItemTime};

const EVENT_COLUMNS: &str = "e.id, e.calendar_id, e.summary, e.description, e.location, \
   e.start, e.\"end\", e.include_time, e.url, e.attendees, c.summary, c.color";

type RawEventRow = (
  String,
  String,
  String,
  Option<String>,
  Option<String>,
  i64,
  i64,
  bool,
  String,
  String,
  Option<String>,
  Option<u32>,
);

fn raw_event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEventRow> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
    row.get(5)?,
    row.get(6)?,
    row.get(7)?,
    row.get(8)?,
    row.get(9)?,
    row.get(10)?,
    row.get(11)?,
  ))
}

fn into_item(raw: RawEventRow) -> Result<AgendaItem> {
  let (id, calendar_id, summary, description, location, start, end, include_time, url, attendees, list_name, color) =
    raw;

  Ok(AgendaItem {
    parent_id: calendar_id,
    item_id: id,
    title: summary,
    description,
    list_name,
    color,
    location,
    attendees: split_attendees(&attendees),
    completed: false,
    url,
    time: ItemTime::Span {
      start: from_millis(start)?,
      end: from_millis(end)?,
      include_time,
    },
  })
}

fn join_attendees(attendees: &[String]) -> String {
  attendees.join("\n")
}

fn split_attendees(joined: &str) -> Vec<String> {
  joined
    .lines()
    .filter(|line| !line.is_empty())
    .map(str::to_string)
    .collect()
}

impl Store {
  /// Replace the entire calendar table. Runs in one transaction so readers
  /// never see a partial calendar set.
  pub fn replace_calendars(&self, calendars: &[CalendarList]) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM calendars", [])
      .map_err(|e| eyre!("Failed to clear calendars: {}", e))?;

    for calendar in calendars {
      tx.execute(
        "INSERT INTO calendars (id, summary, color) VALUES (?, ?, ?)",
        params![calendar.id, calendar.summary, calendar.color],
      )
      .map_err(|e| eyre!("Failed to insert calendar: {}", e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit calendars: {}", e))
  }

  /// Replace all cached events of one calendar. Scoped to that calendar so
  /// sibling calendars are unaffected.
  pub fn replace_events(&self, calendar_id: &str, events: &[Event]) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM events WHERE calendar_id = ?", params![calendar_id])
      .map_err(|e| eyre!("Failed to clear events: {}", e))?;

    for event in events {
      tx.execute(
        "INSERT INTO events (id, calendar_id, summary, description, location, start, \"end\", include_time, url, attendees)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
          event.id,
          event.calendar_id,
          event.summary,
          event.description,
          event.location,
          to_millis(event.start),
          to_millis(event.end),
          event.include_time,
          event.url,
          join_attendees(&event.attendees),
        ],
      )
      .map_err(|e| eyre!("Failed to insert event: {}", e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit events: {}", e))
  }

  /// Point update of exactly one event row.
  pub fn upsert_event(&self, event: &Event) -> Result<()> {
    self
      .conn()?
      .execute(
        "INSERT OR REPLACE INTO events (id, calendar_id, summary, description, location, start, \"end\", include_time, url, attendees)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
          event.id,
          event.calendar_id,
          event.summary,
          event.description,
          event.location,
          to_millis(event.start),
          to_millis(event.end),
          event.include_time,
          event.url,
          join_attendees(&event.attendees),
        ],
      )
      .map_err(|e| eyre!("Failed to upsert event: {}", e))?;

    Ok(())
  }

  /// Search cached events, joined with their calendar's display metadata.
  ///
  /// `text` is a case-insensitive substring match on the event summary. A
  /// window `[start, end)` matches events whose span overlaps it. Events in
  /// excluded calendars are never returned. Results are ordered by start.
  pub fn search_events(
    &self,
    text: Option<&str>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    excluded: &BTreeSet<String>,
  ) -> Result<Vec<AgendaItem>> {
    let start = start.map(to_millis);
    let end = end.map(to_millis);

    let mut sql = format!(
      "SELECT {EVENT_COLUMNS} FROM events e
       LEFT JOIN calendars c ON e.calendar_id = c.id
       WHERE (?1 IS NULL OR e.summary LIKE '%' || ?1 || '%')
         AND (?2 IS NULL OR ?2 < e.\"end\")
         AND (?3 IS NULL OR ?3 > e.start)"
    );
    if !excluded.is_empty() {
      let placeholders: Vec<String> = (0..excluded.len()).map(|i| format!("?{}", i + 4)).collect();
      sql.push_str(&format!(
        " AND e.calendar_id NOT IN ({})",
        placeholders.join(", ")
      ));
    }
    sql.push_str(" ORDER BY e.start ASC");

    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(&sql)
      .map_err(|e| eyre!("Failed to prepare search: {}", e))?;

    let mut sql_params: Vec<&dyn ToSql> = vec![&text, &start, &end];
    for id in excluded {
      sql_params.push(id);
    }

    let rows = stmt
      .query_map(sql_params.as_slice(), raw_event_row)
      .map_err(|e| eyre!("Failed to search events: {}", e))?;

    let mut items = Vec::new();
    for row in rows {
      items.push(into_item(
        row.map_err(|e| eyre!("Failed to read event row: {}", e))?,
      )?);
    }
    Ok(items)
  }

  /// Look up one cached event by its composite key.
  pub fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<Option<AgendaItem>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(&format!(
        "SELECT {EVENT_COLUMNS} FROM events e
         LEFT JOIN calendars c ON e.calendar_id = c.id
         WHERE e.id = ?1 AND e.calendar_id = ?2"
      ))
      .map_err(|e| eyre!("Failed to prepare lookup: {}", e))?;

    let raw = stmt
      .query_row(params![event_id, calendar_id], raw_event_row)
      .ok();

    raw.map(into_item).transpose()
  }

  /// All cached calendars.
  pub fn list_calendars(&self) -> Result<Vec<CalendarList>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare("SELECT id, summary, color FROM calendars")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok(CalendarList {
          id: row.get(0)?,
          summary: row.get(1)?,
          color: row.get(2)?,
        })
      })
      .map_err(|e| eyre!("Failed to list calendars: {}", e))?;

    rows
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read calendar row: {}", e))
  }
}
