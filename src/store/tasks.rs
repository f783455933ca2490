//! Store operations for the task hierarchy.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, types::ToSql};
use std::collections::BTreeSet;

use super::{from_millis, to_millis, Store};
use crate::model::{AgendaItem, ItemTime, Task, Tasklist};

const TASK_COLUMNS: &str =
  "t.id, t.tasklist_id, t.title, t.notes, t.due, t.completed, t.url, l.title";

type RawTaskRow = (
  String,
  String,
  String,
  Option<String>,
  i64,
  bool,
  String,
  Option<String>,
);

fn raw_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawTaskRow> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
    row.get(5)?,
    row.get(6)?,
    row.get(7)?,
  ))
}

fn into_item(raw: RawTaskRow) -> Result<AgendaItem> {
  let (id, tasklist_id, title, notes, due, completed, url, list_name) = raw;

  Ok(AgendaItem {
    parent_id: tasklist_id,
    item_id: id,
    title,
    description: notes,
    list_name,
    color: None,
    location: None,
    attendees: Vec::new(),
    completed,
    url,
    time: ItemTime::Due(from_millis(due)?),
  })
}

impl Store {
  /// Replace the entire task list table. Runs in one transaction so readers
  /// never see a partial list set.
  pub fn replace_tasklists(&self, tasklists: &[Tasklist]) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM tasklists", [])
      .map_err(|e| eyre!("Failed to clear tasklists: {}", e))?;

    for list in tasklists {
      tx.execute(
        "INSERT INTO tasklists (id, title, updated) VALUES (?, ?, ?)",
        params![list.id, list.title, to_millis(list.updated)],
      )
      .map_err(|e| eyre!("Failed to insert tasklist: {}", e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit tasklists: {}", e))
  }

  /// Replace all cached tasks of one task list. Scoped to that list so
  /// sibling lists are unaffected.
  pub fn replace_tasks(&self, tasklist_id: &str, tasks: &[Task]) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM tasks WHERE tasklist_id = ?", params![tasklist_id])
      .map_err(|e| eyre!("Failed to clear tasks: {}", e))?;

    for task in tasks {
      tx.execute(
        "INSERT INTO tasks (id, tasklist_id, title, notes, due, completed, url)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
          task.id,
          task.tasklist_id,
          task.title,
          task.notes,
          to_millis(task.due),
          task.completed,
          task.url,
        ],
      )
      .map_err(|e| eyre!("Failed to insert task: {}", e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit tasks: {}", e))
  }

  /// Point update of exactly one task row.
  pub fn upsert_task(&self, task: &Task) -> Result<()> {
    self
      .conn()?
      .execute(
        "INSERT OR REPLACE INTO tasks (id, tasklist_id, title, notes, due, completed, url)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
          task.id,
          task.tasklist_id,
          task.title,
          task.notes,
          to_millis(task.due),
          task.completed,
          task.url,
        ],
      )
      .map_err(|e| eyre!("Failed to upsert task: {}", e))?;

    Ok(())
  }

  /// Search cached tasks, joined with their list's title.
  ///
  /// A task occupies the single instant of its due date, so a window
  /// `[start, end)` matches when `start <= due < end`. Results are ordered
  /// by due date.
  pub fn search_tasks(
    &self,
    text: Option<&str>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    excluded: &BTreeSet<String>,
  ) -> Result<Vec<AgendaItem>> {
    let start = start.map(to_millis);
    let end = end.map(to_millis);

    let mut sql = format!(
      "SELECT {TASK_COLUMNS} FROM tasks t
       LEFT JOIN tasklists l ON t.tasklist_id = l.id
       WHERE (?1 IS NULL OR t.title LIKE '%' || ?1 || '%')
         AND (?2 IS NULL OR ?2 <= t.due)
         AND (?3 IS NULL OR ?3 > t.due)"
    );
    if !excluded.is_empty() {
      let placeholders: Vec<String> = (0..excluded.len()).map(|i| format!("?{}", i + 4)).collect();
      sql.push_str(&format!(
        " AND t.tasklist_id NOT IN ({})",
        placeholders.join(", ")
      ));
    }
    sql.push_str(" ORDER BY t.due ASC");

    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(&sql)
      .map_err(|e| eyre!("Failed to prepare search: {}", e))?;

    let mut sql_params: Vec<&dyn ToSql> = vec![&text, &start, &end];
    for id in excluded {
      sql_params.push(id);
    }

    let rows = stmt
      .query_map(sql_params.as_slice(), raw_task_row)
      .map_err(|e| eyre!("Failed to search tasks: {}", e))?;

    let mut items = Vec::new();
    for row in rows {
      items.push(into_item(
        row.map_err(|e| eyre!("Failed to read task row: {}", e))?,
      )?);
    }
    Ok(items)
  }

  /// Look up one cached task by its composite key.
  pub fn get_task(&self, tasklist_id: &str, task_id: &str) -> Result<Option<AgendaItem>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks t
         LEFT JOIN tasklists l ON t.tasklist_id = l.id
         WHERE t.id = ?1 AND t.tasklist_id = ?2"
      ))
      .map_err(|e| eyre!("Failed to prepare lookup: {}", e))?;

    let raw = stmt.query_row(params![task_id, tasklist_id], raw_task_row).ok();

    raw.map(into_item).transpose()
  }

  /// All cached task lists, including their revision stamps.
  pub fn list_tasklists(&self) -> Result<Vec<Tasklist>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare("SELECT id, title, updated FROM tasklists")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, i64>(2)?,
        ))
      })
      .map_err(|e| eyre!("Failed to list tasklists: {}", e))?;

    let mut lists = Vec::new();
    for row in rows {
      let (id, title, updated) = row.map_err(|e| eyre!("Failed to read tasklist row: {}", e))?;
      lists.push(Tasklist {
        id,
        title,
        updated: from_millis(updated)?,
      });
    }
    Ok(lists)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap()
  }

  fn task(id: &str, tasklist_id: &str, due: DateTime<Utc>) -> Task {
    Task {
      id: id.to_string(),
      tasklist_id: tasklist_id.to_string(),
      title: format!("Task {id}"),
      notes: None,
      due,
      completed: false,
      url: format!("https://tasks.example.com/{id}"),
    }
  }

  fn seeded() -> Store {
    let store = Store::open_in_memory().unwrap();
    store
      .replace_tasklists(&[Tasklist {
        id: "list1".to_string(),
        title: "Errands".to_string(),
        updated: day(1),
      }])
      .unwrap();
    store
  }

  #[test]
  fn due_date_window_is_inclusive_start_exclusive_end() {
    let store = seeded();
    store
      .replace_tasks("list1", &[task("t1", "list1", day(5))])
      .unwrap();

    // start == due matches
    assert_eq!(
      store
        .search_tasks(None, Some(day(5)), None, &BTreeSet::new())
        .unwrap()
        .len(),
      1
    );
    // end == due does not
    assert!(store
      .search_tasks(None, None, Some(day(5)), &BTreeSet::new())
      .unwrap()
      .is_empty());
    // end > due does
    assert_eq!(
      store
        .search_tasks(None, None, Some(day(6)), &BTreeSet::new())
        .unwrap()
        .len(),
      1
    );
  }

  #[test]
  fn search_joins_list_title_and_orders_by_due() {
    let store = seeded();
    store
      .replace_tasks(
        "list1",
        &[
          task("late", "list1", day(20)),
          task("early", "list1", day(2)),
        ],
      )
      .unwrap();

    let hits = store.search_tasks(None, None, None, &BTreeSet::new()).unwrap();
    let ids: Vec<&str> = hits.iter().map(|i| i.item_id.as_str()).collect();
    assert_eq!(ids, ["early", "late"]);
    assert_eq!(hits[0].list_name.as_deref(), Some("Errands"));
    assert!(matches!(hits[0].time, ItemTime::Due(d) if d == day(2)));
  }

  #[test]
  fn excluded_tasklists_never_appear() {
    let store = Store::open_in_memory().unwrap();
    store
      .replace_tasklists(&[
        Tasklist {
          id: "list1".to_string(),
          title: "Errands".to_string(),
          updated: day(1),
        },
        Tasklist {
          id: "list2".to_string(),
          title: "Work".to_string(),
          updated: day(1),
        },
      ])
      .unwrap();
    store
      .replace_tasks("list1", &[task("t1", "list1", day(2))])
      .unwrap();
    store
      .replace_tasks("list2", &[task("t2", "list2", day(2))])
      .unwrap();

    let excluded: BTreeSet<String> = ["list1".to_string()].into_iter().collect();
    let hits = store.search_tasks(None, None, None, &excluded).unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].parent_id, "list2");
  }

  #[test]
  fn upsert_keeps_completion_state() {
    let store = seeded();
    store
      .replace_tasks("list1", &[task("t1", "list1", day(2))])
      .unwrap();

    let mut done = task("t1", "list1", day(2));
    done.completed = true;
    store.upsert_task(&done).unwrap();

    let hits = store.search_tasks(None, None, None, &BTreeSet::new()).unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].completed);
  }

  #[test]
  fn tasklist_revisions_round_trip() {
    let store = seeded();
    let lists = store.list_tasklists().unwrap();
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].updated, day(1));
  }
}
