//! Task hierarchy: cache-biased search with revision-gated sync, point
//! refresh.

use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::model::{AgendaItem, Tasklist};
use crate::provider::{RefreshOutcome, SearchQuery};
use crate::remote::TaskSource;
use crate::store::{Store, TASKS_LAST_SYNC};

/// Task provider over a remote source and the shared offline cache.
pub struct TaskProvider<T> {
  inner: Arc<Inner<T>>,
}

struct Inner<T> {
  source: T,
  store: Arc<Store>,
  /// Guards the sync pass. Held for the whole pass and never waited on:
  /// a contending caller skips the pass entirely.
  sync_lock: Mutex<()>,
  /// Cache age beyond which a network-allowed search triggers a background
  /// sync pass
  soft_stale_after: Duration,
  /// Cache age beyond which a network-allowed search runs the sync pass
  /// inline before reading
  hard_stale_after: Duration,
  /// Item age below which a refresh trusts the value it was handed
  refresh_window: Duration,
  /// Forward horizon of a sync pass
  sync_horizon: Duration,
}

impl<T> Clone for TaskProvider<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T: TaskSource + 'static> TaskProvider<T> {
  pub fn new(source: T, store: Arc<Store>) -> Self {
    Self {
      inner: Arc::new(Inner {
        source,
        store,
        sync_lock: Mutex::new(()),
        soft_stale_after: Duration::minutes(1),
        hard_stale_after: Duration::hours(1),
        refresh_window: Duration::seconds(30),
        sync_horizon: Duration::days(365),
      }),
    }
  }

  /// Set how far ahead a sync pass fetches tasks.
  pub fn with_sync_horizon(mut self, horizon: Duration) -> Self {
    Arc::get_mut(&mut self.inner)
      .expect("provider not shared yet")
      .sync_horizon = horizon;
    self
  }

  /// Answer a search request. Always reads the cache; with network access,
  /// a stale cache first gets a sync pass: inline past the hard staleness
  /// threshold, in the background past the soft one. The read never waits
  /// on a background pass.
  pub async fn search(&self, query: &SearchQuery) -> Result<Vec<AgendaItem>> {
    if query.allow_network {
      match self.cache_age()? {
        Some(age) if age <= self.inner.soft_stale_after => {}
        Some(age) if age <= self.inner.hard_stale_after => self.spawn_sync(),
        // Never synced, or past the hard threshold: attempt a pass first
        _ => self.sync().await,
      }
    }

    self.inner.store.search_tasks(
      query.text.as_deref(),
      query.start,
      query.end,
      &query.excluded_parents,
    )
  }

  fn cache_age(&self) -> Result<Option<Duration>> {
    Ok(
      self
        .inner
        .store
        .last_sync(TASKS_LAST_SYNC)?
        .map(|at| Utc::now() - at),
    )
  }

  fn spawn_sync(&self) {
    let this = self.clone();
    tokio::spawn(async move {
      this.sync().await;
    });
  }

  /// Run one sync pass: fetch task lists, refresh the tasks of every list
  /// that is new or whose revision stamp advanced, then replace the task
  /// list table and record the cursor.
  ///
  /// Returns immediately if a pass is already in flight; concurrent callers
  /// never wait for it. Remote failures are logged and skipped, so the pass
  /// never surfaces an error to its invoker.
  pub async fn sync(&self) {
    let _guard = match self.inner.sync_lock.try_lock() {
      Ok(guard) => guard,
      Err(_) => {
        debug!("task sync already in flight, skipping");
        return;
      }
    };

    debug!("syncing tasks");
    if let Err(e) = self.sync_pass().await {
      error!("task sync aborted: {e}");
    }
  }

  async fn sync_pass(&self) -> Result<()> {
    let tasklists = match self.inner.source.list_tasklists().await {
      Ok(lists) => lists,
      Err(e) => {
        warn!("task list listing failed, keeping cached state: {e}");
        return Ok(());
      }
    };

    // A list is refreshed only when it is new to the cache or its remote
    // revision stamp advanced.
    let cached = self.inner.store.list_tasklists()?;
    let changed: Vec<&Tasklist> = tasklists
      .iter()
      .filter(|list| {
        cached
          .iter()
          .find(|old| old.id == list.id)
          .map(|old| old.updated < list.updated)
          .unwrap_or(true)
      })
      .collect();

    let window_start = Utc::now();
    let window_end = window_start + self.inner.sync_horizon;

    let fetches = changed.iter().map(|list| async move {
      let tasks = self
        .inner
        .source
        .list_tasks(&list.id, Some(window_start), Some(window_end))
        .await;
      (*list, tasks)
    });

    for (list, fetched) in join_all(fetches).await {
      match fetched {
        Ok(tasks) => self.inner.store.replace_tasks(&list.id, &tasks)?,
        Err(e) => warn!(
          "task fetch for list {} failed, keeping cached copy: {e}",
          list.id
        ),
      }
    }

    self.inner.store.replace_tasklists(&tasklists)?;
    self.inner.store.set_last_sync(TASKS_LAST_SYNC, Utc::now())?;
    Ok(())
  }

  /// Refresh one previously returned task.
  ///
  /// Values obtained within the refresh window are returned unchanged with
  /// no remote call. Otherwise exactly one point fetch runs; its result is
  /// written through to the cache. A failed or empty fetch yields
  /// [`RefreshOutcome::Gone`], not the stale input.
  pub async fn refresh(
    &self,
    item: &AgendaItem,
    last_obtained: DateTime<Utc>,
  ) -> Result<RefreshOutcome> {
    if Utc::now() - last_obtained < self.inner.refresh_window {
      return Ok(RefreshOutcome::Unchanged(item.clone()));
    }

    let refreshed = match self
      .inner
      .source
      .get_task(&item.parent_id, &item.item_id)
      .await
    {
      Ok(Some(task)) => task,
      Ok(None) => return Ok(RefreshOutcome::Gone),
      Err(e) => {
        warn!("refresh of task {} failed: {e}", item.item_id);
        return Ok(RefreshOutcome::Gone);
      }
    };

    self.inner.store.upsert_task(&refreshed)?;

    Ok(RefreshOutcome::Refreshed(AgendaItem::from_task(
      refreshed,
      item.list_name.clone(),
    )))
  }

  /// The task lists of the signed-in account, falling back to the cached
  /// set when the remote is unavailable.
  pub async fn list_tasklists(&self) -> Result<Vec<Tasklist>> {
    match self.inner.source.list_tasklists().await {
      Ok(lists) => Ok(lists),
      Err(e) => {
        warn!("task list listing failed, serving cached lists: {e}");
        self.inner.store.list_tasklists()
      }
    }
  }
}
