//! Calendar hierarchy: live-biased search, opportunistic background sync,
//! point refresh.

use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::model::{AgendaItem, CalendarList};
use crate::provider::{RefreshOutcome, SearchQuery};
use crate::remote::CalendarSource;
use crate::store::{Store, EVENTS_LAST_SYNC};

/// Calendar provider over a remote source and the shared offline cache.
pub struct CalendarProvider<C> {
  inner: Arc<Inner<C>>,
}

struct Inner<C> {
  source: C,
  store: Arc<Store>,
  /// Guards the sync pass. Held for the whole pass and never waited on:
  /// a contending caller skips the pass entirely.
  sync_lock: Mutex<()>,
  /// Cache age beyond which a network-allowed search triggers a background
  /// sync pass
  stale_after: Duration,
  /// Item age below which a refresh trusts the value it was handed
  refresh_window: Duration,
  /// Forward horizon of a sync pass
  sync_horizon: Duration,
}

impl<C> Clone for CalendarProvider<C> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<C: CalendarSource + 'static> CalendarProvider<C> {
  pub fn new(source: C, store: Arc<Store>) -> Self {
    Self {
      inner: Arc::new(Inner {
        source,
        store,
        sync_lock: Mutex::new(()),
        stale_after: Duration::hours(1),
        refresh_window: Duration::seconds(30),
        sync_horizon: Duration::days(14),
      }),
    }
  }

  /// Set how far ahead a sync pass fetches events.
  pub fn with_sync_horizon(mut self, horizon: Duration) -> Self {
    Arc::get_mut(&mut self.inner)
      .expect("provider not shared yet")
      .sync_horizon = horizon;
    self
  }

  /// Answer a search request.
  ///
  /// Without network access this reads the cache and nothing else. With
  /// network access it fans out one request per remote calendar and merges
  /// the answers, falling back to the cache when the calendar listing
  /// itself fails; a background sync pass is triggered first whenever the
  /// cache has gone stale, so offline reads stay useful.
  pub async fn search(&self, query: &SearchQuery) -> Result<Vec<AgendaItem>> {
    if !query.allow_network {
      return self.search_cached(query);
    }

    if self.cache_is_stale()? {
      self.spawn_sync();
    }

    let calendars = match self.inner.source.list_calendars().await {
      Ok(calendars) => calendars,
      Err(e) => {
        warn!("calendar listing failed, serving cached events: {e}");
        return self.search_cached(query);
      }
    };

    let fetches = calendars
      .iter()
      .filter(|calendar| !query.excluded_parents.contains(&calendar.id))
      .map(|calendar| async move {
        match self
          .inner
          .source
          .list_events(&calendar.id, query.text.as_deref(), query.start, query.end)
          .await
        {
          Ok(events) => events
            .into_iter()
            .map(|event| {
              AgendaItem::from_event(event, Some(calendar.summary.clone()), calendar.color)
            })
            .collect(),
          Err(e) => {
            warn!("event search in calendar {} failed: {e}", calendar.id);
            Vec::new()
          }
        }
      });

    let mut items: Vec<AgendaItem> = join_all(fetches).await.into_iter().flatten().collect();
    items.sort_by_key(|item| item.time.primary());
    Ok(items)
  }

  fn search_cached(&self, query: &SearchQuery) -> Result<Vec<AgendaItem>> {
    self.inner.store.search_events(
      query.text.as_deref(),
      query.start,
      query.end,
      &query.excluded_parents,
    )
  }

  fn cache_is_stale(&self) -> Result<bool> {
    let last = self.inner.store.last_sync(EVENTS_LAST_SYNC)?;
    Ok(match last {
      Some(at) => Utc::now() - at > self.inner.stale_after,
      None => true,
    })
  }

  fn spawn_sync(&self) {
    let this = self.clone();
    tokio::spawn(async move {
      this.sync().await;
    });
  }

  /// Run one sync pass: fetch calendars, refresh every calendar's events
  /// within the sync window, then replace the calendar table and record the
  /// cursor.
  ///
  /// Returns immediately if a pass is already in flight; concurrent callers
  /// never wait for it. Remote failures are logged and skipped, so the pass
  /// never surfaces an error to its invoker.
  pub async fn sync(&self) {
    let _guard = match self.inner.sync_lock.try_lock() {
      Ok(guard) => guard,
      Err(_) => {
        debug!("calendar sync already in flight, skipping");
        return;
      }
    };

    debug!("syncing calendars");
    if let Err(e) = self.sync_pass().await {
      error!("calendar sync aborted: {e}");
    }
  }

  async fn sync_pass(&self) -> Result<()> {
    let calendars = match self.inner.source.list_calendars().await {
      Ok(calendars) => calendars,
      Err(e) => {
        warn!("calendar listing failed, keeping cached state: {e}");
        return Ok(());
      }
    };

    let window_start = Utc::now();
    let window_end = window_start + self.inner.sync_horizon;

    // Child fetches run concurrently; all of them settle before the
    // calendar table itself is replaced.
    let fetches = calendars.iter().map(|calendar| async move {
      let events = self
        .inner
        .source
        .list_events(&calendar.id, None, Some(window_start), Some(window_end))
        .await;
      (calendar, events)
    });

    for (calendar, fetched) in join_all(fetches).await {
      match fetched {
        Ok(events) => self.inner.store.replace_events(&calendar.id, &events)?,
        Err(e) => warn!(
          "event fetch for calendar {} failed, keeping cached copy: {e}",
          calendar.id
        ),
      }
    }

    self.inner.store.replace_calendars(&calendars)?;
    self.inner.store.set_last_sync(EVENTS_LAST_SYNC, Utc::now())?;
    Ok(())
  }

  /// Refresh one previously returned event.
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
      .get_event(&item.parent_id, &item.item_id)
      .await
    {
      Ok(Some(event)) => event,
      Ok(None) => return Ok(RefreshOutcome::Gone),
      Err(e) => {
        warn!("refresh of event {} failed: {e}", item.item_id);
        return Ok(RefreshOutcome::Gone);
      }
    };

    self.inner.store.upsert_event(&refreshed)?;

    Ok(RefreshOutcome::Refreshed(AgendaItem::from_event(
      refreshed,
      item.list_name.clone(),
      item.color,
    )))
  }

  /// The calendars of the signed-in account, falling back to the cached
  /// set when the remote is unavailable.
  pub async fn list_calendars(&self) -> Result<Vec<CalendarList>> {
    match self.inner.source.list_calendars().await {
      Ok(calendars) => Ok(calendars),
      Err(e) => {
        warn!("calendar listing failed, serving cached calendars: {e}");
        self.inner.store.list_calendars()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use chrono::TimeZone;
  use color_eyre::eyre::eyre;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};

  use crate::model::Event;

  fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
  }

  fn calendar(id: &str) -> CalendarList {
    CalendarList {
      id: id.to_string(),
      summary: format!("Calendar {id}"),
      color: None,
    }
  }

  fn event(id: &str, calendar_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
    Event {
      id: id.to_string(),
      calendar_id: calendar_id.to_string(),
      summary: format!("Event {id}"),
      description: None,
      location: None,
      start,
      end,
      include_time: true,
      url: format!("https://calendar.example.com/{id}"),
      attendees: Vec::new(),
    }
  }

  #[derive(Clone, Default)]
  struct FakeCalendars {
    calendars: Vec<CalendarList>,
    events: HashMap<String, Vec<Event>>,
    single: Option<Event>,
    fail_listing: bool,
    fail_get: bool,
    list_delay_ms: u64,
    list_calls: Arc<AtomicUsize>,
    event_calls: Arc<AtomicUsize>,
    get_calls: Arc<AtomicUsize>,
  }

  #[async_trait]
  impl CalendarSource for FakeCalendars {
    async fn list_calendars(&self) -> Result<Vec<CalendarList>> {
      self.list_calls.fetch_add(1, Ordering::SeqCst);
      if self.list_delay_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(self.list_delay_ms)).await;
      }
      if self.fail_listing {
        return Err(eyre!("network down"));
      }
      Ok(self.calendars.clone())
    }

    async fn list_events(
      &self,
      calendar_id: &str,
      _text: Option<&str>,
      _time_min: Option<DateTime<Utc>>,
      _time_max: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>> {
      self.event_calls.fetch_add(1, Ordering::SeqCst);
      Ok(self.events.get(calendar_id).cloned().unwrap_or_default())
    }

    async fn get_event(&self, _calendar_id: &str, _event_id: &str) -> Result<Option<Event>> {
      self.get_calls.fetch_add(1, Ordering::SeqCst);
      if self.fail_get {
        return Err(eyre!("network down"));
      }
      Ok(self.single.clone())
    }
  }

  fn provider(source: FakeCalendars) -> CalendarProvider<FakeCalendars> {
    CalendarProvider::new(source, Arc::new(Store::open_in_memory().unwrap()))
  }

  #[tokio::test]
  async fn sync_then_windowed_search_returns_overlapping_event() {
    let source = FakeCalendars {
      calendars: vec![calendar("cal1")],
      events: [(
        "cal1".to_string(),
        vec![
          event("e1", "cal1", day(3), day(3)),
          event("e2", "cal1", day(10), day(11)),
        ],
      )]
      .into_iter()
      .collect(),
      ..Default::default()
    };
    let provider = provider(source);

    provider.sync().await;

    let hits = provider
      .search(&SearchQuery {
        start: Some(day(1)),
        end: Some(day(5)),
        ..Default::default()
      })
      .await
      .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item_id, "e1");
    assert_eq!(hits[0].list_name.as_deref(), Some("Calendar cal1"));
    assert!(
      provider.inner.store.last_sync(EVENTS_LAST_SYNC).unwrap().is_some(),
      "sync pass should record the cursor"
    );
  }

  #[tokio::test]
  async fn concurrent_sync_invocations_run_one_pass() {
    let source = FakeCalendars {
      calendars: vec![calendar("cal1")],
      list_delay_ms: 100,
      ..Default::default()
    };
    let list_calls = Arc::clone(&source.list_calls);
    let provider = provider(source);
    let second = provider.clone();

    tokio::join!(provider.sync(), second.sync());

    assert_eq!(list_calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn offline_search_never_touches_the_network() {
    let source = FakeCalendars {
      calendars: vec![calendar("cal1")],
      ..Default::default()
    };
    let list_calls = Arc::clone(&source.list_calls);
    let event_calls = Arc::clone(&source.event_calls);
    let provider = provider(source);

    let hits = provider
      .search(&SearchQuery {
        allow_network: false,
        ..Default::default()
      })
      .await
      .unwrap();

    assert!(hits.is_empty());
    assert_eq!(list_calls.load(Ordering::SeqCst), 0);
    assert_eq!(event_calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn live_search_fans_out_and_merges_sorted() {
    let source = FakeCalendars {
      calendars: vec![calendar("cal1"), calendar("cal2"), calendar("cal3")],
      events: [
        ("cal1".to_string(), vec![event("late", "cal1", day(20), day(21))]),
        ("cal2".to_string(), vec![event("early", "cal2", day(2), day(3))]),
        ("cal3".to_string(), vec![event("skip", "cal3", day(4), day(5))]),
      ]
      .into_iter()
      .collect(),
      ..Default::default()
    };
    let event_calls = Arc::clone(&source.event_calls);
    let provider = provider(source);
    // Fresh cursor keeps the background sync out of the way
    provider
      .inner
      .store
      .set_last_sync(EVENTS_LAST_SYNC, Utc::now())
      .unwrap();

    let hits = provider
      .search(&SearchQuery {
        excluded_parents: ["cal3".to_string()].into_iter().collect(),
        allow_network: true,
        ..Default::default()
      })
      .await
      .unwrap();

    let ids: Vec<&str> = hits.iter().map(|i| i.item_id.as_str()).collect();
    assert_eq!(ids, ["early", "late"]);
    // Excluded calendars are not queried at all
    assert_eq!(event_calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn live_search_falls_back_to_cache_when_listing_fails() {
    let source = FakeCalendars {
      fail_listing: true,
      ..Default::default()
    };
    let provider = provider(source);
    provider
      .inner
      .store
      .replace_calendars(&[calendar("cal1")])
      .unwrap();
    provider
      .inner
      .store
      .replace_events("cal1", &[event("e1", "cal1", day(2), day(3))])
      .unwrap();
    provider
      .inner
      .store
      .set_last_sync(EVENTS_LAST_SYNC, Utc::now())
      .unwrap();

    let hits = provider
      .search(&SearchQuery {
        allow_network: true,
        ..Default::default()
      })
      .await
      .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item_id, "e1");
  }

  #[tokio::test]
  async fn refresh_within_window_returns_unchanged_without_network() {
    let source = FakeCalendars::default();
    let get_calls = Arc::clone(&source.get_calls);
    let provider = provider(source);

    let item = AgendaItem::from_event(event("e1", "cal1", day(2), day(3)), None, None);
    let obtained = Utc::now();

    let first = provider.refresh(&item, obtained).await.unwrap();
    let second = provider.refresh(&item, obtained).await.unwrap();

    assert_eq!(first, RefreshOutcome::Unchanged(item.clone()));
    assert_eq!(first, second);
    assert_eq!(get_calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn refresh_past_window_with_failing_remote_is_gone() {
    let source = FakeCalendars {
      fail_get: true,
      ..Default::default()
    };
    let get_calls = Arc::clone(&source.get_calls);
    let provider = provider(source);

    let item = AgendaItem::from_event(event("e1", "cal1", day(2), day(3)), None, None);
    let outcome = provider
      .refresh(&item, Utc::now() - Duration::seconds(60))
      .await
      .unwrap();

    assert_eq!(outcome, RefreshOutcome::Gone);
    assert_eq!(get_calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn refresh_past_window_writes_through() {
    let mut moved = event("e1", "cal1", day(8), day(9));
    moved.summary = "Moved".to_string();
    let source = FakeCalendars {
      single: Some(moved),
      ..Default::default()
    };
    let provider = provider(source);
    provider
      .inner
      .store
      .replace_calendars(&[calendar("cal1")])
      .unwrap();
    provider
      .inner
      .store
      .replace_events("cal1", &[event("e1", "cal1", day(2), day(3))])
      .unwrap();

    let item = provider.inner.store.get_event("cal1", "e1").unwrap().unwrap();
    let outcome = provider
      .refresh(&item, Utc::now() - Duration::seconds(60))
      .await
      .unwrap();

    match outcome {
      RefreshOutcome::Refreshed(updated) => assert_eq!(updated.title, "Moved"),
      other => panic!("expected refreshed item, got {other:?}"),
    }
    let cached = provider.inner.store.get_event("cal1", "e1").unwrap().unwrap();
    assert_eq!(cached.title, "Moved");
  }
}
