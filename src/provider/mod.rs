//! Caller-facing query surface over the two hierarchies.
//!
//! Each provider owns the sync coordination, search and point-refresh logic
//! for one hierarchy. Both are deliberately forgiving about the network:
//! remote failures degrade to whatever the cache has, and only storage
//! failures surface as hard errors.

mod calendar;
mod tasks;

pub use calendar::CalendarProvider;
pub use tasks::TaskProvider;

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::model::AgendaItem;

/// A search request as issued by the caller.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
  /// Case-insensitive substring filter on item titles
  pub text: Option<String>,
  /// Window start (inclusive)
  pub start: Option<DateTime<Utc>>,
  /// Window end (exclusive)
  pub end: Option<DateTime<Utc>>,
  /// Parent collections to drop from the results
  pub excluded_parents: BTreeSet<String>,
  /// Whether answering this query may touch the network at all. When false,
  /// results come from the local cache only, with no fetch and no sync
  /// trigger.
  pub allow_network: bool,
}

/// Outcome of a point refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
  /// The remote returned a current version; the cache was updated
  Refreshed(AgendaItem),
  /// The previous value is recent enough to trust as-is
  Unchanged(AgendaItem),
  /// The item is gone remotely, or currently unavailable
  Gone,
}
