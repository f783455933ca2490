mod config;
mod model;
mod provider;
mod remote;
mod store;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use config::Config;
use model::{AgendaItem, ItemTime};
use provider::{CalendarProvider, RefreshOutcome, SearchQuery, TaskProvider};
use remote::{Auth, GoogleClient, LoginState};
use store::Store;

#[derive(Parser, Debug)]
#[command(name = "datebook")]
#[command(about = "Offline-first search over Google Calendar events and Google Tasks")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/datebook/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Search events and tasks
  Search {
    /// Free-text filter on item titles
    query: Option<String>,

    /// Window start, RFC 3339 (inclusive)
    #[arg(long)]
    from: Option<DateTime<Utc>>,

    /// Window end, RFC 3339 (exclusive)
    #[arg(long)]
    to: Option<DateTime<Utc>>,

    /// Calendar/task list ids to exclude (repeatable)
    #[arg(long = "exclude")]
    excluded: Vec<String>,

    /// Answer from the local cache only, without touching the network
    #[arg(long)]
    offline: bool,

    /// Which hierarchy to search
    #[arg(long, value_enum, default_value = "all")]
    kind: Kind,
  },

  /// List the calendars and task lists of the signed-in account
  Lists,

  /// Run a full sync pass for both hierarchies
  Sync,

  /// Re-fetch one item and update the cache
  Refresh {
    #[arg(value_enum)]
    kind: ItemKind,

    /// Id of the calendar or task list
    parent_id: String,

    /// Id of the event or task within its parent
    item_id: String,
  },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
  Events,
  Tasks,
  All,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ItemKind {
  Event,
  Task,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let auth = Auth::load();

  let store = Arc::new(Store::open_default()?);
  let client = GoogleClient::new(&config, &auth)?;
  let calendars = CalendarProvider::new(client.clone(), Arc::clone(&store))
    .with_sync_horizon(chrono::Duration::days(config.sync.event_horizon_days));
  let tasks = TaskProvider::new(client, Arc::clone(&store))
    .with_sync_horizon(chrono::Duration::days(config.sync.task_horizon_days));

  match args.command {
    Command::Search {
      query,
      from,
      to,
      excluded,
      offline,
      kind,
    } => {
      let request = SearchQuery {
        text: query,
        start: from,
        end: to,
        excluded_parents: excluded.into_iter().collect::<BTreeSet<_>>(),
        allow_network: !offline,
      };

      let mut items = Vec::new();
      if matches!(kind, Kind::Events | Kind::All) {
        items.extend(calendars.search(&request).await?);
      }
      if matches!(kind, Kind::Tasks | Kind::All) {
        items.extend(tasks.search(&request).await?);
      }
      items.sort_by_key(|item| item.time.primary());

      for item in &items {
        println!("{}", format_item(item));
      }
    }

    Command::Lists => {
      if let LoginState::LoggedIn { display_name } = auth.login_state() {
        if !display_name.is_empty() {
          println!("Signed in as {display_name}");
        }
      }
      for calendar in calendars.list_calendars().await? {
        println!("calendar  {}  {}", calendar.id, calendar.summary);
      }
      for list in tasks.list_tasklists().await? {
        println!("tasklist  {}  {}", list.id, list.title);
      }
    }

    Command::Sync => {
      tokio::join!(calendars.sync(), tasks.sync());
      println!("Sync complete");
    }

    Command::Refresh {
      kind,
      parent_id,
      item_id,
    } => {
      // Treat the cached copy as never obtained so a real fetch happens
      let never = DateTime::UNIX_EPOCH;
      let outcome = match kind {
        ItemKind::Event => {
          let item = store
            .get_event(&parent_id, &item_id)?
            .ok_or_else(|| eyre!("Event {}/{} is not in the cache", parent_id, item_id))?;
          calendars.refresh(&item, never).await?
        }
        ItemKind::Task => {
          let item = store
            .get_task(&parent_id, &item_id)?
            .ok_or_else(|| eyre!("Task {}/{} is not in the cache", parent_id, item_id))?;
          tasks.refresh(&item, never).await?
        }
      };

      match outcome {
        RefreshOutcome::Refreshed(item) => println!("Refreshed: {}", format_item(&item)),
        RefreshOutcome::Unchanged(item) => println!("Unchanged: {}", format_item(&item)),
        RefreshOutcome::Gone => {
          println!("Gone: the item no longer exists remotely or is unavailable")
        }
      }
    }
  }

  Ok(())
}

fn format_item(item: &AgendaItem) -> String {
  let when = match item.time {
    ItemTime::Span {
      start,
      end,
      include_time: true,
    } => format!(
      "{} .. {}",
      start.format("%Y-%m-%d %H:%M"),
      end.format("%Y-%m-%d %H:%M")
    ),
    ItemTime::Span { start, end, .. } => {
      format!("{} .. {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
    }
    ItemTime::Due(due) => format!("due {}", due.format("%Y-%m-%d")),
  };

  let mut line = format!("{when}  {}", item.title);
  if let Some(name) = &item.list_name {
    line.push_str(&format!("  [{name}]"));
  }
  if item.completed {
    line.push_str("  (done)");
  }
  line
}
