/// Schema for the offline cache tables.
///
/// Instants are stored as epoch milliseconds. Child tables are keyed by
/// `(id, parent id)` because item ids are only unique within their parent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS calendars (
    id TEXT PRIMARY KEY,
    summary TEXT NOT NULL,
    color INTEGER
);

CREATE TABLE IF NOT EXISTS events (
    id TEXT NOT NULL,
    calendar_id TEXT NOT NULL,
    summary TEXT NOT NULL,
    description TEXT,
    location TEXT,
    start INTEGER NOT NULL,
    "end" INTEGER NOT NULL,
    include_time INTEGER NOT NULL,
    url TEXT NOT NULL,
    attendees TEXT NOT NULL,
    PRIMARY KEY (id, calendar_id)
);

CREATE INDEX IF NOT EXISTS idx_events_calendar ON events(calendar_id);
CREATE INDEX IF NOT EXISTS idx_events_start ON events(start);

CREATE TABLE IF NOT EXISTS tasklists (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    updated INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT NOT NULL,
    tasklist_id TEXT NOT NULL,
    title TEXT NOT NULL,
    notes TEXT,
    due INTEGER NOT NULL,
    completed INTEGER NOT NULL,
    url TEXT NOT NULL,
    PRIMARY KEY (id, tasklist_id)
);

CREATE INDEX IF NOT EXISTS idx_tasks_tasklist ON tasks(tasklist_id);
CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(due);

-- One "last full sync" instant per hierarchy
CREATE TABLE IF NOT EXISTS sync_state (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
"#;
