//! Remote account bindings: the network-bound collaborators the sync and
//! query engines call into.

pub mod api_types;
mod auth;
mod client;
mod source;

pub use auth::{Auth, LoginState};
pub use client::GoogleClient;
pub use source::{CalendarSource, TaskSource};
