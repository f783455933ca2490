//! Login/session state for the Google account.
//!
//! Token acquisition (the OAuth consent flow, refresh) lives outside this
//! crate; the engine only needs a bearer token and a logged-in/logged-out
//! signal it can read.

use std::path::PathBuf;

/// Whether a usable Google session exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
  LoggedIn { display_name: String },
  LoggedOut,
}

/// Session state as found on this machine.
pub struct Auth {
  token: Option<String>,
  display_name: Option<String>,
}

impl Auth {
  /// Load session state.
  ///
  /// Checks DATEBOOK_GOOGLE_TOKEN first, then GOOGLE_ACCESS_TOKEN, then the
  /// token file under the data directory.
  pub fn load() -> Self {
    let token = std::env::var("DATEBOOK_GOOGLE_TOKEN")
      .or_else(|_| std::env::var("GOOGLE_ACCESS_TOKEN"))
      .ok()
      .or_else(Self::token_from_file)
      .map(|t| t.trim().to_string())
      .filter(|t| !t.is_empty());

    Self {
      token,
      display_name: std::env::var("DATEBOOK_GOOGLE_ACCOUNT").ok(),
    }
  }

  fn token_file() -> Option<PathBuf> {
    let data_dir = dirs::data_dir().or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))?;
    Some(data_dir.join("datebook").join("token"))
  }

  fn token_from_file() -> Option<String> {
    std::fs::read_to_string(Self::token_file()?).ok()
  }

  pub fn login_state(&self) -> LoginState {
    match &self.token {
      Some(_) => LoginState::LoggedIn {
        display_name: self.display_name.clone().unwrap_or_default(),
      },
      None => LoginState::LoggedOut,
    }
  }

  pub fn access_token(&self) -> Option<&str> {
    self.token.as_deref()
  }
}
