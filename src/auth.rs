use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, ConfigStore};
use crate::error::GateError;
use crate::session::SessionState;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub current_password: Option<String>,
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Owns the manager password and decides who may set it or upload.
pub struct AuthGate {
    session: Arc<SessionState>,
    store: ConfigStore,
    password: RwLock<Option<String>>,
}

impl AuthGate {
    pub fn new(session: Arc<SessionState>, store: ConfigStore, initial: Option<String>) -> Self {
        Self {
            session,
            store,
            password: RwLock::new(initial.filter(|p| !p.is_empty())),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.password.read().is_some()
    }

    fn matches(&self, provided: &str) -> bool {
        match &*self.password.read() {
            Some(expected) => constant_time_eq(expected.as_bytes(), provided.as_bytes()),
            None => false,
        }
    }

    /// Set or change the manager password.
    ///
    /// Pairing must be finished first. Changing an existing password needs
    /// the current one. The in-memory password only changes once the new
    /// value is on disk.
    pub async fn complete_setup(&self, request: SetupRequest) -> Result<(), GateError> {
        let password = request.password.trim();
        let current = request.current_password.as_deref().unwrap_or("").trim();

        if !self.session.is_ready() {
            warn!("Setup attempted before the messaging session was paired");
            return Err(GateError::NotReady);
        }

        if self.is_configured() && !self.matches(current) {
            warn!("Setup rejected: current password mismatch");
            return Err(GateError::Unauthorized);
        }

        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(GateError::InvalidInput(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters."
            )));
        }

        self.store
            .save(&Config {
                manager_password: Some(password.to_string()),
            })
            .await?;
        *self.password.write() = Some(password.to_string());
        info!("Manager password updated");
        Ok(())
    }

    /// True only when a password is configured and `provided` equals it.
    pub fn authorize_upload(&self, provided: &str) -> bool {
        self.matches(provided)
    }

    /// Gate an upload: paired session, configured password, matching password.
    pub fn check_upload(&self, provided: &str) -> Result<(), GateError> {
        self.check_upload_ready()?;
        if !self.authorize_upload(provided) {
            warn!("Upload rejected: wrong password");
            return Err(GateError::Unauthorized);
        }
        Ok(())
    }

    /// The part of [`Self::check_upload`] that needs no request body.
    pub fn check_upload_ready(&self) -> Result<(), GateError> {
        if !self.session.is_ready() {
            return Err(GateError::NotReady);
        }
        if !self.is_configured() {
            return Err(GateError::SetupRequired);
        }
        Ok(())
    }
}
