//! Runtime settings and the persisted manager-password document.
//!
//! Settings come from CLI flags with environment fallbacks and are fixed for
//! the life of the process. The only mutable state on disk is `config.json`,
//! handled by [`store::ConfigStore`].

pub mod store;

pub use store::{Config, ConfigStore, StorageError};

use clap::Args;
use directories::ProjectDirs;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing::warn;

use crate::auth::MIN_PASSWORD_LEN;
use crate::upload::UploadLimits;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Room left in the request body limit for text fields and multipart framing.
const FORM_OVERHEAD_BYTES: u64 = BYTES_PER_MB;

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Address to bind the HTTP gateway to
    #[arg(long, env = "STATUSCAST_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Largest accepted media file, in MiB
    #[arg(long, env = "MAX_FILE_MB", default_value_t = 16)]
    pub max_file_mb: u64,

    /// Most files accepted in one upload
    #[arg(long, env = "MAX_FILES", default_value_t = 15)]
    pub max_files: usize,

    /// MIME prefixes accepted for media files
    #[arg(
        long = "allowed-mime",
        env = "ALLOWED_MIME_PREFIXES",
        value_delimiter = ',',
        default_value = "image/,video/"
    )]
    pub allowed_mime_prefixes: Vec<String>,

    /// Manager password used when none has been saved through setup
    #[arg(long, env = "APP_PASSWORD", hide_env_values = true)]
    pub app_password: Option<String>,

    /// Directory holding config.json (defaults to the platform data dir)
    #[arg(long, env = "STATUSCAST_DATA_DIR")]
    pub data_dir: Option<String>,

    /// Command line of the messaging bridge sidecar
    #[arg(long, env = "STATUSCAST_BRIDGE")]
    pub bridge: Option<String>,

    /// Do not print pairing codes as a QR code in the terminal
    #[arg(long, env = "STATUSCAST_NO_TERMINAL_QR")]
    pub no_terminal_qr: bool,
}

impl Settings {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_mb.saturating_mul(BYTES_PER_MB)
    }

    pub fn limits(&self) -> UploadLimits {
        UploadLimits {
            max_files: self.max_files,
            max_file_bytes: self.max_file_bytes(),
            allowed_mime_prefixes: self
                .allowed_mime_prefixes
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Upper bound on a whole upload request body.
    pub fn body_limit(&self) -> usize {
        let total = (self.max_files as u64)
            .saturating_mul(self.max_file_bytes())
            .saturating_add(FORM_OVERHEAD_BYTES);
        usize::try_from(total).unwrap_or(usize::MAX)
    }

    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = self.data_dir.as_deref().filter(|d| !d.trim().is_empty()) {
            return PathBuf::from(shellexpand::tilde(dir).to_string());
        }
        ProjectDirs::from("", "", "statuscast")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    /// The bridge command split into program and arguments.
    pub fn bridge_command(&self) -> Option<(String, Vec<String>)> {
        let mut parts = self.bridge.as_deref()?.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some((program, parts.collect()))
    }

    /// Password to start with: the saved one wins over the environment.
    /// An environment password below the minimum length is ignored, leaving
    /// setup required.
    pub fn initial_password(&self, saved: &Config) -> Option<String> {
        if let Some(password) = saved.password() {
            return Some(password.to_string());
        }

        let password = self.app_password.as_deref().map(str::trim).filter(|p| !p.is_empty())?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            warn!("APP_PASSWORD is shorter than {MIN_PASSWORD_LEN} characters; ignoring it");
            return None;
        }
        Some(password.to_string())
    }
}
