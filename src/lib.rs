//! Password-gated gateway for posting status updates through a paired
//! messaging session.

pub mod auth;
pub mod channels;
pub mod config;
pub mod error;
pub mod gateway;
pub mod session;
pub mod upload;

pub use auth::AuthGate;
pub use config::{ConfigStore, Settings};
pub use error::GateError;
pub use session::{SessionEvent, SessionState};
pub use upload::UploadPipeline;
