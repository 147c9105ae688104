//! Serverless peer-to-peer calls.
//!
//! Two endpoints exchange session descriptions as copy-pasted text and
//! connect directly. [`ConnectionManager`] owns the one active [`Session`]
//! and reacts to the transport's ICE notifications.

pub mod config;
pub mod error;
pub mod logger;
pub mod manager;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod utils;

pub use config::Config;
pub use error::{Error, Result};
pub use manager::{ConnectionManager, NegotiationStatus};
pub use session::{Role, Session, SessionId, SessionState};
pub use signaling::{SignalSlot, SignalingSink};
