//! API Automate - request collection workbench and automation runner
//!
//! A Rust application providing:
//! - Import of request collection documents into a categorized catalog
//! - Variable resolution and per-request overrides
//! - Sending requests with automatic auth token capture and injection
//! - Ordered automation runs with pacing and cancellation
//! - Transcript logging and collection export

pub mod api;
pub mod automation;
pub mod collection;
pub mod config;
pub mod error;
pub mod executor;
pub mod server;
pub mod session;
pub mod templates;
pub mod transcript;
pub mod tui;
pub mod variables;
pub mod workspace;

pub use automation::{create_shared_sequencer, RunSummary, SharedSequencer};
pub use config::{AppConfig, SharedConfig};
pub use error::{AppError, AppResult};
pub use transcript::{create_shared_transcript, SharedTranscript, TranscriptSummary};
pub use workspace::{create_shared_workspace, SharedWorkspace};

/// Application result type
pub type Result<T> = anyhow::Result<T>;
