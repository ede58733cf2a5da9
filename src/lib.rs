//! Library entry that exposes internal modules.
//! Keep public API minimal and explicit.

pub mod api;
pub mod config;
pub mod db;
pub mod handler;
pub mod ip;
pub mod notify;

// Re-export most used items for ergonomic main.rs imports.
pub use config::{load, load_from, Config, SmtpConfig, TwilioConfig};
pub use db::{init_db, ContactStore, SqliteStore};
pub use handler::{ContactSubmission, SubmissionHandler, SubmissionResponse, SubmitError};
pub use ip::{IpLookup, LocalIpv4Lookup};
pub use notify::{EmailSender, SmsSender, SmtpEmailSender, TwilioSmsSender};
