pub mod catalog;
pub mod config;
pub mod error;
pub mod notify;
pub mod types;
pub mod url_norm;

pub use catalog::DiscriminatorLists;
pub use config::Config;
pub use error::{Result, SentryFeedError};
pub use notify::{HealthTransition, LoggingNotifier, NoopNotifier, Notifier};
pub use types::*;
