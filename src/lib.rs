//! # Notify Tool
//!
//! A personal Web Push dispatcher: a durable, directory-backed registry of
//! push subscriptions and an engine that fans one notification out to all of
//! them, quarantining the ones the push service says are gone.
//!
//! ## Core Concepts
//!
//! - **Subscription records**: one JSON file per browser endpoint, named by
//!   the client's `p256dh` key
//! - **Quarantine**: rejected records are renamed into `subscriptions/revoked`,
//!   never deleted
//! - **Dispatch runs**: one payload, sent at most once to each active record
//! - **Push transport**: the pluggable piece that actually talks to the push
//!   service
//!
//! ## Example
//!
//! ```ignore
//! use notify_tool::{Config, Dispatcher, NeverInterrupts, NotificationBuilder, WebPushTransport};
//!
//! let config = Config::new("/home/me/.config/notify-tool/notify.env");
//! let credentials = config.load_credentials()?;
//! let store = config.open_store()?;
//!
//! let notification = NotificationBuilder::new()
//!     .title("Build")
//!     .body_words(["deploy", "finished"])
//!     .build();
//!
//! let transport = WebPushTransport::from_config(&config)?;
//! let report = Dispatcher::new(&store, transport, &credentials)
//!     .run(&notification, &NeverInterrupts)?;
//! println!("{} delivered, {} quarantined", report.delivered(), report.quarantined());
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod interrupt;
pub mod keys;
pub mod payload;
pub mod store;
pub mod types;

// Re-exports
pub use config::{Config, Credentials};
pub use dispatch::{
    DispatchReport, Dispatcher, PushTransport, RecordOutcome, RecordReport, TransportOutcome,
    WebPushTransport,
};
pub use error::{NotifyError, Result};
pub use interrupt::{Interruptee, NeverInterrupts, ShutdownFlag};
pub use keys::generate_credentials;
pub use payload::{Notification, NotificationBuilder};
pub use store::{SubscriptionIter, SubscriptionStore};
pub use types::*;
