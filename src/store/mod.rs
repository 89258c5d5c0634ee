//! Directory-backed subscription registry.
//!
//! Each active record is one pretty-printed JSON file under the
//! `subscriptions` directory, named after its client key. Quarantined
//! records are renamed into `subscriptions/revoked`, content untouched.

mod registry;

pub use registry::{SubscriptionIter, SubscriptionStore, LOCK_FILE, REVOKED_DIR};
