//! Dispatch engine and push transport.
//!
//! The engine walks the registry once per run, hands the same payload to the
//! transport for every active record, and folds each outcome back into the
//! registry:
//!
//! - delivered: nothing changes
//! - rejected (404/410): the record is quarantined
//! - anything else: the record stays active and is tried again next run

mod engine;
mod transport;

pub use engine::{DispatchReport, Dispatcher, RecordOutcome, RecordReport, MAX_WORKERS};
pub use transport::{PushTransport, TransportOutcome, WebPushTransport};
