//! Setup failures versus per-record failures.

use notify_tool::{
    Config, Credentials, Dispatcher, NeverInterrupts, Notification, NotifyError, PushTransport,
    SubscriptionRecord, SubscriptionStore, TransportOutcome,
};
use std::fs;
use tempfile::TempDir;

const PUBLIC: &str =
    "BBVXt6JXfXI4HXEiWBcr8c_OnljqP4B_6xFr_bd0O-kEvnMATWOeEOv8IvE4HmQqIdujedwwaFs1EkoXDOkSC10";
const PRIVATE: &str = "iPclkxk9cRadR-Sv-Hr96CGsuU1oDXouH4q8QfkpBo0";

struct AlwaysDelivered;

impl PushTransport for AlwaysDelivered {
    fn send(&self, _: &SubscriptionRecord, _: &[u8], _: &Credentials) -> TransportOutcome {
        TransportOutcome::Delivered { status: 201 }
    }
}

// --- Credential Errors ---

#[test]
fn test_credentials_from_file() {
    let dir = TempDir::new().unwrap();
    let env_file = dir.path().join("notify.env");
    fs::write(
        &env_file,
        format!("SUBSCRIBER=me@example.org\nPUBLIC_KEY={PUBLIC}\nPRIVATE_KEY={PRIVATE}\n"),
    )
    .unwrap();

    let creds = Config::new(&env_file).load_credentials().unwrap();
    assert_eq!(creds.vapid_private_key, PRIVATE);
}

#[test]
fn test_incomplete_credential_file() {
    let result = Credentials::from_sources(Some("SUBSCRIBER=me@example.org\n"), |_| None);
    assert!(matches!(result, Err(NotifyError::Config(_))));
}

#[test]
fn test_swapped_keys_fail_validation() {
    let creds = Credentials {
        subscriber: "me@example.org".into(),
        vapid_public_key: PRIVATE.into(),
        vapid_private_key: PUBLIC.into(),
    };
    assert!(matches!(creds.validate(), Err(NotifyError::Config(_))));
}

// --- Store Errors ---

#[test]
fn test_second_store_is_locked_out() {
    let dir = TempDir::new().unwrap();
    let config = Config::new(dir.path().join("notify.env"));

    let _store = config.open_store().unwrap();
    assert!(matches!(config.open_store(), Err(NotifyError::Locked)));
}

#[test]
fn test_store_path_is_a_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("subscriptions");
    fs::write(&path, "not a directory").unwrap();

    assert!(matches!(SubscriptionStore::open(&path), Err(NotifyError::Io(_))));
}

#[test]
fn test_put_incomplete_record() {
    let dir = TempDir::new().unwrap();
    let store = SubscriptionStore::open(dir.path()).unwrap();

    for bad in [
        SubscriptionRecord::new("", "BKey", "auth"),
        SubscriptionRecord::new("https://push.example/x", "", "auth"),
        SubscriptionRecord::new("https://push.example/x", "BKey", ""),
    ] {
        assert!(matches!(store.put(&bad), Err(NotifyError::InvalidRecord(_))));
    }
    assert_eq!(store.list().unwrap().count(), 0);
}

#[test]
fn test_subscription_line_must_be_json() {
    assert!(matches!(
        SubscriptionRecord::from_json("not json"),
        Err(NotifyError::Deserialization(_))
    ));
}

// --- Dispatch Errors ---

#[test]
fn test_empty_store_dispatch() {
    let dir = TempDir::new().unwrap();
    let store = SubscriptionStore::open(dir.path()).unwrap();
    let creds = Credentials {
        subscriber: "me@example.org".into(),
        vapid_public_key: PUBLIC.into(),
        vapid_private_key: PRIVATE.into(),
    };

    let report = Dispatcher::new(&store, AlwaysDelivered, &creds)
        .run(&Notification::default(), &NeverInterrupts)
        .unwrap();
    assert!(report.records.is_empty());
    assert_eq!(report.skipped, 0);
}

#[test]
fn test_dispatch_with_removed_store_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("subscriptions");
    let store = SubscriptionStore::open(&path).unwrap();
    fs::remove_dir_all(&path).unwrap();

    let creds = Credentials {
        subscriber: "me@example.org".into(),
        vapid_public_key: PUBLIC.into(),
        vapid_private_key: PRIVATE.into(),
    };
    let result = Dispatcher::new(&store, AlwaysDelivered, &creds)
        .run(&Notification::default(), &NeverInterrupts);
    assert!(matches!(result, Err(NotifyError::Io(_))));
}
