//! End-to-end runs of the `notify` binary.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ece::crypto::LocalKeyPair;
use mockito::mock;
use notify_tool::{generate_credentials, Credentials, SubscriptionRecord, SubscriptionStore};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

fn notify() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_notify"));
    for var in ["SUBSCRIBER", "PUBLIC_KEY", "PRIVATE_KEY"] {
        cmd.env_remove(var);
    }
    cmd.env("RUST_LOG", "warn");
    cmd
}

/// Temp dir with a fresh credential file at `notify.env`.
fn setup() -> (TempDir, PathBuf, Credentials) {
    let dir = TempDir::new().unwrap();
    let env_file = dir.path().join("notify.env");
    let creds = generate_credentials("me@example.org").unwrap();
    creds.write_to(&env_file).unwrap();
    (dir, env_file, creds)
}

fn subscriber(path: &str) -> SubscriptionRecord {
    let (key_pair, auth) = ece::generate_keypair_and_auth_secret().unwrap();
    SubscriptionRecord::new(
        format!("{}{path}", mockito::server_url()),
        URL_SAFE_NO_PAD.encode(key_pair.pub_as_raw().unwrap()),
        URL_SAFE_NO_PAD.encode(auth),
    )
}

fn enroll(dir: &Path, record: &SubscriptionRecord) {
    let store = SubscriptionStore::open(dir.join("subscriptions")).unwrap();
    store.put(record).unwrap();
}

fn with_stdin(mut cmd: Command, input: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(input.as_bytes()).unwrap();
    child.wait_with_output().unwrap()
}

// ============================================================================
// push
// ============================================================================

#[test]
fn test_push_quarantines_gone_subscription_and_succeeds() {
    let (dir, env_file, _) = setup();
    let record = subscriber("/cli/gone");
    enroll(dir.path(), &record);

    let m = mock("POST", "/cli/gone").with_status(410).expect(1).create();

    let status = notify()
        .arg("push")
        .arg("--env")
        .arg(&env_file)
        .args(["--title", "Build", "deploy", "finished"])
        .status()
        .unwrap();

    assert!(status.success());
    m.assert();

    let subs = dir.path().join("subscriptions");
    assert!(!subs.join(record.file_name()).exists());
    assert!(subs.join("revoked").join(record.file_name()).exists());
}

#[test]
fn test_push_with_transient_failure_succeeds() {
    let (dir, env_file, _) = setup();
    let record = subscriber("/cli/busy");
    enroll(dir.path(), &record);

    let m = mock("POST", "/cli/busy").with_status(503).expect(1).create();

    let status = notify()
        .arg("push")
        .arg("--env")
        .arg(&env_file)
        .arg("hello")
        .status()
        .unwrap();

    assert!(status.success());
    m.assert();
    assert!(dir.path().join("subscriptions").join(record.file_name()).exists());
}

#[test]
fn test_push_without_private_key_fails_and_sends_nothing() {
    let (dir, env_file, creds) = setup();
    fs::write(
        &env_file,
        format!("SUBSCRIBER=me@example.org\nPUBLIC_KEY={}\n", creds.vapid_public_key),
    )
    .unwrap();
    let record = subscriber("/cli/unsent");
    enroll(dir.path(), &record);

    let m = mock("POST", "/cli/unsent").with_status(201).expect(0).create();

    let status = notify()
        .arg("push")
        .arg("--env")
        .arg(&env_file)
        .arg("hello")
        .status()
        .unwrap();

    assert!(!status.success());
    m.assert();
    assert!(dir.path().join("subscriptions").join(record.file_name()).exists());
}

#[test]
fn test_push_with_mismatched_keys_fails() {
    let (dir, env_file, creds) = setup();
    let other = generate_credentials("me@example.org").unwrap();
    fs::write(
        &env_file,
        format!(
            "SUBSCRIBER=me@example.org\nPUBLIC_KEY={}\nPRIVATE_KEY={}\n",
            other.vapid_public_key, creds.vapid_private_key
        ),
    )
    .unwrap();
    enroll(dir.path(), &subscriber("/cli/mismatch"));

    let m = mock("POST", "/cli/mismatch").expect(0).create();

    let status = notify()
        .arg("push")
        .arg("--env")
        .arg(&env_file)
        .arg("hello")
        .status()
        .unwrap();

    assert!(!status.success());
    m.assert();
}

// ============================================================================
// subscribe
// ============================================================================

#[test]
fn test_subscribe_stores_pasted_subscription() {
    let (dir, env_file, creds) = setup();
    let record = subscriber("/cli/new");
    let line = format!("{}\n", serde_json::to_string(&record).unwrap());

    let mut cmd = notify();
    cmd.arg("subscribe").arg("--env").arg(&env_file);
    let output = with_stdin(cmd, &line);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&format!("pubKey={}", creds.vapid_public_key)));

    let path = dir
        .path()
        .join("subscriptions")
        .join(format!("{}.json", record.keys.p256dh));
    let stored: SubscriptionRecord = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
    assert_eq!(stored, record);
}

#[test]
fn test_subscribe_with_empty_input_fails() {
    let (dir, env_file, _) = setup();

    let mut cmd = notify();
    cmd.arg("subscribe").arg("--env").arg(&env_file);
    let output = with_stdin(cmd, "");

    assert!(!output.status.success());
    let paths = SubscriptionStore::paths(dir.path().join("subscriptions")).unwrap();
    assert!(paths.is_empty());
}

#[test]
fn test_subscribe_with_invalid_json_fails() {
    let (_dir, env_file, _) = setup();

    let mut cmd = notify();
    cmd.arg("subscribe").arg("--env").arg(&env_file);
    let output = with_stdin(cmd, "https://push.example/not-json\n");

    assert!(!output.status.success());
}

// ============================================================================
// list
// ============================================================================

#[test]
fn test_list_prints_active_and_revoked_paths() {
    let (dir, env_file, _) = setup();
    let subs = dir.path().join("subscriptions");
    let store = SubscriptionStore::open(&subs).unwrap();
    let kept = SubscriptionRecord::new("https://push.example/a", "BKept", "auth");
    let gone = SubscriptionRecord::new("https://push.example/b", "BGone", "auth");
    store.put(&kept).unwrap();
    store.put(&gone).unwrap();
    store.quarantine(&gone).unwrap();

    // Listing works while another process holds the store.
    let output = notify().arg("list").arg("--env").arg(&env_file).output().unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        format!("{}\n", subs.join("BKept.json").display())
    );

    let output = notify()
        .arg("list")
        .arg("--revoked")
        .arg("--env")
        .arg(&env_file)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        format!("{}\n", subs.join("revoked").join("BGone.json").display())
    );
}

#[test]
fn test_list_does_not_create_registry() {
    let dir = TempDir::new().unwrap();
    let env_file = dir.path().join("nowhere").join("notify.env");

    let output = notify().arg("list").arg("--env").arg(&env_file).output().unwrap();

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert!(!dir.path().join("nowhere").exists());
}

// ============================================================================
// usage
// ============================================================================

#[test]
fn test_unknown_subcommand_fails() {
    let status = notify().arg("frobnicate").status().unwrap();
    assert!(!status.success());
}

#[test]
fn test_init_writes_usable_credentials() {
    let dir = TempDir::new().unwrap();
    let env_file = dir.path().join("conf").join("notify.env");

    let status = notify()
        .arg("init")
        .args(["--subscriber", "ops@example.org"])
        .arg(&env_file)
        .status()
        .unwrap();
    assert!(status.success());

    let creds = Credentials::load(&env_file).unwrap();
    assert_eq!(creds.subscriber, "ops@example.org");
    creds.validate().unwrap();
}
