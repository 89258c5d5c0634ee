//! Process configuration and the VAPID credential set.
//!
//! Everything here is built once at startup and passed down by reference;
//! nothing is read from ambient global state after that.

use crate::error::{NotifyError, Result};
use crate::store::{SubscriptionStore, REVOKED_DIR};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use web_push::VapidSignatureBuilder;

/// Directory, next to the credential file, that holds subscription records.
pub const SUBSCRIPTIONS_DIR: &str = "subscriptions";

/// How long the push service should hold an undelivered message (seconds).
pub const DEFAULT_TTL: u32 = 30;

/// Contact used when bootstrapping credentials without an explicit one.
pub const DEFAULT_SUBSCRIBER: &str = "example@example.org";

/// Credential file key for the VAPID contact.
pub const SUBSCRIBER_VAR: &str = "SUBSCRIBER";
/// Credential file key for the VAPID public key.
pub const PUBLIC_KEY_VAR: &str = "PUBLIC_KEY";
/// Credential file key for the VAPID private key.
pub const PRIVATE_KEY_VAR: &str = "PRIVATE_KEY";

const PRIVATE_KEY_LEN: usize = 32;
const PUBLIC_KEY_LEN: usize = 65;

/// Runtime configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Credential file. Records live in a sibling `subscriptions` directory.
    pub env_file: PathBuf,

    /// Time-to-live hint passed to the push service, in seconds.
    pub ttl: u32,

    /// Number of records delivered concurrently. 1 means sequential.
    pub workers: usize,

    /// Per-request timeout for the push transport.
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env_file: default_env_file(),
            ttl: DEFAULT_TTL,
            workers: 1,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Configuration rooted at the given credential file.
    pub fn new(env_file: impl Into<PathBuf>) -> Self {
        Self {
            env_file: env_file.into(),
            ..Default::default()
        }
    }

    /// Directory holding active subscription records.
    pub fn subscriptions_dir(&self) -> PathBuf {
        self.env_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SUBSCRIPTIONS_DIR)
    }

    /// Directory holding quarantined subscription records.
    pub fn revoked_dir(&self) -> PathBuf {
        self.subscriptions_dir().join(REVOKED_DIR)
    }

    /// Open the subscription registry this configuration points at.
    pub fn open_store(&self) -> Result<SubscriptionStore> {
        SubscriptionStore::open(self.subscriptions_dir())
    }

    /// Load and validate the credential set.
    pub fn load_credentials(&self) -> Result<Credentials> {
        let credentials = Credentials::load(&self.env_file)?;
        credentials.validate()?;
        Ok(credentials)
    }
}

/// `<user config dir>/notify-tool/notify.env`, or `./notify-tool/notify.env`
/// when the platform has no config directory.
pub fn default_env_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notify-tool")
        .join("notify.env")
}

/// VAPID credentials shared by every delivery in a run.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Contact address for the push service operator.
    pub subscriber: String,
    /// Application server public key, unpadded base64url.
    pub vapid_public_key: String,
    /// Application server private key, unpadded base64url.
    pub vapid_private_key: String,
}

impl Credentials {
    /// Load from a credential file, letting process environment variables
    /// of the same names take precedence.
    ///
    /// A missing file is not an error by itself; the values may all come
    /// from the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "loading credentials");

        let contents = match fs::read_to_string(path) {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "credential file not found");
                None
            }
            Err(e) => return Err(e.into()),
        };

        Self::from_sources(contents.as_deref(), |name| std::env::var(name).ok())
    }

    /// Resolve each value from `env` first, then from the file contents.
    pub fn from_sources<F>(file: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pairs = file.map(parse_env_file).unwrap_or_default();

        let lookup = |name: &str| -> Result<String> {
            env(name)
                .filter(|v| !v.is_empty())
                .or_else(|| {
                    pairs
                        .iter()
                        .rev()
                        .find(|(k, v)| k == name && !v.is_empty())
                        .map(|(_, v)| v.clone())
                })
                .ok_or_else(|| NotifyError::Config(format!("required key {name} is not set")))
        };

        Ok(Self {
            subscriber: lookup(SUBSCRIBER_VAR)?,
            vapid_public_key: lookup(PUBLIC_KEY_VAR)?,
            vapid_private_key: lookup(PRIVATE_KEY_VAR)?,
        })
    }

    /// Check the VAPID keys decode to a P-256 scalar and uncompressed point,
    /// and that the public key is the one derived from the private scalar.
    pub fn validate(&self) -> Result<()> {
        let private = self.private_key_bytes()?;
        if private.len() != PRIVATE_KEY_LEN {
            return Err(NotifyError::Config(format!(
                "{PRIVATE_KEY_VAR} must be {PRIVATE_KEY_LEN} bytes, got {}",
                private.len()
            )));
        }

        let public = self.public_key_bytes()?;
        if public.len() != PUBLIC_KEY_LEN || public[0] != 0x04 {
            return Err(NotifyError::Config(format!(
                "{PUBLIC_KEY_VAR} must be a {PUBLIC_KEY_LEN}-byte uncompressed point"
            )));
        }

        let signer = VapidSignatureBuilder::from_base64_no_sub(
            self.vapid_private_key.trim_end_matches('='),
            web_push::URL_SAFE_NO_PAD,
        )
        .map_err(|e| NotifyError::Config(format!("{PRIVATE_KEY_VAR} is not a P-256 key: {e}")))?;
        if signer.get_public_key() != public {
            return Err(NotifyError::Config(format!(
                "{PUBLIC_KEY_VAR} does not belong to {PRIVATE_KEY_VAR}"
            )));
        }

        Ok(())
    }

    pub fn private_key_bytes(&self) -> Result<Vec<u8>> {
        Ok(URL_SAFE_NO_PAD.decode(self.vapid_private_key.trim_end_matches('='))?)
    }

    pub fn public_key_bytes(&self) -> Result<Vec<u8>> {
        Ok(URL_SAFE_NO_PAD.decode(self.vapid_public_key.trim_end_matches('='))?)
    }

    /// The `sub` claim for VAPID tokens.
    pub fn vapid_subject(&self) -> String {
        if self.subscriber.starts_with("https:") || self.subscriber.starts_with("mailto:") {
            self.subscriber.clone()
        } else {
            format!("mailto:{}", self.subscriber)
        }
    }

    /// Write the credential file, creating parent directories.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let mut file = File::create(path)?;
        writeln!(file, "{SUBSCRIBER_VAR}={}", self.subscriber)?;
        writeln!(file, "{PUBLIC_KEY_VAR}={}", self.vapid_public_key)?;
        writeln!(file, "{PRIVATE_KEY_VAR}={}", self.vapid_private_key)?;
        file.sync_all()?;

        tracing::info!(path = %path.display(), "wrote credentials");
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("subscriber", &self.subscriber)
            .field("vapid_public_key", &self.vapid_public_key)
            .finish_non_exhaustive()
    }
}

/// Parse `KEY=value` lines. Blank lines and `#` comments are skipped and an
/// `export ` prefix is tolerated. Values are taken literally.
pub fn parse_env_file(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}
