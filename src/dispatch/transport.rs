//! Push transport contract and the Web Push implementation.

use crate::config::{Config, Credentials};
use crate::error::{NotifyError, Result};
use crate::types::SubscriptionRecord;
use reqwest::blocking::Client;
use std::time::Duration;
use web_push::{
    ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushMessageBuilder,
    URL_SAFE_NO_PAD,
};

/// What the push service said about one delivery attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportOutcome {
    /// The push service accepted the message.
    Delivered { status: u16 },
    /// The subscription no longer exists at the push service.
    Rejected { status: u16, reason: String },
    /// Anything else: error statuses, timeouts, connection failures.
    Transient { status: Option<u16>, reason: String },
}

impl TransportOutcome {
    /// Classify an HTTP response from a push service.
    pub fn from_status(status: u16, body: &str) -> Self {
        let reason = if body.trim().is_empty() {
            format!("status {status}")
        } else {
            format!("status {status}: {}", body.trim())
        };

        match status {
            200..=299 => TransportOutcome::Delivered { status },
            404 | 410 => TransportOutcome::Rejected { status, reason },
            _ => TransportOutcome::Transient {
                status: Some(status),
                reason,
            },
        }
    }

    /// A failure that happened before any response arrived.
    pub fn transient(reason: impl Into<String>) -> Self {
        TransportOutcome::Transient {
            status: None,
            reason: reason.into(),
        }
    }
}

/// Delivers one payload to one subscription.
///
/// Implementations must be shareable across threads; the dispatcher may call
/// `send` concurrently for distinct records.
pub trait PushTransport: Send + Sync {
    fn send(
        &self,
        record: &SubscriptionRecord,
        payload: &[u8],
        credentials: &Credentials,
    ) -> TransportOutcome;
}

impl<T: PushTransport + ?Sized> PushTransport for &T {
    fn send(
        &self,
        record: &SubscriptionRecord,
        payload: &[u8],
        credentials: &Credentials,
    ) -> TransportOutcome {
        (**self).send(record, payload, credentials)
    }
}

/// An encrypted, signed request ready for the HTTP client.
struct PreparedRequest {
    url: String,
    headers: Vec<(String, Vec<u8>)>,
    body: Vec<u8>,
}

/// Web Push over HTTPS: VAPID-signed, aes128gcm-encrypted.
pub struct WebPushTransport {
    client: Client,
    ttl: u32,
}

impl WebPushTransport {
    pub fn new(ttl: u32, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        Ok(Self { client, ttl })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.ttl, config.request_timeout)
    }

    /// Encrypt and sign the payload for one subscription.
    fn prepare(
        &self,
        record: &SubscriptionRecord,
        payload: &[u8],
        credentials: &Credentials,
    ) -> std::result::Result<PreparedRequest, String> {
        let info = SubscriptionInfo::new(
            record.endpoint.as_str(),
            record.keys.p256dh.as_str(),
            record.keys.auth.as_str(),
        );

        let mut signature = VapidSignatureBuilder::from_base64(
            &credentials.vapid_private_key,
            URL_SAFE_NO_PAD,
            &info,
        )
        .map_err(|e| format!("vapid key: {e}"))?;
        signature.add_claim("sub", credentials.vapid_subject());
        let signature = signature.build().map_err(|e| format!("vapid signature: {e}"))?;

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_vapid_signature(signature);
        builder.set_ttl(self.ttl);
        let message = builder.build().map_err(|e| format!("message: {e}"))?;

        let (parts, body) =
            web_push::request_builder::build_request::<Vec<u8>>(message).into_parts();

        // The HTTP client computes its own content length.
        let headers = parts
            .headers
            .iter()
            .filter(|(name, _)| name.as_str() != "content-length")
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();

        Ok(PreparedRequest {
            url: parts.uri.to_string(),
            headers,
            body,
        })
    }
}

impl PushTransport for WebPushTransport {
    fn send(
        &self,
        record: &SubscriptionRecord,
        payload: &[u8],
        credentials: &Credentials,
    ) -> TransportOutcome {
        let prepared = match self.prepare(record, payload, credentials) {
            Ok(prepared) => prepared,
            Err(reason) => return TransportOutcome::transient(reason),
        };

        let mut request = self.client.post(prepared.url).body(prepared.body);
        for (name, value) in prepared.headers {
            request = request.header(name, value);
        }

        match request.send() {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().unwrap_or_default();
                TransportOutcome::from_status(status, &body)
            }
            Err(e) => TransportOutcome::transient(e.to_string()),
        }
    }
}
