//! Notification payload construction.
//!
//! The payload is a compact JSON object with the keys `title`, `body` and
//! `data`, in that order. Empty inputs are left out entirely. `data` is
//! spliced in byte-for-byte; it is never parsed or re-encoded.

use serde_json::Value;

/// A notification, ready to be serialized once and sent to every subscriber.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Notification {
    pub title: Option<String>,
    pub body: Option<String>,
    /// Opaque, caller-supplied JSON text.
    pub data: Option<String>,
}

impl Notification {
    /// Serialize to the wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len_hint());
        out.push(b'{');

        let mut first = true;
        let mut field = |out: &mut Vec<u8>, name: &str, raw: &[u8]| {
            if !first {
                out.push(b',');
            }
            first = false;
            out.push(b'"');
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b"\":");
            out.extend_from_slice(raw);
        };

        if let Some(title) = &self.title {
            field(&mut out, "title", json_string(title).as_bytes());
        }
        if let Some(body) = &self.body {
            field(&mut out, "body", json_string(body).as_bytes());
        }
        if let Some(data) = &self.data {
            field(&mut out, "data", data.as_bytes());
        }

        out.push(b'}');
        out
    }

    fn encoded_len_hint(&self) -> usize {
        let len = |s: &Option<String>| s.as_ref().map_or(0, |s| s.len() + 12);
        2 + len(&self.title) + len(&self.body) + len(&self.data)
    }
}

/// Builds a [`Notification`] from command-line style inputs.
#[derive(Clone, Debug, Default)]
pub struct NotificationBuilder {
    title: String,
    body_words: Vec<String>,
    data: String,
}

impl NotificationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Words joined by single spaces to form the body.
    pub fn body_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.body_words = words.into_iter().map(Into::into).collect();
        self
    }

    pub fn data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }

    pub fn build(self) -> Notification {
        let body = self.body_words.join(" ");

        if !self.data.is_empty()
            && serde_json::from_str::<serde::de::IgnoredAny>(&self.data).is_err()
        {
            tracing::warn!("notification data is not valid JSON; sending it verbatim");
        }

        Notification {
            title: non_empty(self.title),
            body: non_empty(body),
            data: non_empty(self.data),
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn json_string(s: &str) -> String {
    Value::String(s.to_owned()).to_string()
}
