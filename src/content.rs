//! Request bodies with a declared content type.

use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Serialize;

use crate::error::{FcgiError, Result};

/// A request body plus the `CONTENT_TYPE` it declares.
#[derive(Debug, Clone)]
pub struct Content {
    content_type: String,
    body: Bytes,
}

impl Content {
    /// Raw bytes with an explicit content type.
    pub fn raw(body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// Plain-text body (`text/plain`).
    pub fn text(body: impl Into<String>) -> Self {
        Self::raw(Bytes::from(body.into()), "text/plain")
    }

    /// JSON-serialize a value (`application/json`).
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|e| FcgiError::InvalidArgument(format!("could not encode JSON body: {e}")))?;
        Ok(Self::raw(Bytes::from(body), "application/json"))
    }

    /// Form-encode key/value pairs (`application/x-www-form-urlencoded`).
    pub fn form<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut encoded = String::new();
        for (key, value) in pairs {
            if !encoded.is_empty() {
                encoded.push('&');
            }
            encoded.extend(utf8_percent_encode(key, NON_ALPHANUMERIC));
            encoded.push('=');
            encoded.extend(utf8_percent_encode(value, NON_ALPHANUMERIC));
        }
        Self::raw(Bytes::from(encoded), "application/x-www-form-urlencoded")
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_content() {
        #[derive(Serialize)]
        struct Payload {
            name: &'static str,
            count: u32,
        }
        let content = Content::json(&Payload {
            name: "widget",
            count: 3,
        })
        .expect("encode");
        assert_eq!(content.content_type(), "application/json");
        assert_eq!(content.body().as_ref(), br#"{"name":"widget","count":3}"#);
    }

    #[test]
    fn form_content_escapes_reserved_characters() {
        let content = Content::form([("key", "a value"), ("other", "x&y=z")]);
        assert_eq!(
            content.content_type(),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(content.body().as_ref(), b"key=a%20value&other=x%26y%3Dz");
    }

    #[test]
    fn text_content_defaults_to_text_plain() {
        let content = Content::text("hello");
        assert_eq!(content.content_type(), "text/plain");
        assert_eq!(content.len(), 5);
    }
}
