//! Request value type: an immutable description of one FastCGI request.
//!
//! Builder-style `with_*` methods return a modified copy, so a partially
//! built request can be shared across sessions without aliasing surprises.

use crate::content::Content;

/// HTTP methods accepted by responders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMethod {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl RequestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// Ambient server-parameter defaults seeded into every request.
///
/// An explicit struct rather than hidden constants, so callers and tests can
/// override every default.
#[derive(Debug, Clone)]
pub struct RequestDefaults {
    pub server_protocol: String,
    pub gateway_interface: String,
    /// CONTENT_TYPE sent when the request carries no body.
    pub fallback_content_type: String,
    /// Additional ambient server parameters (e.g. REMOTE_ADDR, SERVER_NAME)
    /// seeded into every request built from these defaults.
    pub extra_params: Vec<(String, String)>,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            server_protocol: "HTTP/1.1".into(),
            gateway_interface: "CGI/1.1".into(),
            fallback_content_type: "application/x-www-form-urlencoded".into(),
            extra_params: Vec::new(),
        }
    }
}

/// One FastCGI request: method, script path, optional body, server
/// parameters, and custom variables.
///
/// The effective parameter set sent on the wire is the custom variables
/// merged over the server parameters; custom variables win on collision.
/// Iteration order is deterministic (insertion order).
#[derive(Debug, Clone)]
pub struct Request {
    method: RequestMethod,
    script_path: String,
    content: Option<Content>,
    server_params: Vec<(String, String)>,
    custom_vars: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: RequestMethod, script_path: impl Into<String>) -> Self {
        Self::with_defaults(method, script_path, None, &RequestDefaults::default())
    }

    pub fn with_defaults(
        method: RequestMethod,
        script_path: impl Into<String>,
        content: Option<Content>,
        defaults: &RequestDefaults,
    ) -> Self {
        let script_path = script_path.into();
        let content_type = content
            .as_ref()
            .map(|c| c.content_type().to_string())
            .unwrap_or_else(|| defaults.fallback_content_type.clone());
        let content_length = content.as_ref().map_or(0, Content::len);

        let mut server_params = vec![
            ("REQUEST_METHOD".into(), method.as_str().into()),
            ("SCRIPT_FILENAME".into(), script_path.clone()),
            ("SERVER_PROTOCOL".into(), defaults.server_protocol.clone()),
            (
                "GATEWAY_INTERFACE".into(),
                defaults.gateway_interface.clone(),
            ),
            ("CONTENT_TYPE".into(), content_type),
            ("CONTENT_LENGTH".into(), content_length.to_string()),
        ];
        for (key, value) in &defaults.extra_params {
            upsert(&mut server_params, key.clone(), value.clone());
        }

        Self {
            method,
            script_path,
            content,
            server_params,
            custom_vars: Vec::new(),
        }
    }

    pub fn method(&self) -> RequestMethod {
        self.method
    }

    pub fn script_path(&self) -> &str {
        &self.script_path
    }

    pub fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    pub fn content_length(&self) -> usize {
        self.content.as_ref().map_or(0, Content::len)
    }

    /// Attach a body, refreshing CONTENT_TYPE and CONTENT_LENGTH.
    pub fn with_content(mut self, content: Content) -> Self {
        self = self
            .with_server_param("CONTENT_TYPE", content.content_type())
            .with_server_param("CONTENT_LENGTH", content.len().to_string());
        self.content = Some(content);
        self
    }

    /// Set a server parameter, replacing any existing value for the key.
    pub fn with_server_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        upsert(&mut self.server_params, key.into(), value.into());
        self
    }

    /// Set a custom FastCGI variable; wins over server parameters with the
    /// same name.
    pub fn with_custom_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        upsert(&mut self.custom_vars, key.into(), value.into());
        self
    }

    /// Set an HTTP-style header as a server parameter using CGI naming:
    /// `Content-Type` maps to `CONTENT_TYPE`, anything else gets the
    /// `HTTP_` prefix with `-` replaced by `_`.
    pub fn with_header(self, key: &str, value: impl Into<String>) -> Self {
        self.with_server_param(header_param_name(key), value)
    }

    /// The effective parameter set sent on the wire: server parameters in
    /// insertion order, overridden by custom variables, followed by custom
    /// variables with no server counterpart.
    pub fn params(&self) -> Vec<(&str, &str)> {
        let mut merged: Vec<(&str, &str)> = Vec::with_capacity(
            self.server_params.len() + self.custom_vars.len(),
        );
        for (key, value) in &self.server_params {
            let effective = self
                .custom_vars
                .iter()
                .find(|(ck, _)| ck == key)
                .map(|(_, cv)| cv.as_str())
                .unwrap_or(value.as_str());
            merged.push((key.as_str(), effective));
        }
        for (key, value) in &self.custom_vars {
            if !self.server_params.iter().any(|(sk, _)| sk == key) {
                merged.push((key.as_str(), value.as_str()));
            }
        }
        merged
    }
}

fn upsert(entries: &mut Vec<(String, String)>, key: String, value: String) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
}

/// CGI parameter name for an HTTP header.
fn header_param_name(key: &str) -> String {
    let upper: String = key
        .chars()
        .map(|c| match c {
            '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    match upper.as_str() {
        "CONTENT_TYPE" | "CONTENT_LENGTH" => upper,
        _ if upper.starts_with("HTTP_") => upper,
        _ => format!("HTTP_{upper}"),
    }
}
