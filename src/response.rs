//! Parsed FastCGI response: CGI-style headers, body, stderr, and timing.

use std::time::Duration;

use bytes::Bytes;

/// A parsed response. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Response {
    output: Bytes,
    stderr: Bytes,
    /// Headers in wire order, original case preserved.
    headers: Vec<(String, String)>,
    body: Bytes,
    duration: Duration,
    connect_duration: Duration,
    write_duration: Duration,
    attempts: u32,
}

impl Response {
    pub(crate) fn new(
        output: Bytes,
        stderr: Bytes,
        duration: Duration,
        connect_duration: Duration,
        write_duration: Duration,
    ) -> Self {
        let (headers, body) = parse_output(&output);
        Self {
            output,
            stderr,
            headers,
            body,
            duration,
            connect_duration,
            write_duration,
            attempts: 1,
        }
    }

    /// All headers in wire order, original case preserved. Repeated header
    /// names keep one entry per occurrence.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Values of one header, case-insensitive, in wire order.
    pub fn header(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// All values of one header joined with `", "`.
    pub fn header_line(&self, name: &str) -> String {
        self.header(name).join(", ")
    }

    /// Body bytes after the header/body boundary.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body decoded as UTF-8, lossily.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The full raw STDOUT stream (headers and body).
    pub fn output(&self) -> &Bytes {
        &self.output
    }

    /// Diagnostic STDERR output from the responder.
    pub fn stderr(&self) -> &Bytes {
        &self.stderr
    }

    /// Status code from the `Status` header; 200 when absent.
    pub fn status_code(&self) -> u16 {
        self.status_parts()
            .and_then(|(code, _)| code.parse().ok())
            .unwrap_or(200)
    }

    /// Status message from the `Status` header, if any.
    pub fn status_message(&self) -> Option<String> {
        self.status_parts()
            .and_then(|(_, message)| (!message.is_empty()).then(|| message.to_string()))
    }

    fn status_parts(&self) -> Option<(&str, &str)> {
        let values = self.header("Status");
        let status = values.first()?;
        let code = status.get(..3)?;
        let message = status.get(3..).unwrap_or("").trim_start();
        Some((code, message))
    }

    /// True when the responder wrote no stderr and the status is below 400.
    pub fn successful(&self) -> bool {
        self.stderr.is_empty() && self.status_code() < 400
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Total send-to-END_REQUEST duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn connect_duration(&self) -> Duration {
        self.connect_duration
    }

    pub fn write_duration(&self) -> Duration {
        self.write_duration
    }

    /// How many attempts produced this response. The engine never retries;
    /// an outer retry layer may stamp its count here.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// Split raw STDOUT into headers and body at the first blank line
/// (`\r\n\r\n` or `\n\n`). Without a boundary the whole output is body.
fn parse_output(output: &Bytes) -> (Vec<(String, String)>, Bytes) {
    let Some((pos, sep_len)) = find_header_boundary(output) else {
        return (Vec::new(), output.clone());
    };

    let mut headers = Vec::new();
    let section = String::from_utf8_lossy(&output[..pos]);
    for line in section.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        headers.push((key.trim().to_string(), value.trim().to_string()));
    }

    (headers, output.slice(pos + sep_len..))
}

fn find_header_boundary(data: &[u8]) -> Option<(usize, usize)> {
    for i in 0..data.len() {
        if data[i..].starts_with(b"\r\n\r\n") {
            return Some((i, 4));
        }
        if data[i..].starts_with(b"\n\n") {
            return Some((i, 2));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(output: &[u8]) -> Response {
        Response::new(
            Bytes::copy_from_slice(output),
            Bytes::new(),
            Duration::from_millis(5),
            Duration::ZERO,
            Duration::ZERO,
        )
    }

    #[test]
    fn splits_headers_and_body_on_crlf() {
        let resp = response(b"Content-Type: text/html\r\nX-Powered-By: PHP/8.3\r\n\r\nBody");
        assert_eq!(resp.header("content-type"), vec!["text/html"]);
        assert_eq!(resp.header("X-POWERED-BY"), vec!["PHP/8.3"]);
        assert_eq!(resp.body_text(), "Body");
        assert_eq!(resp.status_code(), 200);
        assert!(resp.successful());
    }

    #[test]
    fn splits_headers_and_body_on_bare_lf() {
        let resp = response(b"Content-Type: text/plain\n\nhello\nworld");
        assert_eq!(resp.header("Content-Type"), vec!["text/plain"]);
        assert_eq!(resp.body_text(), "hello\nworld");
    }

    #[test]
    fn status_header_sets_code_and_message() {
        let resp = response(b"Status: 201 Created\r\n\r\n");
        assert_eq!(resp.status_code(), 201);
        assert_eq!(resp.status_message().as_deref(), Some("Created"));
        assert!(resp.body().is_empty());
    }

    #[test]
    fn missing_status_defaults_to_200() {
        let resp = response(b"Content-Type: text/html\r\n\r\nok");
        assert_eq!(resp.status_code(), 200);
        assert_eq!(resp.status_message(), None);
    }

    #[test]
    fn repeated_headers_keep_wire_order() {
        let resp = response(
            b"Set-Cookie: a=1\r\nContent-Type: text/html\r\nSet-Cookie: b=2\r\n\r\n",
        );
        assert_eq!(resp.header("set-cookie"), vec!["a=1", "b=2"]);
        assert_eq!(resp.header_line("Set-Cookie"), "a=1, b=2");
    }

    #[test]
    fn output_without_boundary_is_all_body() {
        let resp = response(b"no headers here");
        assert!(resp.headers().is_empty());
        assert_eq!(resp.body_text(), "no headers here");
    }

    #[test]
    fn stderr_marks_response_unsuccessful() {
        let resp = Response::new(
            Bytes::from_static(b"Content-Type: text/html\r\n\r\nok"),
            Bytes::from_static(b"PHP Warning: something"),
            Duration::ZERO,
            Duration::ZERO,
            Duration::ZERO,
        );
        assert!(!resp.successful());
    }

    #[test]
    fn error_statuses_classify() {
        let client = response(b"Status: 404 Not Found\r\n\r\n");
        assert!(client.is_client_error());
        assert!(!client.is_server_error());
        assert!(!client.successful());

        let server = response(b"Status: 502 Bad Gateway\r\n\r\n");
        assert!(server.is_server_error());
        assert!(!server.successful());
    }

    #[test]
    fn attempts_default_and_stamp() {
        let resp = response(b"\r\n\r\n");
        assert_eq!(resp.attempts(), 1);
        assert_eq!(resp.with_attempts(3).attempts(), 3);
    }
}
