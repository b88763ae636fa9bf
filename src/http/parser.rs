use crate::http::request::{Headers, Method, Request};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    InvalidRequest,
    InvalidMethod,
    InvalidHeader,
    InvalidContentLength,
    /// The head, or head plus declared body, is larger than the caller allows.
    TooLarge,
    Incomplete,
}

/// Incremental search for the blank line that ends a request head.
///
/// Each call only looks at bytes that arrived since the previous one (plus
/// three bytes of overlap for a terminator split across reads), so feeding a
/// growing buffer costs linear time overall. The buffer may only grow between
/// calls.
#[derive(Debug, Default)]
pub struct HeadScanner {
    scanned: usize,
    end: Option<usize>,
}

impl HeadScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the offset of the `\r\n\r\n` terminator in `buf`, if present.
    pub fn scan(&mut self, buf: &[u8]) -> Option<usize> {
        if self.end.is_none() {
            let from = self.scanned.saturating_sub(3);
            self.end = buf
                .get(from..)
                .and_then(find_headers_end)
                .map(|pos| pos + from);
            self.scanned = buf.len();
        }
        self.end
    }

    /// Bytes searched so far.
    pub fn scanned(&self) -> usize {
        self.scanned
    }
}

/// Parses one request from the front of `buf`.
///
/// Returns the request and the number of bytes it occupied. `Incomplete`
/// means more input is needed; `TooLarge` means the request can never fit in
/// `max_len` bytes no matter how much more arrives.
pub fn parse_http_request(buf: &[u8], max_len: usize) -> Result<(Request, usize), ParseError> {
    parse_with_scanner(&mut HeadScanner::new(), buf, max_len)
}

/// [`parse_http_request`] for a buffer that is filled across several reads.
///
/// `scanner` remembers how far the head terminator search got, so repeated
/// calls on the same growing buffer do not search it from the start again.
pub fn parse_with_scanner(
    scanner: &mut HeadScanner,
    buf: &[u8],
    max_len: usize,
) -> Result<(Request, usize), ParseError> {
    let headers_end = match scanner.scan(buf) {
        Some(end) => end,
        None if buf.len() > max_len => return Err(ParseError::TooLarge),
        None => return Err(ParseError::Incomplete),
    };
    let header_bytes = &buf[..headers_end];
    let body_bytes = &buf[headers_end + 4..];

    let headers_str = std::str::from_utf8(header_bytes)
        .map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if parts.next().is_some() || !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidRequest);
    }

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;

    // Headers
    let mut headers = Headers::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .ok_or(ParseError::InvalidHeader)?;

        // No whitespace is allowed between the field name and the colon.
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(ParseError::InvalidHeader);
        }

        headers.append(key, value.trim());
    }

    // Body
    let content_length = match headers.get("Content-Length") {
        Some(value) => parse_content_length(value)?,
        None => 0,
    };

    let total_len = headers_end
        .checked_add(4 + content_length)
        .ok_or(ParseError::TooLarge)?;
    if total_len > max_len {
        return Err(ParseError::TooLarge);
    }

    if body_bytes.len() < content_length {
        return Err(ParseError::Incomplete);
    }

    let body = body_bytes[..content_length].to_vec();

    let request = Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        body,
    };

    Ok((request, total_len))
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
}

/// `Content-Length = 1*DIGIT`; signs and inner spaces are rejected.
fn parse_content_length(value: &str) -> Result<usize, ParseError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidContentLength);
    }
    value.parse().map_err(|_| ParseError::InvalidContentLength)
}
