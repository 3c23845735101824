//! Minimal HTTP/1.1 request reading and response framing for the server.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ChatError;

const MAX_HEADERS: usize = 64;
const MAX_HEAD_BYTES: usize = 16 * 1024;
/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// Request target with any query string removed.
    pub path: String,
    pub body: Vec<u8>,
}

/// Read one request. Returns `Ok(None)` if the peer closed before sending
/// anything.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<Request>, ChatError>
where
    R: AsyncRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(ChatError::BadRequest("connection closed mid-request".into()));
        }
        buf.extend_from_slice(&chunk[..n]);

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        let head_len = match req
            .parse(&buf)
            .map_err(|e| ChatError::BadRequest(e.to_string()))?
        {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => {
                if buf.len() > MAX_HEAD_BYTES {
                    return Err(ChatError::BadRequest("request head too large".into()));
                }
                continue;
            }
        };

        let method = req.method.unwrap_or("GET").to_string();
        let target = req.path.unwrap_or("/");
        let path = target.split_once('?').map_or(target, |(p, _)| p).to_string();
        let content_length = req
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case("content-length"))
            .map(|h| {
                std::str::from_utf8(h.value)
                    .ok()
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .ok_or_else(|| ChatError::BadRequest("invalid content-length".into()))
            })
            .transpose()?
            .unwrap_or(0);
        if content_length > MAX_BODY_BYTES {
            return Err(ChatError::BadRequest("request body too large".into()));
        }

        let mut body = buf[head_len..].to_vec();
        while body.len() < content_length {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                return Err(ChatError::BadRequest("connection closed mid-body".into()));
            }
            body.extend_from_slice(&chunk[..n]);
        }
        body.truncate(content_length);

        return Ok(Some(Request {
            method,
            path,
            body,
        }));
    }
}

/// Frame a complete response with `Connection: close`.
pub fn response(status: u16, reason: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

pub fn not_found() -> Vec<u8> {
    response(404, "Not Found", "text/plain; charset=utf-8", b"Not Found")
}

/// Headers that open an event stream.
pub const EVENT_STREAM_HEAD: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: keep-alive\r\nAccess-Control-Allow-Origin: *\r\n\r\n";

/// Content type by file extension.
pub fn content_type_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}
