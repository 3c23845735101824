//! HTTP event-stream transport built on reqwest.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio_stream::{Stream, StreamExt};

use crate::error::ChatError;
use crate::sse::{SseDecoder, SseEvent};
use crate::subscriber::{EventConnection, EventTransport};

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>;

/// Opens SSE streams with `GET` + `Accept: text/event-stream`.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

impl HttpTransport {
    /// Only the connect phase is bounded; an open stream may stay idle
    /// indefinitely.
    pub fn new(connect_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl EventTransport for HttpTransport {
    type Connection = HttpConnection;

    async fn open(&mut self, endpoint: &str) -> Result<HttpConnection, ChatError> {
        let resp = self
            .client
            .get(endpoint)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ChatError::Connect {
                url: endpoint.to_string(),
                detail: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ChatError::Http {
                status: resp.status().as_u16(),
                url: endpoint.to_string(),
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.starts_with("text/event-stream") {
            return Err(ChatError::NotEventStream {
                url: endpoint.to_string(),
                content_type,
            });
        }

        let stream = resp.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec()));
        Ok(HttpConnection {
            stream: Box::pin(stream),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
        })
    }
}

/// An open SSE response body.
pub struct HttpConnection {
    stream: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
}

impl EventConnection for HttpConnection {
    async fn next_event(&mut self) -> Result<Option<SseEvent>, ChatError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            match self.stream.next().await {
                Some(Ok(chunk)) => self.pending.extend(self.decoder.feed(&chunk)),
                Some(Err(e)) => return Err(ChatError::Stream(e.to_string())),
                None => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn one_shot_server(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = tokio::io::AsyncReadExt::read(&mut stream, &mut buf).await;
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}/events")
    }

    #[tokio::test]
    async fn test_open_rejects_non_2xx() {
        let url = one_shot_server(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let err = HttpTransport::default().open(&url).await.err().unwrap();
        assert_eq!(err.as_label(), "http_status");
    }

    #[tokio::test]
    async fn test_open_rejects_wrong_content_type() {
        let url = one_shot_server(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 2\r\nConnection: close\r\n\r\nhi",
        )
        .await;
        let err = HttpTransport::default().open(&url).await.err().unwrap();
        assert_eq!(err.as_label(), "not_event_stream");
    }

    #[tokio::test]
    async fn test_open_reads_events_until_close() {
        let url = one_shot_server(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n:\n\ndata: one\n\ndata: two\n\n",
        )
        .await;
        let mut conn = HttpTransport::default().open(&url).await.unwrap();
        assert_eq!(conn.next_event().await.unwrap().unwrap().data, "one");
        assert_eq!(conn.next_event().await.unwrap().unwrap().data, "two");
        assert!(conn.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_unreachable_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = HttpTransport::default()
            .open(&format!("http://{addr}/events"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.as_label(), "connect");
    }
}
