//! Voice service seam and its HTTP implementation.
//!
//! [`VoiceService::exchange`] performs one upload: it sends the PCM body with
//! its format metadata and hands back the status plus a streaming
//! [`ReplyBody`].  Retrying and persisting are the transmitter's job.
//!
//! [`HttpVoiceService`] POSTs to the configured endpoint with `reqwest`.  A
//! fresh connection is made for every exchange (`pool_max_idle_per_host(0)`),
//! so each attempt opens and closes its own socket.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ServiceConfig;
use crate::storage::StorageError;

// ---------------------------------------------------------------------------
// PcmFormat / PcmUpload
// ---------------------------------------------------------------------------

/// Declared format of an uploaded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits: u16,
}

impl PcmFormat {
    /// Signed 16-bit mono at `sample_rate`.
    pub fn mono16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits: 16,
        }
    }

    /// `Content-Type` value describing this format.
    ///
    /// ```
    /// use voice_relay::transmit::PcmFormat;
    ///
    /// assert_eq!(
    ///     PcmFormat::mono16(4000).content_type(),
    ///     "audio/raw; rate=4000; channels=1; bits=16"
    /// );
    /// ```
    pub fn content_type(&self) -> String {
        format!(
            "audio/raw; rate={}; channels={}; bits={}",
            self.sample_rate, self.channels, self.bits
        )
    }
}

/// One outbound request: little-endian PCM plus its declared format.
#[derive(Debug, Clone)]
pub struct PcmUpload {
    pub format: PcmFormat,
    pub body: Vec<u8>,
}

impl PcmUpload {
    /// Serialise `samples` as little-endian 16-bit PCM (`len × 2` bytes).
    pub fn new(samples: &[i16], format: PcmFormat) -> Self {
        Self {
            format,
            body: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// AttemptError
// ---------------------------------------------------------------------------

/// Why a single transfer attempt failed.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// The connection could not be established or the request did not
    /// complete.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The service answered with something other than 200 OK.
    #[error("service returned status {0}")]
    Status(u16),

    /// The reply could not be persisted locally.
    #[error("could not store reply: {0}")]
    Storage(#[from] StorageError),

    /// The reply body broke off while streaming.
    #[error("reply body interrupted: {0}")]
    Body(String),
}

// ---------------------------------------------------------------------------
// ReplyBody / ServiceReply
// ---------------------------------------------------------------------------

/// Streaming response body.
#[async_trait]
pub trait ReplyBody: Send {
    /// Next chunk of the body, or `None` at the end.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, AttemptError>;
}

/// Status line plus body of one exchange.
pub struct ServiceReply {
    pub status: u16,
    pub body: Box<dyn ReplyBody>,
}

impl ServiceReply {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

// ---------------------------------------------------------------------------
// VoiceService trait
// ---------------------------------------------------------------------------

/// Remote inference/response service.
#[async_trait]
pub trait VoiceService: Send + Sync {
    /// Upload `upload` and return the reply, or fail to connect.
    async fn exchange(&self, upload: &PcmUpload) -> Result<ServiceReply, AttemptError>;
}

// ---------------------------------------------------------------------------
// HttpVoiceService
// ---------------------------------------------------------------------------

/// POSTs raw PCM to an HTTP endpoint.
pub struct HttpVoiceService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpVoiceService {
    /// Build the client from service config.
    ///
    /// Idle connections are never pooled.  A default client is used as a
    /// last-resort fallback if the builder fails.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(0)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: config.endpoint.clone(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

struct HttpReplyBody(reqwest::Response);

#[async_trait]
impl ReplyBody for HttpReplyBody {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, AttemptError> {
        self.0
            .chunk()
            .await
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .map_err(|e| AttemptError::Body(e.to_string()))
    }
}

#[async_trait]
impl VoiceService for HttpVoiceService {
    async fn exchange(&self, upload: &PcmUpload) -> Result<ServiceReply, AttemptError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, upload.format.content_type())
            .body(upload.body.clone())
            .send()
            .await
            .map_err(|e| AttemptError::Connect(e.to_string()))?;

        Ok(ServiceReply {
            status: response.status().as_u16(),
            body: Box::new(HttpReplyBody(response)),
        })
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Reply body served from pre-split chunks, optionally failing at the end.
#[cfg(test)]
pub struct ChunkedBody {
    pub chunks: std::collections::VecDeque<Vec<u8>>,
    pub fail_at_end: bool,
}

#[cfg(test)]
#[async_trait]
impl ReplyBody for ChunkedBody {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, AttemptError> {
        match self.chunks.pop_front() {
            Some(chunk) => Ok(Some(chunk)),
            None if self.fail_at_end => Err(AttemptError::Body("connection reset".into())),
            None => Ok(None),
        }
    }
}

/// Scripted outcome of one exchange.
#[cfg(test)]
#[derive(Debug, Clone)]
pub enum Scripted {
    Refused,
    Status(u16),
    Reply(Vec<u8>),
    Truncated(Vec<u8>),
}

/// Voice service that replays a script, then repeats the last entry.
#[cfg(test)]
pub struct ScriptedService {
    script: std::sync::Mutex<std::collections::VecDeque<Scripted>>,
    last: std::sync::Mutex<Option<Scripted>>,
    pub uploads: std::sync::Arc<std::sync::Mutex<Vec<PcmUpload>>>,
}

#[cfg(test)]
impl ScriptedService {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: std::sync::Mutex::new(script.into_iter().collect()),
            last: std::sync::Mutex::new(None),
            uploads: std::sync::Arc::default(),
        }
    }

    pub fn attempts(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl VoiceService for ScriptedService {
    async fn exchange(&self, upload: &PcmUpload) -> Result<ServiceReply, AttemptError> {
        self.uploads.lock().unwrap().push(upload.clone());

        let next = {
            let mut last = self.last.lock().unwrap();
            match self.script.lock().unwrap().pop_front() {
                Some(step) => {
                    *last = Some(step.clone());
                    step
                }
                None => last.clone().unwrap_or(Scripted::Refused),
            }
        };

        let body = |bytes: Vec<u8>, fail_at_end: bool| -> Box<dyn ReplyBody> {
            Box::new(ChunkedBody {
                chunks: bytes.chunks(16).map(<[u8]>::to_vec).collect(),
                fail_at_end,
            })
        };

        match next {
            Scripted::Refused => Err(AttemptError::Connect("connection refused".into())),
            Scripted::Status(status) => Ok(ServiceReply {
                status,
                body: body(Vec::new(), false),
            }),
            Scripted::Reply(bytes) => Ok(ServiceReply {
                status: 200,
                body: body(bytes, false),
            }),
            Scripted::Truncated(bytes) => Ok(ServiceReply {
                status: 200,
                body: body(bytes, true),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn upload_body_is_little_endian_pcm() {
        let upload = PcmUpload::new(&[0x0102, -1], PcmFormat::mono16(4000));
        assert_eq!(upload.body, vec![0x02, 0x01, 0xFF, 0xFF]);
    }

    #[test]
    fn upload_of_4000_samples_is_8000_bytes() {
        let upload = PcmUpload::new(&[0; 4000], PcmFormat::mono16(4000));
        assert_eq!(upload.body.len(), 8000);
    }

    #[test]
    fn content_type_follows_declared_rate() {
        assert_eq!(
            PcmFormat::mono16(8000).content_type(),
            "audio/raw; rate=8000; channels=1; bits=16"
        );
    }

    #[test]
    fn http_service_is_object_safe() {
        let service: Box<dyn VoiceService> =
            Box::new(HttpVoiceService::from_config(&ServiceConfig::default()));
        drop(service);
    }

    /// Read one HTTP request (headers + Content-Length body) from `socket`.
    async fn read_request(socket: &mut tokio::net::TcpStream) -> (String, Vec<u8>) {
        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];
        let header_end = loop {
            let n = socket.read(&mut buf).await.expect("read");
            assert!(n > 0, "client closed before headers");
            raw.extend_from_slice(&buf[..n]);
            if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
        let length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);

        let mut body = raw[header_end..].to_vec();
        while body.len() < length {
            let n = socket.read(&mut buf).await.expect("read body");
            assert!(n > 0, "client closed before body");
            body.extend_from_slice(&buf[..n]);
        }
        (head, body)
    }

    #[tokio::test]
    async fn http_exchange_posts_pcm_and_streams_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let (head, body) = read_request(&mut socket).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello")
                .await
                .expect("respond");
            (head, body)
        });

        let config = ServiceConfig {
            endpoint: format!("http://{addr}/voice"),
            ..ServiceConfig::default()
        };
        let service = HttpVoiceService::from_config(&config);
        let upload = PcmUpload::new(&[1, 2, 3], PcmFormat::mono16(4000));

        let mut reply = service.exchange(&upload).await.expect("exchange");
        assert!(reply.is_ok());

        let mut received = Vec::new();
        while let Some(chunk) = reply.body.next_chunk().await.expect("chunk") {
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, b"hello");

        let (head, body) = server.await.expect("server task");
        assert!(head.starts_with("POST /voice HTTP/1.1"));
        assert!(head
            .to_ascii_lowercase()
            .contains("content-type: audio/raw; rate=4000; channels=1; bits=16"));
        assert_eq!(body, vec![1, 0, 2, 0, 3, 0]);
    }

    #[tokio::test]
    async fn http_exchange_reports_non_200_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let _ = read_request(&mut socket).await;
            let _ = socket
                .write_all(b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        });

        let config = ServiceConfig {
            endpoint: format!("http://{addr}/voice"),
            ..ServiceConfig::default()
        };
        let reply = HttpVoiceService::from_config(&config)
            .exchange(&PcmUpload::new(&[0; 4], PcmFormat::mono16(4000)))
            .await
            .expect("exchange");

        assert_eq!(reply.status, 500);
        assert!(!reply.is_ok());
    }

    #[tokio::test]
    async fn http_exchange_to_closed_port_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let config = ServiceConfig {
            endpoint: format!("http://{addr}/voice"),
            ..ServiceConfig::default()
        };
        let result = HttpVoiceService::from_config(&config)
            .exchange(&PcmUpload::new(&[0; 4], PcmFormat::mono16(4000)))
            .await;

        assert!(matches!(result, Err(AttemptError::Connect(_))));
    }
}
