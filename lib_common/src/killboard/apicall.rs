//! # Killboard API Client
//!
//! A dedicated client for the Albion Online game-info events endpoint. One call
//! to [`ApiCallKillboard::fetch_batch`] performs a single bounded `GET` for the
//! most recent page of kills (fixed page size, zero offset) and translates
//! every record into a [`KillEvent`], in the order upstream returned them.
//!
//! All failures are reported as [`UpstreamError`]. They are expected under
//! network flakiness and are meant to be logged and skipped by the caller.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::killboard::model::KillEvent;
use crate::retrieve::ky_http::{ApiClient, ClientOptions};

/// Production base URL of the game-info API.
pub const DEFAULT_BASE_URL: &str = "https://gameinfo.albiononline.com/api/gameinfo/";
/// Records requested per poll.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Why a batch could not be fetched.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The configured base URL is unusable.
    #[error("invalid upstream configuration: {0}")]
    InvalidUrl(String),

    /// Connect, TLS, timeout or body decode failure.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// Upstream answered with a non-2xx status.
    #[error("upstream returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, if it could be read.
        body: Option<String>,
    },

    /// The body was JSON but not an array of records.
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

/// Settings for [`ApiCallKillboard`].
#[derive(Debug, Clone)]
pub struct KillboardOptions {
    /// Base URL the events path is joined to. Must end with `/`.
    pub base_url: String,
    /// Number of records requested per page.
    pub page_size: u32,
    /// Hard timeout for one request.
    pub timeout: Duration,
    /// Transient-failure retries within one fetch.
    pub max_retries: u32,
}

impl Default for KillboardOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            timeout: Duration::from_secs(10),
            max_retries: 0,
        }
    }
}

/// # Killboard API Call Client
///
/// Wraps a pre-configured [`ApiClient`] pointed at the game-info API.
pub struct ApiCallKillboard {
    client: ApiClient,
    path: String,
}

impl ApiCallKillboard {
    /// Builds the client. Fails only on an invalid base URL.
    pub fn new(options: KillboardOptions) -> Result<Self, UpstreamError> {
        let client_options = ClientOptions {
            timeout: options.timeout,
            max_retries: options.max_retries,
            ..ClientOptions::default()
        };
        let client = ApiClient::new(&options.base_url, None, client_options)
            .map_err(|e| UpstreamError::InvalidUrl(format!("{:#}", e)))?;

        Ok(Self {
            client,
            path: format!("events?limit={}&offset=0", options.page_size),
        })
    }

    /// Fetches the most recent page of kills, newest first as upstream orders them.
    pub async fn fetch_batch(&self) -> Result<Vec<KillEvent>, UpstreamError> {
        let response = self
            .client
            .request::<Value, ()>(Method::GET, &self.path, None, None)
            .await
            .map_err(|e| UpstreamError::Transport(format!("{:#}", e)))?;

        if !response.success {
            return Err(UpstreamError::Status {
                status: response.status,
                body: response.error_body,
            });
        }

        let records = match response.data {
            Some(Value::Array(records)) => records,
            Some(other) => {
                return Err(UpstreamError::Malformed(format!(
                    "expected a JSON array, got {}",
                    json_kind(&other)
                )))
            }
            None => return Err(UpstreamError::Malformed("empty body".to_string())),
        };

        debug!(records = records.len(), "Fetched killboard page");
        Ok(records.iter().map(KillEvent::from_record).collect())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::killboard::model::EventId;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn serve_once(status_line: &'static str, body: String) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 2048];
            let n = stream.read(&mut buf).unwrap();
            let response = format!(
                "{}\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (format!("http://127.0.0.1:{}/api/gameinfo/", port), handle)
    }

    fn client_for(base_url: String) -> ApiCallKillboard {
        ApiCallKillboard::new(KillboardOptions {
            base_url,
            timeout: Duration::from_secs(2),
            ..KillboardOptions::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_batch_preserves_upstream_order() {
        let body = serde_json::json!([
            { "EventId": 3, "TotalVictimKillFame": 900, "Killer": { "Name": "C" }, "Victim": { "Name": "Z" } },
            { "EventId": 2, "TotalVictimKillFame": 500, "Killer": { "Name": "B", "GuildName": "G" }, "Victim": { "Name": "Y" } },
            { "EventId": 1 }
        ])
        .to_string();
        let (base, handle) = serve_once("HTTP/1.1 200 OK", body);

        let batch = client_for(base).fetch_batch().await.unwrap();
        let request = handle.join().unwrap();

        assert!(request.starts_with("GET /api/gameinfo/events?limit=20&offset=0 "));
        let ids: Vec<_> = batch.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec![EventId::new("3"), EventId::new("2"), EventId::new("1")]);
        assert_eq!(batch[1].killer_guild.as_deref(), Some("G"));
        assert_eq!(batch[2].killer, None);
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let (base, handle) = serve_once("HTTP/1.1 503 Service Unavailable", "{}".to_string());

        let err = client_for(base).fetch_batch().await.unwrap_err();
        handle.join().unwrap();

        assert!(matches!(err, UpstreamError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_object_body_is_malformed() {
        let (base, handle) = serve_once("HTTP/1.1 200 OK", r#"{"error":"busy"}"#.to_string());

        let err = client_for(base).fetch_batch().await.unwrap_err();
        handle.join().unwrap();

        assert!(matches!(err, UpstreamError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind then drop to obtain a port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();

        let err = client_for(format!("http://127.0.0.1:{}/", port))
            .fetch_batch()
            .await
            .unwrap_err();

        assert!(matches!(err, UpstreamError::Transport(_)));
    }

    #[tokio::test]
    async fn test_silent_upstream_times_out_as_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accepts and reads the request, then never answers.
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf);
            thread::sleep(Duration::from_secs(10));
        });

        let client = ApiCallKillboard::new(KillboardOptions {
            base_url: format!("http://127.0.0.1:{}/", port),
            timeout: Duration::from_millis(500),
            ..KillboardOptions::default()
        })
        .unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), client.fetch_batch())
            .await
            .expect("request timeout was not applied");

        assert!(matches!(outcome, Err(UpstreamError::Transport(_))));
    }

    #[test]
    fn test_invalid_base_url() {
        let result = ApiCallKillboard::new(KillboardOptions {
            base_url: "gameinfo".to_string(),
            ..KillboardOptions::default()
        });
        assert!(matches!(result, Err(UpstreamError::InvalidUrl(_))));
    }
}
