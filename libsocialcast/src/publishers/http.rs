//! HTTP plumbing shared by the platform publishers
//!
//! Classification lives here as plain functions over status codes and
//! bodies so every platform maps failures the same way.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

use crate::error::{ConfigError, PlatformError, Result};

/// Graph API error codes that mean "throttled" even on a 400/403
const GRAPH_RATE_LIMIT_CODES: &[i64] = &[4, 17, 32, 613];

const SNIPPET_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    api_base: String,
}

/// Decoded 2xx response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub raw: String,
}

impl HttpClient {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("socialcast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "platforms.*.api_base".to_string(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path))
    }

    /// Send a request and classify the outcome.
    ///
    /// Once the platform answered 2xx the post may exist, so an unreadable
    /// body is reported as permanent: retrying could publish twice.
    pub async fn send(&self, request: RequestBuilder) -> std::result::Result<ApiResponse, PlatformError> {
        let response = request.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status();
        let headers = response.headers().clone();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &headers, &body));
        }

        let raw = response.text().await.map_err(|e| {
            PlatformError::Permanent(format!(
                "Platform accepted the request but the response could not be read: {}",
                e
            ))
        })?;

        let body = if raw.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&raw).map_err(|e| {
                PlatformError::Permanent(format!(
                    "Platform accepted the request but returned an unexpected body: {}",
                    e
                ))
            })?
        };

        Ok(ApiResponse {
            status,
            headers,
            body,
            raw,
        })
    }
}

/// Map a non-2xx answer to a failure class
pub fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> PlatformError {
    let detail = format!("HTTP {}: {}", status.as_u16(), snippet(body));

    if status == StatusCode::TOO_MANY_REQUESTS || is_graph_rate_limit(body) {
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return PlatformError::RateLimited {
            message: detail,
            retry_after,
        };
    }

    if status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
        return PlatformError::Transient(detail);
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return PlatformError::Permanent(format!("Authorization rejected ({})", detail));
    }

    PlatformError::Permanent(detail)
}

/// Map a request that never got a status line
pub fn classify_transport(error: &reqwest::Error) -> PlatformError {
    if error.is_builder() {
        return PlatformError::Permanent(format!("Invalid request: {}", error));
    }
    if error.is_timeout() {
        return PlatformError::Transient(format!("Request timed out: {}", error));
    }
    PlatformError::Transient(format!("Network error: {}", error))
}

/// `Retry-After` as delta seconds or an HTTP date
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let wait = at.timestamp() - chrono::Utc::now().timestamp();
    Some(Duration::from_secs(wait.max(0) as u64))
}

fn is_graph_rate_limit(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/code").and_then(Value::as_i64))
        .map(|code| GRAPH_RATE_LIMIT_CODES.contains(&code))
        .unwrap_or(false)
}

/// String or numeric id at a JSON pointer
pub fn id_at(body: &Value, pointer: &str) -> Option<String> {
    match body.pointer(pointer)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= SNIPPET_LEN {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(SNIPPET_LEN).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Minimal HTTP/1.1 responder for publisher tests

    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    pub struct CannedResponse {
        pub status: u16,
        pub headers: Vec<(&'static str, String)>,
        pub body: String,
    }

    impl CannedResponse {
        pub fn json(status: u16, body: &str) -> Self {
            Self {
                status,
                headers: Vec::new(),
                body: body.to_string(),
            }
        }

        pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
            self.headers.push((name, value.to_string()));
            self
        }
    }

    pub struct Stub {
        pub base: String,
        pub requests: Arc<Mutex<Vec<String>>>,
    }

    impl Stub {
        pub fn request(&self, index: usize) -> String {
            self.requests.lock().unwrap()[index].clone()
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    /// Answer one connection per canned response, in order
    pub async fn serve(responses: Vec<CannedResponse>) -> Stub {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            for canned in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let request = read_request(&mut socket).await;
                seen.lock().unwrap().push(request);

                let mut response = format!(
                    "HTTP/1.1 {} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n",
                    canned.status,
                    canned.body.len()
                );
                for (name, value) in &canned.headers {
                    response.push_str(&format!("{}: {}\r\n", name, value));
                }
                response.push_str("\r\n");
                response.push_str(&canned.body);

                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Stub {
            base: format!("http://{}", addr),
            requests,
        }
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }

        String::from_utf8_lossy(&buf).to_string()
    }
}
