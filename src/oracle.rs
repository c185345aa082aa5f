//! Rate-limited HTTP client for the remote combination oracle.
//!
//! All requests are serialized behind a single async mutex holding the
//! timestamp of the last dispatched request, so `REQUEST_COOLDOWN` is
//! enforced globally even when several logical callers hold the client
//! concurrently (batch mode fans work out within a batch, never across it).

use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::util::oracle_uriencode;

pub const WORD_COMBINE_CHAR_LIMIT: usize = 30;
const DEFAULT_REQUEST_ADDR: &str = "https://neal.fun/api/infinite-craft/pair";
const DEFAULT_ERROR_LOG: &str = "500s.txt";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleResult {
    pub result: String,
    #[serde(default)]
    pub emoji: String,
    #[serde(rename = "isNew", default)]
    pub is_new: bool,
}

impl OracleResult {
    fn nothing() -> Self {
        OracleResult {
            result: "Nothing".to_string(),
            emoji: String::new(),
            is_new: false,
        }
    }
}

/// A source of combination answers. `OracleClient` is the real HTTP-backed
/// implementation; tests substitute a scripted double (see
/// [`test_support::ScriptedOracle`]) so searches can be driven deterministically
/// without a network.
///
/// Manually boxed rather than `#[async_trait]`, matching `iddfs.rs`'s own
/// `Pin<Box<dyn Future>>` idiom for a trait that must stay object-safe.
pub trait OracleBackend: Send + Sync {
    fn request_single<'a>(&'a self, a: &'a str, b: &'a str) -> Pin<Box<dyn Future<Output = OracleResult> + Send + 'a>>;

    fn request_batch<'a>(&'a self, pairs: &'a [(String, String)]) -> Pin<Box<dyn Future<Output = Vec<OracleResult>> + Send + 'a>>;
}

pub struct OracleClient {
    client: reqwest::Client,
    request_addr: String,
    request_cooldown: Duration,
    sleep_default: Duration,
    retry_exponent: f64,
    last_request: Mutex<Instant>,
    current_backoff: Mutex<Duration>,
    headers: Option<HeaderMap>,
    error_log_path: PathBuf,
}

impl OracleClient {
    pub fn new(request_addr: Option<String>) -> Self {
        OracleClient {
            client: reqwest::Client::new(),
            request_addr: request_addr.unwrap_or_else(|| DEFAULT_REQUEST_ADDR.to_string()),
            request_cooldown: Duration::from_millis(500),
            sleep_default: Duration::from_secs(1),
            retry_exponent: 2.0,
            last_request: Mutex::new(Instant::now() - Duration::from_secs(3600)),
            current_backoff: Mutex::new(Duration::from_secs(1)),
            headers: None,
            error_log_path: PathBuf::from(DEFAULT_ERROR_LOG),
        }
    }

    /// Attaches custom request headers, loaded from `config.json`'s `"api"`
    /// key. Unparseable header names/values are skipped rather than failing
    /// construction.
    pub fn with_headers(mut self, headers: &HashMap<String, String>) -> Self {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(k.as_bytes()), HeaderValue::from_str(v)) {
                map.insert(name, value);
            }
        }
        self.headers = if map.is_empty() { None } else { Some(map) };
        self
    }

    /// Points the 500-sidecar log at a specific path (by default
    /// `./500s.txt`, relative to the process's working directory).
    pub fn with_error_log(mut self, path: impl AsRef<Path>) -> Self {
        self.error_log_path = path.as_ref().to_path_buf();
        self
    }

    fn char_limit_exceeded(a: &str, b: &str) -> bool {
        a.chars().count() > WORD_COMBINE_CHAR_LIMIT || b.chars().count() > WORD_COMBINE_CHAR_LIMIT
    }

    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        let elapsed = last.elapsed();
        if elapsed < self.request_cooldown {
            sleep(self.request_cooldown - elapsed).await;
        }
        *last = Instant::now();
    }

    /// Appends the pairs blamed for a 500 to the error sidecar file, one
    /// `a<TAB>b` line each. Best-effort: a failure to write here never fails
    /// the request itself, it only loses the audit trail for this batch.
    fn record_500(&self, blamed: &[(String, String)]) {
        let mut line = String::new();
        for (a, b) in blamed {
            line.push_str(a);
            line.push('\t');
            line.push_str(b);
            line.push('\n');
        }
        match std::fs::OpenOptions::new().create(true).append(true).open(&self.error_log_path) {
            Ok(mut f) => {
                if let Err(e) = f.write_all(line.as_bytes()) {
                    warn!(error = %e, path = %self.error_log_path.display(), "failed to append to 500s log");
                }
            }
            Err(e) => warn!(error = %e, path = %self.error_log_path.display(), "failed to open 500s log"),
        }
    }

    /// Requests a single pair. Oversized ingredients short-circuit to
    /// `"Nothing"` without a network call; transient failures retry forever
    /// with exponential backoff; an HTTP 500 on this specific pair is
    /// treated as `"Nothing"`, logged, and recorded to the 500s sidecar
    /// rather than retried.
    pub async fn request_single(&self, a: &str, b: &str) -> OracleResult {
        if Self::char_limit_exceeded(a, b) {
            return OracleResult::nothing();
        }
        let batch = self.request_batch(&[(a.to_string(), b.to_string())]).await;
        batch.into_iter().next().unwrap_or_else(OracleResult::nothing)
    }

    /// Requests up to a caller-chosen number of pairs in a single HTTP call.
    /// The caller (the handler) is responsible for chunking to `BATCH_SIZE`.
    pub async fn request_batch(&self, pairs: &[(String, String)]) -> Vec<OracleResult> {
        if pairs.is_empty() {
            return Vec::new();
        }

        let mut results = vec![None; pairs.len()];
        let mut indices_to_send = Vec::new();
        for (i, (a, b)) in pairs.iter().enumerate() {
            if Self::char_limit_exceeded(a, b) {
                results[i] = Some(OracleResult::nothing());
            } else {
                indices_to_send.push(i);
            }
        }
        if indices_to_send.is_empty() {
            return results.into_iter().map(|r| r.unwrap()).collect();
        }

        let body: Vec<[String; 2]> = indices_to_send
            .iter()
            .map(|&i| {
                [
                    oracle_uriencode(&pairs[i].0),
                    oracle_uriencode(&pairs[i].1),
                ]
            })
            .collect();

        loop {
            self.throttle().await;
            let mut req = self.client.post(&self.request_addr).json(&body);
            if let Some(headers) = &self.headers {
                req = req.headers(headers.clone());
            }
            let resp = req.send().await;
            match resp {
                Ok(r) if r.status().as_u16() == 500 => {
                    let blamed: Vec<(String, String)> = indices_to_send.iter().map(|&i| (pairs[i].0.clone(), pairs[i].1.clone())).collect();
                    error!(pairs = ?blamed, "oracle returned 500, coercing to Nothing");
                    self.record_500(&blamed);
                    for &i in &indices_to_send {
                        results[i] = Some(OracleResult::nothing());
                    }
                    break;
                }
                Ok(r) if r.status().is_success() => match r.json::<Vec<OracleResult>>().await {
                    Ok(values) if values.len() == indices_to_send.len() => {
                        *self.current_backoff.lock().await = self.sleep_default;
                        for (&i, v) in indices_to_send.iter().zip(values.into_iter()) {
                            results[i] = Some(v);
                        }
                        break;
                    }
                    _ => {
                        self.backoff_and_wait().await;
                    }
                },
                Ok(r) => {
                    warn!(status = %r.status(), "oracle request failed, backing off");
                    self.backoff_and_wait().await;
                }
                Err(e) => {
                    warn!(error = %e, "oracle request errored, backing off");
                    self.backoff_and_wait().await;
                }
            }
        }

        results.into_iter().map(|r| r.unwrap()).collect()
    }

    async fn backoff_and_wait(&self) {
        let mut backoff = self.current_backoff.lock().await;
        sleep(*backoff).await;
        *backoff = backoff.mul_f64(self.retry_exponent);
    }
}

impl OracleBackend for OracleClient {
    fn request_single<'a>(&'a self, a: &'a str, b: &'a str) -> Pin<Box<dyn Future<Output = OracleResult> + Send + 'a>> {
        Box::pin(self.request_single(a, b))
    }

    fn request_batch<'a>(&'a self, pairs: &'a [(String, String)]) -> Pin<Box<dyn Future<Output = Vec<OracleResult>> + Send + 'a>> {
        Box::pin(self.request_batch(pairs))
    }
}

/// Test-only scripted oracle double, used so IDDFS/handler tests can drive
/// a multi-answer script (including repeated "Nothing") without a network.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    pub struct ScriptedOracle {
        responses: StdMutex<VecDeque<OracleResult>>,
    }

    impl ScriptedOracle {
        pub fn new(responses: Vec<OracleResult>) -> Self {
            ScriptedOracle {
                responses: StdMutex::new(responses.into_iter().collect()),
            }
        }

        pub fn ok(result: &str) -> OracleResult {
            OracleResult {
                result: result.to_string(),
                emoji: String::new(),
                is_new: true,
            }
        }

        pub fn nothing() -> OracleResult {
            OracleResult::nothing()
        }

        fn next(&self) -> OracleResult {
            self.responses.lock().unwrap().pop_front().unwrap_or_else(OracleResult::nothing)
        }
    }

    impl OracleBackend for ScriptedOracle {
        fn request_single<'a>(&'a self, _a: &'a str, _b: &'a str) -> Pin<Box<dyn Future<Output = OracleResult> + Send + 'a>> {
            let next = self.next();
            Box::pin(async move { next })
        }

        fn request_batch<'a>(&'a self, pairs: &'a [(String, String)]) -> Pin<Box<dyn Future<Output = Vec<OracleResult>> + Send + 'a>> {
            let out: Vec<OracleResult> = pairs.iter().map(|_| self.next()).collect();
            Box::pin(async move { out })
        }
    }
}
