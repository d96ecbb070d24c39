use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;

use crate::DownloadError;
use crate::transport::{FetchResponse, Transport};

/// Initialize tracing for tests with appropriate settings
#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Step {
    Body(Bytes),
    Status(StatusCode),
    /// Transport-level failure (connection reset, timeout, ...)
    Fail,
}

impl Step {
    pub fn body(bytes: impl Into<Bytes>) -> Self {
        Step::Body(bytes.into())
    }
}

#[derive(Default)]
struct Inner {
    fixed: HashMap<String, FetchResponse>,
    scripted: HashMap<String, VecDeque<Step>>,
    requests: HashMap<String, usize>,
}

/// In-memory [`Transport`]: scripted replies are consumed first, then the fixed
/// response for the URL, then 404.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: FetchResponse) {
        let mut inner = self.inner.lock().unwrap();
        inner.fixed.insert(url.to_string(), response);
    }

    pub fn script(&self, url: &str, steps: impl IntoIterator<Item = Step>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .scripted
            .entry(url.to_string())
            .or_default()
            .extend(steps);
    }

    pub fn request_count(&self, url: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.requests.get(url).copied().unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.requests.values().sum()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<FetchResponse, DownloadError> {
        let mut inner = self.inner.lock().unwrap();
        *inner.requests.entry(url.to_string()).or_default() += 1;

        if let Some(step) = inner.scripted.get_mut(url).and_then(|q| q.pop_front()) {
            return match step {
                Step::Body(body) => Ok(FetchResponse::ok(body)),
                Step::Status(status) => Ok(FetchResponse {
                    status,
                    body: Bytes::new(),
                }),
                Step::Fail => Err(DownloadError::Internal {
                    reason: format!("connection reset fetching {url}"),
                }),
            };
        }

        Ok(inner
            .fixed
            .get(url)
            .cloned()
            .unwrap_or_else(|| FetchResponse {
                status: StatusCode::NOT_FOUND,
                body: Bytes::new(),
            }))
    }
}
