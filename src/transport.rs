use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, trace, warn};

use crate::dialect::DialectDescriptor;
use crate::logger::mask_secrets;
use crate::types::Endpoint;
use crate::{Error, Result};

pub const UUID_HEADER: &str = "X-Daikin-uuid";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Randomised exponential backoff between read attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub multiplier: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            multiplier: Duration::from_millis(200),
            max_delay: Duration::from_millis(1200),
        }
    }
}

impl RetryPolicy {
    /// Uniform in `[0, min(max_delay, multiplier * 2^attempt)]`.
    fn delay(&self, attempt: usize) -> Duration {
        let exponent = (attempt as u32).min(16);
        let ceiling = self.multiplier.saturating_mul(2u32.pow(exponent)).min(self.max_delay);
        let millis = rand::thread_rng().gen_range(0..=ceiling.as_millis().max(1) as u64);
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    /// 404 means the device lacks the resource; callers treat it as no data.
    pub fn is_empty(&self) -> bool {
        self.status == 404 || self.body.trim().is_empty()
    }
}

fn check_status(status: u16, body: String) -> Result<Response> {
    match status {
        200 | 404 => Ok(Response { status, body }),
        403 => Err(Error::Authentication("adapter answered 403 Forbidden".to_string())),
        code => Err(Error::Status(code)),
    }
}

/// One device's HTTP channel: base URL, auth material and the per-device
/// request limit.
pub(crate) struct Transport {
    http: reqwest::Client,
    base_url: String,
    uuid: Option<String>,
    password: Option<String>,
    permits: Arc<Semaphore>,
    pause: Option<Duration>,
    retry: RetryPolicy,
}

impl Transport {
    pub fn new(
        endpoint: &Endpoint,
        descriptor: &DialectDescriptor,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(descriptor.relaxed_tls)
            .build()?;
        let base_url = format!(
            "{}://{}/{}",
            descriptor.scheme,
            endpoint.authority(descriptor.default_port),
            descriptor.path_prefix
        );
        Ok(Self {
            http,
            base_url,
            uuid: None,
            password: None,
            permits: Arc::new(Semaphore::new(descriptor.max_concurrent_requests.max(1))),
            pause: descriptor.request_pause,
            retry,
        })
    }

    /// Sent as `X-Daikin-uuid` on every request.
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Sent as the leading `pass` query parameter on every request.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str, query: &str) -> String {
        let mut params = Vec::new();
        if let Some(ref password) = self.password {
            params.push(format!("pass={}", urlencoding::encode(password)));
        }
        if !query.is_empty() {
            params.push(query.to_string());
        }
        if params.is_empty() {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}{path}?{}", self.base_url, params.join("&"))
        }
    }

    fn with_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.uuid {
            Some(ref uuid) => request.header(UUID_HEADER, uuid),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Protocol("request limiter closed".to_string()))?;
        let resp = self.with_headers(request).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        if let Some(pause) = self.pause {
            tokio::time::sleep(pause).await;
        }
        trace!(status, body = %body, "adapter response");
        check_status(status, body)
    }

    async fn retrying<F, Fut>(&self, what: &str, mut attempt_fn: F) -> Result<Response>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Response>>,
    {
        let mut attempt = 1;
        loop {
            match attempt_fn().await {
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(resource = what, attempt, error = %e, ?delay, "retrying request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Read, retried on transient failures.
    pub async fn get(&self, path: &str, query: &str) -> Result<Response> {
        let url = self.url(path, query);
        debug!(url = %mask_secrets(&url), "GET");
        self.retrying(path, || self.send(self.http.get(&url))).await
    }

    /// Command, sent exactly once.
    pub async fn command(&self, path: &str, query: &str) -> Result<Response> {
        let url = self.url(path, query);
        debug!(url = %mask_secrets(&url), "command");
        self.send(self.http.get(&url)).await
    }

    pub async fn post_json(&self, path: &str, body: &Value, retried: bool) -> Result<Response> {
        let url = self.url(path, "");
        debug!(url = %url, "POST");
        if retried {
            self.retrying(path, || self.send(self.http.post(&url).json(body))).await
        } else {
            self.send(self.http.post(&url).json(body)).await
        }
    }
}
