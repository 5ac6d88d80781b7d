//! Finds the dialect an adapter speaks and hands back a ready session.
//!
//! Candidates are tried in a fixed order: the secure dialect when a key is
//! given, SkyFi when a password is given, otherwise a firmware 2.8 probe, a
//! basic probe and finally AirBase. A failing probe only means "not this
//! dialect"; the causes are collected for the final error.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dialect::{Dialect, DialectDescriptor};
use crate::logger::{MessageLogMode, MessageLogger};
use crate::session::{ChangeCallback, DeviceSession};
use crate::store::{ValueStore, DEFAULT_TTL_MINUTES};
use crate::transport::{RetryPolicy, Transport, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT};
use crate::tree;
use crate::types::{Credentials, Endpoint, FieldChange};
use crate::{Error, Result};

/// Name-to-address lookup supplied by the host application.
pub trait Discovery: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Endpoint>;
}

/// Terminal uuid registered with secure adapters when none is configured.
pub fn default_terminal_uuid() -> String {
    Uuid::new_v3(&Uuid::NAMESPACE_OID, env!("CARGO_PKG_NAME").as_bytes())
        .simple()
        .to_string()
}

enum Probe {
    Matched(DeviceSession),
    Rejected(String),
}

pub struct ResolverBuilder {
    credentials: Credentials,
    timeout: Duration,
    max_attempts: usize,
    cache_ttl: TimeDelta,
    callbacks: Vec<ChangeCallback>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
    discovery: Option<Box<dyn Discovery>>,
}

impl Default for ResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverBuilder {
    pub fn new() -> Self {
        Self {
            credentials: Credentials::default(),
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cache_ttl: TimeDelta::minutes(DEFAULT_TTL_MINUTES),
            callbacks: Vec::new(),
            log_mode: None,
            log_path: None,
            discovery: None,
        }
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.credentials.password = Some(password.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.credentials.key = Some(key.into());
        self
    }

    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.credentials.uuid = Some(uuid.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attempts per read, including the first one.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// How long an unread resource stays fresh.
    pub fn cache_ttl(mut self, ttl: TimeDelta) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn on_change(mut self, f: impl Fn(&FieldChange) + Send + Sync + 'static) -> Self {
        self.callbacks.push(Arc::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn discovery(mut self, discovery: impl Discovery + 'static) -> Self {
        self.discovery = Some(Box::new(discovery));
        self
    }

    pub fn build(self) -> Resolver {
        Resolver {
            credentials: self.credentials,
            timeout: self.timeout,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                ..RetryPolicy::default()
            },
            cache_ttl: self.cache_ttl,
            callbacks: self.callbacks,
            log: self.log_mode.zip(self.log_path),
            discovery: self.discovery,
        }
    }
}

pub struct Resolver {
    credentials: Credentials,
    timeout: Duration,
    retry: RetryPolicy,
    cache_ttl: TimeDelta,
    callbacks: Vec<ChangeCallback>,
    log: Option<(MessageLogMode, String)>,
    discovery: Option<Box<dyn Discovery>>,
}

impl Resolver {
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    /// IP literals and `host:port` are used as given; other names go
    /// through discovery and finally DNS.
    pub fn endpoint(&self, target: &str) -> Endpoint {
        if let Some(endpoint) = Endpoint::parse(target) {
            return endpoint;
        }
        if let Some(ref discovery) = self.discovery
            && let Some(endpoint) = discovery.lookup(target)
        {
            debug!(name = target, endpoint = %endpoint, "discovered device");
            return endpoint;
        }
        Endpoint::new(target, None)
    }

    fn transport(&self, descriptor: &DialectDescriptor, endpoint: &Endpoint) -> Result<Transport> {
        Transport::new(endpoint, descriptor, self.timeout, self.retry)
    }

    /// Builds an uninitialised session for `descriptor`.
    fn session(&self, descriptor: &'static DialectDescriptor, endpoint: &Endpoint) -> Result<DeviceSession> {
        self.session_with(descriptor, endpoint, self.transport(descriptor, endpoint)?)
    }

    fn session_with(
        &self,
        descriptor: &'static DialectDescriptor,
        endpoint: &Endpoint,
        transport: Transport,
    ) -> Result<DeviceSession> {
        let logger = match self.log {
            Some((mode, ref path)) => Some(MessageLogger::new(mode, path)?),
            None => None,
        };
        Ok(DeviceSession::new(
            descriptor,
            endpoint.clone(),
            transport,
            ValueStore::with_ttl(self.cache_ttl),
            self.callbacks.clone(),
            logger,
        ))
    }

    pub async fn resolve(&self, target: &str) -> Result<DeviceSession> {
        self.resolve_with(target, &self.credentials).await
    }

    pub async fn resolve_with(&self, target: &str, credentials: &Credentials) -> Result<DeviceSession> {
        let endpoint = self.endpoint(target);

        if let Some(ref key) = credentials.key {
            let uuid = credentials.uuid.clone().unwrap_or_else(default_terminal_uuid);
            return self.secure(&endpoint, key, &uuid).await;
        }

        if let Some(ref password) = credentials.password {
            let descriptor = Dialect::SkyFi.descriptor();
            let transport = self.transport(descriptor, &endpoint)?.with_password(password.as_str());
            let mut session = self.session_with(descriptor, &endpoint, transport)?;
            session.init().await?;
            info!(endpoint = %endpoint, dialect = descriptor.name, "resolved");
            return Ok(session);
        }

        let mut causes = Vec::new();
        for dialect in [Dialect::Firmware28, Dialect::Basic, Dialect::AirBase] {
            match self.probe(dialect, &endpoint).await? {
                Probe::Matched(session) => {
                    info!(endpoint = %endpoint, dialect = dialect.descriptor().name, "resolved");
                    return Ok(session);
                }
                Probe::Rejected(cause) => {
                    debug!(endpoint = %endpoint, dialect = dialect.descriptor().name, cause = %cause, "dialect rejected");
                    causes.push(format!("{}: {cause}", dialect.descriptor().name));
                }
            }
        }
        Err(Error::Unresolved(causes))
    }

    /// Skips probing when the caller already knows the dialect.
    pub async fn connect(&self, target: &str, dialect: Dialect) -> Result<DeviceSession> {
        let endpoint = self.endpoint(target);
        match dialect {
            Dialect::Secure => {
                let key = self
                    .credentials
                    .key
                    .as_deref()
                    .ok_or_else(|| Error::Authentication("secure adapters need a key".to_string()))?;
                let uuid = self.credentials.uuid.clone().unwrap_or_else(default_terminal_uuid);
                self.secure(&endpoint, key, &uuid).await
            }
            Dialect::SkyFi => {
                let password = self
                    .credentials
                    .password
                    .as_deref()
                    .ok_or_else(|| Error::Authentication("SkyFi controllers need a password".to_string()))?;
                let credentials = Credentials::password(password);
                self.resolve_with(target, &credentials).await
            }
            _ => {
                let mut session = self.session(dialect.descriptor(), &endpoint)?;
                session.init().await?;
                Ok(session)
            }
        }
    }

    async fn secure(&self, endpoint: &Endpoint, key: &str, uuid: &str) -> Result<DeviceSession> {
        let descriptor = Dialect::Secure.descriptor();
        let transport = self.transport(descriptor, endpoint)?.with_uuid(uuid);
        let mut session = self.session_with(descriptor, endpoint, transport)?;
        session.register(key).await?;
        session.init().await?;
        info!(endpoint = %endpoint, dialect = descriptor.name, "resolved");
        Ok(session)
    }

    async fn probe(&self, dialect: Dialect, endpoint: &Endpoint) -> Result<Probe> {
        let descriptor = dialect.descriptor();
        let mut session = self.session(descriptor, endpoint)?;
        match dialect {
            Dialect::Firmware28 => match session.probe(tree::MULTIREQ_PATH).await {
                Ok(true) => Ok(Probe::Matched(session)),
                Ok(false) => Ok(Probe::Rejected("empty status".to_string())),
                Err(e) => Ok(Probe::Rejected(e.to_string())),
            },
            Dialect::Basic => {
                let Some(first) = descriptor.resources.first() else {
                    return Ok(Probe::Rejected("no resources".to_string()));
                };
                match session.probe(first.path).await {
                    Ok(true) => match session.init().await {
                        Ok(()) => Ok(Probe::Matched(session)),
                        Err(e @ Error::Authentication(_)) => Err(e),
                        Err(e) => Ok(Probe::Rejected(e.to_string())),
                    },
                    Ok(false) => Ok(Probe::Rejected(format!("{} returned no values", first.path))),
                    Err(e) => Ok(Probe::Rejected(e.to_string())),
                }
            }
            _ => match session.init().await {
                Ok(()) => Ok(Probe::Matched(session)),
                Err(e) => Ok(Probe::Rejected(e.to_string())),
            },
        }
    }
}
