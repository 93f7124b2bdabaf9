//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Builder for creating a [`Handle`](crate::Handle).
//!
use crate::error::{ia_err, CoralError};
use crate::events::EventObserver;
use crate::handle::Handle;
use crate::retry::RetryHandler;
use crate::transport::{AuthorizationProvider, BearerTokenProvider, Transport};
use reqwest::{Certificate, Client};
use std::default::Default;
use std::env;
use std::result::Result;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

// default ceiling for client-side query result buffering: 1GB
const DEFAULT_MAX_MEMORY_CONSUMPTION: u64 = 1_000_000_000;

/// Builder used to set all the parameters to create a [`Handle`](crate::Handle).
///
/// All configuration is resolved exactly once, when [`build()`](HandleBuilder::build())
/// is called; the resulting handle is immutable. Later methods called on a
/// builder override earlier ones, which allows setting desired defaults that
/// can then be overridden by, for example,
/// [`from_environment()`](HandleBuilder::from_environment()).
#[derive(Debug, Clone)]
pub struct HandleBuilder {
    pub(crate) endpoint: String,
    pub(crate) use_https: bool,
    pub(crate) timeout: Option<Duration>,
    pub(crate) retry_handler: Option<Arc<dyn RetryHandler>>,
    pub(crate) rate_limiting: bool,
    pub(crate) rate_limiter_percent: f64,
    pub(crate) max_memory_consumption: u64,
    pub(crate) observers: Vec<Arc<dyn EventObserver>>,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) auth: Option<Arc<dyn AuthorizationProvider>>,
    pub(crate) add_cert: Option<Certificate>,
    pub(crate) accept_invalid_certs: bool,
    pub(crate) client: Option<Client>,
    // For error messaging
    pub(crate) from_environment: bool,
}

impl Default for HandleBuilder {
    fn default() -> HandleBuilder {
        HandleBuilder {
            endpoint: String::new(),
            use_https: false,
            timeout: None,
            retry_handler: None,
            rate_limiting: false,
            rate_limiter_percent: 100.0,
            max_memory_consumption: DEFAULT_MAX_MEMORY_CONSUMPTION,
            observers: Vec::new(),
            transport: None,
            auth: None,
            add_cert: None,
            accept_invalid_certs: false,
            client: None,
            from_environment: false,
        }
    }
}

impl HandleBuilder {
    /// Create a new HandleBuilder struct.
    ///
    /// Consider calling [`from_environment()`](HandleBuilder::from_environment())
    /// to collect the endpoint and related parameters from the local
    /// environment by default.
    pub fn new() -> Self {
        HandleBuilder {
            ..Default::default()
        }
    }

    /// Build a new [`Handle`](crate::Handle).
    ///
    /// Note: Internally, if the [`HandleBuilder`] contains a reference to an
    /// existing [`reqwest::Client`], it will clone and use that. Otherwise,
    /// it will create a new [`reqwest::Client`] for its own internal use.
    /// See [`reqwest_client()`](HandleBuilder::reqwest_client()).
    pub async fn build(self) -> Result<Handle, CoralError> {
        Handle::new(&self).await
    }

    /// Gather configuration settings from the current environment.
    ///
    /// Recognized variables:
    /// - `CORALDB_ENDPOINT`: service endpoint, required unless set in code
    /// - `CORALDB_TIMEOUT_MS`: default operation timeout in milliseconds
    /// - `CORALDB_AUTH_TOKEN`: bearer token sent with every request
    /// - `CORALDB_RATE_LIMITER_PERCENT`: enables rate limiting at the given
    ///   percentage of each table's provisioned throughput
    pub fn from_environment(mut self) -> Result<Self, CoralError> {
        self.from_environment = true;
        if let Ok(ep) = env::var("CORALDB_ENDPOINT") {
            self = self.endpoint(&ep)?;
        }
        if let Ok(t) = env::var("CORALDB_TIMEOUT_MS") {
            match t.parse::<u64>() {
                Ok(ms) => {
                    self = self.timeout(Duration::from_millis(ms))?;
                }
                Err(_) => {
                    return ia_err!("invalid CORALDB_TIMEOUT_MS value '{}'", t);
                }
            }
        }
        if let Ok(tok) = env::var("CORALDB_AUTH_TOKEN") {
            self = self.authorization_provider(Arc::new(BearerTokenProvider::new(&tok)))?;
        }
        if let Ok(p) = env::var("CORALDB_RATE_LIMITER_PERCENT") {
            match p.parse::<f64>() {
                Ok(pct) => {
                    self = self.rate_limiting(true)?.rate_limiter_percent(pct)?;
                }
                Err(_) => {
                    return ia_err!("invalid CORALDB_RATE_LIMITER_PERCENT value '{}'", p);
                }
            }
        }
        Ok(self)
    }

    /// Set the CoralDB endpoint to connect to.
    ///
    /// The endpoint may be given as `host`, `host:port`,
    /// `http://host:port`, or `https://host:port`. Without a scheme,
    /// plain http is assumed.
    pub fn endpoint(mut self, endpoint: &str) -> Result<Self, CoralError> {
        let mut ep = endpoint;
        if let Some(rest) = ep.strip_prefix("https://") {
            self.use_https = true;
            ep = rest;
        } else if let Some(rest) = ep.strip_prefix("http://") {
            self.use_https = false;
            ep = rest;
        }
        let ep = ep.trim_end_matches('/');
        if ep.is_empty() {
            return ia_err!("endpoint must be non-empty");
        }
        // validate through the url parser
        Url::parse(&format!("http://{}", ep))?;
        self.endpoint = ep.to_string();
        Ok(self)
    }

    /// Specify the default timeout value for all operations on this handle.
    ///
    /// The timeout covers the whole of one operation: all retries, backoff
    /// sleeps, and any rate-limiter delay count against it. Individual
    /// requests can override it.
    ///
    /// If not set, a default of 30 seconds is used.
    pub fn timeout(mut self, timeout: Duration) -> Result<Self, CoralError> {
        if timeout < Duration::from_millis(1) {
            return ia_err!("timeout must be at least 1 millisecond");
        }
        self.timeout = Some(timeout);
        Ok(self)
    }

    /// Supply a custom retry policy.
    ///
    /// The given handler is consulted after every failed dispatch. Any
    /// trait method it does not override falls back to the default policy;
    /// see [`RetryHandler`].
    pub fn retry_handler(mut self, handler: Arc<dyn RetryHandler>) -> Result<Self, CoralError> {
        self.retry_handler = Some(handler);
        Ok(self)
    }

    /// Enable or disable adaptive rate limiting.
    ///
    /// When enabled, data operations are throttled client-side to stay
    /// within each table's provisioned throughput, based on the consumed
    /// capacity the service reports. Disabled by default.
    pub fn rate_limiting(mut self, enable: bool) -> Result<Self, CoralError> {
        self.rate_limiting = enable;
        Ok(self)
    }

    /// Set the percentage of each table's provisioned throughput this
    /// handle's rate limiters will use. Must be greater than 0 and no more
    /// than 100. The default is 100.
    ///
    /// Lower values are useful when several client instances share one
    /// table's provisioned capacity, since the limiters of different
    /// instances are not coordinated.
    pub fn rate_limiter_percent(mut self, percent: f64) -> Result<Self, CoralError> {
        if !(percent > 0.0 && percent <= 100.0) {
            return ia_err!(
                "rate limiter percent must be in (0, 100], got {}",
                percent
            );
        }
        self.rate_limiter_percent = percent;
        Ok(self)
    }

    /// Set the maximum amount of memory, in bytes, that a single query
    /// execution may consume at the client while buffering results.
    ///
    /// When the ceiling is exceeded, [`QueryRequest::execute()`](crate::QueryRequest::execute())
    /// fails fast with [`MemoryLimitExceeded`](crate::CoralErrorCode::MemoryLimitExceeded)
    /// rather than degrading silently. The default is 1 GB.
    pub fn max_memory_consumption(mut self, bytes: u64) -> Result<Self, CoralError> {
        if bytes == 0 {
            return ia_err!("max memory consumption must be nonzero");
        }
        self.max_memory_consumption = bytes;
        Ok(self)
    }

    /// Register an [`EventObserver`] to receive per-operation
    /// consumed-capacity and retryable-error notifications. May be called
    /// multiple times; observers are notified in registration order.
    pub fn observer(mut self, observer: Arc<dyn EventObserver>) -> Result<Self, CoralError> {
        self.observers.push(observer);
        Ok(self)
    }

    /// Supply a custom [`Transport`] implementation, replacing the default
    /// HTTP transport. Mostly useful for testing and embedding.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Result<Self, CoralError> {
        self.transport = Some(transport);
        Ok(self)
    }

    /// Supply the [`AuthorizationProvider`] used to authorize requests.
    pub fn authorization_provider(
        mut self,
        provider: Arc<dyn AuthorizationProvider>,
    ) -> Result<Self, CoralError> {
        self.auth = Some(provider);
        Ok(self)
    }

    /// Add an x509 certificate in PEM format to verify the server's
    /// certificate against, for servers whose certificate is self-signed or
    /// not trusted by the default system CA.
    pub fn add_cert_from_pemfile(mut self, path: &str) -> Result<Self, CoralError> {
        let pem = match std::fs::read(path) {
            Ok(p) => p,
            Err(e) => {
                return ia_err!("cannot read pem file '{}': {}", path, e);
            }
        };
        self.add_cert = Some(Certificate::from_pem(&pem)?);
        Ok(self)
    }

    /// Instruct the client to skip verifying the server's certificate.
    ///
    /// Prefer [`add_cert_from_pemfile()`](HandleBuilder::add_cert_from_pemfile())
    /// where possible.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Result<Self, CoralError> {
        self.accept_invalid_certs = accept;
        Ok(self)
    }

    /// Use an existing [`reqwest::Client`] for the default HTTP transport
    /// instead of building a new one.
    pub fn reqwest_client(mut self, client: &Client) -> Result<Self, CoralError> {
        self.client = Some(client.clone());
        Ok(self)
    }
}
