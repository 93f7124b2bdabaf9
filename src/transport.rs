//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! The transport seam between the execution layer and the CoralDB service.
//!
//! Request structs reduce every call to an [`Operation`]; a [`Transport`]
//! turns one operation into one server round-trip, returning either a
//! structured [`ServiceResponse`] or a classified [`CoralError`]. The
//! default transport is [`HttpTransport`], which POSTs a JSON envelope to
//! the configured endpoint. Tests and embedders may substitute their own
//! implementation via [`HandleBuilder::transport()`](crate::HandleBuilder::transport()).
use crate::error::CoralErrorCode::{
    BadProtocolMessage, InvalidAuthorization, OperationLimitExceeded, ServerError,
    ServiceUnavailable,
};
use crate::error::{user_agent, CoralError};
use crate::handle_builder::HandleBuilder;
use crate::operation::Operation;
use crate::types::{Capacity, ContinuationToken};
use async_trait::async_trait;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_derive::Serialize;
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Structured result of a single successful transport round-trip.
///
/// Response payload fields are kept as decoded JSON; each request struct
/// picks out the fields it understands. Consumed capacity, when the service
/// reports it, is split out so the execution layer can feed the rate
/// limiter and observers without knowing the operation type.
#[derive(Debug, Default, Clone)]
pub struct ServiceResponse {
    pub(crate) fields: Map<String, Value>,
    pub consumed: Option<Capacity>,
}

impl ServiceResponse {
    /// Get a raw response field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub(crate) fn take_field(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub(crate) fn string_field(&self, name: &str) -> Option<String> {
        self.fields.get(name)?.as_str().map(|s| s.to_string())
    }

    pub(crate) fn i32_field(&self, name: &str) -> Option<i32> {
        Some(self.fields.get(name)?.as_i64()? as i32)
    }

    pub(crate) fn i64_field(&self, name: &str) -> Option<i64> {
        self.fields.get(name)?.as_i64()
    }

    pub(crate) fn bool_field(&self, name: &str) -> Option<bool> {
        self.fields.get(name)?.as_bool()
    }

    // binary fields travel base64-encoded
    pub(crate) fn binary_field(&self, name: &str) -> Result<Option<Vec<u8>>, CoralError> {
        let s = match self.fields.get(name).and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return Ok(None),
        };
        match BASE64_STANDARD.decode(s) {
            Ok(b) => Ok(Some(b)),
            Err(e) => Err(CoralError::new(
                BadProtocolMessage,
                &format!("invalid binary value in field \"{}\": {}", name, e),
            )),
        }
    }

    pub(crate) fn token_field(
        &self,
        name: &str,
    ) -> Result<Option<ContinuationToken>, CoralError> {
        match self.fields.get(name).and_then(|v| v.as_str()) {
            Some(s) => Ok(Some(ContinuationToken::from_base64(s)?)),
            None => Ok(None),
        }
    }
}

// Decode a response body into a ServiceResponse, surfacing a service error
// code as a CoralError. Shared by the HTTP transport and by scripted
// transports in tests.
pub(crate) fn response_from_json(body: Value) -> Result<ServiceResponse, CoralError> {
    let mut fields = match body {
        Value::Object(m) => m,
        _ => {
            return Err(CoralError::new(
                BadProtocolMessage,
                "response body is not a JSON object",
            ));
        }
    };
    if let Some(code) = fields.get("error_code").and_then(|v| v.as_i64()) {
        if code != 0 {
            let msg = fields
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            return Err(CoralError::from_int(code as i32, &msg));
        }
    }
    fields.remove("error_code");
    let consumed = fields.remove("consumed").map(|v| Capacity::from_json(&v));
    Ok(ServiceResponse { fields, consumed })
}

/// One server round-trip.
///
/// `timeout` is the time remaining in the operation's overall budget; an
/// implementation must not block longer than that. Failures must be
/// classified: a fault that never reached the service maps to
/// [`NetworkError`](crate::CoralErrorCode::NetworkError), a service-reported
/// error to its wire code.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn execute(
        &self,
        operation: &Operation,
        timeout: Duration,
    ) -> Result<ServiceResponse, CoralError>;
}

/// Source of the authorization value sent with each request.
///
/// The execution layer treats this as opaque: the only behavior it relies
/// on is that an authorization failure may be transient immediately after
/// [`refresh()`](AuthorizationProvider::refresh()) completes, which is why
/// such failures get a single automatic retry.
#[async_trait]
pub trait AuthorizationProvider: Send + Sync + Debug {
    /// The value for the `Authorization` header.
    fn authorization(&self) -> Result<String, CoralError>;

    /// Re-acquire credentials after an authorization failure. Returns true
    /// if anything changed and a retry is worthwhile.
    async fn refresh(&self) -> Result<bool, CoralError> {
        Ok(false)
    }
}

/// An [`AuthorizationProvider`] wrapping a fixed bearer token.
#[derive(Debug, Clone)]
pub struct BearerTokenProvider {
    token: String,
}

impl BearerTokenProvider {
    pub fn new(token: &str) -> BearerTokenProvider {
        BearerTokenProvider {
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl AuthorizationProvider for BearerTokenProvider {
    fn authorization(&self) -> Result<String, CoralError> {
        Ok(format!("Bearer {}", self.token))
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    op: &'a str,
    table: &'a str,
    timeout_ms: u64,
    payload: &'a Map<String, Value>,
}

/// The default [`Transport`]: POSTs a JSON envelope over HTTP(S).
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    auth: Option<Arc<dyn AuthorizationProvider>>,
    request_id: AtomicUsize,
}

impl HttpTransport {
    pub(crate) fn new(b: &HandleBuilder, timeout: Duration) -> Result<HttpTransport, CoralError> {
        let client = {
            if let Some(c) = &b.client {
                c.clone()
            } else {
                let mut cb = reqwest::Client::builder()
                    .timeout(timeout)
                    .connect_timeout(timeout);
                if let Some(cert) = &b.add_cert {
                    cb = cb.add_root_certificate(cert.clone());
                }
                if b.accept_invalid_certs {
                    cb = cb.danger_accept_invalid_certs(true);
                }
                cb.build()?
            }
        };
        // normalize endpoint to "http[s]://{endpoint}/V1/data"
        let mut ep = String::from("http");
        if b.use_https {
            ep.push('s');
        }
        ep.push_str("://");
        ep.push_str(&b.endpoint);
        ep.push_str("/V1/data");
        Ok(HttpTransport {
            client,
            endpoint: ep,
            auth: b.auth.clone(),
            request_id: AtomicUsize::new(1),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        operation: &Operation,
        timeout: Duration,
    ) -> Result<ServiceResponse, CoralError> {
        let request_id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let mut headers = HeaderMap::new();
        headers.insert("x-coraldb-request-id", HeaderValue::from(request_id));
        let namespace = &operation.options().namespace;
        if !namespace.is_empty() {
            headers.insert("x-coraldb-default-ns", HeaderValue::from_str(namespace)?);
        }
        if let Some(a) = &self.auth {
            headers.insert("Authorization", HeaderValue::from_str(&a.authorization()?)?);
        }
        headers.insert("User-Agent", HeaderValue::from_str(user_agent())?);

        let wire = WireRequest {
            op: operation.op_code().as_str(),
            table: operation.table_name(),
            timeout_ms: timeout.as_millis() as u64,
            payload: operation.payload(),
        };
        let body = serde_json::to_vec(&wire)?;
        trace!(
            "sending request id={} op={} table={}",
            request_id,
            operation.op_code().as_str(),
            operation.table_name()
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .body(body)
            .timeout(timeout)
            .headers(headers)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let content = resp.text().await.unwrap_or_default();
            let code = match status.as_u16() {
                401 | 403 => InvalidAuthorization,
                429 => OperationLimitExceeded,
                503 => ServiceUnavailable,
                500..=599 => ServerError,
                _ => BadProtocolMessage,
            };
            return Err(CoralError::new(
                code,
                &format!(
                    "got unexpected http status: {}, response text: {}",
                    status, content
                ),
            ));
        }

        let bytes = resp.bytes().await?;
        let parsed: Value = serde_json::from_slice(&bytes)?;
        response_from_json(parsed)
    }
}
