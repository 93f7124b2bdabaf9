//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::operation::Operation;
use num_enum::TryFromPrimitive;

include!(concat!(env!("OUT_DIR"), "/ua.rs"));

pub(crate) fn sdk_version() -> &'static str {
    SDK_VERSION
}

pub(crate) fn user_agent() -> &'static str {
    USER_AGENT
}

/// The error type returned by all fallible operations in this library.
///
/// Every raw failure - a network fault, a decoded service error code, or a
/// local validation failure - maps to exactly one `CoralError`. When an
/// operation gives up after retrying, the error retains the last classified
/// failure as [`cause()`](CoralError::cause()) and the operation that was
/// being executed as [`operation()`](CoralError::operation()).
#[derive(Debug, Clone)]
pub struct CoralError {
    pub code: CoralErrorCode,
    pub message: String,
    pub(crate) operation: Option<Box<Operation>>,
    pub(crate) cause: Option<Box<CoralError>>,
}

impl std::error::Error for CoralError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            Some(c) => Some(c.as_ref()),
            None => None,
        }
    }
}

impl std::fmt::Display for CoralError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        return write!(f, "code={:?} message=\"{}\"", self.code, self.message);
    }
}

impl CoralError {
    pub fn new(code: CoralErrorCode, msg: &str) -> CoralError {
        CoralError {
            code,
            message: msg.to_string(),
            operation: None,
            cause: None,
        }
    }

    pub fn from_int(icode: i32, msg: &str) -> CoralError {
        if let Ok(code) = CoralErrorCode::try_from(icode) {
            return CoralError::new(code, msg);
        }
        CoralError::new(
            CoralErrorCode::UnknownError,
            &format!("Invalid integer error code {}: {}", icode, msg),
        )
    }

    /// Determine if the failure is worth retrying.
    ///
    /// This is the fixed classification used by the default retry policy;
    /// it does not consult any retry budget. See [`CoralErrorCode::is_retryable()`].
    pub fn retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Get the operation that was being executed when this error was raised,
    /// if the error came from an operation dispatch.
    pub fn operation(&self) -> Option<&Operation> {
        match &self.operation {
            Some(op) => Some(op.as_ref()),
            None => None,
        }
    }

    /// Get the underlying failure, if any.
    ///
    /// For a [`RequestTimeout`](CoralErrorCode::RequestTimeout) raised by the
    /// retry loop or a completion poller, this is the last classified error
    /// observed before giving up.
    pub fn cause(&self) -> Option<&CoralError> {
        match &self.cause {
            Some(c) => Some(c.as_ref()),
            None => None,
        }
    }

    pub(crate) fn with_operation(mut self, op: &Operation) -> CoralError {
        if self.operation.is_none() {
            self.operation = Some(Box::new(op.clone()));
        }
        self
    }

    pub(crate) fn with_cause(mut self, cause: CoralError) -> CoralError {
        self.cause = Some(Box::new(cause));
        self
    }
}

macro_rules! ia_error {
    ($($t:tt)*) => {{
        let m = format!($($t)*);
        CoralError {
            code: crate::error::CoralErrorCode::IllegalArgument,
            message: format!("{} ({})", m, crate::error::sdk_version()),
            operation: None,
            cause: None,
        }
    }};
}

pub(crate) use ia_error;

macro_rules! ia_err {
    ($($t:tt)*) => {{
        let m = format!($($t)*);
        Err(CoralError {
            code: crate::error::CoralErrorCode::IllegalArgument,
            message: format!("{} ({})", m, crate::error::sdk_version()),
            operation: None,
            cause: None,
        })
    }};
}

pub(crate) use ia_err;

impl From<reqwest::Error> for CoralError {
    fn from(e: reqwest::Error) -> Self {
        let code = {
            if e.is_timeout() {
                CoralErrorCode::RequestTimeout
            } else if e.is_connect() {
                CoralErrorCode::NetworkError
            } else {
                CoralErrorCode::ServerError
            }
        };
        CoralError::new(
            code,
            &format!(
                "transport error: {} ({})",
                e.to_string(),
                crate::error::sdk_version()
            ),
        )
    }
}

impl From<reqwest::header::InvalidHeaderValue> for CoralError {
    fn from(e: reqwest::header::InvalidHeaderValue) -> Self {
        ia_error!("invalid header value: {}", e.to_string())
    }
}

impl From<url::ParseError> for CoralError {
    fn from(e: url::ParseError) -> Self {
        ia_error!("error parsing url: {}", e.to_string())
    }
}

impl From<chrono::ParseError> for CoralError {
    fn from(e: chrono::ParseError) -> Self {
        ia_error!("invalid datetime value: {}", e.to_string())
    }
}

impl From<serde_json::Error> for CoralError {
    fn from(e: serde_json::Error) -> Self {
        CoralError::new(
            CoralErrorCode::BadProtocolMessage,
            &format!("error encoding/decoding json: {}", e.to_string()),
        )
    }
}

// CoralErrorCode represents the error code.
// Error codes are divided into categories as follows:
//
// 1. Error codes for user-generated errors, range from 1 to 50(exclusive).
// These include illegal arguments, exceeding size limits for some objects,
// resource not found, etc.
//
// 2. Error codes for user throttling, range from 50 to 100(exclusive).
//
// 3. Error codes for server issues, range from 100 to 150(exclusive).
//
// 3.1 Retryable server issues, range from 100 to 125(exclusive), that represent
// internal problems, presumably temporary, and need to be sent back to the
// application for retry.
//
// 3.2 Other server issues, begin from 125.
// These include server illegal state, unknown server error, etc.
// They might be retryable, or not.
//
// 4. Error codes at 1000 and above are generated locally by the driver and
// never appear on the wire.
//
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
#[repr(i32)]
pub enum CoralErrorCode {
    /// NoError represents there is no error.
    NoError = 0,

    /// UnknownOperation error represents the operation attempted is unknown.
    UnknownOperation = 1,

    /// TableNotFound error represents the operation attempted to access a table
    /// that does not exist or is not in a visible state.
    TableNotFound = 2,

    /// IndexNotFound error represents the operation attempted to access an index
    /// that does not exist or is not in a visible state.
    IndexNotFound = 3,

    /// IllegalArgument error represents the application provided an illegal
    /// argument for the operation. These are raised locally where possible,
    /// before any server round-trip, and are never retried.
    IllegalArgument = 4,

    /// RowSizeLimitExceeded error represents an attempt has been made to create
    /// a row with a size that exceeds the system defined limit.
    RowSizeLimitExceeded = 5,

    /// KeySizeLimitExceeded error represents an attempt has been made to create
    /// a row with a primary key or index key size that exceeds the system defined limit.
    KeySizeLimitExceeded = 6,

    /// BatchOpLimitExceeded error represents that the number of sub-operations
    /// included in a WriteBatch operation exceeds the system defined limit.
    BatchOpLimitExceeded = 7,

    /// RequestSizeLimitExceeded error represents that the size of a request
    /// exceeds the system defined limit.
    RequestSizeLimitExceeded = 8,

    /// TableExists error represents the operation attempted to create a table
    /// but the named table already exists.
    TableExists = 9,

    /// IndexExists error represents the operation attempted to create an index
    /// for a table but the named index already exists.
    IndexExists = 10,

    /// InvalidAuthorization error represents the client provided an invalid
    /// authorization value in the request header.
    ///
    /// This may be transient immediately after an authorization provider is
    /// (re)constructed; the default retry policy allows a single automatic
    /// retry so a credential refresh can complete.
    InvalidAuthorization = 11,

    /// InsufficientPermission error represents an application does not have
    /// sufficient permission to perform a request.
    InsufficientPermission = 12,

    /// ResourceExists error represents the operation attempted to create a
    /// resource but it already exists.
    ResourceExists = 13,

    /// ResourceNotFound error represents the operation attempted to access a
    /// resource that does not exist or is not in a visible state.
    ResourceNotFound = 14,

    /// TableLimitExceeded error represents an attempt has been made to create a
    /// number of tables that exceeds the system defined limit.
    TableLimitExceeded = 15,

    /// BadProtocolMessage error represents there is an error in the protocol
    /// used by client and server to exchange information.
    BadProtocolMessage = 17,

    /// OperationNotSupported error represents the operation attempted is not supported.
    /// This may be related to on-premise vs cloud service configurations.
    OperationNotSupported = 21,

    /// ReadLimitExceeded error represents that the provisioned read throughput
    /// has been exceeded.
    ///
    /// Operations resulting in this error can be retried but it is recommended
    /// that callers use a delay before retrying in order to minimize the chance
    /// that a retry will also be throttled. Applications should attempt to avoid
    /// throttling errors by rate limiting themselves to the degree possible,
    /// either with the built-in rate limiter
    /// (see [`HandleBuilder::rate_limiting()`](crate::HandleBuilder::rate_limiting()))
    /// or externally.
    ReadLimitExceeded = 50,

    /// WriteLimitExceeded error represents that the provisioned write throughput
    /// has been exceeded.
    ///
    /// Operations resulting in this error can be retried but it is recommended
    /// that callers use a delay before retrying in order to minimize the chance
    /// that a retry will also be throttled.
    WriteLimitExceeded = 51,

    /// SizeLimitExceeded error represents a table size limit has been exceeded
    /// by writing more data than the table can support.
    /// This error is not retryable because the conditions that lead to it being
    /// returned, while potentially transient, typically require user intervention.
    SizeLimitExceeded = 52,

    /// OperationLimitExceeded error represents the operation attempted has exceeded
    /// the allowed limits for non-data operations defined by the system.
    ///
    /// This error is returned when a non-data operation is throttled.
    /// This can happen if an application attempts too many control operations
    /// such as table creation, deletion, or similar methods. Such operations
    /// do not use throughput or capacity provisioned for a given table but they
    /// consume system resources and their use is limited.
    ///
    /// Operations resulting in this error can be retried but it is recommended
    /// that callers use a relatively large delay before retrying in order to
    /// minimize the chance that a retry will also be throttled.
    OperationLimitExceeded = 53,

    /// RequestTimeout error represents the request cannot be processed or does
    /// not complete when the specified timeout duration elapses.
    ///
    /// If a retry handler is configured it is possible that the
    /// request has been retried a number of times before the timeout occurs.
    RequestTimeout = 100,

    /// ServerError represents there is an internal system problem.
    /// Most system problems are temporary.
    /// The operation that leads to this error may need to retry.
    ServerError = 101,

    /// ServiceUnavailable error represents the requested service is currently unavailable.
    /// This is usually a temporary error.
    /// The operation that leads to this error may need to retry.
    ServiceUnavailable = 102,

    /// TableBusy error represents the table is in use or busy.
    /// This error may be returned when a table operation fails.
    /// Note that only one modification operation at a time is allowed on a table.
    TableBusy = 103,

    /// SecurityInfoUnavailable error represents the security information is not
    /// ready in the system.
    /// This error will occur as the system acquires security information and
    /// must be retried in order for authorization to work properly.
    SecurityInfoUnavailable = 104,

    /// RetryAuthentication error represents the authentication failed and may need to retry.
    RetryAuthentication = 105,

    /// NetworkError represents a network-level fault: the request could not
    /// reach the service, or the connection was dropped before a response
    /// was read. These are always considered retryable.
    NetworkError = 106,

    /// UnknownError represents an unknown error has occurred on the server.
    UnknownError = 125,

    /// IllegalState error represents an illegal state.
    IllegalState = 126,

    /// InternalRetry is used internally for retry logic.
    InternalRetry = 1001,

    /// MemoryLimitExceeded error represents that the memory consumed at the
    /// client while buffering query results exceeded the configured limit.
    /// See [`HandleBuilder::max_memory_consumption()`](crate::HandleBuilder::max_memory_consumption()).
    MemoryLimitExceeded = 1002,
}

impl CoralErrorCode {
    /// Determine if an error code is in the fixed retryable set.
    ///
    /// The partition is decided at build time: throttling errors, transient
    /// server issues, network faults, and security information propagation
    /// delays are retryable; malformed requests, missing resources, and
    /// authorization failures are not. Authorization failures get a single
    /// automatic retry from the default policy despite being classified
    /// non-retryable here.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoralErrorCode::ReadLimitExceeded
                | CoralErrorCode::WriteLimitExceeded
                | CoralErrorCode::OperationLimitExceeded
                | CoralErrorCode::ServerError
                | CoralErrorCode::ServiceUnavailable
                | CoralErrorCode::TableBusy
                | CoralErrorCode::SecurityInfoUnavailable
                | CoralErrorCode::RetryAuthentication
                | CoralErrorCode::NetworkError
                | CoralErrorCode::InternalRetry
        )
    }
}
