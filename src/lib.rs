//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! CoralDB Rust SDK
//!
//! This is the Rust SDK for CoralDB, a networked NoSQL database service
//! available as a managed cloud service and as an on-premises server.
//!
//! This SDK supplies and uses Rust `async` methods throughout, using the
//! [tokio](https://crates.io/crates/tokio) runtime. There is currently no
//! blocking support.
//!
//! The general flow for an application using CoralDB is:
//! - Create a [`HandleBuilder`] with all needed parameters
//! - Create a [`Handle`] from the [`HandleBuilder`] that will be used throughout the application, across all threads
//! - Interact with the database using the [`Handle`] and Request structs such as [`GetRequest`], [`PutRequest`], [`QueryRequest`], etc.
//!
//! ## Simple Example
//! The following code creates a [`Handle`] from values in the current
//! environment and then reads a single record from a table in the database.
//! ```no_run
//! use coraldb::{GetRequest, Handle};
//! use serde_json::json;
//! use std::error::Error;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn Error>> {
//!     let handle = Handle::builder()
//! #       .endpoint("http://localhost:8080")?
//!         .from_environment()?
//!         .build().await?;
//!     let getres = GetRequest::new("test_table")
//!         .key(json!({"id": 10}))
//!         .execute(&handle)
//!         .await?;
//!     println!("GetResult={:?}", getres);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuring the SDK
//!
//! The only required parameter is the service endpoint, set either in code
//! with [`HandleBuilder::endpoint()`] or through the `CORALDB_ENDPOINT`
//! environment variable when using [`HandleBuilder::from_environment()`].
//! For a secure installation, supply an
//! [`AuthorizationProvider`]; for a server using a self-signed certificate,
//! see [`HandleBuilder::add_cert_from_pemfile()`].
//!
//! Operation behavior is tuned on the same builder:
//! - [`HandleBuilder::timeout()`] sets the default per-operation time
//!   budget, covering all retries and backoff.
//! - [`HandleBuilder::retry_handler()`] replaces the default retry policy;
//!   see [`RetryHandler`].
//! - [`HandleBuilder::rate_limiting()`] enables cooperative client-side
//!   throttling that keeps issued load within each table's provisioned
//!   throughput.
//! - [`HandleBuilder::observer()`] registers per-operation observability
//!   callbacks; see [`EventObserver`].
//!
//! ## Row values
//!
//! Rows, keys, and bind variables are plain [`serde_json`] values; the
//! driver does not define its own column value types. The
//! [`serde_json::json!`] macro is the usual way to build them.
//!
//! ## Asynchronous DDL
//!
//! Table and admin DDL statements execute asynchronously in the service.
//! The result structs returned by [`TableRequest`] and [`AdminRequest`]
//! poll for completion; see [`TableResult::wait_for_completion()`],
//! [`TableResult::wait_for_state()`] and
//! [`AdminResult::wait_for_completion()`].

pub(crate) mod handle_builder;
pub use crate::handle_builder::HandleBuilder;

pub(crate) mod handle;
pub use crate::handle::Handle;

pub(crate) mod admin_request;
pub use crate::admin_request::{AdminRequest, AdminResult};

pub(crate) mod delete_range_request;
pub use crate::delete_range_request::{DeleteRangeRequest, DeleteRangeResult, FieldRange};

pub(crate) mod delete_request;
pub use crate::delete_request::{DeleteRequest, DeleteResult};

pub(crate) mod error;
pub use crate::error::{CoralError, CoralErrorCode};

pub(crate) mod events;
pub use crate::events::EventObserver;

pub(crate) mod get_indexes_request;
pub use crate::get_indexes_request::{GetIndexesRequest, GetIndexesResult, IndexInfo};

pub(crate) mod get_request;
pub use crate::get_request::{GetRequest, GetResult};

pub(crate) mod list_tables_request;
pub use crate::list_tables_request::{ListTablesRequest, ListTablesResult};

pub(crate) mod operation;
pub use crate::operation::{OpCode, Operation, OperationOptions};

pub(crate) mod prepared_statement;
pub use crate::prepared_statement::PreparedStatement;

pub(crate) mod put_request;
pub use crate::put_request::{PutRequest, PutResult};

pub(crate) mod query_request;
pub use crate::query_request::{QueryIterable, QueryRequest, QueryResult};

pub(crate) mod rate_limiter;
pub use crate::rate_limiter::SimpleRateLimiter;

#[cfg(test)]
pub(crate) mod rate_limiter_tests;
#[cfg(test)]
pub(crate) mod request_tests;

pub(crate) mod retry;
pub use crate::retry::{DefaultRetryHandler, RetryHandler, RetryState};

#[cfg(test)]
pub(crate) mod retry_tests;

pub(crate) mod table_request;
pub use crate::table_request::{GetTableRequest, TableRequest, TableResult};

pub(crate) mod table_usage_request;
pub use crate::table_usage_request::{TableUsage, TableUsageRequest, TableUsageResult};

pub(crate) mod transport;
pub use crate::transport::{
    AuthorizationProvider, BearerTokenProvider, HttpTransport, ServiceResponse, Transport,
};

pub mod types;

/// Type representing a specific version of a table row in CoralDB.
pub type Version = Vec<u8>;

pub(crate) mod write_batch_request;
pub use crate::write_batch_request::{
    SubOperationResult, WriteBatchRequest, WriteBatchResult,
};
