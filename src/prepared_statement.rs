//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::types::FieldValue;
use std::collections::HashMap;

/// A compiled query statement, ready for repeated execution.
///
/// The compiled form is produced by the service (see
/// [`QueryRequest::prepare_only()`](crate::QueryRequest::prepare_only())) and
/// is opaque to the driver: it is carried back to the service verbatim on
/// each execution. Prepared statements skip query compilation on the server
/// and allow for parameterized queries using bind variables:
///
/// ```no_run
/// # use coraldb::{Handle, QueryRequest};
/// # use serde_json::json;
/// # #[tokio::main]
/// # pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let handle = Handle::builder().build().await?;
/// let prep_result = QueryRequest::new("select * from users where id = $id")
///     .prepare_only()
///     .execute(&handle)
///     .await?;
/// let mut qreq = QueryRequest::new_prepared(&prep_result.prepared_statement());
/// qreq.set_variable("$id", json!(10))?;
/// let result = qreq.execute(&handle).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default, Debug, Clone)]
pub struct PreparedStatement {
    // the server's compiled form, never interpreted client-side
    pub(crate) statement: Vec<u8>,
    pub(crate) table_name: Option<String>,
    pub(crate) bind_variables: HashMap<String, FieldValue>,
}

impl PreparedStatement {
    /// Determine if this statement actually contains a compiled query.
    pub fn is_empty(&self) -> bool {
        self.statement.is_empty()
    }

    /// Get the name of the table the query operates on, if the service
    /// reported one.
    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    /// Set a named bind variable for the next execution.
    pub fn set_variable(&mut self, name: &str, value: FieldValue) {
        self.bind_variables.insert(name.to_string(), value);
    }

    /// Remove all bind variables.
    pub fn clear_variables(&mut self) {
        self.bind_variables.clear();
    }
}
