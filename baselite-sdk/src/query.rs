// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query descriptor for FIND operations
//!
//! The Unit-of-Work treats a query as opaque: whatever this builder produces
//! is serialized into the FIND payload as-given and interpreted server-side.

use serde::Serialize;

/// Fluent builder describing a FIND operation.
///
/// ```ignore
/// let query = DataQuery::new()
///     .where_clause("age > 21")
///     .sort_by("name")
///     .page_size(50);
/// uow.find("Person", query)?;
/// ```
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataQuery {
    #[serde(rename = "whereClause", skip_serializing_if = "Option::is_none")]
    where_clause: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    properties: Vec<String>,

    /// Relation columns to expand in the result records
    #[serde(skip_serializing_if = "Vec::is_empty")]
    related: Vec<String>,

    #[serde(rename = "sortBy", skip_serializing_if = "Vec::is_empty")]
    sort_by: Vec<String>,

    #[serde(rename = "pageSize", skip_serializing_if = "Option::is_none")]
    page_size: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<u32>,
}

impl DataQuery {
    /// Create an empty query matching every record in the table
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter with a server-side where clause
    pub fn where_clause(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    /// Restrict the returned columns
    pub fn properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties = properties.into_iter().map(Into::into).collect();
        self
    }

    /// Expand a relation column in the returned records
    pub fn related(mut self, column: impl Into<String>) -> Self {
        self.related.push(column.into());
        self
    }

    /// Add a sort column, e.g. `"name"` or `"created DESC"`
    pub fn sort_by(mut self, column: impl Into<String>) -> Self {
        self.sort_by.push(column.into());
        self
    }

    /// Page size for the result window
    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Offset of the result window
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}
