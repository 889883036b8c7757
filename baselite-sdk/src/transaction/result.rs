// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Result distribution
//!
//! One raw server response fans out to every local operation handle. On
//! success each handle receives its typed result; on a transactional failure
//! the single failing handle receives the error report and every sibling is
//! left unset (the all-or-nothing abort means they never ran remotely).

use std::collections::HashMap;
use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::op_result::OpResult;
use super::operation::OperationKind;
use crate::error::{Error, Result};

/// Typed result of one operation, shaped by its kind
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    /// CREATE / UPDATE: the stored record, including server-populated
    /// bookkeeping columns (`created`, `updated`, `ownerId`, ...)
    Record(Map<String, Value>),
    /// CREATE_BULK: identifiers of the created records, in input order
    ObjectIds(Vec<String>),
    /// Bulk updates/deletes and relation mutations: affected-row count
    Affected(u64),
    /// DELETE: server-side deletion timestamp (epoch millis)
    DeletionTime(i64),
    /// FIND: matching records
    Records(Vec<Map<String, Value>>),
}

impl OperationResult {
    pub fn as_record(&self) -> Option<&Map<String, Value>> {
        match self {
            OperationResult::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_object_ids(&self) -> Option<&[String]> {
        match self {
            OperationResult::ObjectIds(ids) => Some(ids),
            _ => None,
        }
    }

    pub fn as_affected(&self) -> Option<u64> {
        match self {
            OperationResult::Affected(count) => Some(*count),
            _ => None,
        }
    }

    pub fn as_deletion_time(&self) -> Option<i64> {
        match self {
            OperationResult::DeletionTime(timestamp) => Some(*timestamp),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&[Map<String, Value>]> {
        match self {
            OperationResult::Records(records) => Some(records),
            _ => None,
        }
    }
}

/// The one staged operation the server reports as having failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedOperation {
    #[serde(rename = "operationType")]
    pub operation_type: OperationKind,
    pub table: String,
    #[serde(rename = "opResultId")]
    pub op_result_id: String,
    pub payload: Value,
}

impl fmt::Display for FailedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on table '{}' ({})",
            self.operation_type, self.table, self.op_result_id
        )
    }
}

/// Failure report for a rejected transaction: the server message plus the
/// single operation that caused the whole batch to roll back
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message} [{operation}]")]
pub struct TransactionOperationError {
    pub message: String,
    pub operation: FailedOperation,
}

/// Per-operation entry of a successful transaction summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResultEntry {
    #[serde(rename = "operationType")]
    pub operation_type: OperationKind,
    pub result: Value,
}

/// Summary returned by `execute()`: either a full result map or the failure
/// report, never both
#[derive(Debug, Clone)]
pub struct UnitOfWorkResult {
    success: bool,
    results: Option<HashMap<String, OperationResultEntry>>,
    error: Option<TransactionOperationError>,
}

impl UnitOfWorkResult {
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Result map keyed by op-result id; `None` when the transaction failed
    pub fn results(&self) -> Option<&HashMap<String, OperationResultEntry>> {
        self.results.as_ref()
    }

    /// Failure report; `None` when the transaction committed
    pub fn error(&self) -> Option<&TransactionOperationError> {
        self.error.as_ref()
    }

    /// Convert a failed summary into an [`Error::Transaction`]
    pub fn ensure_success(&self) -> Result<()> {
        match &self.error {
            None => Ok(()),
            Some(error) => Err(Error::Transaction(error.clone())),
        }
    }
}

/// Raw wire response: a failure report is distinguishable from the success
/// map by its `message` + `operation` fields and the absent result map
fn parse_failure(raw: &Value) -> Option<TransactionOperationError> {
    if raw.get("message").is_some() && raw.get("operation").is_some() {
        serde_json::from_value(raw.clone()).ok()
    } else {
        None
    }
}

/// Coerce one raw result into the shape its operation kind requires
fn typed_result(kind: OperationKind, raw: &Value) -> Result<OperationResult> {
    let mismatch = || {
        Error::Protocol(format!(
            "result for {} operation has unexpected shape: {}",
            kind.wire_name(),
            raw
        ))
    };

    match kind {
        OperationKind::Create | OperationKind::Update => raw
            .as_object()
            .map(|record| OperationResult::Record(record.clone()))
            .ok_or_else(mismatch),
        OperationKind::CreateBulk => raw
            .as_array()
            .and_then(|ids| {
                ids.iter()
                    .map(|id| id.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
            })
            .map(OperationResult::ObjectIds)
            .ok_or_else(mismatch),
        OperationKind::UpdateBulk
        | OperationKind::DeleteBulk
        | OperationKind::AddRelation
        | OperationKind::SetRelation
        | OperationKind::DeleteRelation => raw
            .as_u64()
            .map(OperationResult::Affected)
            .ok_or_else(mismatch),
        OperationKind::Delete => raw
            .as_i64()
            .map(OperationResult::DeletionTime)
            .ok_or_else(mismatch),
        OperationKind::Find => raw
            .as_array()
            .and_then(|records| {
                records
                    .iter()
                    .map(|record| record.as_object().cloned())
                    .collect::<Option<Vec<_>>>()
            })
            .map(OperationResult::Records)
            .ok_or_else(mismatch),
    }
}

/// Fan the raw response out to every handle staged in this build cycle
pub(crate) fn distribute(raw: Value, handles: &[OpResult]) -> Result<UnitOfWorkResult> {
    if let Some(error) = parse_failure(&raw) {
        warn!(
            "transaction rolled back at {}: {}",
            error.operation.op_result_id, error.message
        );
        let mut matched = false;
        for handle in handles {
            if handle.op_result_id() == error.operation.op_result_id {
                handle.set_error(error.clone());
                matched = true;
                break;
            }
        }
        if !matched {
            return Err(Error::Protocol(format!(
                "failure names unknown operation '{}'",
                error.operation.op_result_id
            )));
        }
        return Ok(UnitOfWorkResult {
            success: false,
            results: None,
            error: Some(error),
        });
    }

    let entries: HashMap<String, OperationResultEntry> = serde_json::from_value(raw)
        .map_err(|e| Error::Protocol(format!("malformed success response: {}", e)))?;

    let mut results = HashMap::with_capacity(handles.len());
    for handle in handles {
        let id = handle.op_result_id();
        let entry = entries
            .get(&id)
            .ok_or_else(|| Error::Protocol(format!("response is missing result for '{}'", id)))?;
        if entry.operation_type != handle.kind() {
            return Err(Error::Protocol(format!(
                "result for '{}' reports {} but {} was staged",
                id, entry.operation_type, handle.kind()
            )));
        }
        handle.set_result(typed_result(handle.kind(), &entry.result)?);
        results.insert(id, entry.clone());
    }

    for id in entries.keys() {
        if !results.contains_key(id) {
            return Err(Error::Protocol(format!(
                "response carries result for unknown operation '{}'",
                id
            )));
        }
    }

    debug!("distributed results for {} operations", handles.len());
    Ok(UnitOfWorkResult {
        success: true,
        results: Some(results),
        error: None,
    })
}
