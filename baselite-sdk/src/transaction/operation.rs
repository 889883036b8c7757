// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Operation descriptors
//!
//! One [`OperationDescriptor`] is appended per staging call and consumed
//! exactly once when the Unit-of-Work compiles its outbound payload.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::payload::{IdCell, TxValue};

/// Closed set of operation kinds a Unit-of-Work can stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Create,
    CreateBulk,
    Update,
    UpdateBulk,
    Delete,
    DeleteBulk,
    Find,
    AddRelation,
    SetRelation,
    DeleteRelation,
}

impl OperationKind {
    /// Wire name sent as `operationType`
    pub fn wire_name(self) -> &'static str {
        match self {
            OperationKind::Create => "CREATE",
            OperationKind::CreateBulk => "CREATE_BULK",
            OperationKind::Update => "UPDATE",
            OperationKind::UpdateBulk => "UPDATE_BULK",
            OperationKind::Delete => "DELETE",
            OperationKind::DeleteBulk => "DELETE_BULK",
            OperationKind::Find => "FIND",
            OperationKind::AddRelation => "ADD_RELATION",
            OperationKind::SetRelation => "SET_RELATION",
            OperationKind::DeleteRelation => "DELETE_RELATION",
        }
    }

    /// Lowercase token used as the prefix of generated op-result ids
    pub fn id_slug(self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::CreateBulk => "create_bulk",
            OperationKind::Update => "update",
            OperationKind::UpdateBulk => "update_bulk",
            OperationKind::Delete => "delete",
            OperationKind::DeleteBulk => "delete_bulk",
            OperationKind::Find => "find",
            OperationKind::AddRelation => "add_relation",
            OperationKind::SetRelation => "set_relation",
            OperationKind::DeleteRelation => "delete_relation",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Transaction-wide consistency mode, passed through to the server verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn wire_name(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ_UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ_COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE_READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// One staged unit of work: kind, target table, payload.
///
/// The op-result id lives in a cell shared with the [`OpResult`] handle and
/// with every reference token staged against this operation, so a pre-execute
/// id override is reflected everywhere at once.
///
/// [`OpResult`]: super::OpResult
#[derive(Debug)]
pub(crate) struct OperationDescriptor {
    id: IdCell,
    kind: OperationKind,
    table: String,
    payload: TxValue,
}

impl OperationDescriptor {
    pub(crate) fn new(id: IdCell, kind: OperationKind, table: String, payload: TxValue) -> Self {
        Self {
            id,
            kind,
            table,
            payload,
        }
    }

    pub(crate) fn op_result_id(&self) -> String {
        self.id.read().clone()
    }

    pub(crate) fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Serialize this descriptor into one element of the outbound
    /// `operations` list, substituting reference tokens for deferred values
    pub(crate) fn compile(&self) -> Value {
        let mut entry = Map::new();
        entry.insert(
            "operationType".to_string(),
            Value::String(self.kind.wire_name().to_string()),
        );
        entry.insert("table".to_string(), Value::String(self.table.clone()));
        entry.insert(
            "opResultId".to_string(),
            Value::String(self.op_result_id()),
        );
        entry.insert("payload".to_string(), self.payload.to_wire());
        Value::Object(entry)
    }
}
