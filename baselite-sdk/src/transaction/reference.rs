// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Argument normalization
//!
//! Nearly every staging method accepts several argument shapes for the same
//! slot: a bare identifier, a record, an entity instance, an operation
//! handle, or an indexed view of one. This module is the single place that
//! sniffs the shape and decides literal-vs-deferred-reference: handles from
//! the *current* Unit-of-Work always become reference tokens, everything else
//! is serialized literally. A handle from a different Unit-of-Work is a
//! programmer error and is rejected eagerly, before any network activity.

use serde::Serialize;
use serde_json::{Map, Value};

use super::op_result::{OpResult, OpResultIndex};
use super::payload::TxValue;
use crate::entity::{entity_record, json_type_name, TableBinding, DEFAULT_KEY_COLUMN};
use crate::error::{Error, Result};

/// An argument slot that resolves to a single record identifier
#[derive(Debug, Clone)]
pub enum RecordTarget {
    /// Bare identifier string
    ObjectId(String),
    /// Record object; its identifier column is extracted at staging time
    Record(Map<String, Value>),
    /// Whole result of an earlier staged operation
    Result(OpResult),
    /// One element of an earlier operation's array result
    ResultIndex(OpResultIndex),
}

impl RecordTarget {
    /// Build a target from an entity instance, extracting its identifier via
    /// the [`TableBinding`] key column
    pub fn entity<T: Serialize + TableBinding>(entity: &T) -> Result<Self> {
        let record = entity_record(entity)?;
        match record.get(T::key_column()) {
            Some(Value::String(id)) if !id.is_empty() => Ok(RecordTarget::ObjectId(id.clone())),
            _ => Err(Error::usage(format!(
                "entity for table '{}' has no '{}' value",
                T::table_name(),
                T::key_column()
            ))),
        }
    }

    /// Resolve into a literal identifier or a reference token
    pub(crate) fn resolve(self, uow_id: u64) -> Result<TxValue> {
        match self {
            RecordTarget::ObjectId(id) => {
                if id.is_empty() {
                    return Err(Error::usage("object id must not be empty"));
                }
                Ok(TxValue::Literal(Value::String(id)))
            }
            RecordTarget::Record(record) => match record.get(DEFAULT_KEY_COLUMN) {
                Some(Value::String(id)) if !id.is_empty() => {
                    Ok(TxValue::Literal(Value::String(id.clone())))
                }
                _ => Err(Error::usage(format!(
                    "record has no '{}' value",
                    DEFAULT_KEY_COLUMN
                ))),
            },
            RecordTarget::Result(handle) => {
                check_ownership(&handle, uow_id)?;
                Ok(TxValue::Reference(handle.reference()))
            }
            RecordTarget::ResultIndex(view) => {
                check_ownership_indexed(&view, uow_id)?;
                Ok(TxValue::Reference(view.reference()))
            }
        }
    }
}

impl From<&str> for RecordTarget {
    fn from(id: &str) -> Self {
        RecordTarget::ObjectId(id.to_string())
    }
}

impl From<String> for RecordTarget {
    fn from(id: String) -> Self {
        RecordTarget::ObjectId(id)
    }
}

impl From<Map<String, Value>> for RecordTarget {
    fn from(record: Map<String, Value>) -> Self {
        RecordTarget::Record(record)
    }
}

impl From<OpResult> for RecordTarget {
    fn from(handle: OpResult) -> Self {
        RecordTarget::Result(handle)
    }
}

impl From<&OpResult> for RecordTarget {
    fn from(handle: &OpResult) -> Self {
        RecordTarget::Result(handle.clone())
    }
}

impl From<OpResultIndex> for RecordTarget {
    fn from(view: OpResultIndex) -> Self {
        RecordTarget::ResultIndex(view)
    }
}

impl From<&OpResultIndex> for RecordTarget {
    fn from(view: &OpResultIndex) -> Self {
        RecordTarget::ResultIndex(view.clone())
    }
}

/// A slot that must be an operation handle (whole or indexed); carries its
/// own table, so no table argument is needed
#[derive(Debug, Clone)]
pub enum HandleRef {
    Result(OpResult),
    ResultIndex(OpResultIndex),
}

impl HandleRef {
    pub(crate) fn table(&self) -> &str {
        match self {
            HandleRef::Result(handle) => handle.table(),
            HandleRef::ResultIndex(view) => view.table(),
        }
    }

    pub(crate) fn resolve(self, uow_id: u64) -> Result<TxValue> {
        match self {
            HandleRef::Result(handle) => {
                check_ownership(&handle, uow_id)?;
                Ok(TxValue::Reference(handle.reference()))
            }
            HandleRef::ResultIndex(view) => {
                check_ownership_indexed(&view, uow_id)?;
                Ok(TxValue::Reference(view.reference()))
            }
        }
    }
}

impl From<OpResult> for HandleRef {
    fn from(handle: OpResult) -> Self {
        HandleRef::Result(handle)
    }
}

impl From<&OpResult> for HandleRef {
    fn from(handle: &OpResult) -> Self {
        HandleRef::Result(handle.clone())
    }
}

impl From<OpResultIndex> for HandleRef {
    fn from(view: OpResultIndex) -> Self {
        HandleRef::ResultIndex(view)
    }
}

impl From<&OpResultIndex> for HandleRef {
    fn from(view: &OpResultIndex) -> Self {
        HandleRef::ResultIndex(view.clone())
    }
}

/// A column value that may itself be a deferred reference
#[derive(Debug, Clone)]
pub enum TxInput {
    Value(Value),
    Result(OpResult),
    ResultIndex(OpResultIndex),
}

impl TxInput {
    pub(crate) fn resolve(self, uow_id: u64) -> Result<TxValue> {
        match self {
            TxInput::Value(value) => Ok(TxValue::Literal(value)),
            TxInput::Result(handle) => {
                check_ownership(&handle, uow_id)?;
                Ok(TxValue::Reference(handle.reference()))
            }
            TxInput::ResultIndex(view) => {
                check_ownership_indexed(&view, uow_id)?;
                Ok(TxValue::Reference(view.reference()))
            }
        }
    }
}

impl From<Value> for TxInput {
    fn from(value: Value) -> Self {
        TxInput::Value(value)
    }
}

impl From<&str> for TxInput {
    fn from(value: &str) -> Self {
        TxInput::Value(Value::String(value.to_string()))
    }
}

impl From<String> for TxInput {
    fn from(value: String) -> Self {
        TxInput::Value(Value::String(value))
    }
}

impl From<i64> for TxInput {
    fn from(value: i64) -> Self {
        TxInput::Value(value.into())
    }
}

impl From<f64> for TxInput {
    fn from(value: f64) -> Self {
        TxInput::Value(value.into())
    }
}

impl From<bool> for TxInput {
    fn from(value: bool) -> Self {
        TxInput::Value(Value::Bool(value))
    }
}

impl From<OpResult> for TxInput {
    fn from(handle: OpResult) -> Self {
        TxInput::Result(handle)
    }
}

impl From<&OpResult> for TxInput {
    fn from(handle: &OpResult) -> Self {
        TxInput::Result(handle.clone())
    }
}

impl From<OpResultIndex> for TxInput {
    fn from(view: OpResultIndex) -> Self {
        TxInput::ResultIndex(view)
    }
}

impl From<&OpResultIndex> for TxInput {
    fn from(view: &OpResultIndex) -> Self {
        TxInput::ResultIndex(view.clone())
    }
}

/// Selector for bulk updates/deletes: a where clause, an explicit list of
/// targets, or the whole array result of an earlier FIND / CREATE_BULK
#[derive(Debug, Clone)]
pub enum BulkCondition {
    WhereClause(String),
    Items(Vec<RecordTarget>),
    Result(OpResult),
}

impl BulkCondition {
    /// Resolve into the `conditional` or `unconditional` payload slot
    pub(crate) fn resolve(self, uow_id: u64) -> Result<(&'static str, TxValue)> {
        match self {
            BulkCondition::WhereClause(clause) => {
                if clause.is_empty() {
                    return Err(Error::usage("where clause must not be empty"));
                }
                Ok(("conditional", TxValue::Literal(Value::String(clause))))
            }
            BulkCondition::Items(items) => {
                if items.is_empty() {
                    return Err(Error::usage("bulk operation needs at least one target"));
                }
                let resolved = items
                    .into_iter()
                    .map(|item| item.resolve(uow_id))
                    .collect::<Result<Vec<_>>>()?;
                Ok(("unconditional", TxValue::Array(resolved)))
            }
            BulkCondition::Result(handle) => {
                check_ownership(&handle, uow_id)?;
                Ok(("unconditional", TxValue::Reference(handle.list_reference())))
            }
        }
    }
}

impl From<&str> for BulkCondition {
    fn from(clause: &str) -> Self {
        BulkCondition::WhereClause(clause.to_string())
    }
}

impl From<String> for BulkCondition {
    fn from(clause: String) -> Self {
        BulkCondition::WhereClause(clause)
    }
}

impl<T: Into<RecordTarget>> From<Vec<T>> for BulkCondition {
    fn from(items: Vec<T>) -> Self {
        BulkCondition::Items(items.into_iter().map(Into::into).collect())
    }
}

impl From<OpResult> for BulkCondition {
    fn from(handle: OpResult) -> Self {
        BulkCondition::Result(handle)
    }
}

impl From<&OpResult> for BulkCondition {
    fn from(handle: &OpResult) -> Self {
        BulkCondition::Result(handle.clone())
    }
}

/// Parent side of a relation mutation: either an explicit table plus target,
/// or a handle that carries its own table
#[derive(Debug, Clone)]
pub enum RelationParent {
    Table { table: String, target: RecordTarget },
    Handle(HandleRef),
}

impl RelationParent {
    /// Build a parent from an entity instance
    pub fn entity<T: Serialize + TableBinding>(entity: &T) -> Result<Self> {
        Ok(RelationParent::Table {
            table: T::table_name().to_string(),
            target: RecordTarget::entity(entity)?,
        })
    }

    pub(crate) fn table(&self) -> &str {
        match self {
            RelationParent::Table { table, .. } => table,
            RelationParent::Handle(handle) => handle.table(),
        }
    }

    pub(crate) fn resolve(self, uow_id: u64) -> Result<TxValue> {
        match self {
            RelationParent::Table { target, .. } => target.resolve(uow_id),
            RelationParent::Handle(handle) => handle.resolve(uow_id),
        }
    }
}

impl<S: Into<String>, T: Into<RecordTarget>> From<(S, T)> for RelationParent {
    fn from((table, target): (S, T)) -> Self {
        RelationParent::Table {
            table: table.into(),
            target: target.into(),
        }
    }
}

impl From<OpResult> for RelationParent {
    fn from(handle: OpResult) -> Self {
        RelationParent::Handle(HandleRef::Result(handle))
    }
}

impl From<&OpResult> for RelationParent {
    fn from(handle: &OpResult) -> Self {
        RelationParent::Handle(HandleRef::Result(handle.clone()))
    }
}

impl From<OpResultIndex> for RelationParent {
    fn from(view: OpResultIndex) -> Self {
        RelationParent::Handle(HandleRef::ResultIndex(view))
    }
}

impl From<&OpResultIndex> for RelationParent {
    fn from(view: &OpResultIndex) -> Self {
        RelationParent::Handle(HandleRef::ResultIndex(view.clone()))
    }
}

/// Children side of a relation mutation: a server-side where clause, or a
/// list mixing identifiers, records, and references freely
#[derive(Debug, Clone)]
pub enum RelationChildren {
    WhereClause(String),
    Items(Vec<RecordTarget>),
}

impl RelationChildren {
    /// Children given as identifier strings
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RelationChildren::Items(
            ids.into_iter()
                .map(|id| RecordTarget::ObjectId(id.into()))
                .collect(),
        )
    }

    /// Children given as entity instances
    pub fn entities<T: Serialize + TableBinding>(entities: &[T]) -> Result<Self> {
        let items = entities
            .iter()
            .map(RecordTarget::entity)
            .collect::<Result<Vec<_>>>()?;
        Ok(RelationChildren::Items(items))
    }

    /// Children given as record values; each must carry an identifier
    pub fn records(records: Vec<Value>) -> Result<Self> {
        let items = records
            .into_iter()
            .map(|record| match record {
                Value::Object(map) => Ok(RecordTarget::Record(map)),
                other => Err(Error::usage(format!(
                    "relation child must be a record object, got {}",
                    json_type_name(&other)
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RelationChildren::Items(items))
    }

    /// Resolve into the `conditional` or `unconditional` payload slot
    pub(crate) fn resolve(self, uow_id: u64) -> Result<(&'static str, TxValue)> {
        match self {
            RelationChildren::WhereClause(clause) => {
                if clause.is_empty() {
                    return Err(Error::usage("children where clause must not be empty"));
                }
                Ok(("conditional", TxValue::Literal(Value::String(clause))))
            }
            RelationChildren::Items(items) => {
                if items.is_empty() {
                    return Err(Error::usage("relation needs at least one child"));
                }
                let resolved = items
                    .into_iter()
                    .map(|item| item.resolve(uow_id))
                    .collect::<Result<Vec<_>>>()?;
                Ok(("unconditional", TxValue::Array(resolved)))
            }
        }
    }
}

impl From<&str> for RelationChildren {
    fn from(clause: &str) -> Self {
        RelationChildren::WhereClause(clause.to_string())
    }
}

impl From<String> for RelationChildren {
    fn from(clause: String) -> Self {
        RelationChildren::WhereClause(clause)
    }
}

impl<T: Into<RecordTarget>> From<Vec<T>> for RelationChildren {
    fn from(items: Vec<T>) -> Self {
        RelationChildren::Items(items.into_iter().map(Into::into).collect())
    }
}

impl From<OpResult> for RelationChildren {
    fn from(handle: OpResult) -> Self {
        RelationChildren::Items(vec![RecordTarget::Result(handle)])
    }
}

impl From<&OpResult> for RelationChildren {
    fn from(handle: &OpResult) -> Self {
        RelationChildren::Items(vec![RecordTarget::Result(handle.clone())])
    }
}

impl From<OpResultIndex> for RelationChildren {
    fn from(view: OpResultIndex) -> Self {
        RelationChildren::Items(vec![RecordTarget::ResultIndex(view)])
    }
}

fn check_ownership(handle: &OpResult, uow_id: u64) -> Result<()> {
    if handle.same_unit_of_work(uow_id) {
        Ok(())
    } else {
        Err(Error::usage(format!(
            "operation '{}' belongs to a different unit of work",
            handle.op_result_id()
        )))
    }
}

fn check_ownership_indexed(view: &OpResultIndex, uow_id: u64) -> Result<()> {
    if view.same_unit_of_work(uow_id) {
        Ok(())
    } else {
        Err(Error::usage(format!(
            "operation '{}' belongs to a different unit of work",
            view.parent().op_result_id()
        )))
    }
}
