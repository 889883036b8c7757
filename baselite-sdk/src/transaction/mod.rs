// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Unit-of-Work transaction coordinator
//!
//! A [`UnitOfWork`] stages an arbitrary number of heterogeneous data
//! operations client-side and submits them as one atomic server-side
//! transaction. Later-staged operations may reference the not-yet-known
//! result of earlier ones: every staging method returns an [`OpResult`]
//! handle that can be passed (whole, or as an indexed view) into subsequent
//! calls, where it compiles into a reference token instead of a literal
//! value. The server executes operations in staging order and commits
//! all-or-nothing.
//!
//! ```ignore
//! let mut uow = UnitOfWork::new(executor);
//! let person = uow.create("Person", json!({ "name": "Bob" }))?;
//! let order = uow.create("Order", json!({ "price": 1234 }))?;
//! uow.add_to_relation(&person, "order", &order)?;
//!
//! let summary = uow.execute().await?;
//! assert!(summary.is_success());
//! ```

pub mod operation;
pub mod op_result;
pub mod reference;
pub mod result;

mod id;
mod payload;

pub use operation::{IsolationLevel, OperationKind};
pub use op_result::{OpResult, OpResultIndex};
pub use reference::{
    BulkCondition, HandleRef, RecordTarget, RelationChildren, RelationParent, TxInput,
};
pub use result::{
    FailedOperation, OperationResult, OperationResultEntry, TransactionOperationError,
    UnitOfWorkResult,
};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::entity::{entity_record, json_type_name, TableBinding, DEFAULT_KEY_COLUMN};
use crate::error::{Error, Result};
use crate::query::DataQuery;
use crate::transport::TransactionExecutor;

use id::OpResultIdGenerator;
use operation::OperationDescriptor;
use payload::{IdCell, TxValue};

/// Distinguishes Unit-of-Work instances so a handle staged on one can never
/// be referenced from another
static NEXT_UOW_ID: AtomicU64 = AtomicU64::new(1);

/// Client-side builder for one atomic server-side transaction.
///
/// Staging methods are synchronous and perform no I/O; `execute()` is the
/// single network round trip. An instance is single-use: build a second batch
/// with a new instance (which gets its own id allocator, keeping generated
/// ids deterministic and collision-free).
pub struct UnitOfWork {
    executor: Arc<dyn TransactionExecutor>,
    uow_id: u64,
    isolation: Option<IsolationLevel>,
    ids: OpResultIdGenerator,
    operations: Vec<OperationDescriptor>,
    handles: Vec<OpResult>,
    executed: bool,
}

impl UnitOfWork {
    /// Create an empty Unit-of-Work bound to a transaction executor
    pub fn new(executor: Arc<dyn TransactionExecutor>) -> Self {
        Self {
            executor,
            uow_id: NEXT_UOW_ID.fetch_add(1, Ordering::Relaxed),
            isolation: None,
            ids: OpResultIdGenerator::new(),
            operations: Vec::new(),
            handles: Vec::new(),
            executed: false,
        }
    }

    /// Number of operations staged so far
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Isolation level applied to the whole transaction
    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation
    }

    /// Set the transaction-wide isolation level, reflected verbatim in the
    /// compiled payload
    pub fn set_isolation_level(&mut self, level: IsolationLevel) {
        self.isolation = Some(level);
    }

    /// Override a generated op-result id before execution.
    ///
    /// Allowed once per operation; the new id must stay unique within this
    /// Unit-of-Work. Reference tokens already staged against the handle
    /// follow the override automatically.
    pub fn set_op_result_id(&mut self, handle: &OpResult, new_id: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        if !handle.same_unit_of_work(self.uow_id) {
            return Err(Error::usage(
                "handle belongs to a different unit of work",
            ));
        }
        let new_id = new_id.into();
        if new_id.is_empty() {
            return Err(Error::usage("op result id must not be empty"));
        }
        if self
            .operations
            .iter()
            .any(|op| op.op_result_id() == new_id)
        {
            return Err(Error::usage(format!(
                "op result id '{}' is already in use",
                new_id
            )));
        }
        if !handle.mark_renamed() {
            return Err(Error::usage(format!(
                "op result id of '{}' was already overridden",
                handle.op_result_id()
            )));
        }
        debug!("renaming {} to {}", handle.op_result_id(), new_id);
        *handle.id_cell().write() = new_id;
        Ok(())
    }

    // --- create ---

    /// Stage a CREATE of one record
    pub fn create(&mut self, table: impl Into<String>, record: Value) -> Result<OpResult> {
        self.ensure_open()?;
        let record = require_object(record, "create")?;
        Ok(self.stage(
            OperationKind::Create,
            table.into(),
            TxValue::Literal(Value::Object(record)),
        ))
    }

    /// Stage a CREATE of an entity instance; the table comes from its
    /// [`TableBinding`]
    pub fn create_entity<T: Serialize + TableBinding>(&mut self, entity: &T) -> Result<OpResult> {
        self.ensure_open()?;
        let record = entity_record(entity)?;
        Ok(self.stage(
            OperationKind::Create,
            T::table_name().to_string(),
            TxValue::Literal(Value::Object(record)),
        ))
    }

    /// Stage a CREATE_BULK of a list of records.
    ///
    /// The server rejects more than 100 records per bulk create; that limit
    /// is deliberately not enforced here — it surfaces as a transactional
    /// failure naming this operation, and the client never splits or retries.
    pub fn bulk_create(
        &mut self,
        table: impl Into<String>,
        records: Vec<Value>,
    ) -> Result<OpResult> {
        self.ensure_open()?;
        if records.is_empty() {
            return Err(Error::usage("bulk create needs at least one record"));
        }
        let records = records
            .into_iter()
            .map(|record| require_object(record, "bulk create").map(Value::Object))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.stage(
            OperationKind::CreateBulk,
            table.into(),
            TxValue::Literal(Value::Array(records)),
        ))
    }

    /// Stage a CREATE_BULK of entity instances
    pub fn bulk_create_entities<T: Serialize + TableBinding>(
        &mut self,
        entities: &[T],
    ) -> Result<OpResult> {
        self.ensure_open()?;
        if entities.is_empty() {
            return Err(Error::usage("bulk create needs at least one record"));
        }
        let records = entities
            .iter()
            .map(|entity| entity_record(entity).map(Value::Object))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.stage(
            OperationKind::CreateBulk,
            T::table_name().to_string(),
            TxValue::Literal(Value::Array(records)),
        ))
    }

    // --- update ---

    /// Stage an UPDATE of one record; the record must carry its identifier
    pub fn update(&mut self, table: impl Into<String>, record: Value) -> Result<OpResult> {
        self.ensure_open()?;
        let record = require_object(record, "update")?;
        require_key(&record, DEFAULT_KEY_COLUMN)?;
        Ok(self.stage(
            OperationKind::Update,
            table.into(),
            TxValue::Literal(Value::Object(record)),
        ))
    }

    /// Stage an UPDATE of an entity instance
    pub fn update_entity<T: Serialize + TableBinding>(&mut self, entity: &T) -> Result<OpResult> {
        self.ensure_open()?;
        let mut record = entity_record(entity)?;
        // The wire identifier column is always objectId; remap a custom key
        if T::key_column() != DEFAULT_KEY_COLUMN {
            if let Some(id) = record.remove(T::key_column()) {
                record.insert(DEFAULT_KEY_COLUMN.to_string(), id);
            }
        }
        require_key(&record, DEFAULT_KEY_COLUMN)?;
        Ok(self.stage(
            OperationKind::Update,
            T::table_name().to_string(),
            TxValue::Literal(Value::Object(record)),
        ))
    }

    /// Stage an UPDATE of one column on the record an earlier operation
    /// resolves to; the value may itself be a handle
    pub fn update_field(
        &mut self,
        target: impl Into<HandleRef>,
        column: impl Into<String>,
        value: impl Into<TxInput>,
    ) -> Result<OpResult> {
        self.ensure_open()?;
        let target = target.into();
        let column = require_column(column.into())?;
        let table = target.table().to_string();
        let payload = TxValue::Object(vec![
            (
                DEFAULT_KEY_COLUMN.to_string(),
                target.resolve(self.uow_id)?,
            ),
            (column, value.into().resolve(self.uow_id)?),
        ]);
        Ok(self.stage(OperationKind::Update, table, payload))
    }

    /// Stage an UPDATE_BULK applying the same changes to every record
    /// selected by the condition
    pub fn bulk_update(
        &mut self,
        table: impl Into<String>,
        condition: impl Into<BulkCondition>,
        changes: Value,
    ) -> Result<OpResult> {
        self.ensure_open()?;
        let changes = require_object(changes, "bulk update changes")?;
        let (slot, selector) = condition.into().resolve(self.uow_id)?;
        let payload = TxValue::Object(vec![
            (slot.to_string(), selector),
            (
                "changes".to_string(),
                TxValue::Literal(Value::Object(changes)),
            ),
        ]);
        Ok(self.stage(OperationKind::UpdateBulk, table.into(), payload))
    }

    // --- delete ---

    /// Stage a DELETE of one record given its table and an identifier-shaped
    /// target (bare id, record, handle, or indexed view)
    pub fn delete(
        &mut self,
        table: impl Into<String>,
        target: impl Into<RecordTarget>,
    ) -> Result<OpResult> {
        self.ensure_open()?;
        let payload = target.into().resolve(self.uow_id)?;
        Ok(self.stage(OperationKind::Delete, table.into(), payload))
    }

    /// Stage a DELETE of an entity instance
    pub fn delete_entity<T: Serialize + TableBinding>(&mut self, entity: &T) -> Result<OpResult> {
        self.ensure_open()?;
        let payload = RecordTarget::entity(entity)?.resolve(self.uow_id)?;
        Ok(self.stage(
            OperationKind::Delete,
            T::table_name().to_string(),
            payload,
        ))
    }

    /// Stage a DELETE of the record an earlier operation resolves to; the
    /// table comes from the handle
    pub fn delete_result(&mut self, target: impl Into<HandleRef>) -> Result<OpResult> {
        self.ensure_open()?;
        let target = target.into();
        let table = target.table().to_string();
        let payload = target.resolve(self.uow_id)?;
        Ok(self.stage(OperationKind::Delete, table, payload))
    }

    /// Stage a DELETE_BULK of every record selected by the condition
    pub fn bulk_delete(
        &mut self,
        table: impl Into<String>,
        condition: impl Into<BulkCondition>,
    ) -> Result<OpResult> {
        self.ensure_open()?;
        let (slot, selector) = condition.into().resolve(self.uow_id)?;
        let payload = TxValue::Object(vec![(slot.to_string(), selector)]);
        Ok(self.stage(OperationKind::DeleteBulk, table.into(), payload))
    }

    // --- find ---

    /// Stage a FIND; the query descriptor is serialized as given
    pub fn find(&mut self, table: impl Into<String>, query: DataQuery) -> Result<OpResult> {
        self.ensure_open()?;
        let payload = TxValue::Literal(serde_json::to_value(query)?);
        Ok(self.stage(OperationKind::Find, table.into(), payload))
    }

    // --- relations ---

    /// Stage an ADD_RELATION linking children to the parent's relation column
    pub fn add_to_relation(
        &mut self,
        parent: impl Into<RelationParent>,
        column: impl Into<String>,
        children: impl Into<RelationChildren>,
    ) -> Result<OpResult> {
        self.stage_relation(OperationKind::AddRelation, parent.into(), column, children)
    }

    /// Stage a SET_RELATION replacing the parent's relation column contents
    pub fn set_relation(
        &mut self,
        parent: impl Into<RelationParent>,
        column: impl Into<String>,
        children: impl Into<RelationChildren>,
    ) -> Result<OpResult> {
        self.stage_relation(OperationKind::SetRelation, parent.into(), column, children)
    }

    /// Stage a DELETE_RELATION unlinking children from the parent's relation
    /// column
    pub fn delete_relation(
        &mut self,
        parent: impl Into<RelationParent>,
        column: impl Into<String>,
        children: impl Into<RelationChildren>,
    ) -> Result<OpResult> {
        self.stage_relation(
            OperationKind::DeleteRelation,
            parent.into(),
            column,
            children,
        )
    }

    fn stage_relation(
        &mut self,
        kind: OperationKind,
        parent: RelationParent,
        column: impl Into<String>,
        children: impl Into<RelationChildren>,
    ) -> Result<OpResult> {
        self.ensure_open()?;
        let column = require_column(column.into())?;
        let table = parent.table().to_string();
        let parent_value = parent.resolve(self.uow_id)?;
        let (slot, children_value) = children.into().resolve(self.uow_id)?;
        let payload = TxValue::Object(vec![
            ("parentObject".to_string(), parent_value),
            (
                "relationColumn".to_string(),
                TxValue::Literal(Value::String(column)),
            ),
            (slot.to_string(), children_value),
        ]);
        Ok(self.stage(kind, table, payload))
    }

    // --- execution ---

    /// Compile the staged operations and perform the single round trip.
    ///
    /// Returns a successful summary with every handle populated, or a failed
    /// summary whose error names the one rejected operation (the whole batch
    /// is rolled back server-side). Transport faults surface as
    /// [`Error::Transport`]. A Unit-of-Work executes at most once.
    pub async fn execute(&mut self) -> Result<UnitOfWorkResult> {
        self.ensure_open()?;
        if self.operations.is_empty() {
            return Err(Error::usage("unit of work has no staged operations"));
        }
        self.executed = true;

        let payload = self.compile();
        info!(
            "executing unit of work with {} operations",
            self.operations.len()
        );
        let raw = self.executor.send(payload).await?;
        result::distribute(raw, &self.handles)
    }

    /// Serialize the ordered descriptor list into the outbound transaction
    /// payload, with references as tokens instead of values
    fn compile(&self) -> Value {
        let mut root = Map::new();
        if let Some(level) = self.isolation {
            root.insert(
                "isolationLevelEnum".to_string(),
                Value::String(level.wire_name().to_string()),
            );
        }
        root.insert(
            "operations".to_string(),
            Value::Array(self.operations.iter().map(OperationDescriptor::compile).collect()),
        );
        Value::Object(root)
    }

    fn stage(&mut self, kind: OperationKind, table: String, payload: TxValue) -> OpResult {
        // An id override may have claimed a value the allocator would hand
        // out later; redraw until the id is free within this batch
        let mut id = self.ids.allocate(kind, &table);
        while self.operations.iter().any(|op| op.op_result_id() == id) {
            id = self.ids.allocate(kind, &table);
        }
        debug!("staged {} on '{}' as {}", kind, table, id);
        let cell: IdCell = Arc::new(RwLock::new(id));
        let handle = OpResult::new(self.uow_id, kind, table.clone(), cell.clone());
        self.operations
            .push(OperationDescriptor::new(cell, kind, table, payload));
        self.handles.push(handle.clone());
        handle
    }

    fn ensure_open(&self) -> Result<()> {
        if self.executed {
            Err(Error::usage(
                "unit of work was already executed; build a new instance",
            ))
        } else {
            Ok(())
        }
    }
}

fn require_object(value: Value, what: &str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::usage(format!(
            "{} expects a record object, got {}",
            what,
            json_type_name(&other)
        ))),
    }
}

fn require_key(record: &Map<String, Value>, key: &str) -> Result<()> {
    match record.get(key) {
        Some(Value::String(id)) if !id.is_empty() => Ok(()),
        _ => Err(Error::usage(format!("record has no '{}' value", key))),
    }
}

fn require_column(column: String) -> Result<String> {
    if column.is_empty() {
        Err(Error::usage("column name must not be empty"))
    } else {
        Ok(column)
    }
}
