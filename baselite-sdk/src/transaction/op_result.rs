// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Operation handles
//!
//! Every staging call returns an [`OpResult`]: a cheap-clone handle that is a
//! placeholder before `execute()` and carries the operation's typed result
//! (or its failure report) afterwards. Handles double as deferred references:
//! passing one into a later staging call makes the server substitute the
//! earlier operation's result at commit time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::operation::OperationKind;
use super::payload::{IdCell, OpReference};
use super::result::{OperationResult, TransactionOperationError};
use crate::entity::DEFAULT_KEY_COLUMN;

/// Outcome cell, written exactly once by result distribution.
///
/// `Pending` after a failed transaction is deliberate: only the operation the
/// server names as failing carries an error; siblings that never ran remotely
/// stay unset so the two states are distinguishable.
#[derive(Debug)]
enum Outcome {
    Pending,
    Succeeded(OperationResult),
    Failed(TransactionOperationError),
}

#[derive(Debug)]
struct OpResultShared {
    uow_id: u64,
    kind: OperationKind,
    table: String,
    id: IdCell,
    renamed: AtomicBool,
    outcome: RwLock<Outcome>,
}

/// Handle to one staged operation, owned by the Unit-of-Work that staged it
#[derive(Debug, Clone)]
pub struct OpResult {
    shared: Arc<OpResultShared>,
}

impl OpResult {
    pub(crate) fn new(uow_id: u64, kind: OperationKind, table: String, id: IdCell) -> Self {
        Self {
            shared: Arc::new(OpResultShared {
                uow_id,
                kind,
                table,
                id,
                renamed: AtomicBool::new(false),
                outcome: RwLock::new(Outcome::Pending),
            }),
        }
    }

    /// Kind of the staged operation
    pub fn kind(&self) -> OperationKind {
        self.shared.kind
    }

    /// Target table of the staged operation
    pub fn table(&self) -> &str {
        &self.shared.table
    }

    /// Current op-result id (reflects a pre-execute override)
    pub fn op_result_id(&self) -> String {
        self.shared.id.read().clone()
    }

    /// Typed result, populated only after a successful `execute()`
    pub fn result(&self) -> Option<OperationResult> {
        match &*self.shared.outcome.read() {
            Outcome::Succeeded(result) => Some(result.clone()),
            _ => None,
        }
    }

    /// Failure report, populated only when this operation was the one the
    /// server rejected
    pub fn error(&self) -> Option<TransactionOperationError> {
        match &*self.shared.outcome.read() {
            Outcome::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// Indexed view of this handle's array-shaped result, usable wherever a
    /// reference is accepted
    pub fn resolve_to(&self, index: usize) -> OpResultIndex {
        OpResultIndex {
            parent: self.clone(),
            index,
        }
    }

    pub(crate) fn same_unit_of_work(&self, uow_id: u64) -> bool {
        self.shared.uow_id == uow_id
    }

    pub(crate) fn id_cell(&self) -> IdCell {
        self.shared.id.clone()
    }

    /// Returns false if the id was already overridden once
    pub(crate) fn mark_renamed(&self) -> bool {
        !self.shared.renamed.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn set_result(&self, result: OperationResult) {
        let mut outcome = self.shared.outcome.write();
        debug_assert!(matches!(*outcome, Outcome::Pending));
        *outcome = Outcome::Succeeded(result);
    }

    pub(crate) fn set_error(&self, error: TransactionOperationError) {
        let mut outcome = self.shared.outcome.write();
        debug_assert!(matches!(*outcome, Outcome::Pending));
        *outcome = Outcome::Failed(error);
    }

    /// Reference to this operation's whole result. Record-shaped results
    /// (CREATE, UPDATE) resolve to their identifier column when used in an
    /// identifier slot.
    pub(crate) fn reference(&self) -> OpReference {
        let prop = match self.shared.kind {
            OperationKind::Create | OperationKind::Update => {
                Some(DEFAULT_KEY_COLUMN.to_string())
            }
            _ => None,
        };
        OpReference::new(self.id_cell(), None, prop)
    }

    /// Reference to this operation's whole result with no column projection,
    /// used where the server expects the result list itself (e.g. the
    /// `unconditional` slot of a bulk operation)
    pub(crate) fn list_reference(&self) -> OpReference {
        OpReference::new(self.id_cell(), None, None)
    }
}

/// Lightweight indexed view: one element of an array-shaped result
/// (FIND or CREATE_BULK)
#[derive(Debug, Clone)]
pub struct OpResultIndex {
    parent: OpResult,
    index: usize,
}

impl OpResultIndex {
    /// Handle this view indexes into
    pub fn parent(&self) -> &OpResult {
        &self.parent
    }

    /// Position within the referenced operation's array result
    pub fn index(&self) -> usize {
        self.index
    }

    /// Target table, inherited from the parent handle
    pub fn table(&self) -> &str {
        self.parent.table()
    }

    pub(crate) fn same_unit_of_work(&self, uow_id: u64) -> bool {
        self.parent.same_unit_of_work(uow_id)
    }

    /// Reference to the indexed element. FIND elements are records, so an
    /// identifier slot projects their identifier column; CREATE_BULK elements
    /// already are identifiers.
    pub(crate) fn reference(&self) -> OpReference {
        let prop = match self.parent.kind() {
            OperationKind::Find => Some(DEFAULT_KEY_COLUMN.to_string()),
            _ => None,
        };
        OpReference::new(self.parent.id_cell(), Some(self.index), prop)
    }
}
