// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Deferred-reference payload model
//!
//! Every payload slot is a [`TxValue`]: either a literal JSON value or a
//! reference to the eventual result of an earlier staged operation. The
//! client never evaluates references; they serialize as wire tokens the
//! server resolves in declaration order at commit time.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Number, Value};

/// Shared op-result-id cell.
///
/// Owned jointly by the operation descriptor, its handle, and every reference
/// token pointing at it, so a pre-execute id override propagates to all of
/// them.
pub(crate) type IdCell = Arc<RwLock<String>>;

/// Marker field distinguishing a reference token from a literal object
pub(crate) const REF_MARKER: &str = "___ref";

/// A deferred pointer to another staged operation's eventual result
#[derive(Debug, Clone)]
pub(crate) struct OpReference {
    id: IdCell,
    /// When set, the reference denotes one element of an array-shaped result
    index: Option<usize>,
    /// When set, the reference denotes a single column of the resolved
    /// record, e.g. `objectId` when the slot expects an identifier
    prop: Option<String>,
}

impl OpReference {
    pub(crate) fn new(id: IdCell, index: Option<usize>, prop: Option<String>) -> Self {
        Self { id, index, prop }
    }

    pub(crate) fn op_result_id(&self) -> String {
        self.id.read().clone()
    }

    fn to_wire(&self) -> Value {
        let mut token = Map::new();
        token.insert(REF_MARKER.to_string(), Value::Bool(true));
        token.insert(
            "opResultId".to_string(),
            Value::String(self.op_result_id()),
        );
        if let Some(index) = self.index {
            token.insert(
                "resultIndex".to_string(),
                Value::Number(Number::from(index)),
            );
        }
        if let Some(prop) = &self.prop {
            token.insert("propName".to_string(), Value::String(prop.clone()));
        }
        Value::Object(token)
    }
}

/// Tagged union over every payload slot: a literal value, a deferred
/// reference, or a composite whose leaves may be either
#[derive(Debug, Clone)]
pub(crate) enum TxValue {
    Literal(Value),
    Reference(OpReference),
    Object(Vec<(String, TxValue)>),
    Array(Vec<TxValue>),
}

impl TxValue {
    /// Serialize into the outbound wire form, substituting reference tokens
    pub(crate) fn to_wire(&self) -> Value {
        match self {
            TxValue::Literal(value) => value.clone(),
            TxValue::Reference(reference) => reference.to_wire(),
            TxValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_wire()))
                    .collect(),
            ),
            TxValue::Array(items) => {
                Value::Array(items.iter().map(TxValue::to_wire).collect())
            }
        }
    }
}
