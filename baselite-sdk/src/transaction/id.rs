// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Op-result id allocation
//!
//! Ids are scoped to one Unit-of-Work instance: a fresh generator is created
//! per instance, so unrelated batches can never collide and a deterministic
//! staging sequence always yields the same ids.

use std::collections::HashMap;

use super::operation::OperationKind;

/// Counter-based id generator keyed by `(kind, table)`
#[derive(Debug, Default)]
pub(crate) struct OpResultIdGenerator {
    counters: HashMap<(OperationKind, String), u32>,
}

impl OpResultIdGenerator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Produce the next id for this `(kind, table)` pair,
    /// e.g. `createPerson1`, `createPerson2`, `add_relationOrder1`
    pub(crate) fn allocate(&mut self, kind: OperationKind, table: &str) -> String {
        let counter = self
            .counters
            .entry((kind, table.to_string()))
            .or_insert(0);
        *counter += 1;
        format!("{}{}{}", kind.id_slug(), table, counter)
    }
}
