// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory stand-in for the hosted transaction endpoint.
//!
//! [`FakeBackend`] implements [`TransactionExecutor`] with real transactional
//! semantics: operations run in declaration order against a working copy,
//! reference tokens resolve to earlier results, and the first rejection rolls
//! the whole batch back and produces the standard failure report. Tests can
//! seed tables, declare relation columns, opt into strict column checking,
//! and inspect the committed state afterwards.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use baselite_sdk::{TransactionExecutor, TransportError};

const BUILTIN_COLUMNS: [&str; 4] = ["objectId", "created", "updated", "ownerId"];
const BULK_CREATE_LIMIT: usize = 100;

type Record = Map<String, Value>;

#[derive(Clone, Default)]
struct State {
    tables: HashMap<String, Vec<Record>>,
    /// (table, objectId, column) -> child object ids
    relations: HashMap<(String, String, String), Vec<String>>,
    next_id: u64,
    clock: i64,
}

pub struct FakeBackend {
    state: Mutex<State>,
    /// (parent table, column) -> child table
    relation_schema: Mutex<HashMap<(String, String), String>>,
    /// Tables with a declared column set reject unknown columns
    columns: Mutex<HashMap<String, HashSet<String>>>,
    last_payload: Mutex<Option<Value>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                clock: 1_700_000_000_000,
                ..State::default()
            }),
            relation_schema: Mutex::new(HashMap::new()),
            columns: Mutex::new(HashMap::new()),
            last_payload: Mutex::new(None),
        }
    }

    /// Declare a relation column so relation mutations and `related`
    /// expansion know the child table
    pub fn declare_relation(&self, table: &str, column: &str, child_table: &str) {
        self.relation_schema
            .lock()
            .insert((table.to_string(), column.to_string()), child_table.to_string());
    }

    /// Declare the full column set of a table; later payloads naming any
    /// other column are rejected like the real service does
    pub fn declare_columns<const N: usize>(&self, table: &str, columns: [&str; N]) {
        let mut set: HashSet<String> = columns.iter().map(|c| c.to_string()).collect();
        for builtin in BUILTIN_COLUMNS {
            set.insert(builtin.to_string());
        }
        self.columns.lock().insert(table.to_string(), set);
    }

    /// Insert a record directly, bypassing the transaction path
    pub fn seed(&self, table: &str, record: Value) {
        let record = record.as_object().expect("seed record must be an object").clone();
        assert!(record.contains_key("objectId"), "seed record needs an objectId");
        self.state
            .lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(record);
    }

    pub fn records(&self, table: &str) -> Vec<Record> {
        self.state
            .lock()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(&self, table: &str) -> usize {
        self.records(table).len()
    }

    pub fn relation_children(&self, table: &str, object_id: &str, column: &str) -> Vec<String> {
        self.state
            .lock()
            .relations
            .get(&(table.to_string(), object_id.to_string(), column.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Raw payload of the most recent `send`, for wire-shape assertions
    pub fn last_payload(&self) -> Option<Value> {
        self.last_payload.lock().clone()
    }

    fn run(&self, payload: &Value) -> Value {
        let operations = match payload.get("operations").and_then(Value::as_array) {
            Some(operations) => operations.clone(),
            None => {
                return json!({
                    "message": "transaction payload has no operations",
                    "operation": Value::Null,
                })
            }
        };

        let mut work = Work {
            state: self.state.lock().clone(),
            relation_schema: self.relation_schema.lock().clone(),
            columns: self.columns.lock().clone(),
            results: HashMap::new(),
        };

        for entry in &operations {
            let kind = entry["operationType"].as_str().unwrap_or_default().to_string();
            let table = entry["table"].as_str().unwrap_or_default().to_string();
            let id = entry["opResultId"].as_str().unwrap_or_default().to_string();

            match work.apply(&kind, &table, &entry["payload"]) {
                Ok(result) => {
                    work.results.insert(id, (kind, result));
                }
                Err(message) => {
                    // All-or-nothing: drop the working copy
                    return json!({
                        "message": message,
                        "operation": {
                            "operationType": kind,
                            "table": table,
                            "opResultId": id,
                            "payload": entry["payload"].clone(),
                        },
                    });
                }
            }
        }

        // Commit
        *self.state.lock() = work.state;

        let mut response = Map::new();
        for (id, (kind, result)) in work.results {
            response.insert(id, json!({ "operationType": kind, "result": result }));
        }
        Value::Object(response)
    }
}

#[async_trait]
impl TransactionExecutor for FakeBackend {
    async fn send(&self, payload: Value) -> Result<Value, TransportError> {
        *self.last_payload.lock() = Some(payload.clone());
        Ok(self.run(&payload))
    }
}

/// Uncommitted working copy of one in-flight transaction
struct Work {
    state: State,
    relation_schema: HashMap<(String, String), String>,
    columns: HashMap<String, HashSet<String>>,
    /// Results of operations executed so far, by op-result id
    results: HashMap<String, (String, Value)>,
}

impl Work {
    fn apply(&mut self, kind: &str, table: &str, payload: &Value) -> Result<Value, String> {
        let payload = self.resolve(payload)?;
        match kind {
            "CREATE" => self.create(table, &payload),
            "CREATE_BULK" => self.create_bulk(table, &payload),
            "UPDATE" => self.update(table, &payload),
            "UPDATE_BULK" => self.update_bulk(table, &payload),
            "DELETE" => self.delete(table, &payload),
            "DELETE_BULK" => self.delete_bulk(table, &payload),
            "FIND" => self.find(table, &payload),
            "ADD_RELATION" | "SET_RELATION" | "DELETE_RELATION" => {
                self.mutate_relation(kind, table, &payload)
            }
            other => Err(format!("unsupported operation type '{}'", other)),
        }
    }

    /// Substitute reference tokens with the results they point at
    fn resolve(&self, value: &Value) -> Result<Value, String> {
        match value {
            Value::Object(map) if map.get("___ref") == Some(&Value::Bool(true)) => {
                let id = map
                    .get("opResultId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "reference token has no opResultId".to_string())?;
                let (_, result) = self
                    .results
                    .get(id)
                    .ok_or_else(|| format!("reference to unknown or later operation '{}'", id))?;

                let mut current = result.clone();
                if let Some(index) = map.get("resultIndex").and_then(Value::as_u64) {
                    current = current
                        .as_array()
                        .and_then(|items| items.get(index as usize))
                        .cloned()
                        .ok_or_else(|| {
                            format!("resultIndex {} is out of bounds for '{}'", index, id)
                        })?;
                }
                if let Some(prop) = map.get("propName").and_then(Value::as_str) {
                    if let Some(record) = current.as_object() {
                        current = record
                            .get(prop)
                            .cloned()
                            .ok_or_else(|| format!("result of '{}' has no '{}'", id, prop))?;
                    }
                }
                Ok(current)
            }
            Value::Object(map) => {
                let mut resolved = Map::new();
                for (key, item) in map {
                    resolved.insert(key.clone(), self.resolve(item)?);
                }
                Ok(Value::Object(resolved))
            }
            Value::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve(item))
                    .collect::<Result<_, _>>()?,
            )),
            other => Ok(other.clone()),
        }
    }

    fn check_columns(&self, table: &str, record: &Record) -> Result<(), String> {
        if let Some(allowed) = self.columns.get(table) {
            for column in record.keys() {
                if !allowed.contains(column) {
                    return Err(format!(
                        "Column '{}' does not exist in table '{}'",
                        column, table
                    ));
                }
            }
        }
        Ok(())
    }

    fn tick(&mut self) -> i64 {
        self.state.clock += 1000;
        self.state.clock
    }

    fn fresh_id(&mut self) -> String {
        let id = format!("obj-{}", self.state.next_id);
        self.state.next_id += 1;
        id
    }

    fn store(&mut self, table: &str, mut record: Record) -> Result<Record, String> {
        self.check_columns(table, &record)?;
        let now = self.tick();
        record.insert("objectId".to_string(), Value::String(self.fresh_id()));
        record.insert("created".to_string(), json!(now));
        record.insert("updated".to_string(), Value::Null);
        record.insert("ownerId".to_string(), Value::Null);
        self.state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    fn create(&mut self, table: &str, payload: &Value) -> Result<Value, String> {
        let record = payload
            .as_object()
            .ok_or_else(|| "CREATE payload must be an object".to_string())?
            .clone();
        Ok(Value::Object(self.store(table, record)?))
    }

    fn create_bulk(&mut self, table: &str, payload: &Value) -> Result<Value, String> {
        let records = payload
            .as_array()
            .ok_or_else(|| "CREATE_BULK payload must be a list".to_string())?;
        if records.len() > BULK_CREATE_LIMIT {
            return Err(format!(
                "Bulk create is limited to {} objects per operation",
                BULK_CREATE_LIMIT
            ));
        }
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let record = record
                .as_object()
                .ok_or_else(|| "CREATE_BULK items must be objects".to_string())?
                .clone();
            let stored = self.store(table, record)?;
            ids.push(stored["objectId"].clone());
        }
        Ok(Value::Array(ids))
    }

    fn update(&mut self, table: &str, payload: &Value) -> Result<Value, String> {
        let mut changes = payload
            .as_object()
            .ok_or_else(|| "UPDATE payload must be an object".to_string())?
            .clone();
        let object_id = extract_id(changes.get("objectId"))
            .ok_or_else(|| "UPDATE payload has no objectId".to_string())?;
        changes.remove("objectId");
        self.check_columns(table, &changes)?;

        let now = self.tick();
        let records = self
            .state
            .tables
            .get_mut(table)
            .ok_or_else(|| format!("Table '{}' does not exist", table))?;
        let record = records
            .iter_mut()
            .find(|record| record_id(record) == Some(object_id.as_str()))
            .ok_or_else(|| format!("Object '{}' not found in table '{}'", object_id, table))?;
        for (key, value) in changes {
            record.insert(key, value);
        }
        record.insert("updated".to_string(), json!(now));
        Ok(Value::Object(record.clone()))
    }

    /// Targets of a bulk payload: a where clause or an explicit/referenced
    /// id list
    fn bulk_targets(&self, table: &str, payload: &Map<String, Value>) -> Result<Vec<String>, String> {
        if let Some(clause) = payload.get("conditional").and_then(Value::as_str) {
            let records = self.state.tables.get(table).cloned().unwrap_or_default();
            return Ok(records
                .iter()
                .filter(|record| matches_clause(record, clause))
                .filter_map(|record| record_id(record).map(str::to_string))
                .collect());
        }
        let unconditional = payload
            .get("unconditional")
            .ok_or_else(|| "bulk payload needs 'conditional' or 'unconditional'".to_string())?;
        let items = unconditional
            .as_array()
            .ok_or_else(|| "'unconditional' must resolve to a list".to_string())?;
        items
            .iter()
            .map(|item| {
                extract_id(Some(item))
                    .ok_or_else(|| "bulk target does not resolve to an object id".to_string())
            })
            .collect()
    }

    fn update_bulk(&mut self, table: &str, payload: &Value) -> Result<Value, String> {
        let payload = payload
            .as_object()
            .ok_or_else(|| "UPDATE_BULK payload must be an object".to_string())?;
        let changes = payload
            .get("changes")
            .and_then(Value::as_object)
            .ok_or_else(|| "UPDATE_BULK payload has no changes".to_string())?
            .clone();
        self.check_columns(table, &changes)?;
        let targets = self.bulk_targets(table, payload)?;

        let now = self.tick();
        let mut affected = 0u64;
        if let Some(records) = self.state.tables.get_mut(table) {
            for record in records.iter_mut() {
                let id = match record_id(record) {
                    Some(id) => id.to_string(),
                    None => continue,
                };
                if targets.iter().any(|target| *target == id) {
                    for (key, value) in &changes {
                        record.insert(key.clone(), value.clone());
                    }
                    record.insert("updated".to_string(), json!(now));
                    affected += 1;
                }
            }
        }
        Ok(json!(affected))
    }

    fn delete(&mut self, table: &str, payload: &Value) -> Result<Value, String> {
        let object_id = extract_id(Some(payload))
            .ok_or_else(|| "DELETE payload does not resolve to an object id".to_string())?;
        let records = self
            .state
            .tables
            .get_mut(table)
            .ok_or_else(|| format!("Table '{}' does not exist", table))?;
        let before = records.len();
        records.retain(|record| record_id(record) != Some(object_id.as_str()));
        if records.len() == before {
            return Err(format!(
                "Object '{}' not found in table '{}'",
                object_id, table
            ));
        }
        self.drop_relations(table, &object_id);
        Ok(json!(self.tick()))
    }

    fn delete_bulk(&mut self, table: &str, payload: &Value) -> Result<Value, String> {
        let payload = payload
            .as_object()
            .ok_or_else(|| "DELETE_BULK payload must be an object".to_string())?;
        let targets = self.bulk_targets(table, payload)?;
        let mut affected = 0u64;
        if let Some(records) = self.state.tables.get_mut(table) {
            records.retain(|record| {
                let hit = record_id(record)
                    .map(|id| targets.iter().any(|target| target == id))
                    .unwrap_or(false);
                if hit {
                    affected += 1;
                }
                !hit
            });
        }
        for target in &targets {
            self.drop_relations(table, target);
        }
        Ok(json!(affected))
    }

    fn find(&mut self, table: &str, payload: &Value) -> Result<Value, String> {
        let query = payload.as_object().cloned().unwrap_or_default();
        let mut records = self.state.tables.get(table).cloned().unwrap_or_default();

        if let Some(clause) = query.get("whereClause").and_then(Value::as_str) {
            records.retain(|record| matches_clause(record, clause));
        }
        if let Some(sort) = query
            .get("sortBy")
            .and_then(Value::as_array)
            .and_then(|columns| columns.first())
            .and_then(Value::as_str)
        {
            let (column, descending) = match sort.strip_suffix(" DESC") {
                Some(column) => (column.trim(), true),
                None => (sort.trim_end_matches(" ASC").trim(), false),
            };
            records.sort_by(|a, b| compare_values(a.get(column), b.get(column)));
            if descending {
                records.reverse();
            }
        }

        let offset = query.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
        let page = query
            .get("pageSize")
            .and_then(Value::as_u64)
            .unwrap_or(u64::MAX) as usize;
        let records: Vec<Record> = records.into_iter().skip(offset).take(page).collect();

        let related: Vec<String> = query
            .get("related")
            .and_then(Value::as_array)
            .map(|columns| {
                columns
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let expanded = records
            .into_iter()
            .map(|mut record| {
                for column in &related {
                    let children = self.expand_relation(table, &record, column);
                    record.insert(column.clone(), Value::Array(children));
                }
                Value::Object(record)
            })
            .collect();
        Ok(Value::Array(expanded))
    }

    fn expand_relation(&self, table: &str, record: &Record, column: &str) -> Vec<Value> {
        let parent_id = match record_id(record) {
            Some(id) => id.to_string(),
            None => return Vec::new(),
        };
        let child_table = match self
            .relation_schema
            .get(&(table.to_string(), column.to_string()))
        {
            Some(child_table) => child_table,
            None => return Vec::new(),
        };
        let child_ids = self
            .state
            .relations
            .get(&(table.to_string(), parent_id, column.to_string()))
            .cloned()
            .unwrap_or_default();
        let children = self.state.tables.get(child_table).cloned().unwrap_or_default();
        children
            .into_iter()
            .filter(|child| {
                record_id(child)
                    .map(|id| child_ids.iter().any(|child_id| child_id == id))
                    .unwrap_or(false)
            })
            .map(Value::Object)
            .collect()
    }

    fn mutate_relation(&mut self, kind: &str, table: &str, payload: &Value) -> Result<Value, String> {
        let payload = payload
            .as_object()
            .ok_or_else(|| "relation payload must be an object".to_string())?;
        let parent_id = extract_id(payload.get("parentObject"))
            .ok_or_else(|| "relation parent does not resolve to an object id".to_string())?;
        let column = payload
            .get("relationColumn")
            .and_then(Value::as_str)
            .ok_or_else(|| "relation payload has no relationColumn".to_string())?
            .to_string();

        let child_table = self
            .relation_schema
            .get(&(table.to_string(), column.clone()))
            .cloned()
            .ok_or_else(|| {
                format!("Column '{}' is not a relation of table '{}'", column, table)
            })?;

        let parent_exists = self
            .state
            .tables
            .get(table)
            .map(|records| records.iter().any(|r| record_id(r) == Some(parent_id.as_str())))
            .unwrap_or(false);
        if !parent_exists {
            return Err(format!(
                "Object '{}' not found in table '{}'",
                parent_id, table
            ));
        }

        let child_ids: Vec<String> = if let Some(clause) =
            payload.get("conditional").and_then(Value::as_str)
        {
            self.state
                .tables
                .get(&child_table)
                .cloned()
                .unwrap_or_default()
                .iter()
                .filter(|child| matches_clause(child, clause))
                .filter_map(|child| record_id(child).map(str::to_string))
                .collect()
        } else {
            let items = payload
                .get("unconditional")
                .and_then(Value::as_array)
                .ok_or_else(|| "relation payload has no children".to_string())?;
            let ids = items
                .iter()
                .map(|item| {
                    extract_id(Some(item))
                        .ok_or_else(|| "relation child does not resolve to an object id".to_string())
                })
                .collect::<Result<Vec<_>, _>>()?;
            for id in &ids {
                let exists = self
                    .state
                    .tables
                    .get(&child_table)
                    .map(|records| records.iter().any(|r| record_id(r) == Some(id.as_str())))
                    .unwrap_or(false);
                if !exists {
                    return Err(format!(
                        "Object '{}' not found in table '{}'",
                        id, child_table
                    ));
                }
            }
            ids
        };

        let key = (table.to_string(), parent_id, column);
        let entry = self.state.relations.entry(key).or_default();
        let affected = match kind {
            "ADD_RELATION" => {
                let mut added = 0u64;
                for id in child_ids {
                    if !entry.contains(&id) {
                        entry.push(id);
                    }
                    added += 1;
                }
                added
            }
            "SET_RELATION" => {
                *entry = child_ids.clone();
                child_ids.len() as u64
            }
            _ => {
                let before = entry.len();
                entry.retain(|id| !child_ids.contains(id));
                (before - entry.len()) as u64
            }
        };
        Ok(json!(affected))
    }

    fn drop_relations(&mut self, table: &str, object_id: &str) {
        self.state
            .relations
            .retain(|(t, id, _), _| !(t == table && id == object_id));
    }
}

fn record_id(record: &Record) -> Option<&str> {
    record.get("objectId").and_then(Value::as_str)
}

/// Accept both bare id strings and record objects carrying one
fn extract_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(id) => Some(id.clone()),
        Value::Object(map) => map.get("objectId").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Minimal `col <op> value` where-clause support, enough for the scenarios
/// the tests stage
fn matches_clause(record: &Record, clause: &str) -> bool {
    for op in ["!=", ">=", "<=", "=", ">", "<"] {
        if let Some(position) = clause.find(op) {
            let column = clause[..position].trim();
            let raw = clause[position + op.len()..].trim();
            let actual = record.get(column);

            if let Some(literal) = raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
                let actual = actual.and_then(Value::as_str);
                return match op {
                    "=" => actual == Some(literal),
                    "!=" => actual != Some(literal),
                    _ => false,
                };
            }
            let expected: f64 = match raw.parse() {
                Ok(number) => number,
                Err(_) => return false,
            };
            let actual = match actual.and_then(Value::as_f64) {
                Some(number) => number,
                None => return false,
            };
            return match op {
                "=" => actual == expected,
                "!=" => actual != expected,
                ">" => actual > expected,
                "<" => actual < expected,
                ">=" => actual >= expected,
                "<=" => actual <= expected,
                _ => false,
            };
        }
    }
    false
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}
