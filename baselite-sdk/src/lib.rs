//! BaseLite SDK - Rust client for the BaseLite hosted backend
//!
//! This crate implements the client side of BaseLite's transactional data
//! API. Its centerpiece is the Unit-of-Work coordinator: stage any number of
//! heterogeneous data operations (creates, updates, deletes, bulk variants,
//! finds, and relation mutations) client-side, wire them together through
//! deferred references, then submit the whole batch as one atomic
//! server-side transaction.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use baselite_sdk::{HttpTransactionExecutor, UnitOfWork};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), baselite_sdk::Error> {
//! let executor = Arc::new(HttpTransactionExecutor::new(
//!     "https://api.baselite.dev/",
//!     "my-app-id",
//!     "my-api-key",
//! )?);
//!
//! let mut uow = UnitOfWork::new(executor);
//! let person = uow.create("Person", json!({ "name": "Bob" }))?;
//! let order = uow.create("Order", json!({ "price": 1234 }))?;
//! uow.add_to_relation(&person, "order", &order)?;
//!
//! let summary = uow.execute().await?;
//! summary.ensure_success()?;
//! println!("created {:?}", person.result());
//! # Ok(())
//! # }
//! ```
//!
//! # Deferred references
//!
//! Every staging method returns an [`OpResult`] handle. Passing a handle (or
//! an indexed view of one, via [`OpResult::resolve_to`]) into a later staging
//! call does not read its value - the value does not exist yet. Instead the
//! compiled payload carries a reference token, and the server substitutes the
//! earlier operation's result while executing the batch in staging order.
//! The commit is all-or-nothing: if any operation is rejected, nothing is
//! persisted and the failure report names the one offending operation.
//!
//! # Module Organization
//!
//! - [`transaction`] - the Unit-of-Work builder, handles, and results
//! - [`transport`] - the one-round-trip executor boundary
//! - [`query`] - the FIND query descriptor
//! - [`entity`] - entity-to-table binding for typed records
//! - [`error`] - error types and handling

pub mod entity;
pub mod error;
pub mod query;
pub mod transaction;
pub mod transport;

// Re-export main types for convenience
pub use entity::TableBinding;
pub use error::{Error, Result};
pub use query::DataQuery;
pub use transaction::{
    BulkCondition, FailedOperation, IsolationLevel, OperationKind, OperationResult,
    OperationResultEntry, OpResult, OpResultIndex, RecordTarget, RelationChildren,
    RelationParent, TransactionOperationError, UnitOfWork, UnitOfWorkResult,
};
pub use transport::{HttpTransactionExecutor, TransactionExecutor, TransportError};
