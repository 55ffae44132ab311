/// Database Module
///
/// This module provides the execution context and the operations it issues,
/// organized into focused submodules.
///
/// ## Architecture
///
/// - **Connection Management** (`connection.rs`): connect, transactions, statement routing and the error ledger
/// - **Query Execution** (`query.rs`): result materialization, single-row reads, existence checks, exec
/// - **Savepoints** (`savepoint.rs`): nested transaction checkpoints on top of one flat transaction
/// - **Sequences** (`sequence.rs`): named counters allocated through configured templates
///
/// ## Error Handling
///
/// All operations return the crate-wide `DataHelperError`. Failures of issued
/// statements are also appended to the context's ledger.
pub mod connection;
pub mod query;
pub mod savepoint;
pub mod sequence;

pub use connection::*;
pub use query::*;
