/// Driver Module
///
/// The contract a database driver fulfils for the data helper, and the
/// registry used to select a driver by name at connect time.
///
/// ## Architecture
///
/// - `Driver` opens a `Database` handle from a connection string
/// - `Database` runs statements on the base connection and opens transactions
/// - `Transaction` runs statements inside one flat transaction
/// - `Rows` is a forward-only cursor that must be closed on every path
pub mod sqlite;

pub use sqlite::SqliteDriver;

use crate::core::Result;
use crate::table::{Column, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a statement that does not return rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self, connection_string: &str) -> Result<Box<dyn Database>>;
}

/// An open database handle, usually backed by a pool of physical connections.
/// One handle may be shared by several contexts.
pub trait Database: Send + Sync {
    fn ping(&self) -> Result<()>;

    fn query(&self, sql: &str, args: &[Value]) -> Result<Box<dyn Rows>>;

    fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecResult>;

    fn begin(&self) -> Result<Box<dyn Transaction>>;

    fn set_max_open_conns(&mut self, _max: u32) {}

    fn set_max_idle_conns(&mut self, _max: u32) {}

    fn set_conn_max_lifetime(&mut self, _lifetime: Duration) {}

    fn close(&self) -> Result<()>;
}

/// A flat transaction. Commit and rollback consume the handle: the driver
/// invalidates it once either has been attempted.
pub trait Transaction: Send {
    fn query(&self, sql: &str, args: &[Value]) -> Result<Box<dyn Rows>>;

    fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecResult>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}

/// Forward-only result cursor.
pub trait Rows: Send {
    /// Advances to the next row. Returns `false` at the end of the result set
    /// or when iteration stopped on an error, see `take_err`.
    fn next(&mut self) -> bool;

    /// Column metadata. Accurate scan types are only guaranteed once `next`
    /// has returned `true` at least once.
    fn column_types(&self) -> Result<Vec<Column>>;

    /// Decodes the current row, one value per column.
    fn scan(&mut self) -> Result<Vec<Value>>;

    /// The error that ended iteration, if any.
    fn take_err(&mut self) -> Option<crate::core::DataHelperError>;

    /// Releases the cursor. Must be idempotent.
    fn close(&mut self) -> Result<()>;
}

/// Driver lookup by name. Names are matched case-insensitively.
#[derive(Clone)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// A registry with no drivers at all.
    pub fn empty() -> Self {
        DriverRegistry {
            drivers: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, driver: Arc<dyn Driver>) {
        self.drivers.insert(name.trim().to_ascii_lowercase(), driver);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.get(&name.trim().to_ascii_lowercase()).cloned()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        let mut registry = DriverRegistry::empty();
        let sqlite: Arc<dyn Driver> = Arc::new(SqliteDriver);
        registry.register("sqlite3", Arc::clone(&sqlite));
        registry.register("sqlite", sqlite);
        registry
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.drivers.keys().collect();
        names.sort();
        f.debug_struct("DriverRegistry").field("drivers", &names).finish()
    }
}
