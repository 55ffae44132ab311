/// Connection Management Module
///
/// This module provides the execution context: it owns the base database
/// handle and at most one open transaction, routes every statement to the
/// right one, and keeps the per-context error ledger.

use crate::config::{Config, DatabaseInfo};
use crate::core::{DataHelperError, Result};
use crate::dialect::Dialect;
use crate::driver::{Database, DriverRegistry, ExecResult, Rows, Transaction};
use crate::rewrite;
use crate::table::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Errors of the statements issued since the ledger was last reset.
///
/// Outside a transaction every statement resets it first, so it describes the
/// latest statement only. Inside a transaction it accumulates until commit or
/// rollback.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    errors: Vec<String>,
    all_succeeded: bool,
}

impl Default for Ledger {
    fn default() -> Self {
        Ledger {
            errors: Vec::new(),
            all_succeeded: true,
        }
    }
}

impl Ledger {
    pub fn reset(&mut self) {
        self.errors.clear();
        self.all_succeeded = true;
    }

    pub fn record(&mut self, err: &DataHelperError) {
        self.errors.push(err.to_string());
        self.all_succeeded = false;
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn all_succeeded(&self) -> bool {
        self.all_succeeded
    }
}

/// The handle a statement runs on: the open transaction, else the base connection.
pub(crate) enum Target<'a> {
    Transaction(&'a dyn Transaction),
    Database(&'a dyn Database),
}

impl Target<'_> {
    pub(crate) fn query(&self, sql: &str, args: &[Value]) -> Result<Box<dyn Rows>> {
        match self {
            Target::Transaction(tx) => tx.query(sql, args),
            Target::Database(db) => db.query(sql, args),
        }
    }

    pub(crate) fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        match self {
            Target::Transaction(tx) => tx.exec(sql, args),
            Target::Database(db) => db.exec(sql, args),
        }
    }
}

/// Execution context for one logical unit of work.
///
/// Not internally synchronized: use one instance per thread. The context can
/// be moved to another thread, and several contexts can share one base
/// handle through [`DataHelper::share`].
pub struct DataHelper {
    config: Config,
    drivers: DriverRegistry,
    pub(crate) db: Option<Arc<dyn Database>>,
    pub(crate) tx: Option<Box<dyn Transaction>>,
    pub(crate) info: DatabaseInfo,
    pub(crate) dialect: Dialect,
    pub(crate) ledger: Ledger,
}

impl DataHelper {
    /// Creates a context over a connection registry, with the bundled drivers.
    pub fn new(config: Config) -> Self {
        DataHelper::with_drivers(config, DriverRegistry::default())
    }

    pub fn with_drivers(config: Config, drivers: DriverRegistry) -> Self {
        DataHelper {
            config,
            drivers,
            db: None,
            tx: None,
            info: DatabaseInfo::default(),
            dialect: Dialect::default(),
            ledger: Ledger::default(),
        }
    }

    /// Wraps a handle opened elsewhere, possibly shared with other contexts.
    /// The dialect is resolved from `info`; no ping or pool settings are applied.
    pub fn from_database(config: Config, info: DatabaseInfo, db: Arc<dyn Database>) -> Self {
        let mut dh = DataHelper::new(config);
        dh.dialect = Dialect::resolve(&info);
        dh.info = info;
        dh.db = Some(db);
        dh
    }

    /// A new context over the same base handle, with its own ledger and no
    /// transaction.
    ///
    /// # Errors
    ///
    /// `DataHelperError::State` when this context is not connected.
    pub fn share(&self) -> Result<DataHelper> {
        let db = self.db.clone().ok_or_else(not_connected)?;
        Ok(DataHelper {
            config: self.config.clone(),
            drivers: self.drivers.clone(),
            db: Some(db),
            tx: None,
            info: self.info.clone(),
            dialect: self.dialect.clone(),
            ledger: Ledger::default(),
        })
    }

    /// The base handle, for handing to [`DataHelper::from_database`].
    pub fn shared_database(&self) -> Option<Arc<dyn Database>> {
        self.db.clone()
    }

    /// Connects to a named connection from the registry
    ///
    /// # Arguments
    ///
    /// * `connection_id` - Registry id; `None` or blank uses the configured default id
    ///
    /// # Errors
    ///
    /// `DataHelperError::Config` if the id is unknown or its connection string is
    /// empty, `DataHelperError::Connection` if opening or pinging fails.
    pub fn connect(&mut self, connection_id: Option<&str>) -> Result<()> {
        let info = self.config.database(connection_id).cloned().ok_or_else(|| {
            DataHelperError::Config(format!(
                "Connection id '{}' is not configured",
                connection_id
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or(self.config.default_database_id.as_str())
            ))
        })?;
        if info.connection_string.trim().is_empty() {
            return Err(DataHelperError::Config(format!(
                "Connection string for '{}' is not set",
                info.id
            )));
        }
        self.open(info)
    }

    /// Connects without going through the registry.
    pub fn connect_direct(&mut self, driver_name: &str, connection_string: &str, ping: bool) -> Result<()> {
        if driver_name.trim().is_empty() {
            return Err(DataHelperError::Config("Driver name is not set".to_string()));
        }
        if connection_string.trim().is_empty() {
            return Err(DataHelperError::Config("Connection string is not set".to_string()));
        }
        self.open(DatabaseInfo {
            driver_name: driver_name.to_string(),
            connection_string: connection_string.to_string(),
            ping: Some(ping),
            ..Default::default()
        })
    }

    fn open(&mut self, info: DatabaseInfo) -> Result<()> {
        let driver = self.drivers.get(&info.driver_name).ok_or_else(|| {
            DataHelperError::Config(format!("Driver '{}' is not registered", info.driver_name))
        })?;

        let mut db = driver
            .open(&info.connection_string)
            .map_err(|e| DataHelperError::Connection(e.to_string()))?;

        if info.should_ping() {
            if let Err(e) = db.ping() {
                if let Err(close_err) = db.close() {
                    warn!("Closing unreachable database failed: {}", close_err);
                }
                return Err(DataHelperError::Connection(e.to_string()));
            }
        }

        if info.max_open_connection > 0 {
            db.set_max_open_conns(info.max_open_connection);
        }
        if info.max_idle_connection > 0 {
            db.set_max_idle_conns(info.max_idle_connection);
        }
        if info.max_connection_lifetime > 0 {
            db.set_conn_max_lifetime(Duration::from_secs(info.max_connection_lifetime));
        }

        if self.db.is_some() {
            if let Err(e) = self.disconnect() {
                warn!("Closing previous connection failed: {}", e);
            }
        }

        info!("Connected to '{}' using driver {}", info.id, info.driver_name);
        self.dialect = Dialect::resolve(&info);
        self.info = info;
        self.db = Some(Arc::from(db));
        self.ledger.reset();
        Ok(())
    }

    /// Begins a transaction. There is no true nesting: use savepoints instead.
    pub fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(DataHelperError::State("A transaction is already in progress".to_string()));
        }
        let db = self.db.as_deref().ok_or_else(not_connected)?;

        self.ledger.reset();
        match db.begin() {
            Ok(tx) => {
                debug!("Transaction started");
                self.tx = Some(tx);
                Ok(())
            }
            Err(e) => {
                self.ledger.record(&e);
                Err(e)
            }
        }
    }

    /// Commits the open transaction. The handle is cleared whether or not the
    /// driver call succeeds.
    pub fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DataHelperError::State("No transaction was initiated".to_string()))?;
        self.ledger.reset();
        let result = tx.commit();
        debug!("Transaction committed: {}", result.is_ok());
        self.settle(result)
    }

    /// Rolls back the open transaction. The handle is cleared whether or not
    /// the driver call succeeds.
    pub fn rollback(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DataHelperError::State("No transaction was initiated".to_string()))?;
        self.ledger.reset();
        let result = tx.rollback();
        debug!("Transaction rolled back: {}", result.is_ok());
        self.settle(result)
    }

    /// Drops any dangling transaction and releases the base handle. The handle
    /// is closed once no other context shares it.
    pub fn disconnect(&mut self) -> Result<()> {
        self.tx = None;
        match self.db.take() {
            Some(db) if Arc::strong_count(&db) == 1 => {
                debug!("Disconnecting from '{}'", self.info.id);
                db.close()
            }
            Some(_) => {
                debug!("Released shared handle for '{}'", self.info.id);
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn is_in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.db.is_some()
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Settings of the active connection.
    pub fn database_info(&self) -> &DatabaseInfo {
        &self.info
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn errors(&self) -> &[String] {
        self.ledger.errors()
    }

    pub fn all_succeeded(&self) -> bool {
        self.ledger.all_succeeded()
    }

    /// Applies both rewrite passes for the active dialect.
    pub fn rewrite(&self, template: &str) -> String {
        let sql = rewrite::rewrite(template, &self.dialect);
        debug!("Statement: {}", sql);
        sql
    }

    /// Runs one statement on the routed handle.
    ///
    /// Outside a transaction the ledger is reset first; any failure, including
    /// having no connection, is recorded.
    pub(crate) fn issue<T>(&mut self, op: impl FnOnce(Target<'_>) -> Result<T>) -> Result<T> {
        if self.tx.is_none() {
            self.ledger.reset();
        }
        let target = match (self.tx.as_deref(), self.db.as_deref()) {
            (Some(tx), _) => Ok(Target::Transaction(tx)),
            (None, Some(db)) => Ok(Target::Database(db)),
            (None, None) => Err(not_connected()),
        };
        let result = target.and_then(op);
        self.settle(result)
    }

    /// Records a failed result in the ledger and hands it back.
    pub(crate) fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.ledger.record(e);
        }
        result
    }
}

impl Drop for DataHelper {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!("Disconnect on drop failed: {}", e);
        }
    }
}

fn not_connected() -> DataHelperError {
    DataHelperError::State("Not connected to a database".to_string())
}
