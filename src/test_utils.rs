/// # Test Utilities Module
///
/// Test infrastructure shared by the unit tests:
/// - A scriptable mock driver that records every statement, the handle it
///   was routed to, and every cursor it opened and closed
/// - A connection registry wired to the mock driver
/// - Log output for tests through `tracing-subscriber`
use crate::config::{Config, DatabaseInfo, SequenceGenerator};
use crate::core::{DataHelperError, Result};
use crate::driver::{Database, Driver, DriverRegistry, ExecResult, Rows, Transaction};
use crate::table::{Column, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Once};
use std::time::Duration;

static TRACING: Once = Once::new();

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// A result set the mock driver hands out for the next query.
#[derive(Debug, Clone, Default)]
pub struct MockResult {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
    scan_failures: Vec<usize>,
    terminal: Option<String>,
}

impl MockResult {
    pub fn rows(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        MockResult {
            columns,
            rows,
            ..Default::default()
        }
    }

    /// Makes `scan` fail on the row at `index`.
    pub fn fail_scan_at(&mut self, index: usize) {
        self.scan_failures.push(index);
    }

    /// Ends iteration with an error once all rows have been fetched.
    pub fn terminal_error(&mut self, message: &str) {
        self.terminal = Some(message.to_string());
    }
}

#[derive(Debug, Default)]
struct MockState {
    statements: Vec<String>,
    routed: Vec<(String, String)>,
    last_args: Vec<Value>,
    failures: Vec<(String, String)>,
    results: VecDeque<MockResult>,
    pings: usize,
    closes: usize,
    fail_ping: bool,
    fail_open: bool,
    fail_close: bool,
    cursors_opened: usize,
    cursors_closed: usize,
    column_type_calls: Vec<bool>,
    limits: (u32, u32, u64),
}

#[derive(Debug, Clone, Default)]
struct Shared(Arc<Mutex<MockState>>);

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap()
    }

    fn check(&self, sql: &str) -> Result<()> {
        let state = self.lock();
        match state.failures.iter().find(|(pattern, _)| sql.contains(pattern.as_str())) {
            Some((_, message)) => Err(DataHelperError::Execution(message.clone())),
            None => Ok(()),
        }
    }

    fn log(&self, route: &str, sql: &str, args: &[Value]) {
        let mut state = self.lock();
        state.statements.push(sql.to_string());
        state.routed.push((route.to_string(), sql.to_string()));
        state.last_args = args.to_vec();
    }

    fn query(&self, route: &str, sql: &str, args: &[Value]) -> Result<Box<dyn Rows>> {
        self.log(route, sql, args);
        self.check(sql)?;
        let mut state = self.lock();
        let result = state.results.pop_front().unwrap_or_default();
        state.cursors_opened += 1;
        Ok(Box::new(MockRows {
            shared: self.clone(),
            result,
            position: None,
            fetched_any: false,
            closed: false,
        }))
    }

    fn exec(&self, route: &str, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.log(route, sql, args);
        self.check(sql)?;
        Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: None,
        })
    }

    fn finish(&self, statement: &str) -> Result<()> {
        self.lock().statements.push(statement.to_string());
        self.check(statement)
    }
}

/// Scriptable in-memory driver.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    shared: Shared,
}

impl MockDriver {
    pub fn new() -> Self {
        // Every mock-backed test gets log output.
        init_tracing();
        MockDriver::default()
    }

    /// A registry serving this driver as `mock` and as `mssql`.
    pub fn registry(&self) -> DriverRegistry {
        let mut registry = DriverRegistry::empty();
        registry.register("mock", Arc::new(self.clone()));
        registry.register("mssql", Arc::new(self.clone()));
        registry
    }

    /// Statements containing `pattern` fail with `message`.
    pub fn fail_on(&self, pattern: &str, message: &str) {
        self.shared
            .lock()
            .failures
            .push((pattern.to_string(), message.to_string()));
    }

    pub fn fail_ping(&self) {
        self.shared.lock().fail_ping = true;
    }

    pub fn fail_open(&self) {
        self.shared.lock().fail_open = true;
    }

    pub fn fail_close(&self) {
        self.shared.lock().fail_close = true;
    }

    pub fn push_result(&self, result: MockResult) {
        self.shared.lock().results.push_back(result);
    }

    pub fn statements(&self) -> Vec<String> {
        self.shared.lock().statements.clone()
    }

    pub fn routed(&self) -> Vec<(String, String)> {
        self.shared.lock().routed.clone()
    }

    pub fn last_args(&self) -> Vec<Value> {
        self.shared.lock().last_args.clone()
    }

    pub fn pings(&self) -> usize {
        self.shared.lock().pings
    }

    pub fn closes(&self) -> usize {
        self.shared.lock().closes
    }

    pub fn cursors_opened(&self) -> usize {
        self.shared.lock().cursors_opened
    }

    pub fn open_cursors(&self) -> usize {
        let state = self.shared.lock();
        state.cursors_opened - state.cursors_closed
    }

    /// For each `column_types` call, whether a row had been fetched before it.
    pub fn column_type_calls(&self) -> Vec<bool> {
        self.shared.lock().column_type_calls.clone()
    }

    /// (max open, max idle, max lifetime in seconds) as last applied.
    pub fn limits(&self) -> (u32, u32, u64) {
        self.shared.lock().limits
    }
}

impl Driver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(&self, _connection_string: &str) -> Result<Box<dyn Database>> {
        if self.shared.lock().fail_open {
            return Err(DataHelperError::Execution("cannot open database".to_string()));
        }
        Ok(Box::new(MockDatabase {
            shared: self.shared.clone(),
        }))
    }
}

struct MockDatabase {
    shared: Shared,
}

impl Database for MockDatabase {
    fn ping(&self) -> Result<()> {
        let mut state = self.shared.lock();
        state.pings += 1;
        if state.fail_ping {
            return Err(DataHelperError::Execution("server unreachable".to_string()));
        }
        Ok(())
    }

    fn query(&self, sql: &str, args: &[Value]) -> Result<Box<dyn Rows>> {
        self.shared.query("db", sql, args)
    }

    fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.shared.exec("db", sql, args)
    }

    fn begin(&self) -> Result<Box<dyn Transaction>> {
        self.shared.finish("BEGIN")?;
        Ok(Box::new(MockTransaction {
            shared: self.shared.clone(),
        }))
    }

    fn set_max_open_conns(&mut self, max: u32) {
        self.shared.lock().limits.0 = max;
    }

    fn set_max_idle_conns(&mut self, max: u32) {
        self.shared.lock().limits.1 = max;
    }

    fn set_conn_max_lifetime(&mut self, lifetime: Duration) {
        self.shared.lock().limits.2 = lifetime.as_secs();
    }

    fn close(&self) -> Result<()> {
        let mut state = self.shared.lock();
        state.closes += 1;
        if state.fail_close {
            return Err(DataHelperError::Execution("close failed".to_string()));
        }
        Ok(())
    }
}

struct MockTransaction {
    shared: Shared,
}

impl Transaction for MockTransaction {
    fn query(&self, sql: &str, args: &[Value]) -> Result<Box<dyn Rows>> {
        self.shared.query("tx", sql, args)
    }

    fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.shared.exec("tx", sql, args)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        self.shared.finish("COMMIT")
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        self.shared.finish("ROLLBACK")
    }
}

struct MockRows {
    shared: Shared,
    result: MockResult,
    position: Option<usize>,
    fetched_any: bool,
    closed: bool,
}

impl Rows for MockRows {
    fn next(&mut self) -> bool {
        if self.closed {
            return false;
        }
        let index = self.position.map_or(0, |p| p + 1);
        self.position = Some(index);
        if index < self.result.rows.len() {
            self.fetched_any = true;
            true
        } else {
            false
        }
    }

    fn column_types(&self) -> Result<Vec<Column>> {
        self.shared.lock().column_type_calls.push(self.fetched_any);
        Ok(self.result.columns.clone())
    }

    fn scan(&mut self) -> Result<Vec<Value>> {
        let index = self
            .position
            .filter(|i| *i < self.result.rows.len())
            .ok_or_else(|| DataHelperError::Execution("no current row".to_string()))?;
        if self.result.scan_failures.contains(&index) {
            return Err(DataHelperError::Execution(format!("cannot scan row {}", index)));
        }
        Ok(self.result.rows[index].clone())
    }

    fn take_err(&mut self) -> Option<DataHelperError> {
        self.result.terminal.take().map(DataHelperError::Execution)
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.shared.lock().cursors_closed += 1;
        }
        Ok(())
    }
}

/// Registry used by the mock-backed tests. `MAIN` is the default.
pub fn mock_config() -> Config {
    let mut savepoint_keywords = HashMap::new();
    savepoint_keywords.insert("savepoint_start".to_string(), "SAVEPOINT".to_string());
    savepoint_keywords.insert("savepoint_release".to_string(), "ROLLBACK TO".to_string());

    Config {
        default_database_id: "MAIN".to_string(),
        databases: vec![
            DatabaseInfo {
                id: "MAIN".to_string(),
                driver_name: "mock".to_string(),
                connection_string: "mock://main".to_string(),
                max_open_connection: 10,
                max_idle_connection: 2,
                max_connection_lifetime: 60,
                keyword_map: savepoint_keywords,
                ..Default::default()
            },
            DatabaseInfo {
                id: "MSSQL".to_string(),
                driver_name: "mssql".to_string(),
                connection_string: "mock://mssql".to_string(),
                schema: "dbo".to_string(),
                reserved_word_escape_char: "[]".to_string(),
                sequence_generator: Some(SequenceGenerator {
                    upsert_query: "UPDATE {sequence} SET LastNo = LastNo + 1 WHERE Name = '{Name}'".to_string(),
                    result_query: "SELECT LastNo FROM {sequence} WHERE Name = '{Name}'".to_string(),
                    name_placeholder: "{Name}".to_string(),
                }),
                ..Default::default()
            },
            DatabaseInfo {
                id: "FILE".to_string(),
                driver_name: "mock".to_string(),
                connection_string: "mock://file".to_string(),
                storage_type: "file".to_string(),
                ..Default::default()
            },
            DatabaseInfo {
                id: "EMPTY".to_string(),
                driver_name: "mock".to_string(),
                ..Default::default()
            },
            DatabaseInfo {
                id: "NOPLACEHOLDER".to_string(),
                driver_name: "mock".to_string(),
                connection_string: "mock://x".to_string(),
                sequence_generator: Some(SequenceGenerator {
                    upsert_query: "UPDATE seq SET n = n + 1".to_string(),
                    result_query: "SELECT n FROM seq".to_string(),
                    name_placeholder: String::new(),
                }),
                ..Default::default()
            },
        ],
    }
}
