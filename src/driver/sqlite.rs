/// SQLite Driver
///
/// All handles opened from one `open` call share a single `rusqlite`
/// connection behind a mutex. Cursors are buffered: the statement is stepped
/// to completion while the lock is held, so no borrow of the connection
/// outlives the call.
use super::{Database, Driver, ExecResult, Rows, Transaction};
use crate::core::{DataHelperError, Result};
use crate::table::{Column, Value, ValueKind};
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite3"
    }

    fn open(&self, connection_string: &str) -> Result<Box<dyn Database>> {
        let conn = Connection::open(connection_string)?;
        debug!("Opened SQLite database at {}", connection_string);
        Ok(Box::new(SqliteDatabase {
            conn: SharedConnection(Arc::new(Mutex::new(Some(conn)))),
            limits: PoolLimits::default(),
        }))
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::DateTime(dt) => {
                ToSqlOutput::Owned(SqlValue::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
            }
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

/// Scan type implied by a declared column type, following SQLite's affinity rules.
fn kind_from_decl(decl: Option<&str>) -> ValueKind {
    let decl = match decl {
        Some(d) => d.to_ascii_uppercase(),
        None => return ValueKind::Null,
    };
    if decl.contains("BOOL") {
        ValueKind::Bool
    } else if decl.contains("INT") {
        ValueKind::Integer
    } else if decl.contains("CHAR") || decl.contains("CLOB") || decl.contains("TEXT") {
        ValueKind::Text
    } else if decl.contains("BLOB") || decl.is_empty() {
        ValueKind::Blob
    } else if decl.contains("DATE") || decl.contains("TIME") {
        ValueKind::DateTime
    } else {
        ValueKind::Real
    }
}

/// `VARCHAR(50)` gives 50; types without a single length argument give `None`.
fn length_from_decl(decl: &str) -> Option<i64> {
    let open = decl.find('(')?;
    let close = decl[open..].find(')')? + open;
    decl[open + 1..close].trim().parse().ok()
}

#[derive(Debug, Clone)]
struct SharedConnection(Arc<Mutex<Option<Connection>>>);

impl SharedConnection {
    fn with<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self
            .0
            .lock()
            .map_err(|_| DataHelperError::Connection("SQLite connection lock poisoned".to_string()))?;
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(DataHelperError::Connection("database is closed".to_string())),
        }
    }

    fn query(&self, sql: &str, args: &[Value]) -> Result<Box<dyn Rows>> {
        self.with(|conn| Ok(Box::new(SqliteRows::fetch(conn, sql, args)?) as Box<dyn Rows>))
    }

    fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.with(|conn| {
            let affected = conn.execute(sql, params_from_iter(args.iter()))?;
            Ok(ExecResult {
                rows_affected: affected as u64,
                last_insert_id: Some(conn.last_insert_rowid()),
            })
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PoolLimits {
    max_open: u32,
    max_idle: u32,
    max_lifetime: Option<Duration>,
}

struct SqliteDatabase {
    conn: SharedConnection,
    limits: PoolLimits,
}

impl Database for SqliteDatabase {
    fn ping(&self) -> Result<()> {
        self.conn.with(|conn| Ok(conn.query_row("SELECT 1", [], |_| Ok(()))?))
    }

    fn query(&self, sql: &str, args: &[Value]) -> Result<Box<dyn Rows>> {
        self.conn.query(sql, args)
    }

    fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.conn.exec(sql, args)
    }

    fn begin(&self) -> Result<Box<dyn Transaction>> {
        self.conn.with(|conn| Ok(conn.execute_batch("BEGIN")?))?;
        Ok(Box::new(SqliteTransaction {
            conn: self.conn.clone(),
            finished: false,
        }))
    }

    // A single shared connection: the limits are recorded for diagnostics only.
    fn set_max_open_conns(&mut self, max: u32) {
        self.limits.max_open = max;
        debug!("SQLite pool limits now {:?}", self.limits);
    }

    fn set_max_idle_conns(&mut self, max: u32) {
        self.limits.max_idle = max;
        debug!("SQLite pool limits now {:?}", self.limits);
    }

    fn set_conn_max_lifetime(&mut self, lifetime: Duration) {
        self.limits.max_lifetime = Some(lifetime);
        debug!("SQLite pool limits now {:?}", self.limits);
    }

    fn close(&self) -> Result<()> {
        let mut guard = self
            .conn
            .0
            .lock()
            .map_err(|_| DataHelperError::Connection("SQLite connection lock poisoned".to_string()))?;
        match guard.take() {
            Some(conn) => conn.close().map_err(|(_, e)| DataHelperError::Database(e)),
            None => Ok(()),
        }
    }
}

struct SqliteTransaction {
    conn: SharedConnection,
    finished: bool,
}

impl SqliteTransaction {
    fn finish(mut self: Box<Self>, statement: &str) -> Result<()> {
        self.finished = true;
        self.conn.with(|conn| match conn.execute_batch(statement) {
            Ok(()) => Ok(()),
            Err(e) => {
                // A failed COMMIT (deferred constraint, busy) can leave the
                // transaction open; the handle is gone either way.
                if !conn.is_autocommit() {
                    match conn.execute_batch("ROLLBACK") {
                        Ok(()) => debug!("Rolled back after failed {}: {}", statement, e),
                        Err(rollback_err) => warn!("Rollback after failed {} failed: {}", statement, rollback_err),
                    }
                }
                Err(e.into())
            }
        })
    }
}

impl Transaction for SqliteTransaction {
    fn query(&self, sql: &str, args: &[Value]) -> Result<Box<dyn Rows>> {
        self.conn.query(sql, args)
    }

    fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.conn.exec(sql, args)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        self.finish("COMMIT")
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if !self.finished {
            // A dropped, unfinished transaction rolls back, as rusqlite's own does.
            if let Err(e) = self.conn.with(|conn| Ok(conn.execute_batch("ROLLBACK")?)) {
                warn!("Rollback of dropped transaction failed: {}", e);
            }
        }
    }
}

struct SqliteRows {
    columns: Vec<(String, Option<String>)>,
    pending: VecDeque<rusqlite::Result<Vec<Value>>>,
    current: Option<rusqlite::Result<Vec<Value>>>,
    first_kinds: Option<Vec<ValueKind>>,
    terminal: Option<rusqlite::Error>,
    closed: bool,
}

impl SqliteRows {
    fn fetch(conn: &Connection, sql: &str, args: &[Value]) -> Result<SqliteRows> {
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<(String, Option<String>)> = stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
            .collect();
        let count = columns.len();

        let mut pending = VecDeque::new();
        let mut terminal = None;
        let mut rows = stmt.query(params_from_iter(args.iter()))?;
        loop {
            match rows.next() {
                Ok(Some(row)) => {
                    let values = (0..count)
                        .map(|i| row.get_ref(i).map(value_from_ref))
                        .collect::<rusqlite::Result<Vec<_>>>();
                    pending.push_back(values);
                }
                Ok(None) => break,
                Err(e) => {
                    terminal = Some(e);
                    break;
                }
            }
        }

        Ok(SqliteRows {
            columns,
            pending,
            current: None,
            first_kinds: None,
            terminal,
            closed: false,
        })
    }
}

impl Rows for SqliteRows {
    fn next(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.current = self.pending.pop_front();
        if self.first_kinds.is_none() {
            if let Some(Ok(values)) = &self.current {
                self.first_kinds = Some(values.iter().map(Value::kind).collect());
            }
        }
        self.current.is_some()
    }

    fn column_types(&self) -> Result<Vec<Column>> {
        Ok(self
            .columns
            .iter()
            .enumerate()
            .map(|(i, (name, decl))| {
                let declared = kind_from_decl(decl.as_deref());
                let scan_type = match self.first_kinds.as_ref().and_then(|k| k.get(i)) {
                    Some(ValueKind::Null) | None => declared,
                    Some(kind) => *kind,
                };
                Column {
                    name: name.clone(),
                    scan_type,
                    length: decl.as_deref().and_then(length_from_decl),
                    database_type_name: decl.clone().unwrap_or_default().to_ascii_uppercase(),
                }
            })
            .collect())
    }

    fn scan(&mut self) -> Result<Vec<Value>> {
        match self.current.take() {
            Some(Ok(values)) => Ok(values),
            Some(Err(e)) => Err(e.into()),
            None => Err(DataHelperError::Execution("scan called without a current row".to_string())),
        }
    }

    fn take_err(&mut self) -> Option<DataHelperError> {
        self.terminal.take().map(DataHelperError::from)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.pending.clear();
        self.current = None;
        Ok(())
    }
}
