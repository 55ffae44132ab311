/// Query Execution Module
///
/// This module materializes result sets into `DataTable`s and builds the
/// single-row read, existence check and exec operations on top of the routed
/// statement primitives.

use super::connection::DataHelper;
use crate::core::{DataHelperError, Result};
use crate::driver::{ExecResult, Rows};
use crate::rewrite::{exists_statement, extract_alias, select_statement};
use crate::table::{Cell, DataTable, Row, Value};
use std::ops::{Deref, DerefMut};
use tracing::warn;

/// Result of a single-row read. `has_result == false` with an empty row is
/// the "no matching record" outcome, not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SingleRow {
    pub has_result: bool,
    pub row: Row,
}

/// Owns a driver cursor and closes it when dropped, on every exit path.
struct Cursor(Box<dyn Rows>);

impl Deref for Cursor {
    type Target = dyn Rows;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for Cursor {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if let Err(e) = self.0.close() {
            warn!("Closing cursor failed: {}", e);
        }
    }
}

/// Streams a cursor into a table.
///
/// Columns are introspected once, after the first successful fetch. A row
/// that fails to scan, or scans to the wrong width, is skipped. The error that
/// ended iteration, if any, is returned once the loop is done.
fn materialize(rows: &mut dyn Rows) -> Result<DataTable> {
    let mut table = DataTable::new("data");
    let mut columns_added = false;

    while rows.next() {
        if !columns_added {
            for column in rows.column_types()? {
                table.add_column(&column.name, column.scan_type, column.length, &column.database_type_name);
            }
            columns_added = true;
        }

        let values = match rows.scan() {
            Ok(values) => values,
            Err(e) => {
                warn!("Skipping row {}: {}", table.row_count(), e);
                continue;
            }
        };
        if values.len() != table.column_count() {
            warn!(
                "Skipping row {}: {} values for {} columns",
                table.row_count(),
                values.len(),
                table.column_count()
            );
            continue;
        }

        let mut row = table.new_row();
        for (cell, value) in row.cells.iter_mut().zip(values) {
            cell.value = value;
        }
        table.add_row(row)?;
    }

    match rows.take_err() {
        Some(e) => Err(e),
        None => Ok(table),
    }
}

/// Fetches and scans the first row only. `Ok(None)` when there is none.
fn fetch_first(rows: &mut dyn Rows) -> Result<Option<Vec<Value>>> {
    if rows.next() {
        return rows.scan().map(Some);
    }
    match rows.take_err() {
        Some(e) => Err(e),
        None => Ok(None),
    }
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DataHelperError::Validation(format!("{} is required", what)));
    }
    Ok(())
}

impl DataHelper {
    /// Runs a query template and returns every row it produced
    ///
    /// # Arguments
    ///
    /// * `template` - SQL using `?` parameters and `{table}` placeholders
    /// * `args` - Positional arguments, in order of appearance
    ///
    /// # Errors
    ///
    /// Returns the driver's error if the statement fails, or the error that
    /// ended row iteration. Rows that fail to decode are skipped, not reported.
    pub fn get_data(&mut self, template: &str, args: &[Value]) -> Result<DataTable> {
        let sql = self.rewrite(template);
        let mut cursor = Cursor(self.issue(|target| target.query(&sql, args))?);
        let result = materialize(&mut *cursor);
        drop(cursor);
        self.settle(result)
    }

    /// Reads the first row of `SELECT <columns> FROM <table_expression>`.
    ///
    /// Each cell is labelled with the column's public name: `AS` aliases and
    /// reserved-word brackets are stripped, so `COUNT(*) AS [Total]` is `Total`.
    pub fn get_row(&mut self, columns: &[&str], table_expression: &str, args: &[Value]) -> Result<SingleRow> {
        if columns.is_empty() || columns.iter().any(|c| c.trim().is_empty()) {
            return Err(DataHelperError::Validation("column list is required".to_string()));
        }
        require(table_expression, "table expression")?;

        let sql = self.rewrite(&select_statement(columns, table_expression));
        let mut cursor = Cursor(self.issue(|target| target.query(&sql, args))?);
        let fetched = fetch_first(&mut *cursor);

        let values = match self.settle(fetched)? {
            Some(values) => values,
            None => return Ok(SingleRow::default()),
        };

        let names: Vec<String> = if values.len() == columns.len() {
            let (open, close) = (self.dialect.reserved_word_open, self.dialect.reserved_word_close);
            columns.iter().map(|c| extract_alias(c, open, close)).collect()
        } else {
            // `*` and similar expand to more values than requested expressions.
            cursor.column_types()?.into_iter().map(|c| c.name).collect()
        };

        let cells = values
            .into_iter()
            .zip(names)
            .enumerate()
            .map(|(column_index, (value, column_name))| Cell {
                column_index,
                column_name,
                value,
            })
            .collect();

        Ok(SingleRow {
            has_result: true,
            row: Row { cells, row_index: 0 },
        })
    }

    /// Whether `table_expression` (a table plus optional `WHERE ...`) matches any row.
    pub fn exists(&mut self, table_expression: &str, args: &[Value]) -> Result<bool> {
        require(table_expression, "table expression")?;

        let sql = self.rewrite(&exists_statement(table_expression, &self.dialect));
        let mut cursor = Cursor(self.issue(|target| target.query(&sql, args))?);
        let fetched = fetch_first(&mut *cursor);
        drop(cursor);
        Ok(self.settle(fetched)?.is_some())
    }

    /// Executes a statement that returns no rows, such as INSERT, UPDATE or DELETE.
    pub fn exec(&mut self, template: &str, args: &[Value]) -> Result<ExecResult> {
        let sql = self.rewrite(template);
        self.issue(|target| target.exec(&sql, args))
    }
}
