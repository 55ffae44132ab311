//! Dialect-aware data access helper.
//!
//! Application code writes parameterized SQL with `?` parameters and
//! `{table}` placeholders; a [`DataHelper`] rewrites it for the connected
//! database, routes it to the open transaction or the base connection, and
//! materializes results into a [`DataTable`].
//!
//! ```
//! use datahelper::{args, DataHelper, config::Config};
//!
//! let mut dh = DataHelper::new(Config::default());
//! dh.connect_direct("sqlite3", ":memory:", true)?;
//! dh.exec("CREATE TABLE {users} (id INTEGER PRIMARY KEY, name TEXT)", &[])?;
//! dh.exec("INSERT INTO {users} (name) VALUES (?)", &args!["alice"])?;
//!
//! let row = dh.get_row(&["name AS UserName"], "users WHERE id = ?", &args![1])?;
//! assert_eq!(row.row.string("UserName").as_deref(), Some("alice"));
//! assert!(dh.exists("users WHERE name = ?", &args!["alice"])?);
//! # Ok::<(), datahelper::DataHelperError>(())
//! ```

// Core infrastructure modules
pub mod core;

// Dialect handling and result containers
pub mod config;
pub mod dialect;
pub mod driver;
pub mod rewrite;
pub mod table;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::core::db::{DataHelper, Ledger, SingleRow};
pub use crate::core::{DataHelperError, Result};
pub use crate::dialect::{Dialect, RowLimitPlacement};
pub use crate::driver::{DriverRegistry, ExecResult};
pub use crate::table::{Cell, Column, DataTable, Row, Value, ValueKind};
