/// Savepoint Module
///
/// Savepoints simulate nested transactions inside the one open transaction.
/// No stack of active savepoints is kept: marking and discarding in a sensible
/// order is the caller's business.
use super::connection::DataHelper;
use crate::core::{DataHelperError, Result};
use tracing::debug;

const DEFAULT_SAVEPOINT_START: &str = "SAVE TRANSACTION";
const DEFAULT_SAVEPOINT_RELEASE: &str = "ROLLBACK TRANSACTION";

impl DataHelper {
    /// Sets a savepoint named `point_id` in the open transaction.
    ///
    /// The keyword is `SAVE TRANSACTION` unless the connection's keyword map
    /// overrides `savepoint_start`.
    pub fn mark(&mut self, point_id: &str) -> Result<()> {
        let keyword = self.savepoint_keyword("savepoint_start", DEFAULT_SAVEPOINT_START, point_id)?;
        self.savepoint_statement(keyword, point_id)
    }

    /// Rolls the open transaction back to the savepoint `point_id`.
    ///
    /// The keyword is `ROLLBACK TRANSACTION` unless the connection's keyword
    /// map overrides `savepoint_release`.
    pub fn discard(&mut self, point_id: &str) -> Result<()> {
        let keyword = self.savepoint_keyword("savepoint_release", DEFAULT_SAVEPOINT_RELEASE, point_id)?;
        self.savepoint_statement(keyword, point_id)
    }

    fn savepoint_keyword(&self, key: &str, default: &str, point_id: &str) -> Result<String> {
        if !self.is_in_transaction() {
            return Err(DataHelperError::State("No transaction was initiated".to_string()));
        }
        if point_id.trim().is_empty() {
            return Err(DataHelperError::Validation("savepoint id is required".to_string()));
        }
        Ok(self.info.keyword(key).unwrap_or(default).trim().to_string())
    }

    fn savepoint_statement(&mut self, keyword: String, point_id: &str) -> Result<()> {
        let sql = format!("{} {};", keyword, point_id.trim());
        debug!("Savepoint: {}", sql);
        self.issue(|target| target.exec(&sql, &[])).map(|_| ())
    }
}
