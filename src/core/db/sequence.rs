/// Sequence Module
///
/// Named counters allocated through the connection's sequence templates.
use super::connection::DataHelper;
use crate::core::{DataHelperError, Result};
use tracing::{debug, warn};

impl DataHelper {
    /// Allocates the next value of the counter named `key`.
    ///
    /// The key replaces the configured name placeholder in both the upsert and
    /// the result template verbatim, so it must come from trusted code, never
    /// from user input. The upsert runs first; the result template is only read
    /// when it succeeds.
    ///
    /// Returns an empty string when the result template yields no row.
    pub fn get_sequence(&mut self, key: &str) -> Result<String> {
        let generator = self
            .info
            .sequence_generator
            .clone()
            .filter(|g| !g.upsert_query.trim().is_empty() && !g.result_query.trim().is_empty())
            .ok_or_else(|| DataHelperError::Config("Sequence query was not yet setup".to_string()))?;
        if generator.name_placeholder.is_empty() {
            return Err(DataHelperError::Config(
                "Sequence name placeholder was not yet setup".to_string(),
            ));
        }

        let upsert = generator.upsert_query.replace(&generator.name_placeholder, key);
        let read = generator.result_query.replace(&generator.name_placeholder, key);
        debug!("Allocating sequence '{}'", key);

        self.exec(&upsert, &[])?;

        let table = self.get_data(&read, &[])?;
        let row = match table.rows.first() {
            Some(row) => row,
            None => {
                warn!("Sequence '{}' returned no row after upsert", key);
                return Ok(String::new());
            }
        };

        match row.int64(0) {
            Some(next) => Ok(next.to_string()),
            None => {
                let err = DataHelperError::Execution(format!(
                    "Sequence '{}' did not return an integer value",
                    key
                ));
                self.ledger.record(&err);
                Err(err)
            }
        }
    }
}
