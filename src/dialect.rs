/// Dialect Resolver
///
/// Maps a driver name and its connection settings to the SQL dialect facts the
/// rewriter and statement builders need.
use crate::config::DatabaseInfo;

/// The token templates use for positional parameters.
pub const CANONICAL_PLACEHOLDER: &str = "?";

/// Where the row-limiting keyword goes in a SELECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLimitPlacement {
    /// Right after SELECT (`SELECT TOP 1 ...`)
    Front,
    /// After the table expression (`... LIMIT 1`)
    Rear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    pub driver_name: String,
    pub parameter_placeholder: String,
    pub parameter_in_sequence: bool,
    pub row_limit_keyword: String,
    pub row_limit_placement: RowLimitPlacement,
    pub reserved_word_open: char,
    pub reserved_word_close: char,
    pub schema: String,
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect {
            driver_name: String::new(),
            parameter_placeholder: CANONICAL_PLACEHOLDER.to_string(),
            parameter_in_sequence: false,
            row_limit_keyword: "LIMIT".to_string(),
            row_limit_placement: RowLimitPlacement::Rear,
            reserved_word_open: '"',
            reserved_word_close: '"',
            schema: String::new(),
        }
    }
}

fn is_sqlserver_family(driver: &str) -> bool {
    matches!(driver, "sqlserver" | "mssql")
}

fn is_postgres_family(driver: &str) -> bool {
    matches!(driver, "postgres" | "postgresql" | "pgx")
}

/// Splits a configured escape setting into its open and close characters.
pub fn escape_chars(setting: &str) -> (char, char) {
    let mut chars = setting.chars();
    match (chars.next(), chars.next()) {
        (None, _) => ('"', '"'),
        (Some(c), None) => (c, c),
        (Some(open), Some(close)) => (open, close),
    }
}

impl Dialect {
    /// Resolves the dialect for a connection. Explicit settings win over the
    /// driver family defaults.
    pub fn resolve(info: &DatabaseInfo) -> Dialect {
        let driver = info.driver_name.trim().to_ascii_lowercase();
        let mut dialect = Dialect {
            driver_name: info.driver_name.clone(),
            schema: info.schema.trim().to_string(),
            ..Dialect::default()
        };

        if is_sqlserver_family(&driver) {
            dialect.row_limit_keyword = "TOP".to_string();
            dialect.row_limit_placement = RowLimitPlacement::Front;
        }

        if info.parameter_placeholder.is_empty() {
            if is_sqlserver_family(&driver) {
                dialect.parameter_placeholder = "@p".to_string();
                dialect.parameter_in_sequence = true;
            } else if is_postgres_family(&driver) {
                dialect.parameter_placeholder = "$".to_string();
                dialect.parameter_in_sequence = true;
            }
        } else {
            dialect.parameter_placeholder = info.parameter_placeholder.clone();
            dialect.parameter_in_sequence = info.parameter_in_sequence;
        }

        let (open, close) = escape_chars(&info.reserved_word_escape_char);
        dialect.reserved_word_open = open;
        dialect.reserved_word_close = close;
        dialect
    }

    /// Resolves a dialect from a driver name alone.
    pub fn for_driver(driver_name: &str) -> Dialect {
        Dialect::resolve(&DatabaseInfo {
            driver_name: driver_name.to_string(),
            ..Default::default()
        })
    }
}
