/// Query Rewriter
///
/// Turns a template written with the canonical `?` parameter token and
/// `{table}` schema placeholders into the statement text for a dialect.
/// Both passes work on the literal template text: there is no SQL parsing, so
/// a `?` inside a quoted string literal is rewritten like any other.
use crate::dialect::{Dialect, RowLimitPlacement, CANONICAL_PLACEHOLDER};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

// A bare word, or one escaped identifier that may contain spaces.
static TABLE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{(\[[^\]{}]+\]|"[^"{}]+"|`[^`{}]+`|\w+)\}"#).expect("valid table placeholder pattern")
});

/// Replaces every canonical `?` with the dialect placeholder, numbering them
/// from 1 when the dialect is sequential. Dialects whose placeholder is `?`
/// get the template back untouched.
pub fn replace_parameters<'a>(query: &'a str, dialect: &Dialect) -> Cow<'a, str> {
    if dialect.parameter_placeholder == CANONICAL_PLACEHOLDER || !query.contains(CANONICAL_PLACEHOLDER) {
        return Cow::Borrowed(query);
    }

    let mut out = String::with_capacity(query.len() + 8);
    for (i, part) in query.split(CANONICAL_PLACEHOLDER).enumerate() {
        if i > 0 {
            out.push_str(&dialect.parameter_placeholder);
            if dialect.parameter_in_sequence {
                out.push_str(&i.to_string());
            }
        }
        out.push_str(part);
    }
    Cow::Owned(out)
}

/// Replaces `{identifier}` with `schema.identifier`, or with the bare
/// identifier when no schema is configured.
pub fn replace_table_placeholders<'a>(query: &'a str, schema: &str) -> Cow<'a, str> {
    TABLE_PLACEHOLDER.replace_all(query, |caps: &Captures| {
        if schema.is_empty() {
            caps[1].to_string()
        } else {
            format!("{}.{}", schema, &caps[1])
        }
    })
}

/// Runs both passes for a dialect.
pub fn rewrite(query: &str, dialect: &Dialect) -> String {
    let tables = replace_table_placeholders(query, &dialect.schema);
    replace_parameters(&tables, dialect).into_owned()
}

/// `SELECT <columns> FROM <table expression>`
pub fn select_statement(columns: &[&str], table_expression: &str) -> String {
    format!("SELECT {} FROM {}", columns.join(", "), table_expression.trim())
}

/// Row-limited `SELECT 1` used for existence checks.
pub fn exists_statement(table_expression: &str, dialect: &Dialect) -> String {
    let table_expression = table_expression.trim();
    match dialect.row_limit_placement {
        RowLimitPlacement::Front => {
            format!("SELECT {} 1 1 FROM {}", dialect.row_limit_keyword, table_expression)
        }
        RowLimitPlacement::Rear => {
            format!("SELECT 1 FROM {} {} 1", table_expression, dialect.row_limit_keyword)
        }
    }
}

/// Derives the public name of a select-list expression.
///
/// `COUNT(*) AS [Full Name]` gives `Full Name`, `tr.WhatEver` gives
/// `WhatEver` and `tr.WhatEver AS Whenever` gives `Whenever`.
pub fn extract_alias(expression: &str, open: char, close: char) -> String {
    let mut name = expression.trim();

    // ASCII lowercasing keeps byte offsets aligned with the original.
    let lower = name.to_ascii_lowercase();
    if let Some(pos) = lower.find(" as ") {
        name = name[pos + 4..].trim();
    }

    if let Some(inner) = trailing_bracketed(name, open, close) {
        return inner.to_string();
    }

    if let Some(pos) = name.rfind(' ') {
        name = name[pos..].trim();
    }
    if let Some(pos) = name.rfind('.') {
        name = &name[pos + 1..];
    }
    name.to_string()
}

/// Interior of the `open ... close` pair that ends the expression.
fn trailing_bracketed(name: &str, open: char, close: char) -> Option<&str> {
    let body = name.strip_suffix(close)?;
    let start = body.rfind(open)? + open.len_utf8();
    Some(&body[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialect(placeholder: &str, in_sequence: bool) -> Dialect {
        Dialect {
            parameter_placeholder: placeholder.to_string(),
            parameter_in_sequence: in_sequence,
            ..Dialect::default()
        }
    }

    #[test]
    fn test_passthrough_for_native_placeholder() {
        let q = "SELECT * FROM t WHERE a = ? AND b = ?";
        assert!(matches!(replace_parameters(q, &dialect("?", true)), Cow::Borrowed(_)));
        assert_eq!(replace_parameters(q, &dialect("?", false)), q);
    }

    #[test]
    fn test_sequential_placeholders() {
        assert_eq!(replace_parameters("? ? ?", &dialect("@p", true)), "@p1 @p2 @p3");
        assert_eq!(
            replace_parameters("INSERT INTO T (a, b, c) VALUES (?,?,?);", &dialect("$", true)),
            "INSERT INTO T (a, b, c) VALUES ($1,$2,$3);"
        );
    }

    #[test]
    fn test_non_sequential_placeholders() {
        assert_eq!(replace_parameters("? ?", &dialect("$", false)), "$ $");
        assert_eq!(replace_parameters("?", &dialect(":p", false)), ":p");
    }

    #[test]
    fn test_table_placeholders() {
        assert_eq!(
            replace_table_placeholders("SELECT * FROM {orders}", "dbo"),
            "SELECT * FROM dbo.orders"
        );
        assert_eq!(replace_table_placeholders("SELECT * FROM {orders}", ""), "SELECT * FROM orders");
        assert_eq!(
            replace_table_placeholders("SELECT * FROM {[Order Details]} o JOIN {[Orders]} x", "sales"),
            "SELECT * FROM sales.[Order Details] o JOIN sales.[Orders] x"
        );
        assert_eq!(
            replace_table_placeholders(r#"DELETE FROM {"Line Items"} WHERE id = ?"#, ""),
            r#"DELETE FROM "Line Items" WHERE id = ?"#
        );
        assert_eq!(replace_table_placeholders("SELECT * FROM {`audit log`}", "ops"), "SELECT * FROM ops.`audit log`");
        // Not a placeholder: unbalanced or mixed escapes stay as written.
        assert_eq!(replace_table_placeholders("SELECT '{[a}'", "x"), "SELECT '{[a}'");
        assert_eq!(replace_table_placeholders("SELECT '{}'", "x"), "SELECT '{}'");
    }

    #[test]
    fn test_rewrite_runs_both_passes() {
        let d = Dialect {
            parameter_placeholder: "@p".into(),
            parameter_in_sequence: true,
            schema: "dbo".into(),
            ..Dialect::default()
        };
        assert_eq!(
            rewrite("SELECT * FROM {orders} WHERE id = ? AND status = ?", &d),
            "SELECT * FROM dbo.orders WHERE id = @p1 AND status = @p2"
        );
    }

    #[test]
    fn test_select_and_exists_statements() {
        assert_eq!(select_statement(&["a", "b AS c"], " t WHERE x=?"), "SELECT a, b AS c FROM t WHERE x=?");

        let rear = Dialect::for_driver("sqlite3");
        assert_eq!(exists_statement("orders WHERE id=?", &rear), "SELECT 1 FROM orders WHERE id=? LIMIT 1");

        let front = Dialect::for_driver("mssql");
        let q = exists_statement("orders WHERE id=?", &front);
        assert!(q.starts_with("SELECT TOP 1 "));
        assert_eq!(q, "SELECT TOP 1 1 FROM orders WHERE id=?");
    }

    #[test]
    fn test_extract_alias() {
        assert_eq!(extract_alias("COUNT(*) AS CountX", '[', ']'), "CountX");
        assert_eq!(extract_alias("COUNT(*) AS [Count X]", '[', ']'), "Count X");
        assert_eq!(extract_alias("tr.WhatEver", '[', ']'), "WhatEver");
        assert_eq!(extract_alias("tr.WhatEver AS Whenever", '[', ']'), "Whenever");
        assert_eq!(extract_alias("tr.WhatEver as Whenever", '"', '"'), "Whenever");
        assert_eq!(extract_alias(r#"t."Full Name""#, '"', '"'), "Full Name");
        assert_eq!(extract_alias("[dbo.Column]", '[', ']'), "dbo.Column");
        assert_eq!(extract_alias("UserName", '[', ']'), "UserName");
        assert_eq!(extract_alias("COUNT(*) cnt", '[', ']'), "cnt");
        assert_eq!(extract_alias("SUM(t.[Qty]) Total", '[', ']'), "Total");
        assert_eq!(extract_alias("t.[Unit Price]", '[', ']'), "Unit Price");
        assert_eq!(extract_alias("SUM(t.[Qty]) AS [Total Qty]", '[', ']'), "Total Qty");
    }
}
