use std::sync::LazyLock;

use regex::Regex;

static PLAIN_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid")
});

pub(crate) fn extract_column_names<I, T, F>(columns: I, name: F) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> &str,
{
    columns
        .into_iter()
        .map(|col| name(&col).to_string())
        .collect()
}

/// Quote an identifier for SQL text unless it is a plain `[A-Za-z_][A-Za-z0-9_]*` name.
///
/// Double quotes are standard for `PostgreSQL`, `SQLite`, and Flight SQL servers.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    if PLAIN_IDENTIFIER.is_match(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// `schema.table` when a schema is given, otherwise just the table, both quoted as needed.
#[must_use]
pub fn qualified_name(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(table)),
        None => quote_identifier(table),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifiers_stay_bare() {
        assert_eq!(quote_identifier("orders_2024"), "orders_2024");
        assert_eq!(qualified_name(Some("sales"), "orders"), "sales.orders");
    }

    #[test]
    fn unusual_identifiers_are_quoted() {
        assert_eq!(quote_identifier("order date"), "\"order date\"");
        assert_eq!(quote_identifier("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(quote_identifier("2fast"), "\"2fast\"");
        assert_eq!(qualified_name(None, "my-table"), "\"my-table\"");
    }
}
