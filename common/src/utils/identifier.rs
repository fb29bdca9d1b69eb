//! Identifier quoting for dynamically built SQL.

/// Quoting convention of a SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    /// `"name"` (ANSI, PostgreSQL, SQLite).
    DoubleQuote,
    /// `` `name` `` (MySQL).
    Backtick,
    /// `[name]` (SQL Server, Access).
    Bracket,
}

/// Quotes an identifier, escaping the closing delimiter by doubling it.
///
/// A dotted name is quoted part by part so `schema.table` keeps its qualifier.
pub fn quote_identifier(name: &str, style: QuoteStyle) -> String {
    name.split('.')
        .map(|part| quote_part(part, style))
        .collect::<Vec<_>>()
        .join(".")
}

fn quote_part(part: &str, style: QuoteStyle) -> String {
    match style {
        QuoteStyle::DoubleQuote => format!("\"{}\"", part.replace('"', "\"\"")),
        QuoteStyle::Backtick => format!("`{}`", part.replace('`', "``")),
        QuoteStyle::Bracket => format!("[{}]", part.replace(']', "]]")),
    }
}

/// Wraps a catalog lookup value in brackets, as some catalogs store bracketed names.
pub fn bracketed(name: &str) -> String {
    format!("[{name}]")
}
