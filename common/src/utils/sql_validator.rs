//! Guard for ad-hoc diagnostic SQL.

use crate::errors::AppError;

/// Validates ad-hoc SQL before it is passed through to a source.
pub struct SqlValidator;

/// Keywords that are never passed through.
const FORBIDDEN_KEYWORDS: [&str; 9] = [
    "DROP", "TRUNCATE", "DELETE", "ALTER", "INSERT", "UPDATE", "CREATE", "GRANT", "EXEC",
];

impl SqlValidator {
    /// Rejects statements containing destructive keywords or more than one statement.
    ///
    /// # Errors
    /// Returns `AppError::UnsafeSql` naming the offending keyword.
    pub fn validate(sql: &str) -> Result<(), AppError> {
        let trimmed = sql.trim().trim_end_matches(';');
        if trimmed.is_empty() {
            return Err(AppError::Validation("SQL statement is required".into()));
        }
        let masked = mask_quoted(trimmed)
            .ok_or_else(|| AppError::Validation("unterminated quoted text".into()))?;
        if masked.contains(';') {
            return Err(AppError::UnsafeSql("multiple statements".into()));
        }
        let sql_upper = masked.to_uppercase();
        let words = sql_upper.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'));
        for word in words {
            if let Some(keyword) = FORBIDDEN_KEYWORDS.iter().find(|k| **k == word) {
                return Err(AppError::UnsafeSql(format!("forbidden operation: {keyword}")));
            }
        }
        Ok(())
    }

    /// Checks if the SQL is a read query.
    pub fn is_select(sql: &str) -> bool {
        let sql_upper = sql.trim_start().to_uppercase();
        sql_upper.starts_with("SELECT") || sql_upper.starts_with("WITH")
    }
}

/// Blanks out string literals and quoted identifiers.
///
/// Returns `None` when a quote is left open.
fn mask_quoted(sql: &str) -> Option<String> {
    let mut masked = String::with_capacity(sql.len());
    let mut closing = None;
    for c in sql.chars() {
        match closing {
            Some(end) if c == end => {
                closing = None;
                masked.push(' ');
            }
            Some(_) => {}
            None => {
                closing = match c {
                    '\'' => Some('\''),
                    '"' => Some('"'),
                    '`' => Some('`'),
                    '[' => Some(']'),
                    _ => None,
                };
                masked.push(if closing.is_some() { ' ' } else { c });
            }
        }
    }
    closing.is_none().then_some(masked)
}
