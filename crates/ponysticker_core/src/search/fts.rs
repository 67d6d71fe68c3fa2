//! FTS5 match expression helpers.
//!
//! # Responsibility
//! - Quote normalized tokens so user text can never inject FTS5 syntax.
//! - Classify SQLite failures caused by a malformed match expression.
//!
//! # Invariants
//! - Only normalized text reaches [`match_expression`]; tokens are ANDed.
//! - Text without tokens yields no expression, so it matches no rows.

use crate::search::tokenizer::normalize;

/// Builds an FTS5 expression from already-normalized text.
///
/// Returns `None` when the text has no tokens.
pub fn match_expression(normalized: &str) -> Option<String> {
    let terms = normalized
        .split_whitespace()
        .map(escape_fts_term)
        .collect::<Vec<_>>();

    if terms.is_empty() {
        return None;
    }

    Some(terms.join(" "))
}

/// Normalizes raw user text and builds its match expression.
pub fn query_expression(raw: &str) -> Option<String> {
    match_expression(&normalize(raw))
}

fn escape_fts_term(raw: &str) -> String {
    let escaped = raw.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

/// Returns whether a SQLite error was raised by the FTS5 query parser.
pub fn is_match_syntax_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => {
            let msg = message.to_lowercase();
            (msg.contains("fts5") && msg.contains("syntax"))
                || msg.contains("malformed match expression")
                || msg.contains("unterminated")
        }
        _ => false,
    }
}
