//! Error types for graph operations

use thiserror::Error;

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    /// RDF source failed to parse
    #[error("Syntax error{}: {message}", format_position(.file, .line, .column))]
    Syntax {
        file: Option<String>,
        line: Option<u64>,
        column: Option<u64>,
        message: String,
    },

    /// SPARQL parse or evaluation failure
    #[error("Query failed: {0}")]
    Query(String),

    /// Underlying store failure
    #[error("Store operation failed: {0}")]
    Store(String),

    /// Tabular source failed to convert
    #[error("CSV ingest failed: {0}")]
    Csv(String),

    #[error("Invalid IRI: {0}")]
    InvalidIri(String),
}

fn format_position(file: &Option<String>, line: &Option<u64>, column: &Option<u64>) -> String {
    let mut out = String::new();
    if let Some(file) = file {
        out.push_str(&format!(" in {}", file));
    }
    if let Some(line) = line {
        out.push_str(&format!(" at line {}", line));
        if let Some(column) = column {
            out.push_str(&format!(" column {}", column));
        }
    }
    out
}

impl GraphError {
    /// Build a syntax error, scraping line/column hints from the parser message
    pub(crate) fn syntax(file: Option<&str>, message: String) -> Self {
        let line = scrape_number(&message, "line ");
        let column = scrape_number(&message, "column ");
        GraphError::Syntax {
            file: file.map(ToString::to_string),
            line,
            column,
            message,
        }
    }
}

fn scrape_number(message: &str, marker: &str) -> Option<u64> {
    let at = message.find(marker)? + marker.len();
    let rest = &message[at..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrapes_position_from_message() {
        let err = GraphError::syntax(Some("hooks.ttl"), "parse failure on line 12 column 7".into());
        match err {
            GraphError::Syntax { file, line, column, .. } => {
                assert_eq!(file.as_deref(), Some("hooks.ttl"));
                assert_eq!(line, Some(12));
                assert_eq!(column, Some(7));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_position_is_tolerated() {
        let err = GraphError::syntax(None, "unterminated string".into());
        assert!(err.to_string().contains("unterminated string"));
    }
}
