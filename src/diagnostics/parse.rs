//! Diagnostics stream messages
//!
//! Each line is `{"checkStyle": {"<file>": [{line, column, length?, message, type}]}}`.
//! Lines without `checkStyle` carry other stream events and are ignored.

use lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Source attached to every published diagnostic
pub const DIAGNOSTIC_SOURCE: &str = "RTags";

/// Longest excerpt of a bad line kept in the error
const EXCERPT_LEN: usize = 120;

#[derive(Debug, thiserror::Error)]
pub enum DiagnosticsParseError {
    #[error("Malformed diagnostics line ({excerpt}): {source}")]
    Json {
        excerpt: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(rename = "checkStyle")]
    check_style: Option<BTreeMap<PathBuf, Vec<RawDiagnostic>>>,
}

#[derive(Debug, Deserialize)]
struct RawDiagnostic {
    line: u32,
    column: u32,
    #[serde(default)]
    length: Option<u32>,
    message: String,
    #[serde(rename = "type", default)]
    kind: String,
}

impl RawDiagnostic {
    fn into_diagnostic(self) -> Diagnostic {
        let line = self.line.saturating_sub(1);
        let column = self.column.saturating_sub(1);
        let end = column.saturating_add(self.length.unwrap_or(0));
        Diagnostic {
            range: Range::new(Position::new(line, column), Position::new(line, end)),
            severity: Some(severity(&self.kind)),
            source: Some(DIAGNOSTIC_SOURCE.to_string()),
            message: self.message,
            ..Default::default()
        }
    }
}

/// Map an rc severity string; anything unrecognized counts as an error
pub fn severity(kind: &str) -> DiagnosticSeverity {
    match kind {
        "warning" => DiagnosticSeverity::WARNING,
        "note" | "info" | "information" => DiagnosticSeverity::INFORMATION,
        _ => DiagnosticSeverity::ERROR,
    }
}

/// Parse one stream line into per-file diagnostic batches
pub fn parse_line(line: &str) -> Result<Vec<(PathBuf, Vec<Diagnostic>)>, DiagnosticsParseError> {
    let message: StreamMessage =
        serde_json::from_str(line).map_err(|source| DiagnosticsParseError::Json {
            excerpt: line.chars().take(EXCERPT_LEN).collect(),
            source,
        })?;

    Ok(message
        .check_style
        .unwrap_or_default()
        .into_iter()
        .map(|(path, records)| {
            let diagnostics = records
                .into_iter()
                .map(RawDiagnostic::into_diagnostic)
                .collect();
            (path, diagnostics)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_become_zero_based() {
        let batches = parse_line(
            r#"{"checkStyle":{"/ws/a.cpp":[{"line":3,"column":5,"message":"expected ';'","type":"error"}]}}"#,
        )
        .unwrap();

        assert_eq!(batches.len(), 1);
        let (path, diagnostics) = &batches[0];
        assert_eq!(path, &PathBuf::from("/ws/a.cpp"));
        assert_eq!(diagnostics.len(), 1);
        let diagnostic = &diagnostics[0];
        assert_eq!(diagnostic.range.start, Position::new(2, 4));
        assert_eq!(diagnostic.range.end, Position::new(2, 4));
        assert_eq!(diagnostic.severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(diagnostic.message, "expected ';'");
        assert_eq!(diagnostic.source.as_deref(), Some("RTags"));
    }

    #[test]
    fn test_length_extends_range_and_order_is_kept() {
        let batches = parse_line(
            r#"{"checkStyle":{"/ws/b.cpp":[
                {"line":10,"column":1,"length":4,"message":"unused variable","type":"warning"},
                {"line":2,"column":7,"message":"declared here","type":"note"}
            ]}}"#,
        )
        .unwrap();

        let diagnostics = &batches[0].1;
        assert_eq!(diagnostics[0].range.start, Position::new(9, 0));
        assert_eq!(diagnostics[0].range.end, Position::new(9, 4));
        assert_eq!(diagnostics[0].severity, Some(DiagnosticSeverity::WARNING));
        assert_eq!(diagnostics[1].severity, Some(DiagnosticSeverity::INFORMATION));
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(severity("error"), DiagnosticSeverity::ERROR);
        assert_eq!(severity("fixit"), DiagnosticSeverity::ERROR);
        assert_eq!(severity("skipped"), DiagnosticSeverity::ERROR);
        assert_eq!(severity(""), DiagnosticSeverity::ERROR);
        assert_eq!(severity("warning"), DiagnosticSeverity::WARNING);
        assert_eq!(severity("note"), DiagnosticSeverity::INFORMATION);
    }

    #[test]
    fn test_empty_file_list_and_other_messages() {
        let batches = parse_line(r#"{"checkStyle":{"/ws/a.cpp":[]}}"#).unwrap();
        assert_eq!(batches, vec![(PathBuf::from("/ws/a.cpp"), Vec::new())]);

        assert!(parse_line(r#"{"progress":"indexing"}"#).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_line() {
        let error = parse_line("{\"checkStyle\": [").unwrap_err();
        assert!(error.to_string().starts_with("Malformed diagnostics line"));
        assert!(parse_line("not json").is_err());
    }
}
