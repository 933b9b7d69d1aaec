// Purpose: Report diagnostics for a single buffer.
// Inputs/Outputs: (filename, buffer) in; a capped list of {line, column, message}.
// Invariants: Parse errors surface verbatim and suppress type errors; type
//   errors are filtered to the buffer's own file.
// Gotchas: The cap applies after filtering, so foreign-file errors never crowd
//   out buffer errors.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::pkg::PkgCache;
use crate::query::analyze;

pub const MAX_ERRORS: usize = 100;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportedError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

pub fn report_errors(cache: &PkgCache, filename: &Path, data: &str) -> Vec<ReportedError> {
    let analysis = match analyze(cache, filename, data) {
        Some(a) => a,
        None => {
            // No package clause parsed; surface what the parser said.
            let (_, diags) = crate::frontend::parser::parse_source(
                data,
                crate::frontend::parser::ParseMode::Full,
            );
            return diags
                .items
                .iter()
                .take(MAX_ERRORS)
                .map(|d| ReportedError {
                    line: d.span.as_ref().map(|s| s.line).unwrap_or(0),
                    column: d.span.as_ref().map(|s| s.column).unwrap_or(0),
                    message: d.message.clone(),
                })
                .collect();
        }
    };
    if !analysis.parse_diags.is_empty() {
        return analysis
            .parse_diags
            .items
            .iter()
            .take(MAX_ERRORS)
            .map(|d| ReportedError {
                line: d.span.as_ref().map(|s| s.line).unwrap_or(0),
                column: d.span.as_ref().map(|s| s.column).unwrap_or(0),
                message: d.message.clone(),
            })
            .collect();
    }
    analysis
        .check
        .errors
        .iter()
        .filter(|e| e.file == analysis.file_id)
        .take(MAX_ERRORS)
        .map(|e| ReportedError {
            line: e.span.line,
            column: e.span.column,
            message: e.message.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::context::PackedContext;
    use std::path::PathBuf;

    fn cache() -> PkgCache {
        PkgCache::new(PackedContext {
            goos: "linux".to_string(),
            goarch: "amd64".to_string(),
            compiler: "gc".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn parse_errors_win_over_type_errors() {
        let cache = cache();
        let buffer = "package main\n\nfunc broken( {\n\treturn nosuch\n}\n";
        let errors = report_errors(&cache, &PathBuf::from("/tmp/x/buf.go"), buffer);
        assert!(!errors.is_empty());
        assert!(errors.iter().all(|e| !e.message.contains("undefined")));
    }

    #[test]
    fn type_errors_carry_positions_for_the_buffer_only() {
        let cache = cache();
        let buffer = "package main\n\nfunc main() {\n\t_ = missing\n}\n";
        let errors = report_errors(&cache, &PathBuf::from("/tmp/x/buf.go"), buffer);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "undefined: missing");
        assert_eq!(errors[0].line, 4);
    }

    #[test]
    fn clean_buffer_reports_nothing() {
        let cache = cache();
        let buffer = "package main\n\nfunc main() {\n\tx := 1\n\t_ = x\n}\n";
        let errors = report_errors(&cache, &PathBuf::from("/tmp/x/buf.go"), buffer);
        assert!(errors.is_empty(), "unexpected: {:?}", errors);
    }
}
