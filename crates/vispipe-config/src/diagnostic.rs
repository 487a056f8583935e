// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-to-miette error bridge with fuzzy match suggestions.
//!
//! Converts Figment deserialization errors into miette diagnostics with
//! source spans, valid key listings, and "did you mean?" suggestions based on
//! Jaro-Winkler similarity.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity score to suggest a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration error with rich diagnostic information.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// An unknown key was found in the configuration.
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(vispipe::config::unknown_key),
        help("{}", format_suggestion_help(suggestion.as_deref(), "valid keys", valid_keys))
    )]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("this key is not recognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A configuration value has the wrong type.
    #[error("invalid type for key `{key}`: {detail}")]
    #[diagnostic(code(vispipe::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
    },

    /// A required configuration key is missing.
    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(vispipe::config::missing_key),
        help("add `{key} = <value>` to your vispipe.toml")
    )]
    MissingKey { key: String },

    /// A command or `engine.default_pipeline` named a pipeline that is not configured.
    #[error("pipeline `{name}` is not configured")]
    #[diagnostic(
        code(vispipe::config::unknown_pipeline),
        help("{}", format_suggestion_help(suggestion.as_deref(), "configured pipelines", available))
    )]
    UnknownPipeline {
        name: String,
        suggestion: Option<String>,
        available: String,
    },

    /// A configured pipeline's node table is not a valid definition.
    #[error("pipeline `{pipeline}` is invalid: {message}")]
    #[diagnostic(
        code(vispipe::config::invalid_pipeline),
        help("nodes must be keyed \"1\"..\"N\" without gaps and each must name a unit")
    )]
    InvalidPipeline { pipeline: String, message: String },

    /// A validation error for a config value.
    #[error("validation error: {message}")]
    #[diagnostic(code(vispipe::config::validation))]
    Validation { message: String },

    /// Catch-all for other configuration errors.
    #[error("configuration error: {0}")]
    #[diagnostic(code(vispipe::config::other))]
    Other(String),
}

fn format_suggestion_help(suggestion: Option<&str>, label: &str, candidates: &str) -> String {
    let candidates = if candidates.is_empty() {
        "(none)"
    } else {
        candidates
    };
    match suggestion {
        Some(s) => format!("did you mean `{s}`? {label}: {candidates}"),
        None => format!("{label}: {candidates}"),
    }
}

/// Convert a `figment::Error` into a list of `ConfigError` diagnostics.
///
/// A figment error may carry several failures; each becomes one diagnostic.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| match &error.kind {
            Kind::UnknownField(field, expected) => {
                let valid_keys: Vec<&str> = expected.to_vec();
                let (span, src) = find_source_span(&error, field, toml_sources);
                ConfigError::UnknownKey {
                    key: field.clone(),
                    suggestion: suggest_key(field, &valid_keys),
                    valid_keys: valid_keys.join(", "),
                    span,
                    src,
                }
            }
            Kind::MissingField(field) => ConfigError::MissingKey {
                key: dotted(&error.path, field),
            },
            Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
                key: error.path.join("."),
                detail: format!("found {actual}, expected {expected}"),
                expected: expected.to_string(),
            },
            _ => ConfigError::Other(error.to_string()),
        })
        .collect()
}

fn dotted(path: &[String], field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{field}", path.join("."))
    }
}

/// Find the source span of `field` in whichever TOML file the error came from.
fn find_source_span(
    error: &figment::error::Error,
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let source_path = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });

    // Inline sources carry no file path; a single inline source is unambiguous.
    let source = match source_path {
        Some(path) => toml_sources.iter().find(|(p, _)| *p == path),
        None if toml_sources.len() == 1 => toml_sources.first(),
        None => None,
    };

    if let Some((path, content)) = source {
        if let Some(offset) = find_key_offset(content, &error.path, field) {
            let span = SourceSpan::new(offset.into(), field.len());
            let named = NamedSource::new(path, content.clone());
            return (Some(span), Some(named));
        }
    }

    (None, None)
}

/// Find the byte offset of a key in TOML content, relative to a table path.
///
/// For `path = ["pipelines", "search", "nodes", "1"]` the deepest matching
/// header (`[pipelines.search.nodes.1]`, then `[pipelines.search.nodes]`, ...)
/// is located first and the key is searched for after it.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let search_start = if path.is_empty() {
        0
    } else {
        (1..=path.len()).rev().find_map(|len| {
            let header = format!("[{}]", path[..len].join("."));
            content.find(&header).map(|pos| pos + header.len())
        })?
    };

    let remaining = &content[search_start..];
    let mut byte_offset = 0;
    for line in remaining.lines() {
        let trimmed = line.trim_start();
        if let Some(after) = trimmed.strip_prefix(field) {
            if after.starts_with(' ') || after.starts_with('=') || after.starts_with('\t') {
                let field_start_in_line = line.len() - trimmed.len();
                return Some(search_start + byte_offset + field_start_in_line);
            }
        }
        byte_offset += line.len() + 1;
    }

    None
}

/// Suggest a similar key name using Jaro-Winkler string similarity.
///
/// Returns the best match above the similarity threshold, if any.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    let mut best_score = SUGGESTION_THRESHOLD;
    let mut best_match = None;

    for &key in valid_keys {
        let score = strsim::jaro_winkler(unknown, key);
        if score > best_score {
            best_score = score;
            best_match = Some(key.to_string());
        }
    }

    best_match
}

/// Render a list of `ConfigError`s to stderr using miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        let diagnostic: &dyn Diagnostic = error;
        if handler.render_report(&mut buf, diagnostic).is_ok() {
            eprint!("{buf}");
        } else {
            eprintln!("Error: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggest_unit_for_unti() {
        let valid = &["name", "unit", "router", "router_params"];
        assert_eq!(suggest_key("unti", valid), Some("unit".to_string()));
    }

    #[test]
    fn suggest_log_level_for_loglevel() {
        let valid = &["log_level", "default_pipeline"];
        assert_eq!(suggest_key("loglevel", valid), Some("log_level".to_string()));
    }

    #[test]
    fn no_suggestion_for_distant_typo() {
        let valid = &["log_level", "default_pipeline"];
        assert_eq!(suggest_key("zzzzzz", valid), None);
    }

    #[test]
    fn find_key_offset_in_nested_table() {
        let content =
            "[engine]\nlog_level = \"info\"\n\n[pipelines.search.nodes.1]\nunti = \"A\"\n";
        let path: Vec<String> = ["pipelines", "search", "nodes", "1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let offset = find_key_offset(content, &path, "unti").unwrap();
        assert_eq!(&content[offset..offset + 4], "unti");
    }

    #[test]
    fn find_key_offset_misses_absent_key() {
        let content = "[engine]\nlog_level = \"info\"\n";
        assert_eq!(find_key_offset(content, &["engine".to_string()], "levels"), None);
    }

    #[test]
    fn unknown_pipeline_help_lists_candidates() {
        assert_eq!(
            format_suggestion_help(Some("search"), "configured pipelines", "index, search"),
            "did you mean `search`? configured pipelines: index, search"
        );
        assert_eq!(
            format_suggestion_help(None, "configured pipelines", ""),
            "configured pipelines: (none)"
        );
    }
}
