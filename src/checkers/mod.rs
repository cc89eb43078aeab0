//! # Built-in Checker Services
//!
//! The compiled-in plugin table behind `INIT`. Each checker's single-job
//! entry point takes `(filename, args)` with `args[0]` holding the source
//! text, and returns a JSON list: `[{}]` when the source parses, otherwise
//! `[{"error": [filename, line, column, codeSnippet, message]}]`. Parse
//! failures are encoded into the result, never raised.

pub mod json;
pub mod toml;
pub mod yaml;

use std::sync::Arc;

use serde_json::{Value, json};

use crate::service::CheckerPlugin;

/// Resolve an `INIT` module name to its compiled-in plugin.
pub fn load_module(module: &str) -> Option<Arc<dyn CheckerPlugin>> {
    match module {
        "toml_check" | "toml" => Some(Arc::new(toml::TomlCheck)),
        "json_check" | "json" => Some(Arc::new(json::JsonCheck)),
        "yaml_check" | "yaml" => Some(Arc::new(yaml::YamlCheck)),
        _ => None,
    }
}

/// Result list for a source that parsed cleanly.
pub fn ok_result() -> Value {
    json!([{}])
}

/// Result list carrying one syntax error as the standard 5-tuple.
pub fn error_result(
    filename: &str,
    line: usize,
    column: usize,
    snippet: &str,
    message: &str,
) -> Value {
    json!([{ "error": [filename, line, column, snippet, message] }])
}

/// Pull the source text out of `args[0]`, or describe why it is missing.
pub fn source_arg(args: &[Value]) -> Result<&str, &'static str> {
    match args.first() {
        Some(Value::String(src)) => Ok(src),
        Some(_) => Err("source argument is not a string"),
        None => Err("no source argument supplied"),
    }
}

/// 1-based line and column of a byte offset into `src`.
///
/// Offsets inside a multi-byte character snap back to its first byte, so a
/// parser-reported position can never split a UTF-8 sequence.
pub fn line_col_at(src: &str, offset: usize) -> (usize, usize) {
    let mut offset = offset.min(src.len());
    while !src.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &src[..offset];
    let line = before.bytes().filter(|b| *b == b'\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    (line, offset - line_start + 1)
}

/// Text of the given 1-based line, for the code-snippet slot of the tuple.
pub fn source_line(src: &str, line: usize) -> String {
    src.lines().nth(line.saturating_sub(1)).unwrap_or("").to_string()
}
