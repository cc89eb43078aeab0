//! TOML syntax checking via the `toml` parser.

use serde_json::Value;

use super::{error_result, line_col_at, ok_result, source_arg, source_line};
use crate::service::CheckerPlugin;

pub struct TomlCheck;

impl CheckerPlugin for TomlCheck {
    fn service_name(&self) -> &'static str {
        "toml"
    }

    fn check(&self, filename: &str, args: &[Value]) -> Value {
        let src = match source_arg(args) {
            Ok(src) => src,
            Err(reason) => return error_result(filename, 1, 1, "", reason),
        };
        match src.parse::<toml::Table>() {
            Ok(_) => ok_result(),
            Err(err) => {
                let offset = err.span().map(|span| span.start).unwrap_or(0);
                let (line, column) = line_col_at(src, offset);
                error_result(
                    filename,
                    line,
                    column,
                    &source_line(src, line),
                    err.message(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_toml_passes() {
        let result = TomlCheck.check("ok.toml", &[json!("key = \"value\"\n[table]\nx = 1\n")]);
        assert_eq!(result, json!([{}]));
    }

    #[test]
    fn invalid_toml_reports_location_tuple() {
        let result = TomlCheck.check("bad.toml", &[json!("not = valid = toml")]);
        let error = &result[0]["error"];
        assert_eq!(error[0], "bad.toml");
        assert_eq!(error[1], 1);
        assert_eq!(error[3], "not = valid = toml");
        assert!(error[4].as_str().is_some_and(|msg| !msg.is_empty()));
    }

    #[test]
    fn missing_source_is_a_job_level_error() {
        let result = TomlCheck.check("none.toml", &[]);
        assert_eq!(result[0]["error"][4], "no source argument supplied");
    }
}
