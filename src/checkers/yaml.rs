//! YAML syntax checking via `serde_yaml`.

use serde_json::Value;

use super::{error_result, ok_result, source_arg, source_line};
use crate::service::CheckerPlugin;

pub struct YamlCheck;

impl CheckerPlugin for YamlCheck {
    fn service_name(&self) -> &'static str {
        "yaml"
    }

    fn check(&self, filename: &str, args: &[Value]) -> Value {
        let src = match source_arg(args) {
            Ok(src) => src,
            Err(reason) => return error_result(filename, 1, 1, "", reason),
        };
        match serde_yaml::from_str::<serde_yaml::Value>(src) {
            Ok(_) => ok_result(),
            Err(err) => {
                let (line, column) = err
                    .location()
                    .map(|loc| (loc.line().max(1), loc.column().max(1)))
                    .unwrap_or((1, 1));
                error_result(
                    filename,
                    line,
                    column,
                    &source_line(src, line),
                    &err.to_string(),
                )
            }
        }
    }
}
