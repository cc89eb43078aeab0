//! JSON syntax checking via `serde_json`.

use serde_json::Value;

use super::{error_result, ok_result, source_arg, source_line};
use crate::service::CheckerPlugin;

pub struct JsonCheck;

impl CheckerPlugin for JsonCheck {
    fn service_name(&self) -> &'static str {
        "json"
    }

    fn check(&self, filename: &str, args: &[Value]) -> Value {
        let src = match source_arg(args) {
            Ok(src) => src,
            Err(reason) => return error_result(filename, 1, 1, "", reason),
        };
        match serde_json::from_str::<Value>(src) {
            Ok(_) => ok_result(),
            Err(err) => {
                let (line, column) = (err.line().max(1), err.column().max(1));
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
