use chrono::Utc;
use config::shared::ConverterConfig;
use uuid::Uuid;

use crate::bail;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::types::{Row, Value};

/// A converter resolved against the catalog and bound to its target field.
///
/// Application is infallible: every transform is total over the arguments it was resolved
/// with, and a field absent from the row is treated as null.
#[derive(Debug, Clone)]
pub struct FieldConverter {
    field: String,
    op: ConvertOp,
}

#[derive(Debug, Clone)]
enum ConvertOp {
    /// Fills the field with a fixed value when it is null or absent.
    Default { value: String },
    /// Stamps the field with the current timestamp.
    SystemTimestamp,
    /// Substring substitution over the text form of the value.
    Replace { from: String, to: String },
    Prepend { prefix: String },
    Append { suffix: String },
    /// Fills the field with a fresh v4 uuid when it is null or absent.
    Uuid,
    /// Keeps the first `count` characters.
    SubstrFirst { count: usize },
    /// Keeps the last `count` characters.
    SubstrLast { count: usize },
    /// Overwrites the field with null.
    Clear,
}

impl FieldConverter {
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Applies the transform to a projected target row in place.
    pub fn apply(&self, row: &mut Row) {
        let current = row.get(&self.field);
        let missing = current.map(Value::is_null).unwrap_or(true);

        let next = match &self.op {
            ConvertOp::Default { value } => {
                if !missing {
                    return;
                }
                Value::String(value.clone())
            }
            ConvertOp::SystemTimestamp => Value::Timestamp(Utc::now().naive_utc()),
            ConvertOp::Uuid => {
                if !missing {
                    return;
                }
                Value::Uuid(Uuid::new_v4())
            }
            ConvertOp::Clear => Value::Null,
            // Text transforms leave null values alone.
            ConvertOp::Replace { from, to } => match current {
                Some(value) if !missing => Value::String(value.to_text().replace(from, to)),
                _ => return,
            },
            ConvertOp::Prepend { prefix } => match current {
                Some(value) if !missing => Value::String(format!("{prefix}{}", value.to_text())),
                _ => return,
            },
            ConvertOp::Append { suffix } => match current {
                Some(value) if !missing => Value::String(format!("{}{suffix}", value.to_text())),
                _ => return,
            },
            ConvertOp::SubstrFirst { count } => match current {
                Some(value) if !missing => {
                    Value::String(value.to_text().chars().take(*count).collect())
                }
                _ => return,
            },
            ConvertOp::SubstrLast { count } => match current {
                Some(value) if !missing => {
                    let text = value.to_text();
                    let skip = text.chars().count().saturating_sub(*count);
                    Value::String(text.chars().skip(skip).collect())
                }
                _ => return,
            },
        };

        row.insert(self.field.clone(), next);
    }
}

/// Applies a converter chain to a row, in declaration order.
pub fn apply_converters(converters: &[FieldConverter], row: &mut Row) {
    for converter in converters {
        converter.apply(row);
    }
}

/// Resolves declarative converter configs against the catalog.
///
/// Unknown names and wrong argument counts are configuration faults and fail here with
/// [`ErrorKind::ConversionError`].
pub fn resolve_converters(specs: &[ConverterConfig]) -> SyncResult<Vec<FieldConverter>> {
    specs.iter().map(resolve_converter).collect()
}

fn resolve_converter(spec: &ConverterConfig) -> SyncResult<FieldConverter> {
    let op = match spec.name.as_str() {
        "default" => ConvertOp::Default {
            value: single_arg(spec)?,
        },
        "system_timestamp" => {
            expect_args(spec, 0)?;
            ConvertOp::SystemTimestamp
        }
        "replace" => {
            expect_args(spec, 2)?;
            ConvertOp::Replace {
                from: spec.args[0].clone(),
                to: spec.args[1].clone(),
            }
        }
        "prepend" => ConvertOp::Prepend {
            prefix: single_arg(spec)?,
        },
        "append" => ConvertOp::Append {
            suffix: single_arg(spec)?,
        },
        "uuid" => {
            expect_args(spec, 0)?;
            ConvertOp::Uuid
        }
        "substr_first" => ConvertOp::SubstrFirst {
            count: count_arg(spec)?,
        },
        "substr_last" => ConvertOp::SubstrLast {
            count: count_arg(spec)?,
        },
        "clear" => {
            expect_args(spec, 0)?;
            ConvertOp::Clear
        }
        other => {
            bail!(
                ErrorKind::ConversionError,
                "Unknown converter name",
                format!("converter '{other}' on field '{}'", spec.field)
            );
        }
    };

    Ok(FieldConverter {
        field: spec.field.clone(),
        op,
    })
}

fn expect_args(spec: &ConverterConfig, expected: usize) -> SyncResult<()> {
    if spec.args.len() != expected {
        bail!(
            ErrorKind::ConversionError,
            "Wrong converter argument count",
            format!(
                "converter '{}' takes {expected} argument(s), got {}",
                spec.name,
                spec.args.len()
            )
        );
    }
    Ok(())
}

fn single_arg(spec: &ConverterConfig) -> SyncResult<String> {
    expect_args(spec, 1)?;
    Ok(spec.args[0].clone())
}

fn count_arg(spec: &ConverterConfig) -> SyncResult<usize> {
    let arg = single_arg(spec)?;
    arg.parse::<usize>().map_err(|_| {
        SyncError::from((
            ErrorKind::ConversionError,
            "Converter argument must be a non-negative number",
            format!("converter '{}' got '{arg}'", spec.name),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::row_from;

    fn spec(field: &str, name: &str, args: &[&str]) -> ConverterConfig {
        ConverterConfig {
            field: field.to_string(),
            name: name.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    fn resolve_one(field: &str, name: &str, args: &[&str]) -> SyncResult<FieldConverter> {
        resolve_converter(&spec(field, name, args))
    }

    #[test]
    fn default_fills_null_and_absent() {
        let converter = resolve_one("state", "default", &["active"]).unwrap();

        let mut row = Row::new();
        converter.apply(&mut row);
        assert_eq!(row.get("state"), Some(&Value::from("active")));

        let mut row = row_from([("state", Value::Null)]);
        converter.apply(&mut row);
        assert_eq!(row.get("state"), Some(&Value::from("active")));
    }

    #[test]
    fn default_keeps_existing_value() {
        let converter = resolve_one("state", "default", &["active"]).unwrap();
        let mut row = row_from([("state", Value::from("locked"))]);
        converter.apply(&mut row);
        assert_eq!(row.get("state"), Some(&Value::from("locked")));
    }

    #[test]
    fn system_timestamp_overwrites() {
        let converter = resolve_one("updated_at", "system_timestamp", &[]).unwrap();
        let mut row = row_from([("updated_at", Value::from("stale"))]);
        converter.apply(&mut row);
        assert!(matches!(row.get("updated_at"), Some(Value::Timestamp(_))));
    }

    #[test]
    fn replace_rewrites_text() {
        let converter = resolve_one("phone", "replace", &["-", ""]).unwrap();
        let mut row = row_from([("phone", Value::from("555-01-02"))]);
        converter.apply(&mut row);
        assert_eq!(row.get("phone"), Some(&Value::from("5550102")));
    }

    #[test]
    fn prepend_and_append_wrap_text() {
        let mut row = row_from([("code", Value::from("42"))]);
        resolve_one("code", "prepend", &["A-"]).unwrap().apply(&mut row);
        resolve_one("code", "append", &["-Z"]).unwrap().apply(&mut row);
        assert_eq!(row.get("code"), Some(&Value::from("A-42-Z")));
    }

    #[test]
    fn text_transforms_skip_null() {
        let converter = resolve_one("code", "prepend", &["A-"]).unwrap();
        let mut row = row_from([("code", Value::Null)]);
        converter.apply(&mut row);
        assert_eq!(row.get("code"), Some(&Value::Null));
    }

    #[test]
    fn uuid_fills_only_missing() {
        let converter = resolve_one("id", "uuid", &[]).unwrap();

        let mut row = Row::new();
        converter.apply(&mut row);
        assert!(matches!(row.get("id"), Some(Value::Uuid(_))));

        let mut row = row_from([("id", Value::from("keep"))]);
        converter.apply(&mut row);
        assert_eq!(row.get("id"), Some(&Value::from("keep")));
    }

    #[test]
    fn substr_keeps_requested_chars() {
        let mut row = row_from([("name", Value::from("abcdef"))]);
        resolve_one("name", "substr_first", &["3"]).unwrap().apply(&mut row);
        assert_eq!(row.get("name"), Some(&Value::from("abc")));

        let mut row = row_from([("name", Value::from("abcdef"))]);
        resolve_one("name", "substr_last", &["2"]).unwrap().apply(&mut row);
        assert_eq!(row.get("name"), Some(&Value::from("ef")));
    }

    #[test]
    fn substr_handles_short_and_multibyte_text() {
        let mut row = row_from([("name", Value::from("ab"))]);
        resolve_one("name", "substr_first", &["10"]).unwrap().apply(&mut row);
        assert_eq!(row.get("name"), Some(&Value::from("ab")));

        let mut row = row_from([("name", Value::from("héllo"))]);
        resolve_one("name", "substr_first", &["2"]).unwrap().apply(&mut row);
        assert_eq!(row.get("name"), Some(&Value::from("hé")));
    }

    #[test]
    fn clear_overwrites_with_null() {
        let converter = resolve_one("secret", "clear", &[]).unwrap();
        let mut row = row_from([("secret", Value::from("hunter2"))]);
        converter.apply(&mut row);
        assert_eq!(row.get("secret"), Some(&Value::Null));
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = resolve_one("f", "rot13", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConversionError);
        assert!(err.to_string().contains("rot13"));
    }

    #[test]
    fn wrong_arg_count_is_rejected() {
        let err = resolve_one("f", "replace", &["only-one"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConversionError);

        let err = resolve_one("f", "clear", &["extra"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConversionError);
    }

    #[test]
    fn non_numeric_count_is_rejected() {
        let err = resolve_one("f", "substr_first", &["three"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConversionError);
        assert!(err.to_string().contains("three"));
    }

    #[test]
    fn chain_applies_in_declaration_order() {
        let converters = resolve_converters(&[
            spec("code", "prepend", &["X"]),
            spec("code", "substr_first", &["2"]),
        ])
        .unwrap();

        let mut row = row_from([("code", Value::from("1234"))]);
        apply_converters(&converters, &mut row);
        assert_eq!(row.get("code"), Some(&Value::from("X1")));
    }
}
