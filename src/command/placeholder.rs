//! `@name` placeholder handling for statement text and JSON templates.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{ConfigError, ConfigResult};
use crate::params::{ParamSet, ParamValue, Parameter};

static TEXT_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@@?(\w+)").expect("valid regex"));

static JSON_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@(\w+)$").expect("valid regex"));

/// Placeholder names in statement text, in order of appearance, repeats
/// included. `@@name` server variables are skipped.
pub fn scan_text(text: &str) -> Vec<String> {
    TEXT_PLACEHOLDER
        .captures_iter(text)
        .filter(|caps| !caps[0].starts_with("@@"))
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Rewrites every placeholder in `text` with the output of `replace`.
pub fn rewrite_text(text: &str, mut replace: impl FnMut(&str) -> String) -> String {
    TEXT_PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures<'_>| {
            if caps[0].starts_with("@@") {
                caps[0].to_string()
            } else {
                replace(&caps[1])
            }
        })
        .into_owned()
}

/// Placeholder names referenced by string leaves of a JSON template, at any
/// depth.
pub fn scan_json(template: &Value) -> Vec<String> {
    let mut names = Vec::new();
    collect_json(template, &mut names);
    names
}

fn collect_json(value: &Value, names: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            if let Some(caps) = JSON_PLACEHOLDER.captures(s) {
                names.push(caps[1].to_string());
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_json(item, names)),
        Value::Object(map) => map.values().for_each(|item| collect_json(item, names)),
        _ => {}
    }
}

/// Deep copy of `template` with placeholder leaves replaced by their values.
pub fn substitute_json(template: &Value, values: &ParamSet) -> Value {
    match template {
        Value::String(s) => match JSON_PLACEHOLDER.captures(s) {
            Some(caps) => values
                .get(&caps[1])
                .map(ParamValue::to_json)
                .unwrap_or(Value::Null),
            None => template.clone(),
        },
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute_json(item, values))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_json(v, values)))
                .collect(),
        ),
        _ => template.clone(),
    }
}

/// Fails when a referenced placeholder has no parameter.
pub fn ensure_bound<'a>(
    task: &str,
    referenced: impl IntoIterator<Item = &'a String>,
    parameters: &[Parameter],
) -> ConfigResult<()> {
    for name in referenced {
        if !parameters.iter().any(|p| &p.name == name) {
            return Err(ConfigError::UnboundPlaceholder {
                task: task.to_string(),
                placeholder: name.clone(),
            });
        }
    }
    Ok(())
}
