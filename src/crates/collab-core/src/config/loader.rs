//! TOML configuration loader with include and environment variable support
//!
//! Provides functionality to load TOML configuration files with:
//! - `$include` directives for file composition
//! - `${ENV:default}` for environment variable expansion
//! - Deep merging of configurations
//! - Validation and error handling

use crate::CollabError;
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::path::Path;
use toml::Value as TomlValue;

/// Load and parse a TOML file with include support
pub fn load_toml_file<P: AsRef<Path>>(path: P) -> Result<TomlValue, CollabError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| CollabError::Internal(format!("failed to read config file {:?}: {}", path, e)))?;

    let mut value: TomlValue = toml::from_str(&content)
        .map_err(|e| CollabError::Internal(format!("failed to parse config file {:?}: {}", path, e)))?;

    let base_dir = path
        .parent()
        .ok_or_else(|| CollabError::Internal("invalid config file path".to_string()))?;

    process_includes(&mut value, base_dir)?;
    expand_variables(&mut value)?;

    Ok(value)
}

/// Load and deserialize a TOML file into a specific type
pub fn load_toml_config<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, CollabError> {
    let value = load_toml_file(path)?;
    value
        .try_into()
        .map_err(|e| CollabError::Internal(format!("failed to deserialize configuration: {}", e)))
}

/// Process `$include = "path"` directives recursively
fn process_includes(value: &mut TomlValue, base_dir: &Path) -> Result<(), CollabError> {
    match value {
        TomlValue::Table(table) => {
            if let Some(TomlValue::String(include_path)) = table.get("$include") {
                let include_full_path = base_dir.join(include_path);
                let included = load_toml_file(&include_full_path)?;
                *value = included;
                return Ok(());
            }

            for (_, v) in table.iter_mut() {
                process_includes(v, base_dir)?;
            }
        }
        TomlValue::Array(arr) => {
            for item in arr.iter_mut() {
                process_includes(item, base_dir)?;
            }
        }
        _ => {}
    }

    Ok(())
}

/// Expand environment variables in the format `${ENV_VAR:default}`
fn expand_variables(value: &mut TomlValue) -> Result<(), CollabError> {
    match value {
        TomlValue::String(s) => {
            if let Some(expanded) = expand_env_in_string(s) {
                *s = expanded;
            }
        }
        TomlValue::Table(table) => {
            for (_, v) in table.iter_mut() {
                expand_variables(v)?;
            }
        }
        TomlValue::Array(arr) => {
            for item in arr.iter_mut() {
                expand_variables(item)?;
            }
        }
        _ => {}
    }

    Ok(())
}

/// Expand environment variables in a string, supporting `${ENV_VAR:default_value}`
fn expand_env_in_string(s: &str) -> Option<String> {
    if !s.contains("${") {
        return None;
    }

    let mut result = s.to_string();
    let re = regex::Regex::new(r"\$\{([^:}]+)(?::([^}]*))?\}").ok()?;

    for cap in re.captures_iter(s) {
        let full_match = cap.get(0)?.as_str();
        let var_name = cap.get(1)?.as_str();
        let default_value = cap.get(2).map(|m| m.as_str()).unwrap_or("");

        let value = env::var(var_name).unwrap_or_else(|_| default_value.to_string());
        result = result.replace(full_match, &value);
    }

    Some(result)
}

/// Merge two TOML values deeply. For tables, merges keys recursively; for
/// other types, `other` overrides `base`.
pub fn deep_merge(base: &mut TomlValue, other: &TomlValue) {
    match (base, other) {
        (TomlValue::Table(base_table), TomlValue::Table(other_table)) => {
            for (key, other_value) in other_table {
                if let Some(base_value) = base_table.get_mut(key) {
                    deep_merge(base_value, other_value);
                } else {
                    base_table.insert(key.clone(), other_value.clone());
                }
            }
        }
        (base, other) => {
            *base = other.clone();
        }
    }
}
