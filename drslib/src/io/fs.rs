//! File system operations: scenario loading and report saving.

use std::io::prelude::*;
use std::path::{Path, PathBuf};

use itertools::Itertools;

use super::Scenario;

/// Given a `serde_json::Value`, read it from the path it specifies if it's a
/// string, relative to the given `path`.
pub fn read_json_value_from_file<P: AsRef<Path>>(
    value: &mut serde_json::Value,
    path: P,
) -> std::io::Result<bool> {
    if let serde_json::Value::String(s) = value {
        let mut target = PathBuf::new();
        target.push(path);
        target.pop();
        target.push(s);
        *value = {
            let content = std::fs::read_to_string(&target)?;
            serde_json::from_str(&content)?
        };
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Given a `serde_json::Value`, read its given `field` from the path it
/// specifies if it's a string, relative to the given `path`.
pub fn read_field_from_file<P: AsRef<Path>>(
    value: &mut serde_json::Value,
    field: &str,
    path: P,
) -> std::io::Result<bool> {
    let field = value.get_mut(field);
    if let Some(v) = field {
        read_json_value_from_file(v, path)
    } else {
        Ok(false)
    }
}

impl Scenario {
    /// Reads a scenario from a JSON or YAML file. In JSON form the `network`
    /// member may be a string naming a separate network file, resolved
    /// relative to the scenario file.
    pub fn read_from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Scenario> {
        let content = std::fs::read_to_string(&path)?;
        let extension = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        if extension.eq_ignore_ascii_case("yaml") || extension.eq_ignore_ascii_case("yml") {
            serde_yaml::from_str(&content)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        } else {
            let mut value: serde_json::Value = serde_json::from_str(&content)?;
            read_field_from_file(&mut value, "network", path)?;
            let scenario: Scenario = serde_json::from_value(value)?;
            Ok(scenario)
        }
    }
}

/// Convert a free-form run name to a sanitized JSON filename.
pub fn name_to_json(name: &str) -> String {
    let name = name.split_whitespace().join("-");
    let name = name + ".json";
    sanitize_filename::sanitize(name)
}

/// Save a serializable report as pretty JSON under `dir`, named after the
/// run. Returns the path written.
pub fn save_report<T: serde::Serialize>(
    dir: &Path,
    name: &str,
    report: &T,
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name_to_json(name));
    let content = serde_json::to_string_pretty(report)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut file = std::fs::File::create(&path)?;
    file.write_all(content.as_bytes())?;
    log::info!("Saved report: {}", path.display());
    Ok(path)
}
