//! `mod-list.json` and `mod-settings.dat` edits made around a debug session.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, SessionError};
use crate::protocol::ModSettingAdjustment;
use fmtk_wire::{settings, SettingScope};

pub const MOD_LIST_FILE: &str = "mod-list.json";
pub const MOD_SETTINGS_FILE: &str = "mod-settings.dat";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ModList {
    #[serde(default)]
    mods: Vec<ModListEntry>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ModListEntry {
    name: String,
    enabled: bool,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Set `name`'s enabled flag in `mods_path/mod-list.json`, adding the entry
/// (and the file) when missing. Unknown fields are preserved.
pub fn set_enabled(mods_path: &Path, name: &str, enabled: bool) -> Result<()> {
    let path = mods_path.join(MOD_LIST_FILE);
    let mut list: ModList = match std::fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| SessionError::Json {
            path: path.clone(),
            source,
        })?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => ModList::default(),
        Err(source) => return Err(SessionError::Read { path, source }),
    };

    match list.mods.iter_mut().find(|m| m.name == name) {
        Some(entry) => entry.enabled = enabled,
        None => list.mods.push(ModListEntry {
            name: name.to_string(),
            enabled,
            extra: Map::new(),
        }),
    }

    let bytes = serde_json::to_vec_pretty(&list).map_err(|source| SessionError::Json {
        path: path.clone(),
        source,
    })?;
    std::fs::write(&path, bytes).map_err(|source| SessionError::Write {
        path: path.clone(),
        source,
    })?;
    debug!(path = %path.display(), %name, enabled, "updated mod list");
    Ok(())
}

/// Apply setting overrides to `mods_path/mod-settings.dat`.
pub fn adjust_settings(mods_path: &Path, adjustments: &[ModSettingAdjustment]) -> Result<()> {
    if adjustments.is_empty() {
        return Ok(());
    }
    let path = mods_path.join(MOD_SETTINGS_FILE);
    let mut file = settings::load(&path).map_err(|source| SessionError::Read {
        path: path.clone(),
        source,
    })?;
    for adjustment in adjustments {
        let scope: SettingScope = adjustment
            .scope
            .parse()
            .map_err(|_| SessionError::UnknownScope(adjustment.scope.clone()))?;
        let value = setting_value(&adjustment.value)
            .ok_or_else(|| SessionError::UnsupportedSettingValue(adjustment.name.clone()))?;
        file.set(scope, &adjustment.name, value);
    }
    settings::save(&path, &file).map_err(|source| SessionError::Write {
        path: path.clone(),
        source,
    })?;
    debug!(path = %path.display(), count = adjustments.len(), "adjusted mod settings");
    Ok(())
}

/// Settings hold scalars only: booleans, numbers, strings and colors.
fn setting_value(json: &Value) -> Option<fmtk_wire::Value> {
    match json {
        Value::Bool(b) => Some(fmtk_wire::Value::Bool(*b)),
        Value::Number(n) => n.as_f64().map(fmtk_wire::Value::Number),
        Value::String(s) => Some(fmtk_wire::Value::string(s.as_str())),
        Value::Object(map) => {
            let mut dict = indexmap::IndexMap::new();
            for (key, item) in map {
                let Value::Number(n) = item else {
                    return None;
                };
                dict.insert(key.clone(), fmtk_wire::Value::Number(n.as_f64()?));
            }
            Some(fmtk_wire::Value::Dict(dict))
        }
        _ => None,
    }
}
