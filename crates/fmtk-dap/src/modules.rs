//! Where each loaded mod lives on disk, and translation between editor paths
//! and the target's `@__modname__/file.lua` names.

use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
};

use serde::Deserialize;
use tracing::debug;

use crate::protocol::Module;

/// How a module's files were located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolStatus {
    Level,
    UserData,
    DataDirectory,
    Workspace,
    ModsFolder,
    ModsArchive,
    NotFound,
}

impl SymbolStatus {
    pub fn describe(self) -> &'static str {
        match self {
            SymbolStatus::Level => "Level script",
            SymbolStatus::UserData => "Loaded from user data",
            SymbolStatus::DataDirectory => "Loaded from data directory",
            SymbolStatus::Workspace => "Loaded from workspace",
            SymbolStatus::ModsFolder => "Loaded from mods directory",
            SymbolStatus::ModsArchive => "Zip in mods directory",
            SymbolStatus::NotFound => "Unknown module location",
        }
    }

    /// Whether [`ModuleRecord::symbol_path`] is a plain directory usable for
    /// path translation.
    fn is_directory(self) -> bool {
        matches!(
            self,
            SymbolStatus::UserData
                | SymbolStatus::DataDirectory
                | SymbolStatus::Workspace
                | SymbolStatus::ModsFolder
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub name: String,
    pub version: Option<String>,
    pub symbol_path: Option<PathBuf>,
    pub status: SymbolStatus,
}

impl ModuleRecord {
    pub fn to_dap(&self) -> Module {
        Module {
            id: self.name.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            symbol_file_path: self
                .symbol_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            symbol_status: self.status.describe().to_string(),
        }
    }
}

/// Directories searched when a module is reported.
#[derive(Debug, Clone, Default)]
pub struct ModuleRoots {
    pub mods_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
    pub user_data_path: Option<PathBuf>,
    pub workspace_folders: Vec<PathBuf>,
}

#[derive(Deserialize)]
struct ModInfo {
    name: String,
}

impl ModuleRoots {
    pub fn resolve(&self, name: &str, version: Option<&str>) -> ModuleRecord {
        let (symbol_path, status) = self.locate(name, version);
        debug!(%name, ?version, ?symbol_path, status = status.describe(), "resolved module");
        ModuleRecord {
            name: name.to_string(),
            version: version.map(str::to_string),
            symbol_path,
            status,
        }
    }

    fn locate(&self, name: &str, version: Option<&str>) -> (Option<PathBuf>, SymbolStatus) {
        match name {
            "level" => return (None, SymbolStatus::Level),
            "user" => {
                return match &self.user_data_path {
                    Some(path) => (Some(path.clone()), SymbolStatus::UserData),
                    None => (None, SymbolStatus::NotFound),
                }
            }
            _ => {}
        }

        if let Some(data) = &self.data_path {
            let dir = data.join(name);
            if dir.is_dir() {
                return (Some(dir), SymbolStatus::DataDirectory);
            }
        }

        for folder in &self.workspace_folders {
            if let Some(dir) = find_in_workspace(folder, name) {
                return (Some(dir), SymbolStatus::Workspace);
            }
        }

        if let Some(mods) = &self.mods_path {
            let plain = mods.join(name);
            if plain.is_dir() {
                return (Some(plain), SymbolStatus::ModsFolder);
            }
            if let Some(version) = version {
                let versioned = mods.join(format!("{name}_{version}"));
                if versioned.is_dir() {
                    return (Some(versioned), SymbolStatus::ModsFolder);
                }
                let archive = mods.join(format!("{name}_{version}.zip"));
                if archive.is_file() {
                    return (Some(archive), SymbolStatus::ModsArchive);
                }
            }
        }

        (None, SymbolStatus::NotFound)
    }
}

/// The workspace folder itself or one of its direct children, whichever has
/// an `info.json` naming `name`.
fn find_in_workspace(folder: &Path, name: &str) -> Option<PathBuf> {
    if info_names(folder, name) {
        return Some(folder.to_path_buf());
    }
    let entries = std::fs::read_dir(folder).ok()?;
    let mut children: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    children.sort();
    children.into_iter().find(|dir| info_names(dir, name))
}

fn info_names(dir: &Path, name: &str) -> bool {
    std::fs::read(dir.join("info.json"))
        .ok()
        .and_then(|bytes| serde_json::from_slice::<ModInfo>(&bytes).ok())
        .is_some_and(|info| info.name == name)
}

/// Every module reported during the session.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, ModuleRecord>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve newly reported modules. Modules already known keep their
    /// record; the newly resolved ones are returned.
    pub fn update(
        &mut self,
        reported: &BTreeMap<String, String>,
        roots: &ModuleRoots,
    ) -> Vec<ModuleRecord> {
        let mut added = Vec::new();
        for (name, version) in reported {
            if self.modules.contains_key(name) {
                continue;
            }
            let version = Some(version.as_str()).filter(|v| !v.is_empty());
            let record = roots.resolve(name, version);
            self.modules.insert(name.clone(), record.clone());
            added.push(record);
        }
        added
    }

    pub fn insert(&mut self, record: ModuleRecord) {
        self.modules.insert(record.name.clone(), record);
    }

    pub fn get(&self, name: &str) -> Option<&ModuleRecord> {
        self.modules.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.values()
    }

    /// Editor path to target name, using the longest matching module
    /// directory.
    pub fn to_target(&self, client_path: &str) -> Option<String> {
        let path = Path::new(client_path);
        let mut best: Option<(usize, &str, PathBuf)> = None;
        for record in self.modules.values() {
            if !record.status.is_directory() {
                continue;
            }
            let Some(root) = &record.symbol_path else {
                continue;
            };
            let Ok(rest) = path.strip_prefix(root) else {
                continue;
            };
            if record.name == "user" && rest.starts_with("mods") {
                continue;
            }
            let depth = root.components().count();
            if best.as_ref().map_or(true, |(d, _, _)| depth > *d) {
                best = Some((depth, record.name.as_str(), rest.to_path_buf()));
            }
        }
        let (_, name, rest) = best?;
        Some(format!("@__{name}__/{}", slash_join(&rest)))
    }

    /// Target name back to an editor path.
    pub fn to_client(&self, target_name: &str) -> Option<String> {
        let (name, rest) = split_target_name(target_name)?;
        let record = self.modules.get(name)?;
        if !record.status.is_directory() {
            return None;
        }
        let root = record.symbol_path.as_ref()?;
        let mut path = root.clone();
        for part in rest.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        Some(path.to_string_lossy().into_owned())
    }
}

/// `@__foo__/control.lua` → (`foo`, `control.lua`).
pub fn split_target_name(target_name: &str) -> Option<(&str, &str)> {
    let rest = target_name.strip_prefix("@__")?;
    let end = rest.find("__/")?;
    Some((&rest[..end], &rest[end + 3..]))
}

fn slash_join(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, path: &str, status: SymbolStatus) -> ModuleRecord {
        ModuleRecord {
            name: name.to_string(),
            version: None,
            symbol_path: Some(PathBuf::from(path)),
            status,
        }
    }

    #[test]
    fn translates_both_ways() {
        let mut modules = ModuleRegistry::new();
        modules.insert(record("foo", "/mods/foo_1.0.0", SymbolStatus::ModsFolder));

        let target = modules.to_target("/mods/foo_1.0.0/control.lua").unwrap();
        assert_eq!(target, "@__foo__/control.lua");
        assert_eq!(
            modules.to_client(&target).as_deref(),
            Some("/mods/foo_1.0.0/control.lua")
        );
        assert_eq!(modules.to_target("/elsewhere/control.lua"), None);
        assert_eq!(modules.to_client("@__bar__/control.lua"), None);
    }

    #[test]
    fn longest_prefix_wins_and_user_skips_mods() {
        let mut modules = ModuleRegistry::new();
        modules.insert(record("user", "/home/u/.factorio", SymbolStatus::UserData));
        modules.insert(record(
            "nested",
            "/home/u/.factorio/scenarios/nested",
            SymbolStatus::Workspace,
        ));

        assert_eq!(
            modules
                .to_target("/home/u/.factorio/scenarios/nested/lib/a.lua")
                .as_deref(),
            Some("@__nested__/lib/a.lua")
        );
        assert_eq!(
            modules.to_target("/home/u/.factorio/config.lua").as_deref(),
            Some("@__user__/config.lua")
        );
        assert_eq!(modules.to_target("/home/u/.factorio/mods/foo/control.lua"), None);
    }

    #[test]
    fn resolution_order() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let mods = dir.path().join("mods");
        let ws = dir.path().join("ws");
        std::fs::create_dir_all(data.join("base")).unwrap();
        std::fs::create_dir_all(mods.join("foo_1.0.0")).unwrap();
        std::fs::write(mods.join("zipped_0.1.0.zip"), b"PK").unwrap();
        std::fs::create_dir_all(ws.join("bar")).unwrap();
        std::fs::write(ws.join("bar/info.json"), br#"{"name":"bar","version":"2.0.0"}"#).unwrap();
        std::fs::create_dir_all(mods.join("bar")).unwrap();

        let roots = ModuleRoots {
            mods_path: Some(mods.clone()),
            data_path: Some(data.clone()),
            user_data_path: None,
            workspace_folders: vec![ws.clone()],
        };
        let reported: BTreeMap<String, String> = [
            ("base", "1.1.0"),
            ("foo", "1.0.0"),
            ("bar", "2.0.0"),
            ("zipped", "0.1.0"),
            ("level", ""),
            ("missing", "3.0.0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let mut registry = ModuleRegistry::new();
        let added = registry.update(&reported, &roots);
        assert_eq!(added.len(), 6);

        let status = |name: &str| registry.get(name).unwrap().status;
        assert_eq!(status("base"), SymbolStatus::DataDirectory);
        assert_eq!(status("foo"), SymbolStatus::ModsFolder);
        assert_eq!(status("bar"), SymbolStatus::Workspace);
        assert_eq!(status("zipped"), SymbolStatus::ModsArchive);
        assert_eq!(status("level"), SymbolStatus::Level);
        assert_eq!(status("missing"), SymbolStatus::NotFound);
        assert_eq!(registry.get("bar").unwrap().symbol_path, Some(ws.join("bar")));
        assert_eq!(registry.get("level").unwrap().version, None);

        assert!(registry.update(&reported, &roots).is_empty());
    }

    #[test]
    fn splits_target_names() {
        assert_eq!(
            split_target_name("@__foo__/a/b.lua"),
            Some(("foo", "a/b.lua"))
        );
        assert_eq!(split_target_name("control.lua"), None);
    }
}
