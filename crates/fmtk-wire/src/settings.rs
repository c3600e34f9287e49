//! `mod-settings.dat`: a version header followed by one tagged tree dictionary.

use std::{fmt, path::Path, str::FromStr};

use crate::codec::{WireReader, WireWriter};
use crate::error::{Result, WireError};
use crate::proptree::Value;

/// Version of the game that last wrote the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub build: u16,
}

impl fmt::Display for FileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}-{}", self.major, self.minor, self.patch, self.build)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingScope {
    Startup,
    RuntimeGlobal,
    RuntimePerUser,
}

impl SettingScope {
    pub const ALL: [SettingScope; 3] = [
        SettingScope::Startup,
        SettingScope::RuntimeGlobal,
        SettingScope::RuntimePerUser,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SettingScope::Startup => "startup",
            SettingScope::RuntimeGlobal => "runtime-global",
            SettingScope::RuntimePerUser => "runtime-per-user",
        }
    }
}

impl FromStr for SettingScope {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self> {
        SettingScope::ALL
            .into_iter()
            .find(|scope| scope.key() == s)
            .ok_or_else(|| WireError::UnknownScope(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModSettings {
    pub version: FileVersion,
    pub flag: u8,
    root: Value,
}

impl Default for ModSettings {
    fn default() -> Self {
        let mut root = Value::dict();
        if let Some(map) = root.as_dict_mut() {
            for scope in SettingScope::ALL {
                map.insert(scope.key().to_string(), Value::dict());
            }
        }
        Self {
            version: FileVersion::default(),
            flag: 0,
            root,
        }
    }
}

impl ModSettings {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = WireReader::new(bytes);
        let version = FileVersion {
            major: r.read_u16()?,
            minor: r.read_u16()?,
            patch: r.read_u16()?,
            build: r.read_u16()?,
        };
        let flag = r.read_u8()?;
        let root = Value::load(&mut r)?;
        r.finish()?;
        if root.as_dict().is_none() {
            return Err(WireError::SettingsRootNotDictionary);
        }
        Ok(Self {
            version,
            flag,
            root,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.write_u16(self.version.major);
        w.write_u16(self.version.minor);
        w.write_u16(self.version.patch);
        w.write_u16(self.version.build);
        w.write_u8(self.flag);
        self.root.save(&mut w);
        w.into_vec()
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// The stored value of one setting, if present.
    pub fn get(&self, scope: SettingScope, name: &str) -> Option<&Value> {
        self.root.get(scope.key())?.get(name)?.get("value")
    }

    /// Store `value` as `root[scope][name] = { value = value }`, creating the
    /// scope dictionary when missing.
    pub fn set(&mut self, scope: SettingScope, name: &str, value: Value) {
        let Some(root) = self.root.as_dict_mut() else {
            return;
        };
        let scope_value = root
            .entry(scope.key().to_string())
            .or_insert_with(Value::dict);
        if scope_value.as_dict().is_none() {
            *scope_value = Value::dict();
        }
        if let Some(settings) = scope_value.as_dict_mut() {
            let mut entry = Value::dict();
            if let Some(map) = entry.as_dict_mut() {
                map.insert("value".to_string(), value);
            }
            settings.insert(name.to_string(), entry);
        }
    }
}

/// Read the settings file at `path`, starting from an empty file when it does
/// not exist yet.
pub fn load(path: &Path) -> std::io::Result<ModSettings> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ModSettings::default());
        }
        Err(err) => return Err(err),
    };
    ModSettings::from_bytes(&bytes)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

pub fn save(path: &Path, settings: &ModSettings) -> std::io::Result<()> {
    std::fs::write(path, settings.to_bytes())
}
