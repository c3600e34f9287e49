use std::collections::{BTreeMap, HashMap};

use crate::protocol::Source;

/// A script chunk the target reported loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSource {
    /// Target-space name, e.g. `@__foo__/control.lua`.
    pub name: String,
    /// Editor path, when the name maps onto a module directory.
    pub path: Option<String>,
    /// Set for chunks only available from the target itself.
    pub reference: Option<i64>,
}

impl LoadedSource {
    pub fn to_dap(&self) -> Source {
        Source {
            name: Some(display_name(&self.name).to_string()),
            path: self.path.clone(),
            source_reference: self.reference,
        }
    }
}

fn display_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

#[derive(Debug)]
pub struct SourceRegistry {
    by_name: BTreeMap<String, LoadedSource>,
    by_ref: HashMap<i64, String>,
    next_ref: i64,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self {
            by_name: BTreeMap::new(),
            by_ref: HashMap::new(),
            next_ref: 1,
        }
    }
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a load of `name`. Returns the entry and whether it is new. A
    /// chunk without an editor path keeps the reference it was first given.
    pub fn register(&mut self, name: &str, path: Option<String>) -> (LoadedSource, bool) {
        if let Some(existing) = self.by_name.get_mut(name) {
            if path.is_some() {
                existing.path = path;
            }
            return (existing.clone(), false);
        }

        let reference = match path {
            Some(_) => None,
            None => {
                let r = self.next_ref;
                self.next_ref += 1;
                self.by_ref.insert(r, name.to_string());
                Some(r)
            }
        };
        let source = LoadedSource {
            name: name.to_string(),
            path,
            reference,
        };
        self.by_name.insert(name.to_string(), source.clone());
        (source, true)
    }

    pub fn get(&self, name: &str) -> Option<&LoadedSource> {
        self.by_name.get(name)
    }

    pub fn by_reference(&self, reference: i64) -> Option<&LoadedSource> {
        self.by_name.get(self.by_ref.get(&reference)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadedSource> {
        self.by_name.values()
    }
}
