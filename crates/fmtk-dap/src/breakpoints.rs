//! Session-wide breakpoint table.
//!
//! Breakpoints are stored per [`SourceKey`] exactly as the editor asked for
//! them; the line the target will actually stop on is recomputed whenever the
//! executable lines of that source become known.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use fmtk_wire::{SourceBreakpoints, WireBreakpoint};

use crate::protocol::{Breakpoint, SourceBreakpoint};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKey {
    /// Editor-space file path.
    Path(String),
    /// In-memory source known only by its `sourceReference`.
    Ref(i64),
}

#[derive(Debug, Clone)]
struct Stored {
    id: i64,
    requested_line: u32,
    line: u32,
    verified: bool,
    column: Option<u32>,
    condition: Option<String>,
    hit_condition: Option<String>,
    log_message: Option<String>,
}

impl Stored {
    fn same_request(&self, bp: &SourceBreakpoint) -> bool {
        self.requested_line == bp.line
            && self.condition == bp.condition
            && self.hit_condition == bp.hit_condition
            && self.log_message == bp.log_message
    }

    fn to_dap(&self, message: Option<&str>) -> Breakpoint {
        Breakpoint {
            id: self.id,
            verified: self.verified,
            line: self.line,
            column: self.column,
            message: if self.verified {
                None
            } else {
                message.map(str::to_string)
            },
            source: None,
        }
    }

    fn to_wire(&self) -> WireBreakpoint {
        WireBreakpoint {
            line: self.line,
            condition: self.condition.clone(),
            hit_condition: self.hit_condition.clone(),
            log_message: self.log_message.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct SourceEntry {
    /// Name the target knows this source by, once path translation succeeds.
    target_name: Option<String>,
    breakpoints: Vec<Stored>,
}

#[derive(Debug)]
pub struct BreakpointStore {
    next_id: i64,
    sources: BTreeMap<SourceKey, SourceEntry>,
    /// Executable lines per target name.
    executable: HashMap<String, BTreeSet<u32>>,
}

impl Default for BreakpointStore {
    fn default() -> Self {
        Self {
            next_id: 1,
            sources: BTreeMap::new(),
            executable: HashMap::new(),
        }
    }
}

const NOT_LOADED: &str = "source not loaded yet";
const NO_CODE: &str = "no executable code at or after this line";

impl BreakpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the breakpoints of `key`. Unchanged breakpoints keep their id.
    pub fn set(
        &mut self,
        key: SourceKey,
        target_name: Option<String>,
        requested: &[SourceBreakpoint],
    ) -> Vec<Breakpoint> {
        let previous = self
            .sources
            .remove(&key)
            .map(|entry| entry.breakpoints)
            .unwrap_or_default();
        let lines = target_name.as_ref().and_then(|n| self.executable.get(n));

        let mut breakpoints = Vec::with_capacity(requested.len());
        for bp in requested {
            let id = match previous.iter().find(|old| old.same_request(bp)) {
                Some(old) => old.id,
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    id
                }
            };
            let (line, verified) = validate(lines, bp.line);
            breakpoints.push(Stored {
                id,
                requested_line: bp.line,
                line,
                verified,
                column: bp.column,
                condition: bp.condition.clone(),
                hit_condition: bp.hit_condition.clone(),
                log_message: bp.log_message.clone(),
            });
        }

        let message = if lines.is_some() { NO_CODE } else { NOT_LOADED };
        let out = breakpoints.iter().map(|b| b.to_dap(Some(message))).collect();
        self.sources.insert(
            key,
            SourceEntry {
                target_name,
                breakpoints,
            },
        );
        out
    }

    /// Record the executable lines of `target_name` and move its breakpoints
    /// onto them. Returns the breakpoints whose line or verified flag changed.
    pub fn revalidate(
        &mut self,
        target_name: &str,
        lines: impl IntoIterator<Item = u32>,
    ) -> Vec<Breakpoint> {
        let lines: BTreeSet<u32> = lines.into_iter().collect();
        let mut changed = Vec::new();
        for entry in self.sources.values_mut() {
            if entry.target_name.as_deref() != Some(target_name) {
                continue;
            }
            for bp in &mut entry.breakpoints {
                let (line, verified) = validate(Some(&lines), bp.requested_line);
                if line != bp.line || verified != bp.verified {
                    bp.line = line;
                    bp.verified = verified;
                    changed.push(bp.to_dap(Some(NO_CODE)));
                }
            }
        }
        self.executable.insert(target_name.to_string(), lines);
        changed
    }

    /// Translate path-keyed sources that have no target name yet. Returns the
    /// target names that became known, whose breakpoints need syncing.
    pub fn remap(&mut self, mut translate: impl FnMut(&str) -> Option<String>) -> Vec<String> {
        let mut mapped = Vec::new();
        for (key, entry) in &mut self.sources {
            let SourceKey::Path(path) = key else {
                continue;
            };
            if entry.target_name.is_some() {
                continue;
            }
            if let Some(name) = translate(path) {
                mapped.push(name.clone());
                entry.target_name = Some(name);
            }
        }
        mapped
    }

    /// Wire form of one source's breakpoints.
    pub fn wire_for(&self, target_name: &str) -> SourceBreakpoints {
        let breakpoints = self
            .sources
            .values()
            .filter(|e| e.target_name.as_deref() == Some(target_name))
            .flat_map(|e| e.breakpoints.iter().map(Stored::to_wire))
            .collect();
        SourceBreakpoints {
            filename: target_name.to_string(),
            breakpoints,
        }
    }

    /// Wire form of every translated source, for a full sync.
    pub fn wire_all(&self) -> Vec<SourceBreakpoints> {
        let names: BTreeSet<&str> = self
            .sources
            .values()
            .filter_map(|e| e.target_name.as_deref())
            .collect();
        names.into_iter().map(|n| self.wire_for(n)).collect()
    }
}

/// First executable line at or after `requested`. Without line metadata the
/// breakpoint stays where it was asked for, unverified.
fn validate(lines: Option<&BTreeSet<u32>>, requested: u32) -> (u32, bool) {
    match lines.and_then(|lines| lines.range(requested..).next()) {
        Some(&line) => (line, true),
        None => (requested, false),
    }
}
