//! Lines written by the game on stdout, decoded into typed variants.
//!
//! Each significant line starts with a short ASCII tag. The tag decides how
//! the rest of the line is read: free text for `DBG: ` and `PROFILE:`, JSON for
//! everything else. A tagged line whose JSON does not decode is reported as
//! [`TargetLine::Malformed`] instead of being passed through as output.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};

/// Why the target entered its prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptEvent {
    /// Between two game ticks.
    Tick,
    /// A data, settings or control stage was just instrumented. Breakpoints
    /// can only be set locally in these contexts.
    StageLoad(String),
    /// `on_init` / `on_load` style first entry into a mod's control stage.
    InitialLoad(String),
    /// Execution stopped for the editor.
    Stopped(StopReason),
    /// The target needs a fresh reference block.
    GetRef,
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Step,
    Breakpoint,
    Exception,
    Pause,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::Step => "step",
            StopReason::Breakpoint => "breakpoint",
            StopReason::Exception => "exception",
            StopReason::Pause => "pause",
        }
    }
}

impl PromptEvent {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match text {
            "on_tick" => PromptEvent::Tick,
            "step" => PromptEvent::Stopped(StopReason::Step),
            "breakpoint" => PromptEvent::Stopped(StopReason::Breakpoint),
            "exception" => PromptEvent::Stopped(StopReason::Exception),
            "pause" => PromptEvent::Stopped(StopReason::Pause),
            "getref" => PromptEvent::GetRef,
            "on_init" | "on_load" => PromptEvent::InitialLoad(text.to_string()),
            _ if text.starts_with("on_instrument_") => PromptEvent::StageLoad(text.to_string()),
            _ => PromptEvent::Unknown(text.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSource {
    #[serde(default)]
    pub name: Option<String>,
    /// Target-space path, e.g. `@__foo__/control.lua`.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetFrame {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
    #[serde(default)]
    pub source: Option<TargetSource>,
    /// Program counter inside the function, when the frame runs bytecode.
    #[serde(default)]
    pub pc: Option<u32>,
    #[serde(default)]
    pub linedefined: Option<u32>,
    #[serde(default)]
    pub presentation_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackPayload {
    #[serde(default = "default_thread")]
    pub thread_id: i64,
    pub frames: Vec<TargetFrame>,
}

fn default_thread() -> i64 {
    1
}

/// A reply that echoes the request's sequence number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Correlated<T> {
    pub seq: i64,
    #[serde(flatten)]
    pub body: T,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScopesBody {
    pub scopes: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VariablesBody {
    pub variables: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalBody {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub variables_reference: i64,
    /// Set when the expression failed to compile or raised.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceContent {
    pub id: i64,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputPayload {
    pub output: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub source: Option<TargetSource>,
    #[serde(default)]
    pub line: Option<u32>,
}

/// A chunk of script the target just loaded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourcePayload {
    pub name: String,
    /// Lines holding at least one instruction. Absent when the target sent
    /// no line metadata, which leaves known lines untouched.
    #[serde(default)]
    pub lines: Option<Vec<u32>>,
    /// Base64 of the precompiled chunk, when the target could dump it.
    #[serde(default)]
    pub dump: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetLine {
    Prompt(PromptEvent),
    Stack(StackPayload),
    Scopes(Correlated<ScopesBody>),
    Variables(Correlated<VariablesBody>),
    SetVariable(Correlated<Map<String, Value>>),
    Eval(Correlated<EvalBody>),
    Source(SourceContent),
    Print(OutputPayload),
    Modules(BTreeMap<String, String>),
    LoadedSource(SourcePayload),
    Profile(String),
    /// Anything untagged is program output.
    Output(String),
    Malformed { tag: &'static str, error: String },
}

const DBG: &str = "DBG: ";
const PROFILE: &str = "PROFILE:";

impl TargetLine {
    pub fn parse(segment: &[u8]) -> Self {
        let text = String::from_utf8_lossy(segment);
        let text = text.as_ref();

        if let Some(rest) = text.strip_prefix(DBG) {
            return TargetLine::Prompt(PromptEvent::parse(rest));
        }
        if let Some(rest) = text.strip_prefix(PROFILE) {
            return TargetLine::Profile(rest.trim_start().to_string());
        }

        let Some((tag, rest)) = split_json_tag(text) else {
            return TargetLine::Output(text.to_string());
        };
        let parsed = match tag {
            "DBGstack" => json(rest).map(TargetLine::Stack),
            "DBGscopes" => json(rest).map(TargetLine::Scopes),
            "DBGvars" => json(rest).map(TargetLine::Variables),
            "DBGsetvar" => json(rest).map(TargetLine::SetVariable),
            "DBGeval" => json(rest).map(TargetLine::Eval),
            "DBGsource" => json(rest).map(TargetLine::Source),
            "DBGprint" => json(rest).map(TargetLine::Print),
            "EVTmodules" => json(rest).map(TargetLine::Modules),
            "EVTsource" => json(rest).map(TargetLine::LoadedSource),
            _ => return TargetLine::Output(text.to_string()),
        };
        parsed.unwrap_or_else(|error| TargetLine::Malformed {
            tag: static_tag(tag),
            error,
        })
    }
}

/// `DBGxxx: {...}` / `EVTxxx: {...}`.
fn split_json_tag(text: &str) -> Option<(&str, &str)> {
    if !(text.starts_with("DBG") || text.starts_with("EVT")) {
        return None;
    }
    let (tag, rest) = text.split_once(": ")?;
    if !tag.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    Some((tag, rest))
}

fn static_tag(tag: &str) -> &'static str {
    match tag {
        "DBGstack" => "DBGstack",
        "DBGscopes" => "DBGscopes",
        "DBGvars" => "DBGvars",
        "DBGsetvar" => "DBGsetvar",
        "DBGeval" => "DBGeval",
        "DBGsource" => "DBGsource",
        "DBGprint" => "DBGprint",
        "EVTmodules" => "EVTmodules",
        "EVTsource" => "EVTsource",
        _ => "unknown",
    }
}

fn json<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    serde_json::from_str(text).map_err(|err| err.to_string())
}
