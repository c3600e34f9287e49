//! Typed DAP requests and the body types the adapter sends back.
//!
//! Requests are decoded once, right after framing; the session only ever sees
//! a [`Command`].

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// An editor request as framed. `arguments` stay raw until [`Command::parse`].
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub seq: i64,
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

/// A message the adapter writes to the editor.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outgoing {
    Response {
        seq: i64,
        request_seq: i64,
        command: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
    Event {
        seq: i64,
        event: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeArgs {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub adapter_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArgs {
    /// The game binary.
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Launch the game under this native debugger.
    #[serde(default)]
    pub native_debugger: Option<String>,
    #[serde(default)]
    pub native_debugger_args: Vec<String>,
    #[serde(default)]
    pub mods_path: Option<String>,
    #[serde(default)]
    pub data_path: Option<String>,
    #[serde(default)]
    pub user_data_path: Option<String>,
    #[serde(default)]
    pub workspace_folders: Vec<String>,
    /// Enable the helper mod in `mod-list.json` for the session.
    #[serde(default = "default_true")]
    pub hook_mod: bool,
    #[serde(default)]
    pub adjust_mod_settings: Vec<ModSettingAdjustment>,
    #[serde(default)]
    pub object_info_path: Option<String>,
    #[serde(default)]
    pub no_debug: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModSettingAdjustment {
    pub scope: String,
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    pub line: u32,
    #[serde(default)]
    pub column: Option<u32>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub hit_condition: Option<String>,
    #[serde(default)]
    pub log_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArgs {
    pub source: Source,
    #[serde(default)]
    pub breakpoints: Vec<SourceBreakpoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArgs {
    pub thread_id: i64,
    #[serde(default)]
    pub start_frame: Option<i64>,
    #[serde(default)]
    pub levels: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesArgs {
    pub frame_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArgs {
    pub variables_reference: i64,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub count: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariableArgs {
    pub variables_reference: i64,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArgs {
    pub expression: String,
    #[serde(default)]
    pub frame_id: Option<i64>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceArgs {
    #[serde(default)]
    pub source: Option<Source>,
    #[serde(default)]
    pub source_reference: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisassembleArgs {
    pub memory_reference: String,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub instruction_offset: i64,
    pub instruction_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadArgs {
    #[serde(default)]
    pub thread_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArgs {
    #[serde(default)]
    pub terminate_debuggee: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    In,
    Over,
    Out,
}

impl StepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::In => "in",
            StepKind::Over => "over",
            StepKind::Out => "out",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Initialize(InitializeArgs),
    Launch(Box<LaunchArgs>),
    ConfigurationDone,
    SetBreakpoints(SetBreakpointsArgs),
    Threads,
    StackTrace(StackTraceArgs),
    Scopes(ScopesArgs),
    Variables(VariablesArgs),
    SetVariable(SetVariableArgs),
    Evaluate(EvaluateArgs),
    Source(SourceArgs),
    LoadedSources,
    Modules,
    Disassemble(DisassembleArgs),
    Continue(ThreadArgs),
    Step(StepKind),
    Pause(ThreadArgs),
    Terminate,
    Disconnect(DisconnectArgs),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("unsupported request {0:?}")]
    Unsupported(String),
    #[error("invalid arguments for {command}: {message}")]
    InvalidArguments { command: String, message: String },
}

impl Command {
    pub fn parse(request: &Request) -> Result<Self, CommandError> {
        let command = request.command.as_str();
        Ok(match command {
            "initialize" => Command::Initialize(args(request)?),
            "launch" => Command::Launch(Box::new(args(request)?)),
            "configurationDone" => Command::ConfigurationDone,
            "setBreakpoints" => Command::SetBreakpoints(args(request)?),
            "threads" => Command::Threads,
            "stackTrace" => Command::StackTrace(args(request)?),
            "scopes" => Command::Scopes(args(request)?),
            "variables" => Command::Variables(args(request)?),
            "setVariable" => Command::SetVariable(args(request)?),
            "evaluate" => Command::Evaluate(args(request)?),
            "source" => Command::Source(args(request)?),
            "loadedSources" => Command::LoadedSources,
            "modules" => Command::Modules,
            "disassemble" => Command::Disassemble(args(request)?),
            "continue" => Command::Continue(args(request)?),
            "next" => Command::Step(StepKind::Over),
            "stepIn" => Command::Step(StepKind::In),
            "stepOut" => Command::Step(StepKind::Out),
            "pause" => Command::Pause(args(request)?),
            "terminate" => Command::Terminate,
            "disconnect" => Command::Disconnect(args(request)?),
            other => return Err(CommandError::Unsupported(other.to_string())),
        })
    }
}

/// Missing `arguments` decode like an empty object.
fn args<T: DeserializeOwned>(request: &Request) -> Result<T, CommandError> {
    let value = match &request.arguments {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(|err| CommandError::InvalidArguments {
        command: request.command.clone(),
        message: err.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    pub id: i64,
    pub verified: bool,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    pub line: u32,
    pub column: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction_pointer_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_file_path: Option<String>,
    pub symbol_status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisassembledInstruction {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction_bytes: Option<String>,
    pub instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_hint: Option<String>,
}

/// Capabilities advertised in the `initialize` response.
pub fn capabilities() -> Value {
    serde_json::json!({
        "supportsConfigurationDoneRequest": true,
        "supportsConditionalBreakpoints": true,
        "supportsHitConditionalBreakpoints": true,
        "supportsLogPoints": true,
        "supportsEvaluateForHovers": true,
        "supportsSetVariable": true,
        "supportsLoadedSourcesRequest": true,
        "supportsModulesRequest": true,
        "supportsDisassembleRequest": true,
        "supportsInstructionBreakpoints": false,
        "supportsTerminateRequest": true,
        "supportsDelayedStackTraceLoading": true,
    })
}
