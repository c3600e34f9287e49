//! The debug session: one reactor owning every piece of per-session state.
//!
//! Inputs (editor requests, target output, timeouts) arrive on a single
//! channel as [`SessionInput`] and are handled one at a time, so nothing in
//! here needs a lock. Work that has to wait for the target is handed to a
//! small waiter task that answers the editor once the reply, or its timeout,
//! arrives.
//!
//! The target only reads stdin while sitting at its prompt. Commands issued
//! while it runs are queued and flushed, in order, at the next prompt.

use std::{
    collections::{HashMap, VecDeque},
    io,
    path::PathBuf,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use base64::Engine as _;
use fmtk_bytecode::Disassembler;
use fmtk_config::SessionConfig;
use fmtk_process::{BridgeEvent, CancellationToken, ChildBridge, SpawnSpec};
use fmtk_wire::{block_quote, block_quote_str, breakpoints::collapse_newlines};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::breakpoints::{BreakpointStore, SourceKey};
use crate::error::SessionError;
use crate::launch;
use crate::mod_list;
use crate::modules::{ModuleRegistry, ModuleRoots};
use crate::objectinfo;
use crate::pending::{PendingTable, Ticket};
use crate::protocol::{
    self, Command, DisassembleArgs, EvaluateArgs, LaunchArgs, Outgoing, Request, ScopesArgs,
    SetBreakpointsArgs, SetVariableArgs, Source, SourceArgs, StackFrame, StackTraceArgs, StepKind,
    VariablesArgs,
};
use crate::refs::RefBlocks;
use crate::sources::SourceRegistry;
use crate::target::{
    OutputPayload, PromptEvent, SourcePayload, StackPayload, StopReason, TargetFrame,
    TargetLine, TargetSource,
};

pub const THREAD_ID: i64 = 1;
const MAX_DISASSEMBLE_COUNT: i64 = 10_000;
const UNAVAILABLE: &str = "<unavailable>";

/// A running target as the session sees it.
pub trait Target: Send {
    fn write_stdin(&self, data: Vec<u8>) -> io::Result<()>;
    /// Request termination; the exit still arrives as [`BridgeEvent::Exited`].
    fn kill(&self);
}

/// Starts the target. Output and the final exit go to `events`.
pub trait Launcher: Send {
    fn launch(
        &mut self,
        spec: &SpawnSpec,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> io::Result<Box<dyn Target>>;
}

impl Target for ChildBridge {
    fn write_stdin(&self, data: Vec<u8>) -> io::Result<()> {
        ChildBridge::write_stdin(self, data)
    }

    fn kill(&self) {
        ChildBridge::kill(self)
    }
}

/// Launches the real game through [`ChildBridge`].
#[derive(Debug, Default)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(
        &mut self,
        spec: &SpawnSpec,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> io::Result<Box<dyn Target>> {
        let bridge = ChildBridge::spawn(spec, events)?;
        info!(pid = ?bridge.pid(), "target started");
        Ok(Box::new(bridge))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    NotStarted,
    /// Spawned, first prompt not reached yet.
    Launching,
    Prompt,
    Running,
    Terminating,
    Terminated,
}

/// Which table a pending reply lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Stack,
    Scopes,
    Variables,
    SetVariable,
    Evaluate,
    Source,
}

impl PendingKind {
    /// What the editor gets when the target never answers.
    fn unavailable(self) -> Reply {
        match self {
            PendingKind::Stack => Ok(json!({"stackFrames": [], "totalFrames": 0})),
            PendingKind::Scopes => Ok(json!({"scopes": []})),
            PendingKind::Variables => Ok(json!({
                "variables": [{
                    "name": UNAVAILABLE,
                    "value": UNAVAILABLE,
                    "variablesReference": 0,
                }],
            })),
            PendingKind::Evaluate => Ok(json!({"result": UNAVAILABLE, "variablesReference": 0})),
            PendingKind::Source => Ok(json!({"content": UNAVAILABLE})),
            PendingKind::SetVariable => Err("target did not answer".to_string()),
        }
    }
}

/// A rendered response body, or the failure message.
pub type Reply = std::result::Result<Value, String>;

#[derive(Debug)]
pub enum SessionInput {
    Request(Request),
    Bridge(BridgeEvent),
    /// A waiter gave up on its reply.
    Abandon(PendingKind, Ticket),
    ClientClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Sent,
    /// Dropped unsent: cancelled while queued, or the target is gone.
    Expired,
}

/// Frame window asked for by the pending `stackTrace` of one thread.
#[derive(Debug, Clone, Copy, Default)]
struct StackWindow {
    start: i64,
    levels: Option<usize>,
}

struct QueuedWrite {
    data: Vec<u8>,
    consumed: Option<oneshot::Sender<WriteOutcome>>,
    cancel: Option<CancellationToken>,
}

/// Outgoing DAP messages, shared with waiter tasks.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Value>,
    seq: Arc<AtomicI64>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<Value>) -> Self {
        Self {
            tx,
            seq: Arc::new(AtomicI64::new(1)),
        }
    }

    pub fn respond(
        &self,
        request: &Request,
        success: bool,
        body: Option<Value>,
        message: Option<String>,
    ) {
        self.send(Outgoing::Response {
            seq: self.next_seq(),
            request_seq: request.seq,
            command: request.command.clone(),
            success,
            message,
            body,
        });
    }

    pub fn reply(&self, request: &Request, reply: Reply) {
        match reply {
            Ok(body) => self.respond(request, true, Some(body), None),
            Err(message) => self.respond(request, false, None, Some(message)),
        }
    }

    pub fn event(&self, event: impl Into<String>, body: Option<Value>) {
        self.send(Outgoing::Event {
            seq: self.next_seq(),
            event: event.into(),
            body,
        });
    }

    fn next_seq(&self) -> i64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, message: Outgoing) {
        match serde_json::to_value(&message) {
            Ok(value) => {
                let _ = self.tx.send(value);
            }
            Err(err) => warn!(error = %err, "failed to encode DAP message"),
        }
    }
}

pub struct Session {
    config: SessionConfig,
    state: State,
    outbox: Outbox,
    inbox: mpsc::UnboundedSender<SessionInput>,
    launcher: Box<dyn Launcher>,
    target: Option<Box<dyn Target>>,

    mods_path: Option<PathBuf>,
    helper_enabled: bool,
    object_info: Option<fmtk_wire::Value>,
    pause_requested: bool,
    terminated_sent: bool,

    roots: ModuleRoots,
    modules: ModuleRegistry,
    sources: SourceRegistry,
    breakpoints: BreakpointStore,
    disassembler: Disassembler,
    refs: RefBlocks,
    queue: VecDeque<QueuedWrite>,

    stacks: PendingTable<Reply>,
    stack_windows: HashMap<i64, StackWindow>,
    scopes: PendingTable<Reply>,
    variables: PendingTable<Reply>,
    set_variable: PendingTable<Reply>,
    evaluate: PendingTable<Reply>,
    source_dumps: PendingTable<Reply>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        outbox: Outbox,
        inbox: mpsc::UnboundedSender<SessionInput>,
        launcher: Box<dyn Launcher>,
    ) -> Self {
        let refs = RefBlocks::new(config.ref_block_stride);
        Self {
            config,
            state: State::NotStarted,
            outbox,
            inbox,
            launcher,
            target: None,
            mods_path: None,
            helper_enabled: false,
            object_info: None,
            pause_requested: false,
            terminated_sent: false,
            roots: ModuleRoots::default(),
            modules: ModuleRegistry::new(),
            sources: SourceRegistry::new(),
            breakpoints: BreakpointStore::new(),
            disassembler: Disassembler::new(),
            refs,
            queue: VecDeque::new(),
            stacks: PendingTable::new(),
            stack_windows: HashMap::new(),
            scopes: PendingTable::new(),
            variables: PendingTable::new(),
            set_variable: PendingTable::new(),
            evaluate: PendingTable::new(),
            source_dumps: PendingTable::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Handle inputs until the editor goes away.
    pub async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<SessionInput>) {
        while let Some(input) = inbox.recv().await {
            match input {
                SessionInput::Request(request) => self.handle_request(request),
                SessionInput::Bridge(event) => self.handle_bridge(event),
                SessionInput::Abandon(kind, ticket) => {
                    self.table(kind).abandon(ticket);
                }
                SessionInput::ClientClosed => {
                    self.teardown();
                    self.release_waiters();
                    break;
                }
            }
        }
        debug!("session finished");
    }

    fn table(&mut self, kind: PendingKind) -> &mut PendingTable<Reply> {
        match kind {
            PendingKind::Stack => &mut self.stacks,
            PendingKind::Scopes => &mut self.scopes,
            PendingKind::Variables => &mut self.variables,
            PendingKind::SetVariable => &mut self.set_variable,
            PendingKind::Evaluate => &mut self.evaluate,
            PendingKind::Source => &mut self.source_dumps,
        }
    }

    // ---- editor requests ----

    fn handle_request(&mut self, request: Request) {
        let command = match Command::parse(&request) {
            Ok(command) => command,
            Err(err) => {
                warn!(command = %request.command, error = %err, "rejected request");
                self.outbox
                    .respond(&request, false, None, Some(err.to_string()));
                return;
            }
        };
        debug!(command = %request.command, seq = request.seq, state = ?self.state, "request");

        match command {
            Command::Initialize(_) => {
                self.outbox
                    .respond(&request, true, Some(protocol::capabilities()), None);
                self.outbox.event("initialized", None);
            }
            Command::Launch(args) => self.launch(&request, *args),
            Command::ConfigurationDone => self.outbox.respond(&request, true, None, None),
            Command::SetBreakpoints(args) => self.set_breakpoints(&request, args),
            Command::Threads => self.outbox.respond(
                &request,
                true,
                Some(json!({"threads": [{"id": THREAD_ID, "name": "main"}]})),
                None,
            ),
            Command::StackTrace(args) => self.stack_trace(request, args),
            Command::Scopes(args) => self.scopes(request, args),
            Command::Variables(args) => self.variables(request, args),
            Command::SetVariable(args) => self.set_variable(request, args),
            Command::Evaluate(args) => self.evaluate(request, args),
            Command::Source(args) => self.source(request, args),
            Command::LoadedSources => {
                let sources: Vec<Source> = self.sources.iter().map(|s| s.to_dap()).collect();
                self.outbox
                    .respond(&request, true, Some(json!({"sources": sources})), None);
            }
            Command::Modules => {
                let modules: Vec<_> = self.modules.iter().map(|m| m.to_dap()).collect();
                let total = modules.len();
                self.outbox.respond(
                    &request,
                    true,
                    Some(json!({"modules": modules, "totalModules": total})),
                    None,
                );
            }
            Command::Disassemble(args) => self.disassemble(&request, args),
            Command::Continue(_) => {
                if self.resume(&request, b"cont\n".to_vec()) {
                    self.outbox.respond(
                        &request,
                        true,
                        Some(json!({"allThreadsContinued": true})),
                        None,
                    );
                }
            }
            Command::Step(kind) => self.step(&request, kind),
            Command::Pause(_) => {
                if matches!(self.state, State::Running | State::Launching) {
                    self.pause_requested = true;
                }
                self.outbox.respond(&request, true, None, None);
            }
            Command::Terminate | Command::Disconnect(_) => {
                self.teardown();
                self.outbox.respond(&request, true, None, None);
            }
        }
    }

    fn launch(&mut self, request: &Request, args: LaunchArgs) {
        if self.state != State::NotStarted {
            self.outbox.respond(
                request,
                false,
                None,
                Some("target already launched".to_string()),
            );
            return;
        }

        if let Err(err) = self.prepare_launch(&args) {
            warn!(error = %err, "launch preparation failed");
            self.outbox
                .respond(request, false, None, Some(err.to_string()));
            return;
        }

        let spec = launch::spawn_spec(&args);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        match self.launcher.launch(&spec, events_tx) {
            Ok(target) => {
                info!(command = %spec, "launched target");
                self.target = Some(target);
                self.state = State::Launching;
                let inbox = self.inbox.clone();
                tokio::spawn(async move {
                    while let Some(event) = events_rx.recv().await {
                        if inbox.send(SessionInput::Bridge(event)).is_err() {
                            break;
                        }
                    }
                });
                self.outbox.respond(request, true, None, None);
            }
            Err(source) => {
                let err = SessionError::Spawn {
                    program: args.program.clone(),
                    source,
                };
                warn!(command = %spec, error = %err, "failed to launch target");
                self.disable_helper();
                self.outbox
                    .respond(request, false, None, Some(err.to_string()));
                self.state = State::Terminated;
                self.send_terminated();
            }
        }
    }

    fn prepare_launch(&mut self, args: &LaunchArgs) -> crate::error::Result<()> {
        self.roots = launch::module_roots(args);
        self.mods_path = args.mods_path.as_ref().map(PathBuf::from);

        if let Some(mods) = &self.mods_path {
            mod_list::adjust_settings(mods, &args.adjust_mod_settings)?;
        }

        if args.no_debug {
            return Ok(());
        }

        self.object_info = Some(objectinfo::load(
            args.object_info_path.as_ref().map(PathBuf::from).as_deref(),
        )?);

        if args.hook_mod {
            if let Some(mods) = &self.mods_path {
                match mod_list::set_enabled(mods, &self.config.helper_mod, true) {
                    Ok(()) => self.helper_enabled = true,
                    Err(err) => warn!(error = %err, "failed to enable helper mod"),
                }
            }
        }
        Ok(())
    }

    fn set_breakpoints(&mut self, request: &Request, args: SetBreakpointsArgs) {
        let (key, target_name) = match (&args.source.source_reference, &args.source.path) {
            (Some(reference), _) if *reference > 0 => (
                SourceKey::Ref(*reference),
                self.sources
                    .by_reference(*reference)
                    .map(|s| s.name.clone()),
            ),
            (_, Some(path)) => (SourceKey::Path(path.clone()), self.modules.to_target(path)),
            _ => {
                self.outbox.respond(
                    request,
                    false,
                    None,
                    Some("source has neither path nor sourceReference".to_string()),
                );
                return;
            }
        };

        let breakpoints = self
            .breakpoints
            .set(key, target_name.clone(), &args.breakpoints);
        self.outbox.respond(
            request,
            true,
            Some(json!({"breakpoints": breakpoints})),
            None,
        );

        if let Some(name) = target_name {
            self.sync_breakpoints(&[name]);
        }
    }

    fn stack_trace(&mut self, request: Request, args: StackTraceArgs) {
        let start = args.start_frame.unwrap_or(0).max(0);
        let levels = args
            .levels
            .filter(|l| *l > 0)
            .and_then(|l| usize::try_from(l).ok());
        self.stack_windows
            .insert(args.thread_id, StackWindow { start, levels });
        let command = format!("__DebugAdapter.stackTrace({start},{})\n", args.thread_id);
        self.ask(request, PendingKind::Stack, args.thread_id, command.into_bytes());
    }

    fn scopes(&mut self, request: Request, args: ScopesArgs) {
        let command = format!("__DebugAdapter.scopes({},{})\n", args.frame_id, request.seq);
        let seq = request.seq;
        self.ask(request, PendingKind::Scopes, seq, command.into_bytes());
    }

    fn variables(&mut self, request: Request, args: VariablesArgs) {
        let command = format!(
            "__DebugAdapter.variables({},{},{},{},{})\n",
            args.variables_reference,
            request.seq,
            args.filter.as_deref().map_or_else(|| "nil".to_string(), quote_arg),
            lua_int(args.start),
            lua_int(args.count),
        );
        let seq = request.seq;
        self.ask(request, PendingKind::Variables, seq, command.into_bytes());
    }

    fn set_variable(&mut self, request: Request, args: SetVariableArgs) {
        let command = format!(
            "__DebugAdapter.setVariable({},{},{},{})\n",
            args.variables_reference,
            quote_arg(&args.name),
            quote_arg(&args.value),
            request.seq,
        );
        let seq = request.seq;
        self.ask(request, PendingKind::SetVariable, seq, command.into_bytes());
    }

    fn evaluate(&mut self, request: Request, args: EvaluateArgs) {
        let command = format!(
            "__DebugAdapter.evaluate({},{},{},{})\n",
            lua_int(args.frame_id),
            quote_arg(args.context.as_deref().unwrap_or("repl")),
            quote_arg(&args.expression),
            request.seq,
        );
        let seq = request.seq;
        self.ask(request, PendingKind::Evaluate, seq, command.into_bytes());
    }

    fn source(&mut self, request: Request, args: SourceArgs) {
        let reference = args
            .source
            .as_ref()
            .and_then(|s| s.source_reference)
            .filter(|r| *r > 0)
            .unwrap_or(args.source_reference);
        let Some(loaded) = self.sources.by_reference(reference) else {
            self.outbox.respond(
                &request,
                false,
                None,
                Some(format!("unknown source reference {reference}")),
            );
            return;
        };
        let command = format!(
            "__DebugAdapter.source({},{})\n",
            reference,
            quote_arg(&loaded.name)
        );
        self.ask(request, PendingKind::Source, reference, command.into_bytes());
    }

    fn disassemble(&mut self, request: &Request, args: DisassembleArgs) {
        let Some(base) = parse_address(&args.memory_reference) else {
            self.outbox.respond(
                request,
                false,
                None,
                Some(format!("invalid memory reference {:?}", args.memory_reference)),
            );
            return;
        };
        let Some(start) = base.checked_add(args.instruction_offset) else {
            self.outbox.respond(
                request,
                false,
                None,
                Some(format!(
                    "instruction offset {} is out of range for {:?}",
                    args.instruction_offset, args.memory_reference
                )),
            );
            return;
        };
        let count = args.instruction_count.clamp(0, MAX_DISASSEMBLE_COUNT) as usize;
        let instructions: Vec<protocol::DisassembledInstruction> = self
            .disassembler
            .disassemble(start, count)
            .into_iter()
            .map(|i| protocol::DisassembledInstruction {
                address: i.address.to_string(),
                instruction_bytes: i.instruction_bytes,
                instruction: i.instruction,
                location: i.source.as_deref().map(|name| self.client_source(name, None)),
                line: i.line,
                presentation_hint: i.invalid.then(|| "invalid".to_string()),
            })
            .collect();
        self.outbox.respond(
            request,
            true,
            Some(json!({"instructions": instructions})),
            None,
        );
    }

    fn step(&mut self, request: &Request, kind: StepKind) {
        let command = format!("__DebugAdapter.step(\"{}\")\n", kind.as_str());
        if self.resume(request, command.into_bytes()) {
            self.outbox.respond(request, true, None, None);
        }
    }

    /// Leave the prompt with `command`. Outside the prompt the request fails
    /// and nothing is written.
    fn resume(&mut self, request: &Request, command: Vec<u8>) -> bool {
        if self.state != State::Prompt {
            warn!(command = %request.command, state = ?self.state, "target is not stopped");
            self.outbox.respond(
                request,
                false,
                None,
                Some("target is not stopped".to_string()),
            );
            return false;
        }
        self.write_now(command);
        self.state = State::Running;
        true
    }

    /// Write a command whose reply is correlated through `kind`'s table and
    /// answer the editor from a waiter task.
    fn ask(&mut self, request: Request, kind: PendingKind, key: i64, command: Vec<u8>) {
        if matches!(
            self.state,
            State::NotStarted | State::Terminating | State::Terminated
        ) {
            self.outbox.reply(&request, kind.unavailable());
            return;
        }

        let (ticket, reply) = self.table(kind).insert(key);
        let cancel = CancellationToken::new();
        let consumed = self.write(command, Some(cancel.clone()));

        let outbox = self.outbox.clone();
        let inbox = self.inbox.clone();
        let timeout = self.config.request_timeout();
        tokio::spawn(wait_for_reply(
            WaitContext {
                outbox,
                inbox,
                request,
                kind,
                ticket,
                timeout,
            },
            consumed,
            reply,
            cancel,
        ));
    }

    // ---- stdin ----

    /// Write now when at the prompt, otherwise queue for the next one.
    fn write(
        &mut self,
        data: Vec<u8>,
        cancel: Option<CancellationToken>,
    ) -> oneshot::Receiver<WriteOutcome> {
        let (tx, rx) = oneshot::channel();
        let write = QueuedWrite {
            data,
            consumed: Some(tx),
            cancel,
        };
        match self.state {
            State::Prompt => self.deliver(write),
            State::Launching | State::Running => {
                debug!(queued = self.queue.len() + 1, "target running; queued command");
                self.queue.push_back(write);
            }
            State::NotStarted | State::Terminating | State::Terminated => {
                expire(write);
            }
        }
        rx
    }

    fn write_now(&mut self, data: Vec<u8>) {
        self.deliver(QueuedWrite {
            data,
            consumed: None,
            cancel: None,
        });
    }

    fn deliver(&mut self, write: QueuedWrite) {
        if write.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            debug!("dropping expired command");
            expire(write);
            return;
        }
        let outcome = match &self.target {
            Some(target) => match target.write_stdin(write.data) {
                Ok(()) => WriteOutcome::Sent,
                Err(err) => {
                    warn!(error = %err, "failed to write to target stdin");
                    WriteOutcome::Expired
                }
            },
            None => WriteOutcome::Expired,
        };
        if let Some(tx) = write.consumed {
            let _ = tx.send(outcome);
        }
    }

    fn flush(&mut self) {
        while let Some(write) = self.queue.pop_front() {
            self.deliver(write);
        }
    }

    fn expire_queue(&mut self) {
        for write in self.queue.drain(..) {
            expire(write);
        }
    }

    fn sync_breakpoints(&mut self, names: &[String]) {
        let lists: Vec<_> = names.iter().map(|n| self.breakpoints.wire_for(n)).collect();
        if let Some(command) = update_breakpoints_command(&lists) {
            self.write(command, None);
        }
    }

    // ---- target output ----

    fn handle_bridge(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::Stdout(segment) => self.handle_line(TargetLine::parse(&segment)),
            BridgeEvent::Stderr(segment) => {
                let mut output = String::from_utf8_lossy(&segment).into_owned();
                output.push('\n');
                self.outbox.event(
                    "output",
                    Some(json!({"category": "stderr", "output": output})),
                );
            }
            BridgeEvent::Exited { code, signal } => self.exited(code, signal),
        }
    }

    fn handle_line(&mut self, line: TargetLine) {
        match line {
            TargetLine::Prompt(event) => self.prompt(event),
            TargetLine::Stack(payload) => {
                let thread_id = payload.thread_id;
                let window = self.stack_windows.remove(&thread_id).unwrap_or_default();
                let body = self.stack_body(payload, window);
                if !self.stacks.resolve(thread_id, Ok(body)) {
                    debug!(thread_id, "stack reply without a waiting request");
                }
            }
            TargetLine::Scopes(reply) => {
                self.scopes
                    .resolve(reply.seq, Ok(json!({"scopes": reply.body.scopes})));
            }
            TargetLine::Variables(reply) => {
                self.variables
                    .resolve(reply.seq, Ok(json!({"variables": reply.body.variables})));
            }
            TargetLine::SetVariable(reply) => {
                self.set_variable
                    .resolve(reply.seq, Ok(Value::Object(reply.body)));
            }
            TargetLine::Eval(reply) => {
                let body = reply.body;
                let value = match body.error {
                    Some(error) => Err(error),
                    None => Ok(json!({
                        "result": body.result.unwrap_or_default(),
                        "type": body.type_name,
                        "variablesReference": body.variables_reference,
                    })),
                };
                self.evaluate.resolve(reply.seq, value);
            }
            TargetLine::Source(content) => {
                self.source_dumps
                    .resolve(content.id, Ok(json!({"content": content.content})));
            }
            TargetLine::Print(payload) => self.print(payload),
            TargetLine::Modules(reported) => {
                for record in self.modules.update(&reported, &self.roots) {
                    self.outbox.event(
                        "module",
                        Some(json!({"reason": "new", "module": record.to_dap()})),
                    );
                }
                let modules = &self.modules;
                let mapped = self.breakpoints.remap(|path| modules.to_target(path));
                if !mapped.is_empty() {
                    self.sync_breakpoints(&mapped);
                }
            }
            TargetLine::LoadedSource(payload) => self.loaded_source(payload),
            TargetLine::Profile(text) => {
                self.outbox.event("fmtk/profile", Some(json!({"line": text})));
            }
            TargetLine::Output(mut output) => {
                output.push('\n');
                self.outbox.event(
                    "output",
                    Some(json!({"category": "stdout", "output": output})),
                );
            }
            TargetLine::Malformed { tag, error } => {
                warn!(tag, error = %error, "malformed target line");
            }
        }
    }

    fn prompt(&mut self, event: PromptEvent) {
        if matches!(self.state, State::Terminating | State::Terminated) {
            return;
        }
        debug!(?event, previous = ?self.state, "target at prompt");
        self.state = State::Prompt;

        if let Some(info) = self.object_info.take() {
            for command in objectinfo::commands(&info, self.config.object_info_chunk_bytes) {
                self.write_now(command);
            }
        }

        match event {
            PromptEvent::Tick => {
                self.flush();
                if std::mem::take(&mut self.pause_requested) {
                    self.stopped(StopReason::Pause);
                } else {
                    self.cont();
                }
            }
            PromptEvent::StageLoad(_) => {
                self.flush();
                if let Some(command) = update_breakpoints_command(&self.breakpoints.wire_all()) {
                    self.write_now(command);
                }
                self.cont();
            }
            PromptEvent::InitialLoad(_) => {
                self.flush();
                self.cont();
            }
            PromptEvent::Stopped(reason) => {
                self.pause_requested = false;
                self.flush();
                self.stopped(reason);
            }
            PromptEvent::GetRef => {
                let base = self.refs.allocate();
                self.write_now(format!("__DebugAdapter.transferRef({base})\n").into_bytes());
                self.flush();
                self.cont();
            }
            PromptEvent::Unknown(text) => {
                warn!(event = %text, "unrecognised prompt event; continuing");
                self.flush();
                self.cont();
            }
        }
    }

    fn cont(&mut self) {
        self.write_now(b"cont\n".to_vec());
        self.state = State::Running;
    }

    fn stopped(&mut self, reason: StopReason) {
        info!(reason = reason.as_str(), "target stopped");
        self.outbox.event(
            "stopped",
            Some(json!({
                "reason": reason.as_str(),
                "threadId": THREAD_ID,
                "allThreadsStopped": true,
            })),
        );
    }

    fn print(&mut self, payload: OutputPayload) {
        let mut output = payload.output;
        if !output.ends_with('\n') {
            output.push('\n');
        }
        let mut body = json!({
            "category": payload.category.unwrap_or_else(|| "console".to_string()),
            "output": output,
        });
        if let Some(source) = payload.source.as_ref().and_then(|s| self.frame_source(s)) {
            body["source"] = json!(source);
            if let Some(line) = payload.line {
                body["line"] = json!(line);
            }
        }
        self.outbox.event("output", Some(body));
    }

    fn loaded_source(&mut self, payload: SourcePayload) {
        let path = self.modules.to_client(&payload.name);
        let (source, is_new) = self.sources.register(&payload.name, path);
        self.outbox.event(
            "loadedSource",
            Some(json!({
                "reason": if is_new { "new" } else { "changed" },
                "source": source.to_dap(),
            })),
        );

        if let Some(lines) = payload.lines {
            for breakpoint in self.breakpoints.revalidate(&payload.name, lines) {
                self.outbox.event(
                    "breakpoint",
                    Some(json!({"reason": "changed", "breakpoint": breakpoint})),
                );
            }
        }

        if let Some(dump) = payload.dump {
            match base64::engine::general_purpose::STANDARD.decode(dump.as_bytes()) {
                Ok(bytes) => {
                    if let Err(err) = self.disassembler.load(payload.name.clone(), &bytes) {
                        warn!(name = %payload.name, error = %err, "failed to parse bytecode dump");
                    }
                }
                Err(err) => {
                    warn!(name = %payload.name, error = %err, "bytecode dump is not base64");
                }
            }
        }
    }

    /// The target answers with every frame from `window.start` down; `levels`
    /// only trims what the editor sees.
    fn stack_body(&self, payload: StackPayload, window: StackWindow) -> Value {
        let total = window.start + payload.frames.len() as i64;
        let frames: Vec<StackFrame> = payload
            .frames
            .iter()
            .take(window.levels.unwrap_or(usize::MAX))
            .map(|frame| self.convert_frame(frame))
            .collect();
        json!({"stackFrames": frames, "totalFrames": total})
    }

    fn convert_frame(&self, frame: &TargetFrame) -> StackFrame {
        let target_path = frame.source.as_ref().and_then(|s| s.path.as_deref());
        let instruction_pointer_reference = match (target_path, frame.linedefined, frame.pc) {
            (Some(name), Some(line_defined), Some(pc)) => self
                .disassembler
                .address_of(name, line_defined, pc)
                .map(|address| address.to_string()),
            _ => None,
        };
        StackFrame {
            id: frame.id,
            name: frame.name.clone(),
            source: frame.source.as_ref().and_then(|s| self.frame_source(s)),
            line: frame.line,
            column: frame.column,
            instruction_pointer_reference,
            presentation_hint: frame.presentation_hint.clone(),
        }
    }

    fn frame_source(&self, source: &TargetSource) -> Option<Source> {
        match source.path.as_deref() {
            Some(path) => Some(self.client_source(path, source.name.as_deref())),
            None => source.name.as_ref().map(|name| Source {
                name: Some(name.clone()),
                ..Source::default()
            }),
        }
    }

    /// Editor view of a target-space source name.
    fn client_source(&self, target_name: &str, display: Option<&str>) -> Source {
        if let Some(path) = self.modules.to_client(target_name) {
            let name = display
                .map(str::to_string)
                .or_else(|| target_name.rsplit('/').next().map(str::to_string));
            return Source {
                name,
                path: Some(path),
                source_reference: None,
            };
        }
        if let Some(loaded) = self.sources.get(target_name) {
            return loaded.to_dap();
        }
        Source {
            name: Some(display.unwrap_or(target_name).to_string()),
            ..Source::default()
        }
    }

    // ---- lifecycle ----

    /// Kill the target, then undo launch-time bookkeeping. Safe to repeat.
    fn teardown(&mut self) {
        match self.state {
            State::Terminating | State::Terminated => {}
            State::NotStarted => {
                self.state = State::Terminated;
                self.send_terminated();
            }
            State::Launching | State::Prompt | State::Running => {
                info!("terminating target");
                self.state = State::Terminating;
                if let Some(target) = &self.target {
                    target.kill();
                }
                self.expire_queue();
            }
        }
        self.disable_helper();
    }

    fn exited(&mut self, code: Option<i32>, signal: Option<i32>) {
        let exit_code = code.or(signal.map(|s| 128 + s)).unwrap_or(-1);
        info!(?code, ?signal, "target exited");
        self.state = State::Terminated;
        self.target = None;
        self.expire_queue();
        self.release_waiters();
        self.disable_helper();
        self.outbox
            .event("exited", Some(json!({"exitCode": exit_code})));
        self.send_terminated();
    }

    fn send_terminated(&mut self) {
        if !std::mem::replace(&mut self.terminated_sent, true) {
            self.outbox.event("terminated", None);
        }
    }

    /// Waiters still pending see a closed channel and answer "unavailable".
    fn release_waiters(&mut self) {
        self.stacks.clear();
        self.stack_windows.clear();
        self.scopes.clear();
        self.variables.clear();
        self.set_variable.clear();
        self.evaluate.clear();
        self.source_dumps.clear();
    }

    fn disable_helper(&mut self) {
        if !std::mem::take(&mut self.helper_enabled) {
            return;
        }
        if let Some(mods) = &self.mods_path {
            if let Err(err) = mod_list::set_enabled(mods, &self.config.helper_mod, false) {
                warn!(error = %err, "failed to disable helper mod");
            }
        }
    }
}

fn expire(write: QueuedWrite) {
    if let Some(tx) = write.consumed {
        let _ = tx.send(WriteOutcome::Expired);
    }
}

struct WaitContext {
    outbox: Outbox,
    inbox: mpsc::UnboundedSender<SessionInput>,
    request: Request,
    kind: PendingKind,
    ticket: Ticket,
    timeout: Duration,
}

async fn wait_for_reply(
    cx: WaitContext,
    consumed: oneshot::Receiver<WriteOutcome>,
    reply: oneshot::Receiver<Reply>,
    cancel: CancellationToken,
) {
    let outcome = tokio::time::timeout(cx.timeout, async {
        match consumed.await {
            Ok(WriteOutcome::Sent) => reply.await.ok(),
            _ => None,
        }
    })
    .await
    .ok()
    .flatten();

    match outcome {
        Some(reply) => cx.outbox.reply(&cx.request, reply),
        None => {
            cancel.cancel();
            let _ = cx.inbox.send(SessionInput::Abandon(cx.kind, cx.ticket));
            warn!(
                command = %cx.request.command,
                seq = cx.request.seq,
                "no reply from target; answering unavailable"
            );
            cx.outbox.reply(&cx.request, cx.kind.unavailable());
        }
    }
}

/// `__DebugAdapter.updateBreakpoints(<bq>,<bq>,...)`, or `None` for nothing
/// to send.
fn update_breakpoints_command(lists: &[fmtk_wire::SourceBreakpoints]) -> Option<Vec<u8>> {
    let mut args = Vec::new();
    for list in lists {
        match list.encode() {
            Ok(bytes) => args.push(block_quote(&bytes)),
            Err(err) => warn!(source = %list.filename, error = %err, "cannot encode breakpoints"),
        }
    }
    if args.is_empty() {
        return None;
    }
    let mut command = b"__DebugAdapter.updateBreakpoints(".to_vec();
    command.extend(args.join(&b","[..]));
    command.extend_from_slice(b")\n");
    Some(command)
}

/// Block-quoted command argument. Line breaks become a single space so the
/// command stays on one stdin line.
fn quote_arg(text: &str) -> String {
    block_quote_str(&collapse_newlines(text))
}

fn lua_int(value: Option<i64>) -> String {
    value.map_or_else(|| "nil".to_string(), |v| v.to_string())
}

/// Decimal, or hexadecimal with a `0x` prefix.
fn parse_address(text: &str) -> Option<i64> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}
