//! The resumable, tree-walking interpreter.
//!
//! Execution state is an explicit stack of frames, each holding a beat
//! name, the node id of a block, the index of the current statement and
//! the state frames activated in that block. Because the cursor is plain
//! data, it can be serialised (save/restore) and execution can suspend at
//! any statement boundary.
//!
//! The host drives the interpreter through a pull API:
//! [`Interpreter::start`] runs to the first event, [`Interpreter::advance`]
//! answers a dialogue event, [`Interpreter::choose`] answers a choice
//! event. Each call runs the cursor forward to the next suspension (or to
//! [`Event::Finished`]). Calling the wrong continuation for the current
//! suspension is a `DoubleContinuation` error, which covers the one-shot
//! discipline continuations must follow.
//!
//! Every suspension carries an **epoch**: dialogue and choice events embed
//! the counter value they were raised with, and `advance`/`choose` verify
//! it against the current suspension. [`Interpreter::restore`] moves the
//! epoch past every previously issued event, so an event held from before
//! a restore can no longer be answered.

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tracing::debug;

use loreline_par::{
    AssignStmt, ChoiceStmt, NodeId, Script, StateDecl, Stmt, TextStmt, TransitionStmt,
    TransitionTarget,
};
use loreline_lex::TextFragment;
use loreline_par::FieldInit;
use loreline_util::{Error, Position, Result, RuntimeErrorKind};

use crate::eval::{eval, render_text, EvalCtx, TagMarker};
use crate::fields::{FieldsContext, FieldsFactory, FieldsRef, FrameKind, MapFieldsFactory};
use crate::rng::DiceRng;
use crate::scope::Env;
use crate::translations::Translations;
use crate::value::Value;

/// Execution stack bound; exceeding it is a `StackOverflow` error.
pub(crate) const MAX_STACK_DEPTH: usize = 256;

/// Transition bound; exceeding it is an `InfiniteLoopGuard` error.
pub(crate) const MAX_TRANSITIONS: u64 = 1_000_000;

/// A host-registered function callable from scripts.
pub struct HostFunction {
    pub(crate) func: Box<dyn FnMut(&[Value]) -> std::result::Result<Value, String>>,
    /// Pure functions may be called from choice guards under strict access.
    pub(crate) pure: bool,
}

impl HostFunction {
    /// A function with side effects (the default).
    pub fn new(
        func: impl FnMut(&[Value]) -> std::result::Result<Value, String> + 'static,
    ) -> Self {
        Self {
            func: Box::new(func),
            pure: false,
        }
    }

    /// A function declared pure: no observable side effects, safe in
    /// choice guards.
    pub fn pure_fn(
        func: impl FnMut(&[Value]) -> std::result::Result<Value, String> + 'static,
    ) -> Self {
        Self {
            func: Box::new(func),
            pure: true,
        }
    }
}

/// Interpreter construction options.
#[derive(Default)]
pub struct Options {
    /// Host functions by name; these shadow built-ins.
    pub functions: FxHashMap<String, HostFunction>,
    /// Reject reads of undeclared names (and impure guard calls) instead
    /// of yielding `Null`.
    pub strict_access: bool,
    /// RNG seed; drawn from entropy when absent.
    pub seed: Option<u64>,
    /// Active translation table.
    pub translations: Option<Translations>,
    /// Custom backing for character and state frames.
    pub create_fields: Option<Box<dyn FieldsFactory>>,
}

/// Where the interpreter currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// About to execute the next statement.
    Ready,
    /// A dialogue event is out; waiting for [`Interpreter::advance`].
    AwaitingDialogue,
    /// A choice event is out; waiting for [`Interpreter::choose`].
    AwaitingChoice,
    /// Execution completed.
    Finished,
    /// A runtime error aborted execution.
    Failed,
}

/// A dialogue line for the host.
#[derive(Clone, Debug, PartialEq)]
pub struct DialogueEvent {
    /// Display name of the speaking character, `None` for narration.
    pub character: Option<String>,
    pub text: String,
    pub tags: Vec<TagMarker>,
    pub node: NodeId,
    /// Suspension epoch; pass back to [`Interpreter::advance`].
    pub epoch: u64,
}

/// One option in a choice event, in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub struct ChoiceOptionView {
    pub text: String,
    pub tags: Vec<TagMarker>,
    /// Guard result; hosts that hide disabled options must still answer
    /// with the absolute index into this list.
    pub enabled: bool,
}

/// A choice menu for the host.
#[derive(Clone, Debug, PartialEq)]
pub struct ChoiceEvent {
    pub options: Vec<ChoiceOptionView>,
    pub node: NodeId,
    /// Suspension epoch; pass back to [`Interpreter::choose`].
    pub epoch: u64,
}

/// What the interpreter stopped on.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Dialogue(DialogueEvent),
    Choice(ChoiceEvent),
    Finished,
}

/// One entry of the execution stack.
pub(crate) struct Frame {
    pub beat: String,
    /// Node id of the block being executed.
    pub block: NodeId,
    /// Index of the current statement within the block.
    pub index: usize,
    /// State frames activated in this block, in activation order.
    /// The flag marks transient (`new state`) frames.
    pub states: Vec<(NodeId, FieldsRef, bool)>,
}

/// The Loreline interpreter.
pub struct Interpreter {
    pub(crate) script: Arc<Script>,
    pub(crate) functions: FxHashMap<String, HostFunction>,
    pub(crate) strict: bool,
    pub(crate) translations: Option<Translations>,
    pub(crate) factory: Box<dyn FieldsFactory>,

    pub(crate) globals: FieldsRef,
    pub(crate) globals_transient: FieldsRef,
    pub(crate) characters: IndexMap<String, FieldsRef>,
    /// Persistent beat-state frames, keyed by the declaring statement.
    pub(crate) persistent_states: FxHashMap<NodeId, FieldsRef>,

    pub(crate) stack: Vec<Frame>,
    pub(crate) status: Status,
    pub(crate) rng: DiceRng,
    pub(crate) transitions: u64,
    pub(crate) epoch: u64,
    pub(crate) pending_choice: Option<NodeId>,
    pub(crate) error: Option<Error>,
}

impl Interpreter {
    /// Create an interpreter over a script: global state and character
    /// frames are initialised, but no beat is entered yet.
    pub fn new(script: Arc<Script>, options: Options) -> Result<Self> {
        let factory = options
            .create_fields
            .unwrap_or_else(|| Box::new(MapFieldsFactory));
        let seed = options.seed.unwrap_or_else(rand::random);
        let globals = factory.create(FieldsContext {
            kind: FrameKind::GlobalState,
            node: NodeId::ROOT,
            name: None,
        });
        let globals_transient = factory.create(FieldsContext {
            kind: FrameKind::GlobalState,
            node: NodeId::ROOT,
            name: None,
        });

        let mut interpreter = Self {
            script,
            functions: options.functions,
            strict: options.strict_access,
            translations: options.translations,
            factory,
            globals,
            globals_transient,
            characters: IndexMap::new(),
            persistent_states: FxHashMap::default(),
            stack: Vec::new(),
            status: Status::Ready,
            rng: DiceRng::new(seed),
            transitions: 0,
            epoch: 0,
            pending_choice: None,
            error: None,
        };
        interpreter.init_globals()?;
        interpreter.init_characters()?;
        interpreter.init_transient_globals()?;
        Ok(interpreter)
    }

    /// Start (or restart) execution at `beat`, or at the first declared
    /// beat, and run to the first event.
    pub fn start(&mut self, beat: Option<&str>) -> Result<Event> {
        self.error = None;
        self.status = Status::Ready;
        self.stack.clear();
        self.pending_choice = None;
        self.transitions = 0;
        self.init_transient_globals()?;

        let name = match beat {
            Some(name) => name.to_string(),
            None => match self.script.first_beat() {
                Some(beat) => beat.name.clone(),
                None => {
                    return self.fail(Error::new(
                        RuntimeErrorKind::UnknownBeat,
                        "script declares no beats",
                        Position::NONE,
                    ))
                }
            },
        };
        if let Err(err) = self.enter_beat(&name, Position::NONE) {
            return self.fail(err);
        }
        self.run()
    }

    /// Continue after a dialogue event.
    ///
    /// `epoch` is the value the event was raised with. An event held from
    /// before a [`restore`](Interpreter::restore) no longer matches the
    /// current suspension and is rejected.
    pub fn advance(&mut self, epoch: u64) -> Result<Event> {
        if self.status != Status::AwaitingDialogue {
            return Err(self.continuation_error("advance"));
        }
        if epoch != self.epoch {
            return Err(self.stale_continuation_error("advance", epoch));
        }
        self.bump_index();
        self.status = Status::Ready;
        self.run()
    }

    /// Answer a choice event with the absolute option index.
    ///
    /// `epoch` is the value the event was raised with; stale events are
    /// rejected the same way as in [`advance`](Interpreter::advance).
    pub fn choose(&mut self, epoch: u64, index: usize) -> Result<Event> {
        if self.status != Status::AwaitingChoice {
            return Err(self.continuation_error("choose"));
        }
        if epoch != self.epoch {
            return Err(self.stale_continuation_error("choose", epoch));
        }
        let Some(choice_id) = self.pending_choice else {
            return self.fail(Error::new(
                RuntimeErrorKind::IncompatibleSaveData,
                "no pending choice recorded for this suspension",
                Position::NONE,
            ));
        };
        let script = self.script.clone();
        let Some(Stmt::Choice(choice)) = script.find_stmt(choice_id) else {
            return self.fail(Error::new(
                RuntimeErrorKind::IncompatibleSaveData,
                "pending choice does not exist in this script",
                Position::NONE,
            ));
        };
        let Some(option) = choice.options.get(index) else {
            return Err(Error::new(
                RuntimeErrorKind::TypeMismatch,
                format!(
                    "choice index {index} out of range for {} options",
                    choice.options.len()
                ),
                choice.pos,
            ));
        };
        let body_id = option.body.id;
        let beat = self
            .stack
            .last()
            .map(|frame| frame.beat.clone())
            .unwrap_or_default();
        self.bump_index();
        self.pending_choice = None;
        self.status = Status::Ready;
        self.push_frame(beat, body_id)?;
        self.run()
    }

    /// Continue from the recorded cursor, typically after [`restore`].
    /// A pending dialogue or choice suspension is re-raised.
    ///
    /// [`restore`]: Interpreter::restore
    pub fn resume(&mut self) -> Result<Event> {
        match self.status {
            Status::AwaitingDialogue | Status::AwaitingChoice => {
                self.status = Status::Ready;
                self.pending_choice = None;
                self.run()
            }
            Status::Ready => self.run(),
            Status::Finished => Ok(Event::Finished),
            Status::Failed => Err(self
                .error
                .clone()
                .expect("failed status always records its error")),
        }
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// The error that aborted execution, if any.
    pub fn last_error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// The RNG seed in use (useful for reproducing a run).
    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// The epoch of the current suspension.
    ///
    /// Bumped every time a dialogue or choice event is raised, and moved
    /// past every previously issued event on restore. A host answering the
    /// pending suspension right after a restore, without re-raising it
    /// through [`resume`](Interpreter::resume), passes this value.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The script being executed.
    pub fn script(&self) -> &Arc<Script> {
        &self.script
    }

    /// Read a character field by the character's declared identifier.
    pub fn get_character_field(&self, character: &str, field: &str) -> Result<Value> {
        match self.characters.get(character) {
            Some(frame) => Ok(frame.borrow().get(field).unwrap_or(Value::Null)),
            None => Err(self.unknown_character(character)),
        }
    }

    /// Write a character field by the character's declared identifier.
    pub fn set_character_field(
        &mut self,
        character: &str,
        field: &str,
        value: Value,
    ) -> Result<()> {
        match self.characters.get(character) {
            Some(frame) => {
                frame.borrow_mut().set(field, value);
                Ok(())
            }
            None => Err(self.unknown_character(character)),
        }
    }

    // =========================================================================
    // Initialisation
    // =========================================================================

    fn init_globals(&mut self) -> Result<()> {
        let script = self.script.clone();
        for state in script.state_decls() {
            if !state.is_new {
                let frame = self.globals.clone();
                self.init_fields(&frame, &state.fields)?;
            }
        }
        Ok(())
    }

    pub(crate) fn init_transient_globals(&mut self) -> Result<()> {
        let script = self.script.clone();
        let frame = self.globals_transient.clone();
        {
            let mut frame = frame.borrow_mut();
            for key in frame.fields() {
                frame.remove(&key);
            }
        }
        for state in script.state_decls() {
            if state.is_new {
                self.init_fields(&frame, &state.fields)?;
            }
        }
        Ok(())
    }

    fn init_characters(&mut self) -> Result<()> {
        let script = self.script.clone();
        for decl in script.characters() {
            let frame = self.factory.create(FieldsContext {
                kind: FrameKind::Character,
                node: decl.id,
                name: Some(&decl.name),
            });
            self.characters.insert(decl.name.clone(), frame.clone());
            self.init_fields(&frame, &decl.fields)?;
        }
        Ok(())
    }

    fn init_fields(&mut self, frame: &FieldsRef, fields: &[FieldInit]) -> Result<()> {
        for field in fields {
            let value = self.eval_expr(&field.value, false)?;
            frame.borrow_mut().set(&field.name, value);
        }
        Ok(())
    }

    // =========================================================================
    // The drive loop
    // =========================================================================

    fn run(&mut self) -> Result<Event> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        loop {
            let Some(frame) = self.stack.last() else {
                self.status = Status::Finished;
                debug!("script finished");
                return Ok(Event::Finished);
            };
            let (block_id, index) = (frame.block, frame.index);

            let script = self.script.clone();
            let Some(block) = script.find_block(block_id) else {
                return self.fail(Error::new(
                    RuntimeErrorKind::IncompatibleSaveData,
                    format!("block {block_id} does not exist in this script"),
                    Position::NONE,
                ));
            };

            if index >= block.stmts.len() {
                self.stack.pop();
                continue;
            }

            match self.exec_stmt(&block.stmts[index]) {
                Ok(Some(event)) => return Ok(event),
                Ok(None) => {}
                Err(err) => return self.fail(err),
            }
        }
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Option<Event>> {
        match stmt {
            Stmt::Text(text) => self.exec_text(text).map(Some),
            Stmt::Assign(assign) => {
                self.exec_assign(assign)?;
                self.bump_index();
                Ok(None)
            }
            Stmt::Call(call) => {
                self.eval_expr(&loreline_par::Expr::Call(call.call.clone()), false)?;
                self.bump_index();
                Ok(None)
            }
            Stmt::State(state) => {
                self.exec_state(state)?;
                self.bump_index();
                Ok(None)
            }
            Stmt::If(stmt) => {
                let cond = self.eval_expr(&stmt.cond, false)?.is_truthy();
                self.bump_index();
                let target = if cond {
                    Some(&stmt.then_block)
                } else {
                    stmt.else_block.as_ref()
                };
                if let Some(block) = target {
                    let beat = self
                        .stack
                        .last()
                        .map(|frame| frame.beat.clone())
                        .unwrap_or_default();
                    self.push_frame(beat, block.id)?;
                }
                Ok(None)
            }
            Stmt::Choice(choice) => self.exec_choice(choice).map(Some),
            Stmt::Transition(transition) => {
                self.exec_transition(transition)?;
                Ok(None)
            }
        }
    }

    fn exec_text(&mut self, text: &TextStmt) -> Result<Event> {
        let character = match &text.speaker {
            None => None,
            Some(id) => {
                let Some(frame) = self.characters.get(id) else {
                    return Err(self.unknown_character(id));
                };
                let display = match frame.borrow().get("name") {
                    Some(Value::String(name)) => name,
                    _ => id.clone(),
                };
                Some(display)
            }
        };
        let fragments = self.translated_fragments(text.id, &text.fragments);
        let (rendered, tags) = self.render_fragments(&fragments, text.pos)?;
        self.epoch = self.epoch.wrapping_add(1);
        self.status = Status::AwaitingDialogue;
        Ok(Event::Dialogue(DialogueEvent {
            character,
            text: rendered,
            tags,
            node: text.id,
            epoch: self.epoch,
        }))
    }

    fn exec_choice(&mut self, choice: &ChoiceStmt) -> Result<Event> {
        let mut options = Vec::with_capacity(choice.options.len());
        for option in &choice.options {
            let enabled = match &option.guard {
                None => true,
                Some(guard) => self.eval_expr(guard, true)?.is_truthy(),
            };
            let fragments = self.translated_fragments(option.id, &option.prompt);
            let (text, tags) = self.render_fragments(&fragments, option.pos)?;
            options.push(ChoiceOptionView {
                text,
                tags,
                enabled,
            });
        }
        self.epoch = self.epoch.wrapping_add(1);
        self.pending_choice = Some(choice.id);
        self.status = Status::AwaitingChoice;
        Ok(Event::Choice(ChoiceEvent {
            options,
            node: choice.id,
            epoch: self.epoch,
        }))
    }

    fn exec_assign(&mut self, assign: &AssignStmt) -> Result<()> {
        let value = self.eval_expr(&assign.value, false)?;
        let script = self.script.clone();
        let scopes = self.collect_scopes();
        let env = Env {
            scopes: &scopes,
            characters: &self.characters,
            globals: &self.globals,
            globals_transient: &self.globals_transient,
            strict: self.strict,
            file: script.file.as_deref(),
        };
        env.assign(&assign.target.segments, assign.op, value, assign.pos)
    }

    /// Beat-local `state`: a persistent frame is created on first execution
    /// and reused afterwards; a `new state` frame is rebuilt every time the
    /// statement runs.
    fn exec_state(&mut self, state: &StateDecl) -> Result<()> {
        if state.is_new {
            let frame = self.factory.create(FieldsContext {
                kind: FrameKind::BeatState,
                node: state.id,
                name: None,
            });
            self.register_state(state.id, frame.clone(), true);
            self.init_fields(&frame, &state.fields)?;
            return Ok(());
        }

        if let Some(existing) = self.persistent_states.get(&state.id) {
            let frame = existing.clone();
            self.register_state(state.id, frame, false);
            return Ok(());
        }
        let frame = self.factory.create(FieldsContext {
            kind: FrameKind::BeatState,
            node: state.id,
            name: None,
        });
        self.persistent_states.insert(state.id, frame.clone());
        self.register_state(state.id, frame.clone(), false);
        self.init_fields(&frame, &state.fields)?;
        Ok(())
    }

    fn exec_transition(&mut self, transition: &TransitionStmt) -> Result<()> {
        self.transitions += 1;
        if self.transitions > MAX_TRANSITIONS {
            return Err(Error::new(
                RuntimeErrorKind::InfiniteLoopGuard,
                format!("more than {MAX_TRANSITIONS} transitions"),
                transition.pos,
            ));
        }
        let target = match &transition.target {
            TransitionTarget::Beat(name) => name.clone(),
            TransitionTarget::Current => self
                .stack
                .last()
                .map(|frame| frame.beat.clone())
                .unwrap_or_default(),
        };
        self.enter_beat(&target, transition.pos)
    }

    fn enter_beat(&mut self, name: &str, pos: Position) -> Result<()> {
        let script = self.script.clone();
        let Some(beat) = script.beat(name) else {
            return Err(Error::new(
                RuntimeErrorKind::UnknownBeat,
                format!("no beat named '{name}'"),
                pos,
            )
            .with_frame(script.file.as_deref(), pos.line));
        };
        debug!(beat = name, "entering beat");
        self.stack.clear();
        self.stack.push(Frame {
            beat: name.to_string(),
            block: beat.body.id,
            index: 0,
            states: Vec::new(),
        });
        Ok(())
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    fn bump_index(&mut self) {
        if let Some(frame) = self.stack.last_mut() {
            frame.index += 1;
        }
    }

    fn push_frame(&mut self, beat: String, block: NodeId) -> Result<()> {
        if self.stack.len() >= MAX_STACK_DEPTH {
            return Err(Error::new(
                RuntimeErrorKind::StackOverflow,
                format!("execution stack deeper than {MAX_STACK_DEPTH}"),
                Position::NONE,
            ));
        }
        self.stack.push(Frame {
            beat,
            block,
            index: 0,
            states: Vec::new(),
        });
        Ok(())
    }

    fn register_state(&mut self, id: NodeId, frame: FieldsRef, transient: bool) {
        if let Some(top) = self.stack.last_mut() {
            top.states.retain(|(existing, _, _)| *existing != id);
            top.states.push((id, frame, transient));
        }
    }

    /// Active state frames, innermost first.
    pub(crate) fn collect_scopes(&self) -> Vec<FieldsRef> {
        let mut scopes = Vec::new();
        for frame in self.stack.iter().rev() {
            for (_, fields, _) in frame.states.iter().rev() {
                scopes.push(fields.clone());
            }
        }
        scopes
    }

    fn translated_fragments(&self, id: NodeId, original: &[TextFragment]) -> Vec<TextFragment> {
        self.translations
            .as_ref()
            .and_then(|table| table.lookup(id))
            .map(|entry| entry.fragments.clone())
            .unwrap_or_else(|| original.to_vec())
    }

    pub(crate) fn eval_expr(&mut self, expr: &loreline_par::Expr, in_guard: bool) -> Result<Value> {
        let script = self.script.clone();
        let scopes = self.collect_scopes();
        let env = Env {
            scopes: &scopes,
            characters: &self.characters,
            globals: &self.globals,
            globals_transient: &self.globals_transient,
            strict: self.strict,
            file: script.file.as_deref(),
        };
        let mut ctx = EvalCtx {
            env: &env,
            rng: &mut self.rng,
            functions: &mut self.functions,
            in_guard,
        };
        eval(&mut ctx, expr)
    }

    fn render_fragments(
        &mut self,
        fragments: &[TextFragment],
        pos: Position,
    ) -> Result<(String, Vec<TagMarker>)> {
        let script = self.script.clone();
        let scopes = self.collect_scopes();
        let env = Env {
            scopes: &scopes,
            characters: &self.characters,
            globals: &self.globals,
            globals_transient: &self.globals_transient,
            strict: self.strict,
            file: script.file.as_deref(),
        };
        let mut ctx = EvalCtx {
            env: &env,
            rng: &mut self.rng,
            functions: &mut self.functions,
            in_guard: false,
        };
        render_text(&mut ctx, fragments, pos)
    }

    /// Abort execution: the error is recorded on the interpreter, enriched
    /// with the beat stack, and no further events fire.
    fn fail<T>(&mut self, mut err: Error) -> Result<T> {
        let script = self.script.clone();
        for frame in self.stack.iter().rev() {
            if let Some(beat) = script.beat(&frame.beat) {
                err = err.with_frame(script.file.as_deref(), beat.pos.line);
            }
        }
        self.status = Status::Failed;
        self.error = Some(err.clone());
        Err(err)
    }

    fn continuation_error(&self, which: &str) -> Error {
        Error::new(
            RuntimeErrorKind::DoubleContinuation,
            format!("'{which}' called while the interpreter is {:?}", self.status),
            Position::NONE,
        )
    }

    fn stale_continuation_error(&self, which: &str, epoch: u64) -> Error {
        Error::new(
            RuntimeErrorKind::DoubleContinuation,
            format!(
                "'{which}' answers suspension epoch {epoch}, but the current suspension is epoch {}",
                self.epoch
            ),
            Position::NONE,
        )
    }

    fn unknown_character(&self, name: &str) -> Error {
        Error::new(
            RuntimeErrorKind::UnknownCharacter,
            format!("no character '{name}'"),
            Position::NONE,
        )
        .with_frame(self.script.file.as_deref(), 0)
    }
}
