//! loreline - An embeddable runtime for the Loreline interactive-fiction
//! language.
//!
//! A `.lor` script declares persistent state, characters and **beats**:
//! named blocks mixing narrative lines, dialogue, conditional branches,
//! state mutations, choice menus and transitions. A host application loads
//! a script and drives it: the runtime hands the host text and choices, the
//! host answers when it is ready.
//!
//! This crate ties the pipeline stages together behind one façade:
//!
//! - [`parse`]: source text to a [`Script`] (imports resolved through a
//!   [`FileLoader`]; the core never touches disk).
//! - [`Interpreter`]: the pull-based resumable evaluator, with
//!   [`play`] / [`resume`] as synchronous closure drivers on top.
//! - [`print`]: canonical re-serialisation of a script.
//! - [`extract_translations`]: localisation tables from a mirrored script.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use loreline::Options;
//!
//! let script = Arc::new(loreline::parse(
//!     "beat Start\n  Welcome in!\n",
//!     None,
//!     None,
//! ).unwrap());
//!
//! let mut lines = Vec::new();
//! loreline::play(
//!     Arc::clone(&script),
//!     |_interp, dialogue| lines.push(dialogue.text.clone()),
//!     |_interp, _choice| 0,
//!     |_interp| {},
//!     None,
//!     Options::default(),
//! ).unwrap();
//! assert_eq!(lines, ["Welcome in!"]);
//! ```

use std::sync::Arc;

pub use loreline_fmt::{print, PrintOptions};
pub use loreline_lex::{TextFragment, Token, TokenKind};
pub use loreline_par::{
    parse, parse_with_diagnostics, BeatDecl, CharacterDecl, Decl, FileLoader, NodeId, Script,
    Stmt,
};
pub use loreline_run::{
    ChoiceEvent, ChoiceOptionView, DialogueEvent, Event, Fields, FieldsContext, FieldsFactory,
    FieldsRef, FrameKind, HostFunction, Interpreter, MapFields, Options, Status, TagMarker,
    TranslationEntry, Translations, Value,
};
pub use loreline_util::{
    Error, ErrorKind, LexErrorKind, ParseErrorKind, Position, Result, RuntimeErrorKind,
    TraceFrame,
};

/// Extract the translation table of a parsed (localised) script.
///
/// See [`Translations`] for the keying scheme.
pub fn extract_translations(script: &Script) -> Translations {
    Translations::extract(script)
}

/// Create an interpreter and drive it to completion with host closures.
///
/// This is the synchronous tail-call mode: each callback answers on the
/// spot (`on_choice` returns the absolute option index) and the next
/// statement is evaluated on the same call. Hosts that need to answer
/// later hold an [`Interpreter`] and use its pull API instead.
///
/// Returns the finished interpreter so the host can inspect state or
/// [`save`](Interpreter::save) it.
pub fn play<D, C, F>(
    script: Arc<Script>,
    mut on_dialogue: D,
    mut on_choice: C,
    mut on_finish: F,
    beat: Option<&str>,
    options: Options,
) -> Result<Interpreter>
where
    D: FnMut(&Interpreter, &DialogueEvent),
    C: FnMut(&Interpreter, &ChoiceEvent) -> usize,
    F: FnMut(&Interpreter),
{
    let mut interpreter = Interpreter::new(script, options)?;
    let event = interpreter.start(beat)?;
    drive(
        &mut interpreter,
        event,
        &mut on_dialogue,
        &mut on_choice,
        &mut on_finish,
    )?;
    Ok(interpreter)
}

/// Restore an interpreter from save data and drive it to completion.
///
/// When `beat` is given, execution starts there instead of at the saved
/// cursor (the restored state frames are kept either way).
pub fn resume<D, C, F>(
    script: Arc<Script>,
    mut on_dialogue: D,
    mut on_choice: C,
    mut on_finish: F,
    save_data: &str,
    beat: Option<&str>,
    options: Options,
) -> Result<Interpreter>
where
    D: FnMut(&Interpreter, &DialogueEvent),
    C: FnMut(&Interpreter, &ChoiceEvent) -> usize,
    F: FnMut(&Interpreter),
{
    let mut interpreter = Interpreter::new(script, options)?;
    interpreter.restore(save_data)?;
    let event = match beat {
        Some(beat) => interpreter.start(Some(beat))?,
        None => interpreter.resume()?,
    };
    drive(
        &mut interpreter,
        event,
        &mut on_dialogue,
        &mut on_choice,
        &mut on_finish,
    )?;
    Ok(interpreter)
}

fn drive<D, C, F>(
    interpreter: &mut Interpreter,
    mut event: Event,
    on_dialogue: &mut D,
    on_choice: &mut C,
    on_finish: &mut F,
) -> Result<()>
where
    D: FnMut(&Interpreter, &DialogueEvent),
    C: FnMut(&Interpreter, &ChoiceEvent) -> usize,
    F: FnMut(&Interpreter),
{
    loop {
        event = match event {
            Event::Dialogue(dialogue) => {
                on_dialogue(interpreter, &dialogue);
                interpreter.advance(dialogue.epoch)?
            }
            Event::Choice(choice) => {
                let index = on_choice(interpreter, &choice);
                interpreter.choose(choice.epoch, index)?
            }
            Event::Finished => {
                on_finish(interpreter);
                return Ok(());
            }
        };
    }
}
