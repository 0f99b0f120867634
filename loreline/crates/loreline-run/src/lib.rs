//! loreline-run - The Loreline interpreter runtime.
//!
//! Everything between a parsed [`Script`](loreline_par::Script) and the
//! host: tagged runtime [`Value`]s with structural equality, the pluggable
//! [`Fields`] capability backing character and state frames, the expression
//! evaluator, translations, and the resumable tree-walking
//! [`Interpreter`] with JSON save/restore.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use loreline_run::{Event, Interpreter, Options};
//!
//! let script = Arc::new(loreline_par::parse("beat B\n  Hello!\n", None, None).unwrap());
//! let mut interp = Interpreter::new(script, Options::default()).unwrap();
//! let Event::Dialogue(line) = interp.start(None).unwrap() else { panic!() };
//! assert_eq!(line.text, "Hello!");
//! assert!(matches!(interp.advance(line.epoch).unwrap(), Event::Finished));
//! ```

mod eval;
mod fields;
mod interpreter;
mod rng;
mod save;
mod scope;
mod translations;
mod value;

pub use eval::TagMarker;
pub use fields::{
    fields_equal, Fields, FieldsContext, FieldsFactory, FieldsRef, FrameKind, MapFields,
    MapFieldsFactory,
};
pub use interpreter::{
    ChoiceEvent, ChoiceOptionView, DialogueEvent, Event, HostFunction, Interpreter, Options,
    Status,
};
pub use rng::DiceRng;
pub use translations::{TranslationEntry, Translations};
pub use value::Value;
