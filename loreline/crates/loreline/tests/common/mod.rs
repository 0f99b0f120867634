//! Shared helpers for the end-to-end tests.

#![allow(dead_code)]

use std::sync::Arc;

use loreline::{Event, Interpreter, Options, Script};

pub fn script(source: &str) -> Arc<Script> {
    Arc::new(loreline::parse(source, None, None).expect("test script should parse"))
}

pub fn interpreter(source: &str) -> Interpreter {
    interpreter_with(source, Options {
        seed: Some(1),
        ..Options::default()
    })
}

pub fn interpreter_with(source: &str, options: Options) -> Interpreter {
    Interpreter::new(script(source), options).expect("interpreter should build")
}

/// Drive an interpreter and record a readable event trace.
///
/// Dialogue renders as `speaker: text` (or bare text for narration),
/// choices as `[+enabled -disabled …]` menus answered from `picks`, and
/// completion as `<finished>`. The trace stops when the script finishes,
/// when `picks` runs dry at a choice, or after `limit` events.
pub fn trace(interp: &mut Interpreter, picks: &[usize], limit: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut picks = picks.iter();
    let mut event = interp.start(None).expect("start");
    for _ in 0..limit {
        let next = match &event {
            Event::Dialogue(dialogue) => {
                match &dialogue.character {
                    Some(name) => out.push(format!("{name}: {}", dialogue.text)),
                    None => out.push(dialogue.text.clone()),
                }
                interp.advance(dialogue.epoch).expect("advance")
            }
            Event::Choice(choice) => {
                let menu: Vec<String> = choice
                    .options
                    .iter()
                    .map(|option| {
                        format!(
                            "{}{}",
                            if option.enabled { '+' } else { '-' },
                            option.text
                        )
                    })
                    .collect();
                out.push(format!("[{}]", menu.join(" ")));
                let Some(&pick) = picks.next() else { break };
                interp.choose(choice.epoch, pick).expect("choose")
            }
            Event::Finished => {
                out.push("<finished>".to_string());
                break;
            }
        };
        event = next;
    }
    out
}

/// Trace a source string from a fresh interpreter with a fixed seed.
pub fn trace_source(source: &str, picks: &[usize], limit: usize) -> Vec<String> {
    let mut interp = interpreter(source);
    trace(&mut interp, picks, limit)
}
