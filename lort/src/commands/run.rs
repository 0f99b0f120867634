//! Run command: play a script interactively in the terminal.
//!
//! This is a deliberately plain host: dialogue lines print straight to
//! stdout (tag markers are ignored), choice menus list the enabled options
//! numbered from 1, and the selection is read from stdin. The menu index
//! the player types is mapped back to the absolute option index the
//! runtime expects.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use loreline::{ChoiceEvent, Event, Interpreter, Options};
use tracing::debug;

use crate::commands::common::load_script;
use crate::config::Config;
use crate::error::{LortError, Result};

/// Arguments for the run command.
#[derive(Debug, Clone)]
pub struct RunArgs {
    /// Script to play.
    pub file: PathBuf,
    /// Beat to start at (default: the first declared beat).
    pub beat: Option<String>,
    /// RNG seed for a reproducible session.
    pub seed: Option<u64>,
    /// Reject reads of undeclared names.
    pub strict: bool,
    /// Enable verbose output.
    pub verbose: bool,
}

/// Play the script until it finishes.
pub fn run_run(args: RunArgs, config: &Config) -> Result<()> {
    let script = Arc::new(load_script(&args.file)?);
    let options = Options {
        seed: args.seed.or(config.run.seed),
        strict_access: args.strict || config.run.strict,
        ..Options::default()
    };
    let mut interpreter = Interpreter::new(script, options)?;
    debug!(seed = interpreter.seed(), "session starting");

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut event = interpreter.start(args.beat.as_deref())?;
    loop {
        event = match &event {
            Event::Dialogue(dialogue) => {
                match &dialogue.character {
                    Some(name) => println!("{name}: {}", dialogue.text),
                    None => println!("{}", dialogue.text),
                }
                interpreter.advance(dialogue.epoch)?
            }
            Event::Choice(choice) => {
                let index = ask_choice(choice, &mut input)?;
                interpreter.choose(choice.epoch, index)?
            }
            Event::Finished => {
                println!();
                println!("(the end)");
                return Ok(());
            }
        };
    }
}

/// Present the enabled options and read a selection, returning the
/// absolute index into the declared option list.
fn ask_choice(choice: &ChoiceEvent, input: &mut impl BufRead) -> Result<usize> {
    // menu number (1-based) -> absolute index
    let enabled: Vec<usize> = choice
        .options
        .iter()
        .enumerate()
        .filter(|(_, option)| option.enabled)
        .map(|(index, _)| index)
        .collect();

    println!();
    if enabled.is_empty() {
        // Every guard is false; the full list is still presented.
        for (number, option) in choice.options.iter().enumerate() {
            println!("  {}. {}", number + 1, option.text);
        }
    } else {
        for (number, &index) in enabled.iter().enumerate() {
            println!("  {}. {}", number + 1, choice.options[index].text);
        }
    }
    let count = if enabled.is_empty() {
        choice.options.len()
    } else {
        enabled.len()
    };

    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(LortError::Validation(
                "input ended before a choice was made".to_string(),
            ));
        }
        match line.trim().parse::<usize>() {
            Ok(number) if (1..=count).contains(&number) => {
                let absolute = if enabled.is_empty() {
                    number - 1
                } else {
                    enabled[number - 1]
                };
                return Ok(absolute);
            }
            _ => println!("please enter a number between 1 and {count}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loreline::{ChoiceOptionView, NodeId};

    fn choice(flags: &[bool]) -> ChoiceEvent {
        ChoiceEvent {
            options: flags
                .iter()
                .enumerate()
                .map(|(i, &enabled)| ChoiceOptionView {
                    text: format!("option {i}"),
                    tags: Vec::new(),
                    enabled,
                })
                .collect(),
            node: NodeId::ROOT,
            epoch: 1,
        }
    }

    #[test]
    fn test_menu_maps_back_to_absolute_index() {
        // options 0 and 2 disabled: menu entry 1 is absolute index 1
        let event = choice(&[false, true, false, true]);
        let mut input = io::Cursor::new(b"1\n".to_vec());
        assert_eq!(ask_choice(&event, &mut input).unwrap(), 1);
        let mut input = io::Cursor::new(b"2\n".to_vec());
        assert_eq!(ask_choice(&event, &mut input).unwrap(), 3);
    }

    #[test]
    fn test_invalid_input_reprompts() {
        let event = choice(&[true, true]);
        let mut input = io::Cursor::new(b"zero\n9\n2\n".to_vec());
        assert_eq!(ask_choice(&event, &mut input).unwrap(), 1);
    }

    #[test]
    fn test_all_disabled_menu_is_still_answerable() {
        let event = choice(&[false, false]);
        let mut input = io::Cursor::new(b"2\n".to_vec());
        assert_eq!(ask_choice(&event, &mut input).unwrap(), 1);
    }

    #[test]
    fn test_exhausted_input_is_an_error() {
        let event = choice(&[true]);
        let mut input = io::Cursor::new(Vec::new());
        assert!(ask_choice(&event, &mut input).is_err());
    }
}
