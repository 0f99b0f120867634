//! Save and restore.
//!
//! The save payload is a versioned JSON document holding everything needed
//! to reconstruct the cursor at a statement boundary: RNG seed and draw
//! count, the global frame, character frames, persistent beat-state frames,
//! the execution stack (with the contents of transient frames) and the
//! pending suspension. Field order is preserved by encoding maps as arrays
//! of pairs.

use serde_json::{json, Value as Json};
use tracing::debug;

use loreline_par::{NodeId, Stmt};
use loreline_util::{Error, Position, Result, RuntimeErrorKind};

use crate::fields::{overwrite_fields, FieldsContext, FieldsRef, FrameKind};
use crate::interpreter::{Frame, Interpreter, Status};
use crate::rng::DiceRng;
use crate::value::Value;

/// Bumped whenever the payload shape changes.
const SAVE_VERSION: u64 = 1;

impl Interpreter {
    /// Serialise the full interpreter state.
    ///
    /// Save points are statement boundaries: the payload records the
    /// statement the cursor stands on, so a restored interpreter re-raises
    /// a pending dialogue or choice and continues identically.
    pub fn save(&self) -> Result<String> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let status = match self.status {
            Status::Ready => "ready",
            Status::AwaitingDialogue => "dialogue",
            Status::AwaitingChoice => "choice",
            Status::Finished => "finished",
            Status::Failed => unreachable!("failed interpreters returned above"),
        };

        let stack: Vec<Json> = self
            .stack
            .iter()
            .map(|frame| {
                let states: Vec<Json> = frame
                    .states
                    .iter()
                    .map(|(node, fields, transient)| {
                        if *transient {
                            json!({
                                "node": node.to_string(),
                                "transient": true,
                                "fields": fields_to_json(fields),
                            })
                        } else {
                            json!({ "node": node.to_string(), "transient": false })
                        }
                    })
                    .collect();
                json!({
                    "beat": frame.beat,
                    "block": frame.block.to_string(),
                    "index": frame.index,
                    "states": states,
                })
            })
            .collect();

        let characters: Vec<Json> = self
            .characters
            .iter()
            .map(|(name, frame)| json!({ "name": name, "fields": fields_to_json(frame) }))
            .collect();

        let beat_state: Vec<Json> = self
            .persistent_states
            .iter()
            .map(|(node, frame)| {
                let beat = self
                    .script
                    .beats()
                    .find(|beat| beat.id.section() == node.section())
                    .map(|beat| beat.name.clone());
                json!({
                    "node": node.to_string(),
                    "beat": beat,
                    "fields": fields_to_json(frame),
                })
            })
            .collect();

        let payload = json!({
            "version": SAVE_VERSION,
            "seed": self.rng.seed(),
            "draws": self.rng.draws(),
            "transitions": self.transitions,
            "epoch": self.epoch,
            "status": status,
            "pending": self.pending_choice.map(|id| id.to_string()),
            "globals": fields_to_json(&self.globals),
            "characters": characters,
            "beatState": beat_state,
            "stack": stack,
        });
        debug!(frames = self.stack.len(), "saved interpreter state");
        Ok(payload.to_string())
    }

    /// Rebuild interpreter state from a [`save`](Interpreter::save)
    /// payload. Nothing is committed until the whole payload validates
    /// against the current script.
    pub fn restore(&mut self, data: &str) -> Result<()> {
        let json: Json = serde_json::from_str(data)
            .map_err(|err| incompatible(format!("save data is not valid JSON: {err}")))?;

        let version = field_u64(&json, "version")?;
        if version != SAVE_VERSION {
            return Err(incompatible(format!(
                "save data version {version}, expected {SAVE_VERSION}"
            )));
        }
        let seed = field_u64(&json, "seed")?;
        let draws = field_u64(&json, "draws")?;
        let transitions = field_u64(&json, "transitions")?;
        let epoch = field_u64(&json, "epoch")?;

        let status = match json.get("status").and_then(Json::as_str) {
            Some("ready") => Status::Ready,
            Some("dialogue") => Status::AwaitingDialogue,
            Some("choice") => Status::AwaitingChoice,
            Some("finished") => Status::Finished,
            other => return Err(incompatible(format!("unknown status {other:?}"))),
        };
        let pending = match json.get("pending") {
            None | Some(Json::Null) => None,
            Some(Json::String(text)) => Some(parse_node_id(text)?),
            Some(other) => return Err(incompatible(format!("bad pending suspension: {other}"))),
        };

        let globals = json_to_entries(field(&json, "globals")?)?;

        let mut characters = Vec::new();
        for entry in field_array(&json, "characters")? {
            let name = field_str(entry, "name")?.to_string();
            if !self.characters.contains_key(&name) {
                return Err(incompatible(format!(
                    "saved character '{name}' is not declared in this script"
                )));
            }
            characters.push((name, json_to_entries(field(entry, "fields")?)?));
        }

        let mut beat_state = Vec::new();
        for entry in field_array(&json, "beatState")? {
            let node = parse_node_id(field_str(entry, "node")?)?;
            match self.script.find_stmt(node) {
                Some(Stmt::State(_)) => {}
                _ => {
                    return Err(incompatible(format!(
                        "saved state frame {node} does not exist in this script"
                    )))
                }
            }
            beat_state.push((node, json_to_entries(field(entry, "fields")?)?));
        }

        struct SavedFrame {
            beat: String,
            block: NodeId,
            index: usize,
            states: Vec<(NodeId, bool, Vec<(String, Value)>)>,
        }
        let mut stack = Vec::new();
        for entry in field_array(&json, "stack")? {
            let beat = field_str(entry, "beat")?.to_string();
            if self.script.beat(&beat).is_none() {
                return Err(incompatible(format!(
                    "saved beat '{beat}' is not declared in this script"
                )));
            }
            let block = parse_node_id(field_str(entry, "block")?)?;
            let Some(block_node) = self.script.find_block(block) else {
                return Err(incompatible(format!(
                    "saved block {block} does not exist in this script"
                )));
            };
            let index = field_u64(entry, "index")? as usize;
            if index > block_node.stmts.len() {
                return Err(incompatible(format!(
                    "saved cursor {index} is past the end of block {block}"
                )));
            }
            let mut states = Vec::new();
            for state in field_array(entry, "states")? {
                let node = parse_node_id(field_str(state, "node")?)?;
                let transient = state
                    .get("transient")
                    .and_then(Json::as_bool)
                    .ok_or_else(|| incompatible("state frame without a transient flag"))?;
                let fields = match state.get("fields") {
                    Some(fields) => json_to_entries(fields)?,
                    None => Vec::new(),
                };
                states.push((node, transient, fields));
            }
            stack.push(SavedFrame {
                beat,
                block,
                index,
                states,
            });
        }

        // Everything validated; commit. The epoch moves past both the
        // saved value and every event this interpreter has already issued,
        // so continuations held from before the restore are rejected as
        // stale by `advance` and `choose`.
        self.rng = DiceRng::from_state(seed, draws);
        self.transitions = transitions;
        self.epoch = self.epoch.max(epoch).wrapping_add(1);
        self.error = None;

        overwrite_fields(&self.globals, globals);
        self.init_transient_globals()?;
        for (name, entries) in characters {
            let frame = self.characters[&name].clone();
            overwrite_fields(&frame, entries);
        }

        self.persistent_states.clear();
        for (node, entries) in beat_state {
            let frame = self.new_state_frame(node);
            overwrite_fields(&frame, entries);
            self.persistent_states.insert(node, frame);
        }

        self.stack.clear();
        for saved in stack {
            let mut states = Vec::new();
            for (node, transient, entries) in saved.states {
                let frame = if transient {
                    let frame = self.new_state_frame(node);
                    overwrite_fields(&frame, entries);
                    frame
                } else {
                    match self.persistent_states.get(&node) {
                        Some(frame) => frame.clone(),
                        None => {
                            let frame = self.new_state_frame(node);
                            self.persistent_states.insert(node, frame.clone());
                            frame
                        }
                    }
                };
                states.push((node, frame, transient));
            }
            self.stack.push(Frame {
                beat: saved.beat,
                block: saved.block,
                index: saved.index,
                states,
            });
        }

        self.status = status;
        self.pending_choice = pending;
        debug!(frames = self.stack.len(), "restored interpreter state");
        Ok(())
    }

    fn new_state_frame(&self, node: NodeId) -> FieldsRef {
        self.factory.create(FieldsContext {
            kind: FrameKind::BeatState,
            node,
            name: None,
        })
    }
}

fn incompatible(message: impl Into<String>) -> Error {
    Error::new(
        RuntimeErrorKind::IncompatibleSaveData,
        message,
        Position::NONE,
    )
}

fn field<'a>(json: &'a Json, name: &str) -> Result<&'a Json> {
    json.get(name)
        .ok_or_else(|| incompatible(format!("save data is missing '{name}'")))
}

fn field_u64(json: &Json, name: &str) -> Result<u64> {
    field(json, name)?
        .as_u64()
        .ok_or_else(|| incompatible(format!("'{name}' is not an unsigned integer")))
}

fn field_str<'a>(json: &'a Json, name: &str) -> Result<&'a str> {
    field(json, name)?
        .as_str()
        .ok_or_else(|| incompatible(format!("'{name}' is not a string")))
}

fn field_array<'a>(json: &'a Json, name: &str) -> Result<&'a Vec<Json>> {
    field(json, name)?
        .as_array()
        .ok_or_else(|| incompatible(format!("'{name}' is not an array")))
}

fn parse_node_id(text: &str) -> Result<NodeId> {
    text.parse()
        .map_err(|_| incompatible(format!("'{text}' is not a node id")))
}

/// Encode a frame's contents as an array of pairs, preserving field order.
fn fields_to_json(frame: &FieldsRef) -> Json {
    let frame = frame.borrow();
    let pairs: Vec<Json> = frame
        .fields()
        .into_iter()
        .map(|key| {
            let value = frame.get(&key).unwrap_or(Value::Null);
            json!([key, value_to_json(&value)])
        })
        .collect();
    Json::Array(pairs)
}

fn json_to_entries(json: &Json) -> Result<Vec<(String, Value)>> {
    let pairs = json
        .as_array()
        .ok_or_else(|| incompatible("fields are not an array of pairs"))?;
    let mut entries = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let (Some(key), Some(value)) = (
            pair.get(0).and_then(Json::as_str),
            pair.get(1),
        ) else {
            return Err(incompatible("malformed field pair"));
        };
        entries.push((key.to_string(), json_to_value(value)?));
    }
    Ok(entries)
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => json!({ "t": "null" }),
        Value::Int(v) => json!({ "t": "int", "v": v }),
        Value::Float(v) => json!({ "t": "float", "v": v }),
        Value::Bool(v) => json!({ "t": "bool", "v": v }),
        Value::String(v) => json!({ "t": "str", "v": v }),
        Value::Array(items) => {
            let items: Vec<Json> = items.borrow().iter().map(value_to_json).collect();
            json!({ "t": "array", "v": items })
        }
        Value::StringMap(map) => {
            let pairs: Vec<Json> = map
                .borrow()
                .iter()
                .map(|(k, v)| json!([k, value_to_json(v)]))
                .collect();
            json!({ "t": "smap", "v": pairs })
        }
        Value::IntMap(map) => {
            let pairs: Vec<Json> = map
                .borrow()
                .iter()
                .map(|(k, v)| json!([k.to_string(), value_to_json(v)]))
                .collect();
            json!({ "t": "imap", "v": pairs })
        }
        Value::Fields(frame) => json!({ "t": "fields", "v": fields_to_json(frame) }),
    }
}

fn json_to_value(json: &Json) -> Result<Value> {
    let tag = field_str(json, "t")?;
    let payload = json.get("v");
    let bad = || incompatible(format!("malformed value of type '{tag}'"));
    match tag {
        "null" => Ok(Value::Null),
        "int" => payload
            .and_then(Json::as_i64)
            .map(Value::Int)
            .ok_or_else(bad),
        "float" => payload
            .and_then(Json::as_f64)
            .map(Value::Float)
            .ok_or_else(bad),
        "bool" => payload
            .and_then(Json::as_bool)
            .map(Value::Bool)
            .ok_or_else(bad),
        "str" => payload
            .and_then(Json::as_str)
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(bad),
        "array" => {
            let items = payload.and_then(Json::as_array).ok_or_else(bad)?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(json_to_value(item)?);
            }
            Ok(Value::array(out))
        }
        "smap" => {
            let pairs = payload.and_then(Json::as_array).ok_or_else(bad)?;
            let mut map = indexmap::IndexMap::new();
            for pair in pairs {
                let (Some(key), Some(value)) =
                    (pair.get(0).and_then(Json::as_str), pair.get(1))
                else {
                    return Err(bad());
                };
                map.insert(key.to_string(), json_to_value(value)?);
            }
            Ok(Value::string_map(map))
        }
        "imap" => {
            let pairs = payload.and_then(Json::as_array).ok_or_else(bad)?;
            let mut map = indexmap::IndexMap::new();
            for pair in pairs {
                let (Some(key), Some(value)) =
                    (pair.get(0).and_then(Json::as_str), pair.get(1))
                else {
                    return Err(bad());
                };
                let key: i64 = key.parse().map_err(|_| bad())?;
                map.insert(key, json_to_value(value)?);
            }
            Ok(Value::int_map(map))
        }
        "fields" => {
            let entries = json_to_entries(payload.ok_or_else(bad)?)?;
            let frame = crate::fields::MapFields::new_ref();
            overwrite_fields(&frame, entries);
            Ok(Value::Fields(frame))
        }
        _ => Err(bad()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use loreline_par::parse;
    use loreline_util::ErrorKind;

    use crate::interpreter::{Event, Interpreter, Options, Status};
    use crate::value::Value;

    const SCRIPT: &str = "state\n  beans: 3\n\nbeat Shop\n  state\n    visits: 0\n  visits += 1\n  \"beans=$beans visits=$visits\"\n  choice\n    Buy if beans > 0\n      beans -= 1\n      -> Shop\n    Leave\n      Goodbye.\n";

    fn make() -> Interpreter {
        let script = Arc::new(parse(SCRIPT, None, None).unwrap());
        Interpreter::new(
            script,
            Options {
                seed: Some(9),
                ..Options::default()
            },
        )
        .unwrap()
    }

    fn drive(interp: &mut Interpreter, picks: &[usize]) -> (Vec<String>, Event) {
        let mut out = Vec::new();
        let mut picks = picks.iter();
        let mut event = interp.start(None).unwrap();
        loop {
            let next = match &event {
                Event::Dialogue(d) => {
                    out.push(d.text.clone());
                    interp.advance(d.epoch).unwrap()
                }
                Event::Choice(c) => match picks.next() {
                    Some(&p) => interp.choose(c.epoch, p).unwrap(),
                    None => break,
                },
                Event::Finished => break,
            };
            event = next;
        }
        (out, event)
    }

    #[test]
    fn test_save_restore_round_trip_at_choice() {
        // Uninterrupted run: buy once, then leave.
        let mut reference = make();
        let (full, _) = drive(&mut reference, &[0, 1]);
        assert_eq!(
            full,
            ["beans=3 visits=1", "beans=2 visits=2", "Goodbye."]
        );

        // Interrupted run: save at the second choice, drop the interpreter.
        let mut first = make();
        let (prefix, event) = drive(&mut first, &[0]);
        assert!(matches!(event, Event::Choice(_)));
        assert_eq!(prefix, ["beans=3 visits=1", "beans=2 visits=2"]);
        let saved = first.save().unwrap();
        drop(first);

        // Fresh interpreter, restore, answer the pending choice directly;
        // the restored suspension's epoch is the interpreter's current one.
        let mut second = make();
        second.restore(&saved).unwrap();
        assert_eq!(second.status(), Status::AwaitingChoice);
        let mut suffix = Vec::new();
        let mut event = second.choose(second.epoch(), 1).unwrap();
        loop {
            let next = match &event {
                Event::Dialogue(d) => {
                    suffix.push(d.text.clone());
                    second.advance(d.epoch).unwrap()
                }
                Event::Finished => break,
                Event::Choice(_) => panic!("no further choices expected"),
            };
            event = next;
        }

        let mut combined = prefix;
        combined.extend(suffix);
        assert_eq!(combined, full);
    }

    #[test]
    fn test_restore_re_raises_pending_choice() {
        let mut first = make();
        let (_, event) = drive(&mut first, &[]);
        assert!(matches!(event, Event::Choice(_)));
        let saved = first.save().unwrap();

        let mut second = make();
        second.restore(&saved).unwrap();
        let Event::Choice(choice) = second.resume().unwrap() else {
            panic!("expected the pending choice to re-raise");
        };
        assert_eq!(choice.options.len(), 2);
        assert!(choice.options[0].enabled);
    }

    #[test]
    fn test_restore_preserves_rng_position() {
        let source = "beat Roll\n  if chance(2)\n    Heads.\n  else\n    Tails.\n  -> .\n";
        let script = Arc::new(parse(source, None, None).unwrap());
        let opts = || Options {
            seed: Some(77),
            ..Options::default()
        };

        let mut reference = Interpreter::new(Arc::clone(&script), opts()).unwrap();
        let mut expected = Vec::new();
        let mut event = reference.start(None).unwrap();
        for _ in 0..12 {
            if let Event::Dialogue(d) = &event {
                expected.push(d.text.clone());
                event = reference.advance(d.epoch).unwrap();
            }
        }

        let mut interrupted = Interpreter::new(Arc::clone(&script), opts()).unwrap();
        let mut actual = Vec::new();
        let mut event = interrupted.start(None).unwrap();
        for _ in 0..6 {
            if let Event::Dialogue(d) = &event {
                actual.push(d.text.clone());
                event = interrupted.advance(d.epoch).unwrap();
            }
        }
        let saved = interrupted.save().unwrap();
        let mut resumed = Interpreter::new(script, opts()).unwrap();
        resumed.restore(&saved).unwrap();
        let mut event = resumed.resume().unwrap();
        for _ in 0..6 {
            if let Event::Dialogue(d) = &event {
                actual.push(d.text.clone());
                event = resumed.advance(d.epoch).unwrap();
            }
        }
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_stale_event_rejected_after_restore() {
        let source = "beat B\n  One.\n  Two.\n";
        let script = Arc::new(parse(source, None, None).unwrap());
        let opts = || Options {
            seed: Some(1),
            ..Options::default()
        };

        // A save taken at the second dialogue suspension.
        let mut donor = Interpreter::new(Arc::clone(&script), opts()).unwrap();
        let Event::Dialogue(first) = donor.start(None).unwrap() else {
            panic!("expected dialogue");
        };
        donor.advance(first.epoch).unwrap();
        let saved = donor.save().unwrap();

        // A live interpreter suspended at its own first dialogue, restored
        // in place over a save that is also awaiting a dialogue.
        let mut interp = Interpreter::new(script, opts()).unwrap();
        let Event::Dialogue(stale) = interp.start(None).unwrap() else {
            panic!("expected dialogue");
        };
        interp.restore(&saved).unwrap();
        assert_eq!(interp.status(), Status::AwaitingDialogue);

        // The event issued before the restore no longer answers anything.
        let err = interp.advance(stale.epoch).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Runtime(loreline_util::RuntimeErrorKind::DoubleContinuation)
        );

        // The restored suspension is still answerable once re-raised.
        let Event::Dialogue(current) = interp.resume().unwrap() else {
            panic!("expected the pending dialogue to re-raise");
        };
        assert_eq!(current.text, "Two.");
        assert!(matches!(
            interp.advance(current.epoch).unwrap(),
            Event::Finished
        ));
    }

    #[test]
    fn test_incompatible_version_rejected() {
        let mut interp = make();
        interp.start(None).unwrap();
        let saved = interp.save().unwrap().replace("\"version\":1", "\"version\":99");
        let err = interp.restore(&saved).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Runtime(loreline_util::RuntimeErrorKind::IncompatibleSaveData)
        );
    }

    #[test]
    fn test_garbage_rejected() {
        let mut interp = make();
        let err = interp.restore("not json at all").unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Runtime(loreline_util::RuntimeErrorKind::IncompatibleSaveData)
        );
    }

    #[test]
    fn test_restore_against_different_script_rejected() {
        let mut interp = make();
        interp.start(None).unwrap();
        let saved = interp.save().unwrap();

        let other = Arc::new(parse("beat Other\n  Hi.\n", None, None).unwrap());
        let mut other = Interpreter::new(
            other,
            Options {
                seed: Some(9),
                ..Options::default()
            },
        )
        .unwrap();
        let err = other.restore(&saved).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Runtime(loreline_util::RuntimeErrorKind::IncompatibleSaveData)
        );
    }

    #[test]
    fn test_character_state_round_trips() {
        let source = "character barista\n  name: \"Alex\"\n  served: 0\n\nbeat B\n  barista.served += 1\n  Done.\n";
        let script = Arc::new(parse(source, None, None).unwrap());
        let mut interp = Interpreter::new(
            Arc::clone(&script),
            Options {
                seed: Some(1),
                ..Options::default()
            },
        )
        .unwrap();
        interp.start(None).unwrap();
        assert_eq!(
            interp.get_character_field("barista", "served").unwrap(),
            Value::Int(1)
        );
        let saved = interp.save().unwrap();

        let mut fresh = Interpreter::new(
            script,
            Options {
                seed: Some(1),
                ..Options::default()
            },
        )
        .unwrap();
        fresh.restore(&saved).unwrap();
        assert_eq!(
            fresh.get_character_field("barista", "served").unwrap(),
            Value::Int(1)
        );
    }
}
