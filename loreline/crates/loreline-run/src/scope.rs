//! Name resolution and assignment over the scope chain.
//!
//! Lookup order: block state frames innermost-first, then character frames
//! (matched on the path head), then the transient-global and global state
//! frames. Assignment writes to the innermost frame that already defines
//! the target; an undeclared target is created in the innermost state
//! frame, or rejected under strict access.

use indexmap::IndexMap;

use loreline_util::{Error, Position, Result, RuntimeErrorKind};

use crate::eval::apply_binary;
use crate::fields::FieldsRef;
use crate::value::Value;
use loreline_par::{AssignOp, BinOp};

/// A borrowed view of every frame visible at the current cursor.
pub(crate) struct Env<'a> {
    /// Active block state frames, innermost first.
    pub scopes: &'a [FieldsRef],
    pub characters: &'a IndexMap<String, FieldsRef>,
    pub globals: &'a FieldsRef,
    pub globals_transient: &'a FieldsRef,
    pub strict: bool,
    pub file: Option<&'a str>,
}

impl<'a> Env<'a> {
    /// Read a dotted path.
    pub fn lookup(&self, segments: &[String], pos: Position) -> Result<Value> {
        let head = &segments[0];

        for frame in self.scopes {
            if frame.borrow().exists(head) {
                let base = frame.borrow().get(head).unwrap_or(Value::Null);
                return self.walk(base, &segments[1..], pos);
            }
        }

        if let Some(frame) = self.characters.get(head) {
            if segments.len() == 1 {
                return Ok(Value::Fields(frame.clone()));
            }
            return match frame.borrow().get(&segments[1]) {
                Some(base) => self.walk(base, &segments[2..], pos),
                None => self.missing(&format!("{head}.{}", segments[1]), pos),
            };
        }

        for frame in [self.globals_transient, self.globals] {
            if frame.borrow().exists(head) {
                let base = frame.borrow().get(head).unwrap_or(Value::Null);
                return self.walk(base, &segments[1..], pos);
            }
        }

        self.missing(head, pos)
    }

    /// Write a dotted path, applying a compound operator if any.
    pub fn assign(
        &self,
        segments: &[String],
        op: AssignOp,
        value: Value,
        pos: Position,
    ) -> Result<()> {
        let (frame, key_index) = self.resolve_owner(segments, pos)?;
        let key = &segments[key_index];
        let rest = &segments[key_index + 1..];

        if rest.is_empty() {
            let current = frame.borrow().get(key);
            let next = self.apply_op(op, current, value, key, pos)?;
            frame.borrow_mut().set(key, next);
            return Ok(());
        }

        let mut container = match frame.borrow().get(key) {
            Some(value) => value,
            None => {
                let kind = if self.strict {
                    RuntimeErrorKind::UndefinedReference
                } else {
                    RuntimeErrorKind::TypeMismatch
                };
                return Err(self.error(
                    kind,
                    format!("cannot write fields of missing value '{key}'"),
                    pos,
                ));
            }
        };
        for segment in &rest[..rest.len() - 1] {
            container = self.member(container, segment, pos)?;
        }
        let last = &rest[rest.len() - 1];
        self.set_member(container, last, op, value, pos)
    }

    /// The frame owning the path head, plus the index of the first segment
    /// written inside that frame (1 for character frames, whose head names
    /// the frame itself).
    fn resolve_owner(&self, segments: &[String], pos: Position) -> Result<(FieldsRef, usize)> {
        let head = &segments[0];

        for frame in self.scopes {
            if frame.borrow().exists(head) {
                return Ok((frame.clone(), 0));
            }
        }
        if let Some(frame) = self.characters.get(head) {
            if segments.len() == 1 {
                return Err(self.error(
                    RuntimeErrorKind::TypeMismatch,
                    format!("cannot assign to character '{head}'"),
                    pos,
                ));
            }
            return Ok((frame.clone(), 1));
        }
        for frame in [self.globals_transient, self.globals] {
            if frame.borrow().exists(head) {
                return Ok((frame.clone(), 0));
            }
        }

        if self.strict {
            return Err(self.error(
                RuntimeErrorKind::UndefinedReference,
                format!("'{head}' is not declared"),
                pos,
            ));
        }
        // Undeclared and lenient: create the binding in the innermost
        // state frame.
        let frame = self
            .scopes
            .first()
            .cloned()
            .unwrap_or_else(|| self.globals.clone());
        Ok((frame, 0))
    }

    fn walk(&self, mut value: Value, rest: &[String], pos: Position) -> Result<Value> {
        for segment in rest {
            value = self.member(value, segment, pos)?;
        }
        Ok(value)
    }

    fn member(&self, value: Value, key: &str, pos: Position) -> Result<Value> {
        match value {
            Value::Fields(fields) => {
                let found = fields.borrow().get(key);
                match found {
                    Some(value) => Ok(value),
                    None => self.missing(key, pos),
                }
            }
            Value::StringMap(map) => match map.borrow().get(key) {
                Some(value) => Ok(value.clone()),
                None => self.missing(key, pos),
            },
            Value::IntMap(map) => match key.parse::<i64>() {
                Ok(index) => match map.borrow().get(&index) {
                    Some(value) => Ok(value.clone()),
                    None => self.missing(key, pos),
                },
                Err(_) => Err(self.error(
                    RuntimeErrorKind::TypeMismatch,
                    format!("int map field '{key}' is not an integer"),
                    pos,
                )),
            },
            Value::Null => self.missing(key, pos),
            other => Err(self.error(
                RuntimeErrorKind::TypeMismatch,
                format!("cannot read field '{key}' of {}", other.type_name()),
                pos,
            )),
        }
    }

    fn set_member(
        &self,
        container: Value,
        key: &str,
        op: AssignOp,
        value: Value,
        pos: Position,
    ) -> Result<()> {
        match container {
            Value::Fields(fields) => {
                let current = fields.borrow().get(key);
                let next = self.apply_op(op, current, value, key, pos)?;
                fields.borrow_mut().set(key, next);
                Ok(())
            }
            Value::StringMap(map) => {
                let current = map.borrow().get(key).cloned();
                let next = self.apply_op(op, current, value, key, pos)?;
                map.borrow_mut().insert(key.to_string(), next);
                Ok(())
            }
            Value::IntMap(map) => {
                let index = key.parse::<i64>().map_err(|_| {
                    self.error(
                        RuntimeErrorKind::TypeMismatch,
                        format!("int map field '{key}' is not an integer"),
                        pos,
                    )
                })?;
                let current = map.borrow().get(&index).cloned();
                let next = self.apply_op(op, current, value, key, pos)?;
                map.borrow_mut().insert(index, next);
                Ok(())
            }
            other => Err(self.error(
                RuntimeErrorKind::TypeMismatch,
                format!("cannot write field '{key}' of {}", other.type_name()),
                pos,
            )),
        }
    }

    fn apply_op(
        &self,
        op: AssignOp,
        current: Option<Value>,
        value: Value,
        key: &str,
        pos: Position,
    ) -> Result<Value> {
        let bin_op = match op {
            AssignOp::Set => return Ok(value),
            AssignOp::Add => BinOp::Add,
            AssignOp::Sub => BinOp::Sub,
            AssignOp::Mul => BinOp::Mul,
            AssignOp::Div => BinOp::Div,
        };
        let current = match current {
            Some(value) => value,
            None => {
                let kind = if self.strict {
                    RuntimeErrorKind::UndefinedReference
                } else {
                    RuntimeErrorKind::TypeMismatch
                };
                return Err(self.error(
                    kind,
                    format!("compound assignment to missing field '{key}'"),
                    pos,
                ));
            }
        };
        apply_binary(bin_op, current, value, pos, self.file)
    }

    fn missing(&self, name: &str, pos: Position) -> Result<Value> {
        if self.strict {
            Err(self.error(
                RuntimeErrorKind::UndefinedReference,
                format!("'{name}' is not declared"),
                pos,
            ))
        } else {
            Ok(Value::Null)
        }
    }

    fn error(&self, kind: RuntimeErrorKind, message: String, pos: Position) -> Error {
        Error::new(kind, message, pos).with_frame(self.file, pos.line)
    }
}
