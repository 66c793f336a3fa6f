//! Lexical scopes mapping names to stack slots, plus the flat table of
//! user-defined functions populated by the signature pass.

use crate::ir::{Ty, Value};
use std::collections::HashMap;

/// A stack slot holding one variable. `ptr` is the alloca; `ty` is the type
/// currently stored in it. Reassigning a value of a different type replaces
/// the slot entirely (see the lowerer's retyping rule).
#[derive(Debug, Clone)]
pub struct Slot {
    pub ptr: Value,
    pub ty: Ty,
}

#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<HashMap<String, Slot>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Bind a name in the innermost scope, shadowing any outer binding.
    pub fn define(&mut self, name: String, slot: Slot) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name, slot);
        }
    }

    /// Innermost binding for `name`, searching outwards.
    pub fn lookup(&self, name: &str) -> Option<&Slot> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Slot> {
        self.frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.get_mut(name))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionInfo {
    pub param_count: usize,
}

/// User-defined functions, all with `double` parameters and a `ptr` return.
#[derive(Debug, Default)]
pub struct FunctionTable {
    map: HashMap<String, FunctionInfo>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: &str, info: FunctionInfo) -> Result<(), FunctionInfo> {
        if let Some(existing) = self.map.get(name) {
            return Err(*existing);
        }
        self.map.insert(name.to_string(), info);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<FunctionInfo> {
        self.map.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, FunctionInfo)> {
        self.map.iter().map(|(name, info)| (name, *info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_scopes_inside_out() {
        let mut scopes = ScopeStack::new();
        scopes.define(
            "x".to_string(),
            Slot {
                ptr: Value::Temp("x".to_string(), Ty::Ptr),
                ty: Ty::F64,
            },
        );
        scopes.push();
        scopes.define(
            "x".to_string(),
            Slot {
                ptr: Value::Temp("x.1".to_string(), Ty::Ptr),
                ty: Ty::Ptr,
            },
        );
        assert_eq!(scopes.lookup("x").map(|s| s.ty), Some(Ty::Ptr));
        scopes.pop();
        assert_eq!(scopes.lookup("x").map(|s| s.ty), Some(Ty::F64));
        assert!(scopes.lookup("y").is_none());
    }

    #[test]
    fn function_table_rejects_redefinition() {
        let mut table = FunctionTable::new();
        assert!(table.define("f", FunctionInfo { param_count: 1 }).is_ok());
        assert!(table.define("f", FunctionInfo { param_count: 2 }).is_err());
        assert_eq!(table.lookup("f").map(|i| i.param_count), Some(1));
    }
}
