//! Lowerer state: the module under construction, the current function
//! builder, the scope stack and the value stack the visitor communicates
//! through.

use crate::ir::symbol_table::{FunctionTable, ScopeStack, Slot};
use crate::ir::verify;
use crate::ir::{
    BinOp, Block, CastOp, FPred, FnSig, Function, GlobalDef, GlobalInit, IPred, Inst, Linkage,
    Module, Ty, Value,
};
use crate::{CompileError, LoweringErrorKind};
use std::collections::{HashMap, HashSet};

/// Tag word stored in front of every heap (and string) value. The runtime
/// discriminators in `print`, `len`, `str` and unboxing branch on it.
pub(super) const TAG_NUMBER: i64 = 1;
pub(super) const TAG_STRING: i64 = 2;
pub(super) const TAG_ARRAY: i64 = 3;

/// Size in bytes of the tag word that precedes a value's payload.
pub(super) const TAG_BYTES: i64 = 8;

/// Builds one function's blocks. All value and block names are uniquified
/// here so that lowering the same AST twice prints byte-identical text.
pub(super) struct FuncBuilder {
    pub(super) func: Function,
    current: usize,
    entry_allocas: usize,
    temp_count: usize,
    used: HashSet<String>,
}

impl FuncBuilder {
    pub(super) fn new(name: &str, params: Vec<(String, Ty)>, ret: Ty, internal: bool) -> Self {
        let mut used = HashSet::new();
        used.insert("entry".to_string());
        for (param, _) in &params {
            used.insert(param.clone());
        }
        Self {
            func: Function {
                name: name.to_string(),
                params,
                ret,
                internal,
                blocks: vec![Block::new("entry".to_string())],
            },
            current: 0,
            entry_allocas: 0,
            temp_count: 0,
            used,
        }
    }

    fn uniq(&mut self, base: &str) -> String {
        if self.used.insert(base.to_string()) {
            return base.to_string();
        }
        let mut i = 1;
        loop {
            let candidate = format!("{base}.{i}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            i += 1;
        }
    }

    fn new_temp(&mut self) -> String {
        let name = format!("t{}", self.temp_count);
        self.temp_count += 1;
        self.uniq(&name)
    }

    /// Append a fresh block (does not move the insertion point).
    fn new_block(&mut self, base: &str) -> String {
        let label = self.uniq(base);
        self.func.blocks.push(Block::new(label.clone()));
        label
    }

    fn set_block(&mut self, label: &str) {
        if let Some(index) = self.func.blocks.iter().position(|b| b.label == label) {
            self.current = index;
        }
    }

    fn is_terminated(&self) -> bool {
        self.func.blocks[self.current].is_terminated()
    }

    fn push(&mut self, inst: Inst) {
        // Anything emitted after a terminator lands in a fresh unreachable
        // block so the function stays structurally valid.
        if self.is_terminated() {
            let label = self.new_block("dead");
            self.set_block(&label);
        }
        self.func.blocks[self.current].insts.push(inst);
    }

    /// Materialise a variable slot at the top of the entry block, regardless
    /// of where lowering currently is.
    fn entry_alloca(&mut self, base: &str, ty: Ty) -> Value {
        let name = self.uniq(base);
        let at = self.entry_allocas;
        self.func.blocks[0]
            .insts
            .insert(at, Inst::Alloca { dst: name.clone(), ty });
        self.entry_allocas += 1;
        Value::Temp(name, Ty::Ptr)
    }
}

pub struct Lowerer {
    pub(super) module: Module,
    pub(super) scopes: ScopeStack,
    pub(super) functions: FunctionTable,
    pub(super) builder: FuncBuilder,
    /// Expression results; each expression visit pushes exactly one value.
    values: Vec<Value>,
    str_consts: HashMap<Vec<u8>, String>,
    fmt_consts: HashMap<Vec<u8>, String>,
    extern_names: HashSet<String>,
    rng_declared: bool,
}

impl Lowerer {
    pub(super) fn new(module_name: &str) -> Self {
        Self {
            module: Module::new(module_name),
            scopes: ScopeStack::new(),
            functions: FunctionTable::new(),
            builder: FuncBuilder::new("main", Vec::new(), Ty::I32, false),
            values: Vec::new(),
            str_consts: HashMap::new(),
            fmt_consts: HashMap::new(),
            extern_names: HashSet::new(),
            rng_declared: false,
        }
    }

    /// Seal `main`, verify the whole module and hand it over.
    pub(super) fn finish(mut self) -> Result<Module, CompileError> {
        if !self.builder.is_terminated() {
            self.emit(Inst::Ret {
                val: Some(Value::Int(Ty::I32, 0)),
            });
        }
        self.seal_dangling_blocks();
        let main = std::mem::replace(
            &mut self.builder,
            FuncBuilder::new("main", Vec::new(), Ty::I32, false),
        );
        self.verify_completed(&main.func)?;
        self.module.functions.push(main.func);

        verify::verify_module(&self.module).map_err(CompileError::Verify)?;
        Ok(self.module)
    }

    pub(super) fn err(&self, kind: LoweringErrorKind, message: impl Into<String>) -> CompileError {
        CompileError::lowering(kind, message)
    }

    /* Value stack */

    pub(super) fn push_value(&mut self, value: Value) {
        self.values.push(value);
    }

    pub(super) fn pop_value(&mut self) -> Value {
        self.values.pop().expect("value stack underflow")
    }

    /* Emission */

    pub(super) fn emit(&mut self, inst: Inst) {
        self.builder.push(inst);
    }

    pub(super) fn new_temp(&mut self) -> String {
        self.builder.new_temp()
    }

    pub(super) fn new_block(&mut self, base: &str) -> String {
        self.builder.new_block(base)
    }

    pub(super) fn set_block(&mut self, label: &str) {
        self.builder.set_block(label);
    }

    pub(super) fn block_terminated(&self) -> bool {
        self.builder.is_terminated()
    }

    pub(super) fn entry_alloca(&mut self, base: &str, ty: Ty) -> Value {
        self.builder.entry_alloca(base, ty)
    }

    /// A scratch slot at the point of use (loop counters, merge results).
    pub(super) fn scratch_slot(&mut self, base: &str, ty: Ty) -> Value {
        let name = self.builder.uniq(base);
        self.emit(Inst::Alloca {
            dst: name.clone(),
            ty,
        });
        Value::Temp(name, Ty::Ptr)
    }

    /// A raw byte buffer on the stack at the point of use.
    pub(super) fn buffer_alloca(&mut self, base: &str, len: u64) -> Value {
        let name = self.builder.uniq(base);
        self.emit(Inst::AllocaArray {
            dst: name.clone(),
            elem: Ty::I8,
            len,
        });
        Value::Temp(name, Ty::Ptr)
    }

    pub(super) fn emit_bin(&mut self, op: BinOp, ty: Ty, lhs: Value, rhs: Value) -> Value {
        let dst = self.new_temp();
        self.emit(Inst::Bin {
            dst: dst.clone(),
            op,
            ty,
            lhs,
            rhs,
        });
        Value::Temp(dst, ty)
    }

    pub(super) fn emit_fneg(&mut self, val: Value) -> Value {
        let dst = self.new_temp();
        self.emit(Inst::FNeg {
            dst: dst.clone(),
            val,
        });
        Value::Temp(dst, Ty::F64)
    }

    pub(super) fn emit_fcmp(&mut self, pred: FPred, lhs: Value, rhs: Value) -> Value {
        let dst = self.new_temp();
        self.emit(Inst::FCmp {
            dst: dst.clone(),
            pred,
            lhs,
            rhs,
        });
        Value::Temp(dst, Ty::I1)
    }

    pub(super) fn emit_icmp(&mut self, pred: IPred, ty: Ty, lhs: Value, rhs: Value) -> Value {
        let dst = self.new_temp();
        self.emit(Inst::ICmp {
            dst: dst.clone(),
            pred,
            ty,
            lhs,
            rhs,
        });
        Value::Temp(dst, Ty::I1)
    }

    pub(super) fn emit_select(&mut self, cond: Value, on_true: Value, on_false: Value) -> Value {
        let ty = on_true.ty();
        let dst = self.new_temp();
        self.emit(Inst::Select {
            dst: dst.clone(),
            cond,
            ty,
            on_true,
            on_false,
        });
        Value::Temp(dst, ty)
    }

    pub(super) fn emit_cast(&mut self, op: CastOp, val: Value, to: Ty) -> Value {
        let dst = self.new_temp();
        self.emit(Inst::Cast {
            dst: dst.clone(),
            op,
            val,
            to,
        });
        Value::Temp(dst, to)
    }

    pub(super) fn emit_load(&mut self, ty: Ty, ptr: Value) -> Value {
        let dst = self.new_temp();
        self.emit(Inst::Load {
            dst: dst.clone(),
            ty,
            ptr,
        });
        Value::Temp(dst, ty)
    }

    pub(super) fn emit_store(&mut self, val: Value, ptr: Value) {
        self.emit(Inst::Store { val, ptr });
    }

    pub(super) fn emit_gep(&mut self, elem: Ty, base: Value, index: Value) -> Value {
        let dst = self.new_temp();
        self.emit(Inst::Gep {
            dst: dst.clone(),
            elem,
            base,
            index,
        });
        Value::Temp(dst, Ty::Ptr)
    }

    pub(super) fn emit_br(&mut self, target: &str) {
        self.emit(Inst::Br {
            target: target.to_string(),
        });
    }

    pub(super) fn emit_cond_br(&mut self, cond: Value, then_target: &str, else_target: &str) {
        self.emit(Inst::CondBr {
            cond,
            then_target: then_target.to_string(),
            else_target: else_target.to_string(),
        });
    }

    /* Runtime symbols */

    /// Declare (once) and return the signature of a C runtime symbol.
    pub(super) fn runtime(&mut self, name: &str) -> FnSig {
        let sig = runtime_sig(name);
        if self.extern_names.insert(name.to_string()) {
            self.module.extern_fns.push((name.to_string(), sig.clone()));
        }
        sig
    }

    /// Call a runtime function and capture its result.
    pub(super) fn call_runtime(&mut self, name: &str, args: Vec<Value>) -> Value {
        let sig = self.runtime(name);
        let ret = sig.ret;
        let dst = self.new_temp();
        self.emit(Inst::Call {
            dst: Some(dst.clone()),
            callee: name.to_string(),
            sig,
            args,
        });
        Value::Temp(dst, ret)
    }

    /// Call a runtime function for its side effect only.
    pub(super) fn call_runtime_discard(&mut self, name: &str, args: Vec<Value>) {
        let sig = self.runtime(name);
        self.emit(Inst::Call {
            dst: None,
            callee: name.to_string(),
            sig,
            args,
        });
    }

    pub(super) fn stdin_global(&mut self) -> Value {
        if !self
            .module
            .extern_globals
            .iter()
            .any(|(name, _)| name == "stdin")
        {
            self.module.extern_globals.push(("stdin".to_string(), Ty::Ptr));
        }
        Value::Global("stdin".to_string())
    }

    /* Constants */

    /// Intern a printf/snprintf format string. Plain bytes, no tag word.
    pub(super) fn format_string(&mut self, text: &str) -> Value {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        if let Some(name) = self.fmt_consts.get(&bytes) {
            return Value::Global(name.clone());
        }
        let name = if self.fmt_consts.is_empty() {
            ".fmt".to_string()
        } else {
            format!(".fmt.{}", self.fmt_consts.len())
        };
        self.module.globals.push(GlobalDef {
            name: name.clone(),
            linkage: Linkage::Private,
            constant: true,
            init: GlobalInit::Bytes(bytes.clone()),
        });
        self.fmt_consts.insert(bytes, name.clone());
        Value::Global(name)
    }

    /// Intern a source-level string literal and return a pointer to its
    /// payload (past the tag word).
    pub(super) fn string_literal(&mut self, text: &str) -> Value {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        let base = if let Some(name) = self.str_consts.get(&bytes) {
            Value::Global(name.clone())
        } else {
            let name = if self.str_consts.is_empty() {
                ".str".to_string()
            } else {
                format!(".str.{}", self.str_consts.len())
            };
            self.module.globals.push(GlobalDef {
                name: name.clone(),
                linkage: Linkage::Private,
                constant: true,
                init: GlobalInit::TaggedBytes(TAG_STRING, bytes.clone()),
            });
            self.str_consts.insert(bytes, name.clone());
            Value::Global(name)
        };
        self.emit_gep(Ty::I8, base, Value::Int(Ty::I64, TAG_BYTES))
    }

    /* Tagged heap values */

    /// Read the tag word in front of a value pointer.
    pub(super) fn load_tag(&mut self, ptr: Value) -> Value {
        let tag_ptr = self.emit_gep(Ty::I8, ptr, Value::Int(Ty::I64, -TAG_BYTES));
        self.emit_load(Ty::I64, tag_ptr)
    }

    /// `malloc` a tagged value with `payload_bytes` bytes of payload and
    /// return the payload pointer.
    pub(super) fn heap_alloc(&mut self, tag: i64, payload_bytes: Value) -> Value {
        let total = self.emit_bin(
            BinOp::Add,
            Ty::I64,
            payload_bytes,
            Value::Int(Ty::I64, TAG_BYTES),
        );
        let raw = self.call_runtime("malloc", vec![total]);
        self.emit_store(Value::Int(Ty::I64, tag), raw.clone());
        self.emit_gep(Ty::I8, raw, Value::Int(Ty::I64, TAG_BYTES))
    }

    /// A stack buffer carrying a string tag; returns the payload pointer.
    pub(super) fn stack_string_buffer(&mut self, base: &str, payload_len: u64) -> Value {
        let buf = self.buffer_alloca(base, payload_len + TAG_BYTES as u64);
        self.emit_store(Value::Int(Ty::I64, TAG_STRING), buf.clone());
        self.emit_gep(Ty::I8, buf, Value::Int(Ty::I64, TAG_BYTES))
    }

    /// Internal globals backing `random()`.
    pub(super) fn rng_globals(&mut self) -> (Value, Value) {
        if !self.rng_declared {
            self.module.globals.push(GlobalDef {
                name: "rng.seed".to_string(),
                linkage: Linkage::Internal,
                constant: false,
                init: GlobalInit::Int(Ty::I64, 0),
            });
            self.module.globals.push(GlobalDef {
                name: "rng.seeded".to_string(),
                linkage: Linkage::Internal,
                constant: false,
                init: GlobalInit::Int(Ty::I1, 0),
            });
            self.rng_declared = true;
        }
        (
            Value::Global("rng.seed".to_string()),
            Value::Global("rng.seeded".to_string()),
        )
    }

    /* Conversions */

    /// Coerce to `double`. Integer constants fold; pointers are rejected.
    pub(super) fn to_f64(&mut self, value: Value) -> Result<Value, CompileError> {
        match value.ty() {
            Ty::F64 => Ok(value),
            Ty::I1 => Ok(match value {
                Value::Int(_, n) => Value::F64(n as f64),
                other => self.emit_cast(CastOp::UiToFp, other, Ty::F64),
            }),
            Ty::I8 | Ty::I32 | Ty::I64 => Ok(match value {
                Value::Int(_, n) => Value::F64(n as f64),
                other => self.emit_cast(CastOp::SiToFp, other, Ty::F64),
            }),
            Ty::Ptr | Ty::Void => Err(self.err(
                LoweringErrorKind::InvalidOperand,
                "Expected a numeric value",
            )),
        }
    }

    /// Truthiness coercion to `i1`.
    pub(super) fn to_i1(&mut self, value: Value) -> Value {
        match value.ty() {
            Ty::I1 => value,
            Ty::I8 | Ty::I32 | Ty::I64 => {
                let ty = value.ty();
                self.emit_icmp(IPred::Ne, ty, value, Value::Int(ty, 0))
            }
            Ty::F64 => self.emit_fcmp(FPred::One, value, Value::F64(0.0)),
            _ => self.emit_icmp(IPred::Ne, Ty::Ptr, value, Value::Null),
        }
    }

    /// Coercion used when `main` returns and when printing transient ints.
    pub(super) fn to_i32(&mut self, value: Value) -> Value {
        match value.ty() {
            Ty::I32 => value,
            Ty::I1 | Ty::I8 => self.emit_cast(CastOp::Zext, value, Ty::I32),
            Ty::I64 => self.emit_cast(CastOp::Trunc, value, Ty::I32),
            Ty::F64 => self.emit_cast(CastOp::FpToSi, value, Ty::I32),
            _ => Value::Int(Ty::I32, 0),
        }
    }

    /* Variables */

    /// Store `value` into an existing binding, retyping the slot if the IR
    /// type changed, or create a binding in the innermost scope.
    pub(super) fn set_variable(&mut self, name: &str, value: Value) {
        if let Some(slot) = self.scopes.lookup(name).cloned() {
            if slot.ty == value.ty() {
                self.emit_store(value, slot.ptr);
            } else {
                let ptr = self.entry_alloca(name, value.ty());
                let ty = value.ty();
                self.emit_store(value, ptr.clone());
                if let Some(slot) = self.scopes.lookup_mut(name) {
                    slot.ptr = ptr;
                    slot.ty = ty;
                }
            }
            return;
        }
        self.declare_variable(name, value);
    }

    /// Bind a fresh slot in the innermost scope, shadowing outer bindings.
    pub(super) fn declare_variable(&mut self, name: &str, value: Value) {
        let ptr = self.entry_alloca(name, value.ty());
        let ty = value.ty();
        self.emit_store(value, ptr.clone());
        self.scopes.define(name.to_string(), Slot { ptr, ty });
    }

    /* Verification */

    /// Every finished function is checked on its own before it joins the
    /// module.
    pub(super) fn verify_completed(&self, function: &Function) -> Result<(), CompileError> {
        let mut owned: Vec<(String, FnSig)> = self.module.extern_fns.clone();
        for (name, info) in self.functions.iter() {
            owned.push((
                name.clone(),
                FnSig::new(vec![Ty::F64; info.param_count], Ty::Ptr),
            ));
        }
        owned.push(("main".to_string(), FnSig::new(Vec::new(), Ty::I32)));

        let callables: HashMap<&str, &FnSig> =
            owned.iter().map(|(name, sig)| (name.as_str(), sig)).collect();
        let globals: HashSet<&str> = self
            .module
            .globals
            .iter()
            .map(|g| g.name.as_str())
            .chain(self.module.extern_globals.iter().map(|(n, _)| n.as_str()))
            .collect();

        verify::verify_function(function, &callables, &globals).map_err(CompileError::Verify)
    }

    /// Cap any unreachable blocks opened after a terminator so the function
    /// verifies; they are dead by construction.
    pub(super) fn seal_dangling_blocks(&mut self) {
        let ret = match self.builder.func.ret {
            Ty::I32 => Some(Value::Int(Ty::I32, 0)),
            Ty::Ptr => Some(Value::Null),
            Ty::F64 => Some(Value::F64(0.0)),
            Ty::Void => None,
            other => Some(Value::Int(other, 0)),
        };
        for block in &mut self.builder.func.blocks {
            if !block.is_terminated() {
                block.insts.push(Inst::Ret { val: ret.clone() });
            }
        }
    }
}

fn runtime_sig(name: &str) -> FnSig {
    match name {
        "printf" | "scanf" => FnSig::variadic(vec![Ty::Ptr], Ty::I32),
        "snprintf" => FnSig::variadic(vec![Ty::Ptr, Ty::I64, Ty::Ptr], Ty::I32),
        "fgets" => FnSig::new(vec![Ty::Ptr, Ty::I32, Ty::Ptr], Ty::Ptr),
        "atof" => FnSig::new(vec![Ty::Ptr], Ty::F64),
        "atoi" => FnSig::new(vec![Ty::Ptr], Ty::I32),
        "fabs" | "round" | "sqrt" => FnSig::new(vec![Ty::F64], Ty::F64),
        "pow" => FnSig::new(vec![Ty::F64, Ty::F64], Ty::F64),
        "rand" => FnSig::new(Vec::new(), Ty::I32),
        "srand" => FnSig::new(vec![Ty::I32], Ty::Void),
        "time" => FnSig::new(vec![Ty::Ptr], Ty::I64),
        "strlen" => FnSig::new(vec![Ty::Ptr], Ty::I64),
        "malloc" => FnSig::new(vec![Ty::I64], Ty::Ptr),
        "strcpy" | "strcat" | "strstr" => FnSig::new(vec![Ty::Ptr, Ty::Ptr], Ty::Ptr),
        "strncpy" => FnSig::new(vec![Ty::Ptr, Ty::Ptr, Ty::I64], Ty::Ptr),
        other => panic!("unknown runtime symbol '{other}'"),
    }
}
