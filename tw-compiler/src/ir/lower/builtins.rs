//! Inline expansion of the built-in operations.
//!
//! Built-ins are not ordinary calls: each one is synthesized at the call
//! site from primitive instructions and calls into the C runtime, including
//! any internal control flow. Merged results go through scratch slots so
//! the emitted IR never needs phi nodes.

use super::context::{Lowerer, TAG_STRING};
use crate::ast::{Expr, Visitor};
use crate::ir::{BinOp, CastOp, FPred, FnSig, IPred, Ty, Value};
use crate::{CompileError, LoweringErrorKind};

impl Lowerer {
    /// Dispatch a call expression. Built-in names are claimed first; what
    /// remains is looked up in the user function table.
    pub(super) fn lower_call(&mut self, name: &str, args: &[Expr]) -> Result<(), CompileError> {
        match name {
            "print" => self.builtin_print(args),
            "input" => self.builtin_input(args),
            "str" => self.builtin_str(args),
            "num" => self.builtin_num(args),
            "int" => self.builtin_int(args),
            "abs" => self.builtin_abs(args),
            "round" => self.builtin_round(args),
            "min" => self.builtin_min_max("min", FPred::Olt, args),
            "max" => self.builtin_min_max("max", FPred::Ogt, args),
            "pow" => self.builtin_pow(args),
            "sqrt" => self.builtin_sqrt(args),
            "random" => self.builtin_random(args),
            "len" => self.builtin_len(args),
            "upper" => self.builtin_case_fold("upper", args),
            "lower" => self.builtin_case_fold("lower", args),
            "includes" => self.builtin_includes(args),
            "replace" => self.builtin_replace(args),
            "append" => self.builtin_append(args),
            _ => self.user_call(name, args),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, CompileError> {
        self.visit_expr(expr)?;
        Ok(self.pop_value())
    }

    fn arity(&self, name: &str, args: &[Expr], expected: usize) -> Result<(), CompileError> {
        if args.len() == expected {
            return Ok(());
        }
        let noun = if expected == 1 { "argument" } else { "arguments" };
        Err(self.err(
            LoweringErrorKind::InvalidArity,
            format!("{name}() expects exactly {expected} {noun}"),
        ))
    }

    /* I/O */

    fn builtin_print(&mut self, args: &[Expr]) -> Result<(), CompileError> {
        if args.is_empty() {
            let newline = self.format_string("\n");
            self.call_runtime_discard("printf", vec![newline]);
        }
        for arg in args {
            let value = self.eval(arg)?;
            match value.ty() {
                Ty::Ptr => self.print_dynamic(value),
                Ty::F64 => {
                    let fmt = self.format_string("%f\n");
                    self.call_runtime_discard("printf", vec![fmt, value]);
                }
                _ => {
                    let value = self.to_i32(value);
                    let fmt = self.format_string("%d\n");
                    self.call_runtime_discard("printf", vec![fmt, value]);
                }
            }
        }
        // print evaluates to 0 like any other call expression.
        self.push_value(Value::Int(Ty::I32, 0));
        Ok(())
    }

    /// A pointer may be a string or a boxed number; branch on the tag word.
    fn print_dynamic(&mut self, ptr: Value) {
        let tag = self.load_tag(ptr.clone());
        let is_str = self.emit_icmp(IPred::Eq, Ty::I64, tag, Value::Int(Ty::I64, TAG_STRING));
        let str_label = self.new_block("print.str");
        let num_label = self.new_block("print.num");
        let done_label = self.new_block("print.done");
        self.emit_cond_br(is_str, &str_label, &num_label);

        self.set_block(&str_label);
        let fmt = self.format_string("%s\n");
        self.call_runtime_discard("printf", vec![fmt, ptr.clone()]);
        self.emit_br(&done_label);

        self.set_block(&num_label);
        let number = self.emit_load(Ty::F64, ptr);
        let fmt = self.format_string("%f\n");
        self.call_runtime_discard("printf", vec![fmt, number]);
        self.emit_br(&done_label);

        self.set_block(&done_label);
    }

    fn builtin_input(&mut self, args: &[Expr]) -> Result<(), CompileError> {
        if !args.is_empty() {
            eprintln!("Warning: input() takes no arguments, ignoring provided arguments");
        }
        let buf = self.stack_string_buffer("input.buf", 1024);
        let stdin = self.stdin_global();
        let stream = self.emit_load(Ty::Ptr, stdin);
        self.call_runtime_discard("fgets", vec![buf.clone(), Value::Int(Ty::I32, 1024), stream]);

        // Strip one trailing newline if fgets kept it.
        let len = self.call_runtime("strlen", vec![buf.clone()]);
        let last = self.emit_bin(BinOp::Sub, Ty::I64, len, Value::Int(Ty::I64, 1));
        let last_ptr = self.emit_gep(Ty::I8, buf.clone(), last);
        let last_char = self.emit_load(Ty::I8, last_ptr.clone());
        let is_newline = self.emit_icmp(IPred::Eq, Ty::I8, last_char, Value::Int(Ty::I8, 10));
        let trim_label = self.new_block("input.trim");
        let done_label = self.new_block("input.done");
        self.emit_cond_br(is_newline, &trim_label, &done_label);

        self.set_block(&trim_label);
        self.emit_store(Value::Int(Ty::I8, 0), last_ptr);
        self.emit_br(&done_label);

        self.set_block(&done_label);
        self.push_value(buf);
        Ok(())
    }

    /* Conversions */

    fn builtin_str(&mut self, args: &[Expr]) -> Result<(), CompileError> {
        self.arity("str", args, 1)?;
        let value = self.eval(&args[0])?;
        let value = if value.ty() == Ty::Ptr {
            self.unbox_to_f64(value)
        } else {
            self.to_f64(value)?
        };
        let buf = self.stack_string_buffer("str.buf", 32);
        let fmt = self.format_string("%g");
        self.call_runtime_discard(
            "snprintf",
            vec![buf.clone(), Value::Int(Ty::I64, 32), fmt, value],
        );
        self.push_value(buf);
        Ok(())
    }

    /// Turn a pointer back into a `double`: strings go through `atof`,
    /// anything else is read as a boxed number.
    pub(super) fn unbox_to_f64(&mut self, ptr: Value) -> Value {
        let slot = self.scratch_slot("unbox.res", Ty::F64);
        let tag = self.load_tag(ptr.clone());
        let is_str = self.emit_icmp(IPred::Eq, Ty::I64, tag, Value::Int(Ty::I64, TAG_STRING));
        let str_label = self.new_block("unbox.str");
        let num_label = self.new_block("unbox.num");
        let done_label = self.new_block("unbox.done");
        self.emit_cond_br(is_str, &str_label, &num_label);

        self.set_block(&str_label);
        let parsed = self.call_runtime("atof", vec![ptr.clone()]);
        self.emit_store(parsed, slot.clone());
        self.emit_br(&done_label);

        self.set_block(&num_label);
        let loaded = self.emit_load(Ty::F64, ptr);
        self.emit_store(loaded, slot.clone());
        self.emit_br(&done_label);

        self.set_block(&done_label);
        self.emit_load(Ty::F64, slot)
    }

    fn builtin_num(&mut self, args: &[Expr]) -> Result<(), CompileError> {
        self.arity("num", args, 1)?;
        let value = self.eval(&args[0])?;
        let value = self.expect_ptr(value, "num() expects a string argument")?;
        let result = self.call_runtime("atof", vec![value]);
        self.push_value(result);
        Ok(())
    }

    fn builtin_int(&mut self, args: &[Expr]) -> Result<(), CompileError> {
        self.arity("int", args, 1)?;
        let value = self.eval(&args[0])?;
        let value = self.expect_ptr(value, "int() expects a string argument")?;
        let parsed = self.call_runtime("atoi", vec![value]);
        let result = self.emit_cast(CastOp::SiToFp, parsed, Ty::F64);
        self.push_value(result);
        Ok(())
    }

    /* Math */

    fn builtin_abs(&mut self, args: &[Expr]) -> Result<(), CompileError> {
        self.arity("abs", args, 1)?;
        let value = self.eval(&args[0])?;
        let value = self.require_numeric(value, "abs() expects a number")?;
        let result = self.call_runtime("fabs", vec![value]);
        self.push_value(result);
        Ok(())
    }

    fn builtin_round(&mut self, args: &[Expr]) -> Result<(), CompileError> {
        if args.is_empty() || args.len() > 2 {
            return Err(self.err(
                LoweringErrorKind::InvalidArity,
                "round() expects 1 or 2 arguments",
            ));
        }
        let value = self.eval(&args[0])?;
        let value = self.require_numeric(value, "round() expects a number")?;
        if args.len() == 1 {
            let result = self.call_runtime("round", vec![value]);
            self.push_value(result);
            return Ok(());
        }
        // round(x, d) == round(x * 10^d) / 10^d
        let places = self.eval(&args[1])?;
        let places = self.require_numeric(places, "round() expects a number")?;
        let scale = self.call_runtime("pow", vec![Value::F64(10.0), places]);
        let scaled = self.emit_bin(BinOp::FMul, Ty::F64, value, scale.clone());
        let rounded = self.call_runtime("round", vec![scaled]);
        let result = self.emit_bin(BinOp::FDiv, Ty::F64, rounded, scale);
        self.push_value(result);
        Ok(())
    }

    /// Left fold with `select`; `pred` picks the replacement.
    fn builtin_min_max(
        &mut self,
        name: &str,
        pred: FPred,
        args: &[Expr],
    ) -> Result<(), CompileError> {
        if args.len() < 2 {
            return Err(self.err(
                LoweringErrorKind::InvalidArity,
                format!("{name}() expects at least 2 arguments"),
            ));
        }
        let first = self.eval(&args[0])?;
        let mut acc = self.require_numeric(first, &format!("{name}() expects numbers"))?;
        for arg in &args[1..] {
            let value = self.eval(arg)?;
            let value = self.require_numeric(value, &format!("{name}() expects numbers"))?;
            let take = self.emit_fcmp(pred, value.clone(), acc.clone());
            acc = self.emit_select(take, value, acc);
        }
        self.push_value(acc);
        Ok(())
    }

    fn builtin_pow(&mut self, args: &[Expr]) -> Result<(), CompileError> {
        self.arity("pow", args, 2)?;
        let base = self.eval(&args[0])?;
        let base = self.require_numeric(base, "pow() expects numbers")?;
        let exponent = self.eval(&args[1])?;
        let exponent = self.require_numeric(exponent, "pow() expects numbers")?;
        let result = self.call_runtime("pow", vec![base, exponent]);
        self.push_value(result);
        Ok(())
    }

    fn builtin_sqrt(&mut self, args: &[Expr]) -> Result<(), CompileError> {
        self.arity("sqrt", args, 1)?;
        let value = self.eval(&args[0])?;
        let value = self.require_numeric(value, "sqrt() expects a number")?;
        let result = self.call_runtime("sqrt", vec![value]);
        self.push_value(result);
        Ok(())
    }

    /// Lazily-seeded linear congruential generator over module globals.
    fn builtin_random(&mut self, args: &[Expr]) -> Result<(), CompileError> {
        if !args.is_empty() {
            return Err(self.err(
                LoweringErrorKind::InvalidArity,
                "random() expects no arguments",
            ));
        }
        let (seed_global, seeded_global) = self.rng_globals();
        let seeded = self.emit_load(Ty::I1, seeded_global.clone());
        let seed_label = self.new_block("rand.seed");
        let next_label = self.new_block("rand.next");
        self.emit_cond_br(seeded, &next_label, &seed_label);

        // First call: mix time(NULL) with the address of a stack local.
        self.set_block(&seed_label);
        let now = self.call_runtime("time", vec![Value::Null]);
        let local = self.scratch_slot("rand.entropy", Ty::I64);
        let addr = self.emit_cast(CastOp::PtrToInt, local, Ty::I64);
        let mixed = self.emit_bin(BinOp::Xor, Ty::I64, now, addr);
        self.emit_store(mixed, seed_global.clone());
        self.emit_store(Value::Int(Ty::I1, 1), seeded_global);
        self.emit_br(&next_label);

        self.set_block(&next_label);
        let seed = self.emit_load(Ty::I64, seed_global.clone());
        let stepped = self.emit_bin(BinOp::Mul, Ty::I64, seed, Value::Int(Ty::I64, 1664525));
        let next = self.emit_bin(
            BinOp::Add,
            Ty::I64,
            stepped,
            Value::Int(Ty::I64, 1013904223),
        );
        self.emit_store(next.clone(), seed_global);
        let high = self.emit_bin(BinOp::LShr, Ty::I64, next, Value::Int(Ty::I64, 32));
        let as_f64 = self.emit_cast(CastOp::UiToFp, high, Ty::F64);
        let result = self.emit_bin(BinOp::FDiv, Ty::F64, as_f64, Value::F64(4294967296.0));
        self.push_value(result);
        Ok(())
    }

    /* Strings and arrays */

    fn builtin_len(&mut self, args: &[Expr]) -> Result<(), CompileError> {
        self.arity("len", args, 1)?;
        let value = self.eval(&args[0])?;
        let value = self.expect_ptr(value, "len() expects a string or array")?;

        let slot = self.scratch_slot("len.res", Ty::F64);
        let tag = self.load_tag(value.clone());
        let is_str = self.emit_icmp(IPred::Eq, Ty::I64, tag, Value::Int(Ty::I64, TAG_STRING));
        let str_label = self.new_block("len.str");
        let arr_label = self.new_block("len.arr");
        let done_label = self.new_block("len.done");
        self.emit_cond_br(is_str, &str_label, &arr_label);

        self.set_block(&str_label);
        let chars = self.call_runtime("strlen", vec![value.clone()]);
        let chars = self.emit_cast(CastOp::UiToFp, chars, Ty::F64);
        self.emit_store(chars, slot.clone());
        self.emit_br(&done_label);

        self.set_block(&arr_label);
        let count = self.array_count(value);
        self.emit_store(count, slot.clone());
        self.emit_br(&done_label);

        self.set_block(&done_label);
        let result = self.emit_load(Ty::F64, slot);
        self.push_value(result);
        Ok(())
    }

    /// `upper`/`lower`: copy into a fresh tagged buffer, folding the ASCII
    /// letter range byte by byte (the NUL terminator is copied untouched).
    fn builtin_case_fold(&mut self, name: &str, args: &[Expr]) -> Result<(), CompileError> {
        self.arity(name, args, 1)?;
        let value = self.eval(&args[0])?;
        let source = self.expect_ptr(value, &format!("{name}() expects a string"))?;

        let len = self.call_runtime("strlen", vec![source.clone()]);
        let size = self.emit_bin(BinOp::Add, Ty::I64, len, Value::Int(Ty::I64, 1));
        let buf = self.heap_alloc(TAG_STRING, size.clone());
        let index = self.scratch_slot("i", Ty::I64);
        self.emit_store(Value::Int(Ty::I64, 0), index.clone());

        let cond_label = self.new_block(&format!("{name}.cond"));
        let body_label = self.new_block(&format!("{name}.body"));
        let done_label = self.new_block(&format!("{name}.done"));

        self.emit_br(&cond_label);
        self.set_block(&cond_label);
        let i = self.emit_load(Ty::I64, index.clone());
        let more = self.emit_icmp(IPred::Slt, Ty::I64, i.clone(), size);
        self.emit_cond_br(more, &body_label, &done_label);

        self.set_block(&body_label);
        let src_ptr = self.emit_gep(Ty::I8, source.clone(), i.clone());
        let byte = self.emit_load(Ty::I8, src_ptr);
        let (low, high, op) = if name == "upper" {
            (b'a', b'z', BinOp::Sub)
        } else {
            (b'A', b'Z', BinOp::Add)
        };
        let ge = self.emit_icmp(IPred::Sge, Ty::I8, byte.clone(), Value::Int(Ty::I8, low as i64));
        let le = self.emit_icmp(IPred::Sle, Ty::I8, byte.clone(), Value::Int(Ty::I8, high as i64));
        let in_range = self.emit_bin(BinOp::And, Ty::I1, ge, le);
        let folded = self.emit_bin(op, Ty::I8, byte.clone(), Value::Int(Ty::I8, 32));
        let out = self.emit_select(in_range, folded, byte);
        let dst_ptr = self.emit_gep(Ty::I8, buf.clone(), i.clone());
        self.emit_store(out, dst_ptr);
        let next = self.emit_bin(BinOp::Add, Ty::I64, i, Value::Int(Ty::I64, 1));
        self.emit_store(next, index);
        self.emit_br(&cond_label);

        self.set_block(&done_label);
        self.push_value(buf);
        Ok(())
    }

    fn builtin_includes(&mut self, args: &[Expr]) -> Result<(), CompileError> {
        self.arity("includes", args, 2)?;
        let haystack = self.eval(&args[0])?;
        let haystack = self.expect_ptr(
            haystack,
            "includes() expects a string or array as its first argument",
        )?;
        let needle = self.eval(&args[1])?;

        if needle.ty() == Ty::Ptr {
            // Substring search.
            let hit = self.call_runtime("strstr", vec![haystack, needle]);
            let found = self.emit_icmp(IPred::Ne, Ty::Ptr, hit, Value::Null);
            let result = self.emit_cast(CastOp::UiToFp, found, Ty::F64);
            self.push_value(result);
            return Ok(());
        }

        // Linear scan over the array cells.
        let needle = self.to_f64(needle)?;
        let slot = self.scratch_slot("incl.res", Ty::F64);
        self.emit_store(Value::F64(0.0), slot.clone());
        let count = self.array_count(haystack.clone());
        let n = self.emit_cast(CastOp::FpToSi, count, Ty::I64);
        let index = self.scratch_slot("i", Ty::I64);
        self.emit_store(Value::Int(Ty::I64, 0), index.clone());

        let cond_label = self.new_block("incl.cond");
        let body_label = self.new_block("incl.body");
        let hit_label = self.new_block("incl.hit");
        let next_label = self.new_block("incl.next");
        let done_label = self.new_block("incl.done");

        self.emit_br(&cond_label);
        self.set_block(&cond_label);
        let i = self.emit_load(Ty::I64, index.clone());
        let more = self.emit_icmp(IPred::Slt, Ty::I64, i.clone(), n);
        self.emit_cond_br(more, &body_label, &done_label);

        self.set_block(&body_label);
        let cell = self.emit_gep(Ty::F64, haystack, i.clone());
        let element = self.emit_load(Ty::F64, cell);
        let matches = self.emit_fcmp(FPred::Oeq, element, needle);
        self.emit_cond_br(matches, &hit_label, &next_label);

        self.set_block(&hit_label);
        self.emit_store(Value::F64(1.0), slot.clone());
        self.emit_br(&done_label);

        self.set_block(&next_label);
        let next = self.emit_bin(BinOp::Add, Ty::I64, i, Value::Int(Ty::I64, 1));
        self.emit_store(next, index);
        self.emit_br(&cond_label);

        self.set_block(&done_label);
        let result = self.emit_load(Ty::F64, slot);
        self.push_value(result);
        Ok(())
    }

    /// Replace the first occurrence only. A miss returns a copy of the
    /// haystack; a hit builds prefix + replacement + suffix at exact length.
    fn builtin_replace(&mut self, args: &[Expr]) -> Result<(), CompileError> {
        self.arity("replace", args, 3)?;
        let haystack = self.eval(&args[0])?;
        let haystack = self.expect_ptr(haystack, "replace() expects string arguments")?;
        let needle = self.eval(&args[1])?;
        let needle = self.expect_ptr(needle, "replace() expects string arguments")?;
        let replacement = self.eval(&args[2])?;
        let replacement = self.expect_ptr(replacement, "replace() expects string arguments")?;

        let hit = self.call_runtime("strstr", vec![haystack.clone(), needle.clone()]);
        let missed = self.emit_icmp(IPred::Eq, Ty::Ptr, hit.clone(), Value::Null);
        let slot = self.scratch_slot("repl.res", Ty::Ptr);

        let miss_label = self.new_block("repl.miss");
        let hit_label = self.new_block("repl.hit");
        let done_label = self.new_block("repl.done");
        self.emit_cond_br(missed, &miss_label, &hit_label);

        self.set_block(&miss_label);
        let len = self.call_runtime("strlen", vec![haystack.clone()]);
        let size = self.emit_bin(BinOp::Add, Ty::I64, len, Value::Int(Ty::I64, 1));
        let copy = self.heap_alloc(TAG_STRING, size);
        self.call_runtime_discard("strcpy", vec![copy.clone(), haystack.clone()]);
        self.emit_store(copy, slot.clone());
        self.emit_br(&done_label);

        self.set_block(&hit_label);
        let hay_len = self.call_runtime("strlen", vec![haystack.clone()]);
        let needle_len = self.call_runtime("strlen", vec![needle]);
        let repl_len = self.call_runtime("strlen", vec![replacement.clone()]);
        let hay_addr = self.emit_cast(CastOp::PtrToInt, haystack.clone(), Ty::I64);
        let hit_addr = self.emit_cast(CastOp::PtrToInt, hit.clone(), Ty::I64);
        let prefix_len = self.emit_bin(BinOp::Sub, Ty::I64, hit_addr, hay_addr);
        let without_needle = self.emit_bin(BinOp::Sub, Ty::I64, hay_len, needle_len.clone());
        let with_repl = self.emit_bin(BinOp::Add, Ty::I64, without_needle, repl_len);
        let size = self.emit_bin(BinOp::Add, Ty::I64, with_repl, Value::Int(Ty::I64, 1));
        let buf = self.heap_alloc(TAG_STRING, size);
        self.call_runtime_discard(
            "strncpy",
            vec![buf.clone(), haystack, prefix_len.clone()],
        );
        let prefix_end = self.emit_gep(Ty::I8, buf.clone(), prefix_len);
        self.emit_store(Value::Int(Ty::I8, 0), prefix_end);
        self.call_runtime_discard("strcat", vec![buf.clone(), replacement]);
        let suffix = self.emit_gep(Ty::I8, hit, needle_len);
        self.call_runtime_discard("strcat", vec![buf.clone(), suffix]);
        self.emit_store(buf, slot.clone());
        self.emit_br(&done_label);

        self.set_block(&done_label);
        let result = self.emit_load(Ty::Ptr, slot);
        self.push_value(result);
        Ok(())
    }

    /// Copy into a fresh array of length + 1; the original is untouched.
    fn builtin_append(&mut self, args: &[Expr]) -> Result<(), CompileError> {
        self.arity("append", args, 2)?;
        let array = self.eval(&args[0])?;
        let array = self.expect_ptr(array, "append() expects an array as its first argument")?;
        let value = self.eval(&args[1])?;
        let value =
            self.require_numeric(value, "append() expects a number as its second argument")?;

        let count = self.array_count(array.clone());
        let n = self.emit_cast(CastOp::FpToSi, count.clone(), Ty::I64);
        let new_count = self.emit_bin(BinOp::FAdd, Ty::F64, count, Value::F64(1.0));
        let n_plus_one = self.emit_bin(BinOp::Add, Ty::I64, n.clone(), Value::Int(Ty::I64, 1));
        let new_array = self.array_alloc(new_count, n_plus_one);

        let index = self.scratch_slot("i", Ty::I64);
        self.emit_store(Value::Int(Ty::I64, 0), index.clone());
        let cond_label = self.new_block("append.cond");
        let body_label = self.new_block("append.body");
        let done_label = self.new_block("append.done");

        self.emit_br(&cond_label);
        self.set_block(&cond_label);
        let i = self.emit_load(Ty::I64, index.clone());
        let more = self.emit_icmp(IPred::Slt, Ty::I64, i.clone(), n.clone());
        self.emit_cond_br(more, &body_label, &done_label);

        self.set_block(&body_label);
        let src = self.emit_gep(Ty::F64, array.clone(), i.clone());
        let element = self.emit_load(Ty::F64, src);
        let dst = self.emit_gep(Ty::F64, new_array.clone(), i.clone());
        self.emit_store(element, dst);
        let next = self.emit_bin(BinOp::Add, Ty::I64, i, Value::Int(Ty::I64, 1));
        self.emit_store(next, index);
        self.emit_br(&cond_label);

        self.set_block(&done_label);
        let tail = self.emit_gep(Ty::F64, new_array.clone(), n);
        self.emit_store(value, tail);
        self.push_value(new_array);
        Ok(())
    }

    /* User functions */

    fn user_call(&mut self, name: &str, args: &[Expr]) -> Result<(), CompileError> {
        let info = self.functions.lookup(name).ok_or_else(|| {
            self.err(
                LoweringErrorKind::UndefinedFunction,
                format!("Undefined function: {name}"),
            )
        })?;
        if args.len() != info.param_count {
            return Err(self.err(
                LoweringErrorKind::InvalidArity,
                format!(
                    "Function '{name}' expects {} argument(s), got {}",
                    info.param_count,
                    args.len()
                ),
            ));
        }
        let mut values = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let value = self.eval(arg)?;
            if value.ty() == Ty::Ptr {
                return Err(self.err(
                    LoweringErrorKind::InvalidOperand,
                    format!("Argument {} of '{name}' must be a number", i + 1),
                ));
            }
            values.push(self.to_f64(value)?);
        }
        let sig = FnSig::new(vec![Ty::F64; info.param_count], Ty::Ptr);
        let dst = self.new_temp();
        self.emit(crate::ir::Inst::Call {
            dst: Some(dst.clone()),
            callee: name.to_string(),
            sig,
            args: values,
        });
        self.push_value(Value::Temp(dst, Ty::Ptr));
        Ok(())
    }
}
