//! Expression lowering with operand-type-driven instruction selection.
//!
//! Each expression leaves exactly one IR value on the value stack. For the
//! nodes the visitor walks (binary, unary, assignments, indexing) the
//! operand values are already on the stack when [`Lowerer::lower_expr`]
//! runs; calls and array literals evaluate their own children here.

use super::context::{Lowerer, TAG_ARRAY, TAG_STRING};
use crate::ast::{BinOp as AstBinOp, Expr, UnOp, Visitor};
use crate::ir::{BinOp, CastOp, FPred, IPred, Ty, Value};
use crate::{CompileError, LoweringErrorKind};

impl Lowerer {
    pub(super) fn lower_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::NumberLiteral(value) => {
                self.push_value(Value::F64(*value));
            }
            Expr::StringLiteral(text) => {
                let ptr = self.string_literal(text);
                self.push_value(ptr);
            }
            Expr::BooleanLiteral(value) => {
                self.push_value(Value::Int(Ty::I1, i64::from(*value)));
            }
            Expr::NullLiteral => {
                self.push_value(Value::Null);
            }
            Expr::Identifier(name) => {
                let slot = self.scopes.lookup(name).cloned().ok_or_else(|| {
                    self.err(
                        LoweringErrorKind::UndefinedVariable,
                        format!("Undefined variable: {name}"),
                    )
                })?;
                let value = self.emit_load(slot.ty, slot.ptr);
                self.push_value(value);
            }
            Expr::Binary { op, .. } => {
                let rhs = self.pop_value();
                let lhs = self.pop_value();
                let result = self.lower_binary(*op, lhs, rhs)?;
                self.push_value(result);
            }
            Expr::Unary { op, .. } => {
                let value = self.pop_value();
                let result = self.lower_unary(*op, value)?;
                self.push_value(result);
            }
            Expr::Assignment { name, .. } => {
                let value = self.pop_value();
                self.set_variable(name, value.clone());
                // Assignment evaluates to the assigned value.
                self.push_value(value);
            }
            Expr::IndexAssignment { .. } => {
                let value = self.pop_value();
                let index = self.pop_value();
                let array = self.pop_value();
                let array = self.expect_ptr(array, "Only arrays can be indexed")?;
                let index = self.index_to_cell(index)?;
                let value = self.require_numeric(value, "Array elements must be numbers")?;
                let cell = self.emit_gep(Ty::F64, array, index);
                self.emit_store(value.clone(), cell);
                self.push_value(value);
            }
            Expr::Call { name, args } => {
                self.lower_call(name, args)?;
            }
            Expr::ArrayLiteral(elements) => {
                let array = self.lower_array_literal(elements)?;
                self.push_value(array);
            }
            Expr::Index { .. } => {
                let index = self.pop_value();
                let array = self.pop_value();
                let array = self.expect_ptr(array, "Only arrays can be indexed")?;
                let index = self.index_to_cell(index)?;
                let cell = self.emit_gep(Ty::F64, array, index);
                let value = self.emit_load(Ty::F64, cell);
                self.push_value(value);
            }
        }
        Ok(())
    }

    /// Turn an already-evaluated index value into an `i64` cell offset.
    fn index_to_cell(&mut self, value: Value) -> Result<Value, CompileError> {
        let value = self.require_numeric(value, "Array index must be a number")?;
        Ok(self.emit_cast(CastOp::FpToSi, value, Ty::I64))
    }

    fn lower_binary(
        &mut self,
        op: AstBinOp,
        lhs: Value,
        rhs: Value,
    ) -> Result<Value, CompileError> {
        match op {
            AstBinOp::Add => {
                if lhs.ty() == Ty::Ptr || rhs.ty() == Ty::Ptr {
                    return self.string_concat(lhs, rhs);
                }
                let (lhs, rhs, float) = self.arith_pair(lhs, rhs, "+")?;
                if float {
                    Ok(self.emit_bin(BinOp::FAdd, Ty::F64, lhs, rhs))
                } else {
                    let ty = lhs.ty();
                    Ok(self.emit_bin(BinOp::Add, ty, lhs, rhs))
                }
            }
            AstBinOp::Sub => self.arith(BinOp::FSub, BinOp::Sub, lhs, rhs, "-"),
            AstBinOp::Mul => self.arith(BinOp::FMul, BinOp::Mul, lhs, rhs, "*"),
            AstBinOp::Mod => self.arith(BinOp::FRem, BinOp::SRem, lhs, rhs, "%"),
            AstBinOp::Div => {
                // Division is always performed in floating point.
                let lhs = self.require_numeric(lhs, "Operator '/' requires numeric operands")?;
                let rhs = self.require_numeric(rhs, "Operator '/' requires numeric operands")?;
                Ok(self.emit_bin(BinOp::FDiv, Ty::F64, lhs, rhs))
            }
            AstBinOp::Eq => self.equality(IPred::Eq, FPred::Oeq, lhs, rhs, "=="),
            AstBinOp::Ne => self.equality(IPred::Ne, FPred::One, lhs, rhs, "!="),
            AstBinOp::Lt => self.comparison(IPred::Slt, FPred::Olt, lhs, rhs, "<"),
            AstBinOp::Le => self.comparison(IPred::Sle, FPred::Ole, lhs, rhs, "<="),
            AstBinOp::Gt => self.comparison(IPred::Sgt, FPred::Ogt, lhs, rhs, ">"),
            AstBinOp::Ge => self.comparison(IPred::Sge, FPred::Oge, lhs, rhs, ">="),
            AstBinOp::And => {
                let lhs = self.to_i1(lhs);
                let rhs = self.to_i1(rhs);
                Ok(self.emit_bin(BinOp::And, Ty::I1, lhs, rhs))
            }
            AstBinOp::Or => {
                let lhs = self.to_i1(lhs);
                let rhs = self.to_i1(rhs);
                Ok(self.emit_bin(BinOp::Or, Ty::I1, lhs, rhs))
            }
        }
    }

    fn arith(
        &mut self,
        float_op: BinOp,
        int_op: BinOp,
        lhs: Value,
        rhs: Value,
        symbol: &str,
    ) -> Result<Value, CompileError> {
        let (lhs, rhs, float) = self.arith_pair(lhs, rhs, symbol)?;
        if float {
            Ok(self.emit_bin(float_op, Ty::F64, lhs, rhs))
        } else {
            let ty = lhs.ty();
            Ok(self.emit_bin(int_op, ty, lhs, rhs))
        }
    }

    /// Unify arithmetic operands: both sides become `double` unless both are
    /// already integers of the same width. Pointers are rejected.
    fn arith_pair(
        &mut self,
        lhs: Value,
        rhs: Value,
        symbol: &str,
    ) -> Result<(Value, Value, bool), CompileError> {
        if lhs.ty() == Ty::Ptr || rhs.ty() == Ty::Ptr {
            return Err(self.err(
                LoweringErrorKind::InvalidOperand,
                format!("Operator '{symbol}' requires numeric operands"),
            ));
        }
        if lhs.ty().is_integer() && lhs.ty() == rhs.ty() {
            return Ok((lhs, rhs, false));
        }
        let lhs = self.to_f64(lhs)?;
        let rhs = self.to_f64(rhs)?;
        Ok((lhs, rhs, true))
    }

    fn equality(
        &mut self,
        int_pred: IPred,
        float_pred: FPred,
        lhs: Value,
        rhs: Value,
        symbol: &str,
    ) -> Result<Value, CompileError> {
        if lhs.ty() == Ty::Ptr && rhs.ty() == Ty::Ptr {
            // Pointer identity, not contents.
            return Ok(self.emit_icmp(int_pred, Ty::Ptr, lhs, rhs));
        }
        self.comparison(int_pred, float_pred, lhs, rhs, symbol)
    }

    fn comparison(
        &mut self,
        int_pred: IPred,
        float_pred: FPred,
        lhs: Value,
        rhs: Value,
        symbol: &str,
    ) -> Result<Value, CompileError> {
        if lhs.ty() == Ty::Ptr || rhs.ty() == Ty::Ptr {
            return Err(self.err(
                LoweringErrorKind::InvalidOperand,
                format!("Operator '{symbol}' requires numeric operands"),
            ));
        }
        if lhs.ty().is_integer() && lhs.ty() == rhs.ty() {
            let ty = lhs.ty();
            return Ok(self.emit_icmp(int_pred, ty, lhs, rhs));
        }
        let lhs = self.to_f64(lhs)?;
        let rhs = self.to_f64(rhs)?;
        Ok(self.emit_fcmp(float_pred, lhs, rhs))
    }

    fn lower_unary(&mut self, op: UnOp, value: Value) -> Result<Value, CompileError> {
        match op {
            UnOp::Neg => match value.ty() {
                Ty::F64 => Ok(self.emit_fneg(value)),
                ty if ty.is_integer() => Ok(self.emit_bin(
                    BinOp::Sub,
                    ty,
                    Value::Int(ty, 0),
                    value,
                )),
                _ => Err(self.err(
                    LoweringErrorKind::InvalidOperand,
                    "Unary '-' requires a numeric operand",
                )),
            },
            UnOp::Not => {
                let value = self.to_i1(value);
                Ok(self.emit_bin(BinOp::Xor, Ty::I1, value, Value::Int(Ty::I1, 1)))
            }
        }
    }

    /* Strings */

    /// `+` with a pointer on either side: convert both sides to strings and
    /// build the concatenation in a fresh tagged buffer.
    pub(super) fn string_concat(&mut self, lhs: Value, rhs: Value) -> Result<Value, CompileError> {
        let lhs = self.convert_to_string(lhs)?;
        let rhs = self.convert_to_string(rhs)?;
        let lhs_len = self.call_runtime("strlen", vec![lhs.clone()]);
        let rhs_len = self.call_runtime("strlen", vec![rhs.clone()]);
        let sum = self.emit_bin(BinOp::Add, Ty::I64, lhs_len, rhs_len);
        let total = self.emit_bin(BinOp::Add, Ty::I64, sum, Value::Int(Ty::I64, 1));
        let buf = self.heap_alloc(TAG_STRING, total);
        self.call_runtime_discard("strcpy", vec![buf.clone(), lhs]);
        self.call_runtime_discard("strcat", vec![buf.clone(), rhs]);
        Ok(buf)
    }

    /// Format a non-pointer value with `%g` into a 32-byte stack buffer.
    pub(super) fn convert_to_string(&mut self, value: Value) -> Result<Value, CompileError> {
        if value.ty() == Ty::Ptr {
            return Ok(value);
        }
        let value = self.to_f64(value)?;
        let buf = self.stack_string_buffer("str.buf", 32);
        let fmt = self.format_string("%g");
        self.call_runtime_discard(
            "snprintf",
            vec![buf.clone(), Value::Int(Ty::I64, 32), fmt, value],
        );
        Ok(buf)
    }

    /* Arrays */

    /// Heap layout: `[count: double][tag: i64][cells: double x n]`, with the
    /// user pointer at cell 0 so the tag word sits directly in front of it.
    pub(super) fn array_alloc(&mut self, count_f64: Value, count_i64: Value) -> Value {
        let cell_bytes = self.emit_bin(BinOp::Mul, Ty::I64, count_i64, Value::Int(Ty::I64, 8));
        let total = self.emit_bin(BinOp::Add, Ty::I64, cell_bytes, Value::Int(Ty::I64, 16));
        let raw = self.call_runtime("malloc", vec![total]);
        self.emit_store(count_f64, raw.clone());
        let tag_ptr = self.emit_gep(Ty::I8, raw.clone(), Value::Int(Ty::I64, 8));
        self.emit_store(Value::Int(Ty::I64, TAG_ARRAY), tag_ptr);
        self.emit_gep(Ty::I8, raw, Value::Int(Ty::I64, 16))
    }

    /// The count cell sits two `double` cells before element 0 (the tag word
    /// is in between).
    pub(super) fn array_count(&mut self, array: Value) -> Value {
        let count_ptr = self.emit_gep(Ty::F64, array, Value::Int(Ty::I64, -2));
        self.emit_load(Ty::F64, count_ptr)
    }

    fn lower_array_literal(&mut self, elements: &[Expr]) -> Result<Value, CompileError> {
        let n = elements.len() as i64;
        let array = self.array_alloc(Value::F64(n as f64), Value::Int(Ty::I64, n));
        for (i, element) in elements.iter().enumerate() {
            self.visit_expr(element)?;
            let value = self.pop_value();
            let value = self.require_numeric(value, "Array elements must be numbers")?;
            let cell = self.emit_gep(Ty::F64, array.clone(), Value::Int(Ty::I64, i as i64));
            self.emit_store(value, cell);
        }
        Ok(array)
    }

    /* Operand checks */

    pub(super) fn expect_ptr(&self, value: Value, message: &str) -> Result<Value, CompileError> {
        if value.ty() == Ty::Ptr {
            Ok(value)
        } else {
            Err(self.err(LoweringErrorKind::InvalidOperand, message))
        }
    }

    pub(super) fn require_numeric(
        &mut self,
        value: Value,
        message: &str,
    ) -> Result<Value, CompileError> {
        if value.ty() == Ty::Ptr {
            return Err(self.err(LoweringErrorKind::InvalidOperand, message));
        }
        self.to_f64(value)
    }
}
