//! Statement lowering: control flow, scopes, and the two-phase handling of
//! function declarations.

use super::context::{FuncBuilder, Lowerer, TAG_NUMBER};
use crate::ast::{Expr, Program, Stmt, Visitor};
use crate::ir::symbol_table::{FunctionInfo, ScopeStack, Slot};
use crate::ir::{Inst, Ty, Value};
use crate::{CompileError, LoweringErrorKind};
use std::collections::HashSet;
use std::mem;

impl Lowerer {
    /// Signature pass over the top-level statements: register every function
    /// so bodies may call forward, validating names and parameter lists.
    pub(super) fn declare_functions(&mut self, program: &Program) -> Result<(), CompileError> {
        for stmt in &program.statements {
            if let Stmt::FunctionDeclaration { name, params, .. } = stmt {
                if name == "main" {
                    return Err(self.err(
                        LoweringErrorKind::DuplicateDefinition,
                        "Function 'main' conflicts with the program entry point",
                    ));
                }
                let mut seen = HashSet::new();
                for param in params {
                    if !seen.insert(param.as_str()) {
                        return Err(self.err(
                            LoweringErrorKind::DuplicateDefinition,
                            format!("Duplicate parameter '{param}' in function '{name}'"),
                        ));
                    }
                }
                if self
                    .functions
                    .define(name, FunctionInfo { param_count: params.len() })
                    .is_err()
                {
                    return Err(self.err(
                        LoweringErrorKind::DuplicateDefinition,
                        format!("Function '{name}' is already defined"),
                    ));
                }
            }
        }
        Ok(())
    }

    pub(super) fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expression(expr) => {
                self.visit_expr(expr)?;
                self.pop_value();
                Ok(())
            }
            Stmt::VariableDeclaration {
                kind: _,
                name,
                initializer,
            } => {
                let value = match initializer {
                    Some(init) => {
                        self.visit_expr(init)?;
                        self.pop_value()
                    }
                    None => Value::F64(0.0),
                };
                self.declare_variable(name, value);
                Ok(())
            }
            Stmt::Block(body) => {
                self.scopes.push();
                let result = body.iter().try_for_each(|stmt| self.visit_stmt(stmt));
                self.scopes.pop();
                result
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => self.lower_if(condition, then_branch, else_branch.as_deref()),
            Stmt::While { condition, body } => self.lower_while(condition, body),
            Stmt::For {
                init,
                condition,
                update,
                body,
            } => self.lower_for(init.as_deref(), condition.as_ref(), update.as_ref(), body),
            Stmt::Return(value) => self.lower_return(value.as_ref()),
            Stmt::FunctionDeclaration { name, .. } => Err(self.err(
                LoweringErrorKind::NestedFunction,
                format!("Function '{name}' must be declared at the top level"),
            )),
        }
    }

    fn lower_if(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> Result<(), CompileError> {
        self.visit_expr(condition)?;
        let cond = self.pop_value();
        let cond = self.to_i1(cond);

        let then_label = self.new_block("then");
        let else_label = else_branch.map(|_| self.new_block("else"));
        let merge_label = self.new_block("merge");

        self.emit_cond_br(cond, &then_label, else_label.as_deref().unwrap_or(&merge_label));

        self.set_block(&then_label);
        self.visit_stmt(then_branch)?;
        if !self.block_terminated() {
            self.emit_br(&merge_label);
        }

        if let (Some(else_label), Some(else_branch)) = (&else_label, else_branch) {
            self.set_block(else_label);
            self.visit_stmt(else_branch)?;
            if !self.block_terminated() {
                self.emit_br(&merge_label);
            }
        }

        self.set_block(&merge_label);
        Ok(())
    }

    fn lower_while(&mut self, condition: &Expr, body: &Stmt) -> Result<(), CompileError> {
        let cond_label = self.new_block("while.cond");
        let body_label = self.new_block("while.body");
        let end_label = self.new_block("while.end");

        self.emit_br(&cond_label);
        self.set_block(&cond_label);
        self.visit_expr(condition)?;
        let cond = self.pop_value();
        let cond = self.to_i1(cond);
        self.emit_cond_br(cond, &body_label, &end_label);

        self.set_block(&body_label);
        self.visit_stmt(body)?;
        if !self.block_terminated() {
            self.emit_br(&cond_label);
        }

        self.set_block(&end_label);
        Ok(())
    }

    fn lower_for(
        &mut self,
        init: Option<&Stmt>,
        condition: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
    ) -> Result<(), CompileError> {
        // The initializer runs once, in the enclosing scope.
        if let Some(init) = init {
            self.visit_stmt(init)?;
        }

        let cond_label = self.new_block("for.cond");
        let body_label = self.new_block("for.body");
        let update_label = self.new_block("for.update");
        let end_label = self.new_block("for.end");

        self.emit_br(&cond_label);
        self.set_block(&cond_label);
        match condition {
            Some(condition) => {
                self.visit_expr(condition)?;
                let cond = self.pop_value();
                let cond = self.to_i1(cond);
                self.emit_cond_br(cond, &body_label, &end_label);
            }
            // No condition: fall straight through into the body.
            None => self.emit_br(&body_label),
        }

        self.set_block(&body_label);
        self.visit_stmt(body)?;
        if !self.block_terminated() {
            self.emit_br(&update_label);
        }

        self.set_block(&update_label);
        if let Some(update) = update {
            self.visit_expr(update)?;
            self.pop_value();
        }
        self.emit_br(&cond_label);

        self.set_block(&end_label);
        Ok(())
    }

    fn lower_return(&mut self, value: Option<&Expr>) -> Result<(), CompileError> {
        let ret_ty = self.builder.func.ret;
        let ret = match value {
            None => match ret_ty {
                Ty::I32 => Some(Value::Int(Ty::I32, 0)),
                Ty::Ptr => Some(Value::Null),
                _ => None,
            },
            Some(expr) => {
                self.visit_expr(expr)?;
                let value = self.pop_value();
                match ret_ty {
                    // Returning from `main`.
                    Ty::I32 => Some(self.to_i32(value)),
                    // Function returns are always pointers; numbers get boxed.
                    Ty::Ptr => {
                        if value.ty() == Ty::Ptr {
                            Some(value)
                        } else {
                            Some(self.box_number(value)?)
                        }
                    }
                    _ => None,
                }
            }
        };
        self.emit(Inst::Ret { val: ret });
        Ok(())
    }

    /// Wrap a number in a tagged heap cell so it can travel through a
    /// pointer-typed return.
    pub(super) fn box_number(&mut self, value: Value) -> Result<Value, CompileError> {
        let value = self.to_f64(value)?;
        let payload = self.heap_alloc(TAG_NUMBER, Value::Int(Ty::I64, 8));
        self.emit_store(value, payload.clone());
        Ok(payload)
    }

    pub(super) fn lower_function(
        &mut self,
        name: &str,
        params: &[String],
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        let ir_params: Vec<(String, Ty)> =
            params.iter().map(|p| (p.clone(), Ty::F64)).collect();
        let outer_builder = mem::replace(
            &mut self.builder,
            FuncBuilder::new(name, ir_params, Ty::Ptr, true),
        );
        // A body only sees its own bindings; top-level slots live in `main`.
        let outer_scopes = mem::replace(&mut self.scopes, ScopeStack::new());

        let result = self.lower_function_body(params, body);
        self.seal_dangling_blocks();

        let finished = mem::replace(&mut self.builder, outer_builder);
        self.scopes = outer_scopes;
        result?;

        self.verify_completed(&finished.func)?;
        self.module.functions.push(finished.func);
        Ok(())
    }

    fn lower_function_body(
        &mut self,
        params: &[String],
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        for param in params {
            let incoming = Value::Temp(param.clone(), Ty::F64);
            let slot = self.entry_alloca(&format!("{param}.addr"), Ty::F64);
            self.emit_store(incoming, slot.clone());
            self.scopes.define(
                param.clone(),
                Slot {
                    ptr: slot,
                    ty: Ty::F64,
                },
            );
        }
        for stmt in body {
            self.visit_stmt(stmt)?;
        }
        if !self.block_terminated() {
            self.emit(Inst::Ret {
                val: Some(Value::Null),
            });
        }
        Ok(())
    }
}
