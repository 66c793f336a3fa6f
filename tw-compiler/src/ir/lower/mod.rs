//! AST to IR lowering.
//!
//! The [`Lowerer`] walks the tree through the [`Visitor`] trait. Expression
//! nodes whose operands evaluate strictly in source order go through
//! [`walk_expr`], which leaves the operand values on the lowerer's internal
//! stack for the combining arm in `expr.rs`; calls and array literals
//! evaluate their own children (built-ins decide whether and when each
//! argument runs), and statements drive their own traversal around scope
//! pushes and block creation. Control flow, the built-in library and the
//! dynamic-typing machinery (slot retyping, tagged heap values, boxing)
//! live in the submodules.

mod builtins;
mod context;
mod expr;
mod stmt;

pub use context::Lowerer;

use crate::ast::{walk_expr, Expr, Program, Stmt, Visitor};
use crate::ir::Module;
use crate::CompileError;

/// Lower a parsed program to a verified IR module.
pub fn lower(program: &Program, module_name: &str) -> Result<Module, CompileError> {
    let mut lowerer = Lowerer::new(module_name);
    lowerer.visit_program(program)?;
    lowerer.finish()
}

/// Nodes whose operand values are produced by the default walk. Everything
/// else controls its own evaluation.
fn walks_operands(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Binary { .. }
            | Expr::Unary { .. }
            | Expr::Assignment { .. }
            | Expr::IndexAssignment { .. }
            | Expr::Index { .. }
    )
}

impl Visitor for Lowerer {
    type Error = CompileError;

    /// Two passes over the top level: register every function signature so
    /// bodies may call forward, then lower everything in source order.
    fn visit_program(&mut self, program: &Program) -> Result<(), CompileError> {
        self.declare_functions(program)?;
        for stmt in &program.statements {
            match stmt {
                Stmt::FunctionDeclaration { name, params, body } => {
                    self.lower_function(name, params, body)?;
                }
                other => self.visit_stmt(other)?,
            }
        }
        Ok(())
    }

    fn visit_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        if walks_operands(expr) {
            walk_expr(self, expr)?;
        }
        self.lower_expr(expr)
    }

    fn visit_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        // Do not use the default walking logic: statements interleave child
        // visits with scope and block management.
        self.lower_stmt(stmt)
    }
}
