pub mod ast;
pub mod frontend;
pub mod ir;

use std::fmt;
use thiserror::Error;

/// Classification of errors raised while lowering the AST to IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoweringErrorKind {
    UndefinedVariable,
    UndefinedFunction,
    InvalidArity,
    InvalidOperand,
    NestedFunction,
    DuplicateDefinition,
}

impl fmt::Display for LoweringErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoweringErrorKind::UndefinedVariable => "undefined variable",
            LoweringErrorKind::UndefinedFunction => "undefined function",
            LoweringErrorKind::InvalidArity => "invalid arity",
            LoweringErrorKind::InvalidOperand => "invalid operand",
            LoweringErrorKind::NestedFunction => "nested function",
            LoweringErrorKind::DuplicateDefinition => "duplicate definition",
        };
        write!(f, "{s}")
    }
}

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("lexical analysis failed with {0} error(s)")]
    Lex(usize),

    #[error("parsing failed with {0} error(s)")]
    Parse(usize),

    #[error("{message}")]
    Lowering {
        kind: LoweringErrorKind,
        message: String,
    },

    #[error("module verification failed: {0}")]
    Verify(String),
}

impl CompileError {
    pub fn lowering(kind: LoweringErrorKind, message: impl Into<String>) -> Self {
        CompileError::Lowering {
            kind,
            message: message.into(),
        }
    }
}

/// Compile Twine source text into a verified IR module.
///
/// Lexer and parser diagnostics are printed to stderr as they occur; the
/// returned error only carries the counts. Lowering and verifier errors are
/// fatal on first occurrence.
pub fn compile_to_ir(source: &str, module_name: &str) -> Result<ir::Module, CompileError> {
    let mut lexer = frontend::lexer::Lexer::new(source);
    let tokens = lexer.tokenize();
    let lex_errors = lexer.error_count();

    let mut parser = frontend::parser::Parser::new(tokens);
    let parsed = parser.parse();

    if lex_errors > 0 {
        return Err(CompileError::Lex(lex_errors));
    }
    let program = parsed.map_err(CompileError::Parse)?;

    ir::lower::lower(&program, module_name)
}

/// Compile Twine source text directly to a textual IR module.
pub fn compile_to_ir_text(source: &str, module_name: &str) -> Result<String, CompileError> {
    Ok(compile_to_ir(source, module_name)?.to_string())
}
