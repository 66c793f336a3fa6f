use tw_compiler::{compile_to_ir, CompileError, LoweringErrorKind};

// ── Lowering error detection ─────────────────────────────────────────────
// Each test verifies that an invalid program produces the correct kind.

fn lowering_kind(source: &str) -> LoweringErrorKind {
    match compile_to_ir(source, "test") {
        Err(CompileError::Lowering { kind, .. }) => kind,
        Ok(_) => panic!("expected a lowering error, but {source:?} compiled"),
        Err(other) => panic!("expected a lowering error, got {other:?}"),
    }
}

#[test]
fn undefined_variable() {
    assert_eq!(
        lowering_kind("print(missing);"),
        LoweringErrorKind::UndefinedVariable
    );
}

#[test]
fn undefined_function() {
    assert_eq!(
        lowering_kind("let x = foo();"),
        LoweringErrorKind::UndefinedFunction
    );
}

#[test]
fn builtin_arity_violations() {
    for source in [
        "str(1, 2);",
        "num();",
        "len();",
        "min(1);",
        "random(1);",
        "round();",
        "pow(2);",
        "replace(\"a\", \"b\");",
    ] {
        assert_eq!(
            lowering_kind(source),
            LoweringErrorKind::InvalidArity,
            "for {source:?}"
        );
    }
}

#[test]
fn user_function_arity_mismatch() {
    assert_eq!(
        lowering_kind("function add(a, b) { return a + b; } add(1, 2, 3);"),
        LoweringErrorKind::InvalidArity
    );
    assert_eq!(
        lowering_kind("function add(a, b) { return a + b; } add(1);"),
        LoweringErrorKind::InvalidArity
    );
}

#[test]
fn pointer_operands_are_rejected_where_numbers_are_required() {
    for source in [
        "let x = \"a\" - 1;",
        "let x = \"a\" * \"b\";",
        "let x = -\"a\";",
        "let x = \"a\" < 1;",
        "num(5);",
        "let a = [\"s\"];",
        "function f(a) { return a; } f(\"s\");",
    ] {
        assert_eq!(
            lowering_kind(source),
            LoweringErrorKind::InvalidOperand,
            "for {source:?}"
        );
    }
}

#[test]
fn nested_function_declarations_are_rejected() {
    assert_eq!(
        lowering_kind("function outer() { function inner() { return 1; } return 2; }"),
        LoweringErrorKind::NestedFunction
    );
}

#[test]
fn duplicate_definitions_are_rejected() {
    assert_eq!(
        lowering_kind("function f() { return 1; } function f() { return 2; }"),
        LoweringErrorKind::DuplicateDefinition
    );
    assert_eq!(
        lowering_kind("function f(a, a) { return a; }"),
        LoweringErrorKind::DuplicateDefinition
    );
    assert_eq!(
        lowering_kind("function main() { return 1; }"),
        LoweringErrorKind::DuplicateDefinition
    );
}

// ── Front-end failures ───────────────────────────────────────────────────

#[test]
fn missing_semicolon_fails_the_compile() {
    match compile_to_ir("let x = 5", "test") {
        Err(CompileError::Parse(count)) => assert_eq!(count, 1),
        other => panic!("expected a parse failure, got {other:?}"),
    }
}

#[test]
fn parse_recovery_reports_multiple_errors() {
    match compile_to_ir("let = 1; let = 2; let ok = 3;", "test") {
        Err(CompileError::Parse(count)) => assert_eq!(count, 2),
        other => panic!("expected a parse failure, got {other:?}"),
    }
}

#[test]
fn unterminated_string_fails_the_compile() {
    match compile_to_ir("let s = \"abc", "test") {
        Err(CompileError::Lex(count)) => assert_eq!(count, 1),
        other => panic!("expected a lex failure, got {other:?}"),
    }
}

#[test]
fn unknown_character_fails_the_compile() {
    assert!(matches!(
        compile_to_ir("let x = 1 @ 2;", "test"),
        Err(CompileError::Lex(1))
    ));
}

#[test]
fn lowering_errors_carry_a_message() {
    match compile_to_ir("print(missing);", "test") {
        Err(err @ CompileError::Lowering { .. }) => {
            assert_eq!(err.to_string(), "Undefined variable: missing");
        }
        other => panic!("expected a lowering error, got {other:?}"),
    }
}
