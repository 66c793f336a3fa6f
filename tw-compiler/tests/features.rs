use tw_compiler::compile_to_ir_text;

fn ir(source: &str) -> String {
    compile_to_ir_text(source, "test").expect("program should compile")
}

// ── print ────────────────────────────────────────────────────────────────

#[test]
fn print_dispatches_on_the_operand_type() {
    let text = ir("print(1); print(\"s\"); print(true);");
    assert!(text.contains("c\"%f\\0A\\00\""), "{text}");
    assert!(text.contains("c\"%s\\0A\\00\""), "{text}");
    assert!(text.contains("c\"%d\\0A\\00\""), "{text}");
    // booleans are widened before the vararg call
    assert!(text.contains("zext i1 true to i32"), "{text}");
}

#[test]
fn print_without_arguments_emits_a_newline() {
    let text = ir("print();");
    assert!(text.contains("c\"\\0A\\00\""), "{text}");
}

#[test]
fn print_of_a_pointer_discriminates_at_runtime() {
    let text = ir("function f() { return 1; } print(f());");
    for label in ["print.str:", "print.num:", "print.done:"] {
        assert!(text.contains(label), "missing {label} in {text}");
    }
    assert!(text.contains("icmp eq i64"), "{text}");
    assert!(text.contains("getelementptr inbounds i8, ptr %t"), "{text}");
}

#[test]
fn print_with_multiple_arguments_prints_each_on_its_own_line() {
    let text = ir("print(1, 2);");
    assert_eq!(text.matches("call i32 (ptr, ...) @printf").count(), 2, "{text}");
}

// ── input ────────────────────────────────────────────────────────────────

#[test]
fn input_reads_a_line_and_strips_the_newline() {
    let text = ir("let s = input(); print(upper(s));");
    assert!(text.contains("@stdin = external global ptr"), "{text}");
    assert!(text.contains("declare ptr @fgets(ptr, i32, ptr)"), "{text}");
    assert!(text.contains("alloca [1032 x i8]"), "{text}");
    assert!(text.contains("i32 1024"), "{text}");
    for label in ["input.trim:", "input.done:"] {
        assert!(text.contains(label), "missing {label} in {text}");
    }
    // newline byte compare and NUL overwrite
    assert!(text.contains("icmp eq i8"), "{text}");
    assert!(text.contains("store i8 0"), "{text}");
}

// ── numeric conversions ──────────────────────────────────────────────────

#[test]
fn str_formats_through_snprintf() {
    let text = ir("let s = str(3.5); print(s);");
    assert!(text.contains("alloca [40 x i8]"), "{text}");
    assert!(text.contains("c\"%g\\00\""), "{text}");
    assert!(text.contains("i64 32"), "{text}");
}

#[test]
fn num_and_int_use_the_c_parsers() {
    let text = ir("let a = num(\"1.5\"); let b = int(\"7\"); print(a + b);");
    assert!(text.contains("call double @atof(ptr"), "{text}");
    assert!(text.contains("call i32 @atoi(ptr"), "{text}");
    assert!(text.contains("sitofp i32"), "{text}");
}

// ── math builtins ────────────────────────────────────────────────────────

#[test]
fn abs_pow_sqrt_call_libm() {
    let text = ir("print(abs(-1)); print(pow(2, 10)); print(sqrt(2));");
    assert!(text.contains("call double @fabs(double"), "{text}");
    assert!(text.contains("call double @pow(double"), "{text}");
    assert!(text.contains("call double @sqrt(double"), "{text}");
    assert!(text.contains("fneg double"), "{text}");
}

#[test]
fn round_with_precision_scales_by_a_power_of_ten() {
    let text = ir("print(round(3.14159, 2));");
    assert!(
        text.contains("call double @pow(double 1.0e1, double 2.0e0)"),
        "{text}"
    );
    assert!(text.contains("call double @round(double"), "{text}");
    assert!(text.contains("fdiv double"), "{text}");
}

#[test]
fn min_max_fold_with_select() {
    let text = ir("print(min(3, 1, 2)); print(max(3, 1, 2));");
    assert!(text.contains("fcmp olt double"), "{text}");
    assert!(text.contains("fcmp ogt double"), "{text}");
    assert!(text.matches("select i1").count() >= 4, "{text}");
}

// ── random ───────────────────────────────────────────────────────────────

#[test]
fn random_is_a_lazily_seeded_lcg() {
    let text = ir("print(random());");
    assert!(text.contains("@rng.seed = internal global i64 0"), "{text}");
    assert!(text.contains("@rng.seeded = internal global i1 false"), "{text}");
    for label in ["rand.seed:", "rand.next:"] {
        assert!(text.contains(label), "missing {label} in {text}");
    }
    assert!(text.contains("mul i64 %t"), "{text}");
    assert!(text.contains("1664525"), "{text}");
    assert!(text.contains("1013904223"), "{text}");
    assert!(text.contains("lshr i64"), "{text}");
    assert!(text.contains("fdiv double %t"), "{text}");
    assert!(text.contains("4.294967296e9"), "{text}");
    // seed mixes time with a stack address
    assert!(text.contains("call i64 @time(ptr null)"), "{text}");
    assert!(text.contains("ptrtoint ptr %rand.entropy to i64"), "{text}");
    assert!(text.contains("xor i64"), "{text}");
}

#[test]
fn rng_globals_are_declared_once() {
    let text = ir("print(random()); print(random());");
    assert_eq!(text.matches("@rng.seed = internal").count(), 1, "{text}");
}

// ── arrays ───────────────────────────────────────────────────────────────

#[test]
fn array_literal_stores_count_tag_and_cells() {
    let text = ir("let a = [10, 20, 30]; print(a[1]); print(len(a));");
    // count cell, tag word, then three element stores
    assert!(text.contains("store double 3.0e0"), "{text}");
    assert!(text.contains("store i64 3"), "{text}");
    assert!(text.contains("store double 1.0e1"), "{text}");
    assert!(text.contains("store double 2.0e1"), "{text}");
    assert!(text.contains("store double 3.0e1"), "{text}");
    // indexing converts the index to i64 cell offsets
    assert!(text.contains("fptosi double 1.0e0 to i64"), "{text}");
}

#[test]
fn len_discriminates_strings_from_arrays() {
    let text = ir("let a = [1]; print(len(a)); print(len(\"abc\"));");
    for label in ["len.str:", "len.arr:", "len.done:"] {
        assert!(text.contains(label), "missing {label} in {text}");
    }
    // array count lives two cells before element 0
    assert!(
        text.contains("getelementptr inbounds double, ptr %t"),
        "{text}"
    );
    assert!(text.contains("i64 -2"), "{text}");
    assert!(text.contains("call i64 @strlen(ptr"), "{text}");
    assert!(text.contains("uitofp i64"), "{text}");
}

#[test]
fn append_copies_into_a_longer_array() {
    let text = ir("let a = [1, 2, 3]; let b = append(a, 4); print(len(a)); print(len(b));");
    for label in ["append.cond:", "append.body:", "append.done:"] {
        assert!(text.contains(label), "missing {label} in {text}");
    }
    assert!(text.contains("fadd double %t"), "{text}");
}

#[test]
fn index_assignment_stores_through_a_gep() {
    let text = ir("let a = [1, 2]; a[0] = 9; print(a[0]);");
    assert!(text.contains("store double 9.0e0, ptr %t"), "{text}");
}

// ── string builtins ──────────────────────────────────────────────────────

#[test]
fn upper_and_lower_fold_the_ascii_letter_range() {
    let text = ir("print(upper(\"abc\")); print(lower(\"ABC\"));");
    for label in [
        "upper.cond:",
        "upper.body:",
        "upper.done:",
        "lower.cond:",
        "lower.body:",
        "lower.done:",
    ] {
        assert!(text.contains(label), "missing {label} in {text}");
    }
    assert!(text.contains("icmp sge i8"), "{text}");
    assert!(text.contains("icmp sle i8"), "{text}");
    assert!(text.contains("sub i8"), "{text}");
    assert!(text.contains("add i8"), "{text}");
    assert!(text.contains("select i1"), "{text}");
}

#[test]
fn includes_uses_strstr_for_string_needles() {
    let text = ir("print(includes(\"hello\", \"ell\"));");
    assert!(text.contains("call ptr @strstr(ptr"), "{text}");
    assert!(text.contains("icmp ne ptr"), "{text}");
    assert!(text.contains("uitofp i1"), "{text}");
}

#[test]
fn includes_scans_arrays_for_numeric_needles() {
    let text = ir("let a = [1, 2, 3]; print(includes(a, 2));");
    for label in [
        "incl.cond:",
        "incl.body:",
        "incl.hit:",
        "incl.next:",
        "incl.done:",
    ] {
        assert!(text.contains(label), "missing {label} in {text}");
    }
    assert!(text.contains("fcmp oeq double"), "{text}");
}

#[test]
fn replace_builds_the_result_from_prefix_replacement_suffix() {
    let text = ir("print(replace(\"aXb\", \"X\", \"Y\"));");
    for label in ["repl.miss:", "repl.hit:", "repl.done:"] {
        assert!(text.contains(label), "missing {label} in {text}");
    }
    assert!(text.contains("declare ptr @strncpy(ptr, ptr, i64)"), "{text}");
    assert!(text.contains("ptrtoint ptr"), "{text}");
    // prefix is NUL-patched before the strcats
    assert!(text.contains("store i8 0"), "{text}");
    assert_eq!(text.matches("call ptr @strcat").count(), 2, "{text}");
}

// ── logic ────────────────────────────────────────────────────────────────

#[test]
fn logical_operators_coerce_to_i1() {
    let text = ir("print(1 && 0); print(0 || 2); print(!1);");
    assert!(text.contains("fcmp one double"), "{text}");
    assert!(text.contains("and i1"), "{text}");
    assert!(text.contains("or i1"), "{text}");
    assert!(text.contains("xor i1"), "{text}");
}

#[test]
fn equality_on_two_pointers_compares_identity() {
    let text = ir("let a = \"x\"; let b = \"y\"; print(a == b);");
    assert!(text.contains("icmp eq ptr"), "{text}");
}

// ── scenario table ───────────────────────────────────────────────────────

#[test]
fn the_end_to_end_scenarios_all_lower() {
    let scenarios = [
        "let x = 2 + 3 * 4; print(x);",
        "let a = [10, 20, 30]; print(a[1]); print(len(a));",
        "print(\"hello\" + \" \" + \"world\");",
        "function fact(n){ if (n<2) { return 1; } return n * num(str(fact(n-1))); } print(fact(5));",
        "let s = input(); print(upper(s));",
        "let a = [1,2,3]; let b = append(a, 4); print(len(a)); print(len(b));",
    ];
    for source in scenarios {
        assert!(
            tw_compiler::compile_to_ir(source, "test").is_ok(),
            "scenario failed to lower: {source}"
        );
    }
}
