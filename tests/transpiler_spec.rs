use puppy::compiler::{compile, PuppyCode};

fn compile_ok(src: &str) -> PuppyCode {
    let code = compile(src);
    assert!(
        code.errors.is_empty(),
        "unexpected errors for {:?}: {:?}",
        src,
        code.errors
    );
    code
}

fn assert_error(src: &str, key: &str) -> PuppyCode {
    let code = compile(src);
    assert!(
        code.errors.iter().any(|e| e.key == key),
        "expected {} error for {:?}, got {:?}",
        key,
        src,
        code.errors
    );
    code
}

fn assert_warning(src: &str, key: &str) -> PuppyCode {
    let code = compile(src);
    assert!(
        code.warnings.iter().any(|w| w.key == key),
        "expected {} warning for {:?}, got {:?}",
        key,
        src,
        code.warnings
    );
    code
}

// -- name resolution and overloads ------------------------------------------

#[test]
fn test_arity_selects_overload() {
    let code = compile_ok("a = max(1, 2)\nb = max([1, 2, 3])\n");
    assert!(code.main.contains("Math.max(1, 2)"));
    assert!(code.main.contains("lib.listMax([1, 2, 3])"));
}

#[test]
fn test_range_overloads() {
    let code = compile_ok("a = range(5)\nb = range(0, 10)\nc = range(0, 10, 2)\n");
    assert_eq!(code.main.matches("lib.range(").count(), 3);
}

#[test]
fn test_undefined_function_reported_on_name() {
    let code = assert_error("nosuchfn(1)\n", "UndefinedFunction");
    assert_eq!(code.errors[0].subject, "nosuchfn");
}

#[test]
fn test_auto_import_on_first_use() {
    let code = compile_ok("c = Circle(100, 100, 50)\n");
    assert!(code.main.contains("lib.Circle(100, 100, 50)"));
    assert!(code.notices.iter().any(|n| n.key == "InferredPackage"));
}

#[test]
fn test_explicit_import_and_members() {
    let code = compile_ok("import math\nx = math.pi\ny = math.sin(0)\n");
    assert!(code.main.contains("Math.PI"));
    assert!(code.main.contains("Math.sin(0)"));
}

#[test]
fn test_unknown_package_is_error() {
    assert_error("import nosuchpkg\n", "UnknownPackageName");
}

#[test]
fn test_missing_arguments() {
    assert_error("c = Circle(100)\n", "MissingArguments");
}

#[test]
fn test_extra_arguments_warn_but_stay_in_call() {
    let code = assert_warning("print(1, 2, 3)\n", "TooManyArguments");
    assert!(code.errors.is_empty());
    // surplus arguments are still emitted, not silently dropped
    assert!(code.main.contains("lib.print(1, 2, 3);"));
}

#[test]
fn test_keyword_options_record() {
    let code = compile_ok("c = Circle(50, 50, 20, color='red')\n");
    assert!(code.main.contains("{ 'color': 'red' }"));
}

// -- statement-level error isolation ----------------------------------------

#[test]
fn test_bad_statement_does_not_stop_compilation() {
    let code = compile("x = 1\ny = nosuch\nz = 3\n");
    assert_eq!(code.errors.len(), 1);
    assert!(code.main.contains("vars['x'] = 1;"));
    assert!(code.main.contains("vars['z'] = 3;"));
    assert!(!code.main.contains("vars['y']"));
}

#[test]
fn test_syntax_error_recovers_at_next_line() {
    let code = compile("x = 1\ny = = 2\nz = 3\n");
    assert!(code.errors.iter().any(|e| e.key == "SyntaxError"));
    assert!(code.main.contains("vars['x'] = 1;"));
    assert!(code.main.contains("vars['z'] = 3;"));
}

// -- emission conventions ----------------------------------------------------

#[test]
fn test_print_literal_round_trip() {
    let code = compile_ok("print('hello')\n");
    assert!(code.main.contains("lib.print('hello');"));
}

#[test]
fn test_print_overload_by_arity_keeps_quoting() {
    let code = compile_ok("print(\"hello,world\")\nprint(1, 2)\n");
    assert!(code.main.contains("lib.print(\"hello,world\");"));
    // two arguments select the two-argument overload, so no surplus warning
    assert!(code.main.contains("lib.print(1, 2);"));
    assert!(code.warnings.is_empty(), "unexpected: {:?}", code.warnings);
}

#[test]
fn test_operator_lowering() {
    let code = compile_ok("a = 7 / 2\nb = 7 // 2\nc = 2 ** 8\nd = 1 != 2\ne = 1 == 2\n");
    assert!(code.main.contains("(7 / 2)"));
    assert!(code.main.contains("((7 / 2) | 0)"));
    assert!(code.main.contains("Math.pow(2, 8)"));
    assert!(code.main.contains("(1 !== 2)"));
    assert!(code.main.contains("(1 === 2)"));
}

#[test]
fn test_division_compare_lowering() {
    let code = compile_ok("x = 1/2 != 1//3\n");
    assert!(code.main.contains("((1 / 2) !== ((1 / 3) | 0))"));
}

#[test]
fn test_boolean_operator_shape() {
    let code = compile_ok("x = not 1 == 2 and 1 > 3\n");
    assert!(code.main.contains("(!((1 === 2)) && (1 > 3))"));
}

#[test]
fn test_string_concat_stays_plain() {
    let code = compile_ok("s = 'a' + 'b'\n");
    assert!(code.main.contains("('a' + 'b')"));
    assert!(!code.main.contains("anyAdd"));
}

#[test]
fn test_dynamic_add_uses_helper() {
    let code = compile_ok("def f(a, b):\n    return a + b\n");
    // untyped parameters fall back to the dynamic helper
    assert!(code.main.contains("lib.anyAdd(a, b)"));
}

#[test]
fn test_list_elements_unify() {
    let code = compile_ok("xs = [1, 2, 3]\n");
    assert!(code.main.contains("[1, 2, 3]"));
}

#[test]
fn test_heterogeneous_list_is_error() {
    let code = assert_error("xs = [1, 'a']\n", "TypeError");
    assert!(!code.main.contains("vars['xs']"));
}

#[test]
fn test_ternary_arms_must_agree() {
    let code = compile_ok("x = 1 if 2 > 1 else 3\n");
    assert!(code.main.contains("((2 > 1) ? 1 : 3)"));
    assert_error("y = 1 if 2 > 1 else 'a'\n", "TypeError");
}

#[test]
fn test_vec2_tuple_sugar() {
    let code = compile_ok("v = (1, 2)\n");
    assert!(code.main.contains("lib.vec2(1, 2)"));
}

#[test]
fn test_fstring_lowering() {
    let code = compile_ok("name = 'ai'\nprint(f'hi {name}!')\n");
    assert!(code.main.contains("'hi ' + lib.str(vars['name']) + '!'"));
}

#[test]
fn test_index_carries_codemap_reference() {
    let code = compile_ok("xs = [1, 2]\ny = xs[0]\n");
    assert!(code.main.contains("lib.index(vars['xs'], 0, codemap["));
    assert!(!code.codemap.is_empty());
}

#[test]
fn test_setindex_on_assignment_target() {
    let code = compile_ok("xs = [1, 2]\nxs[0] = 9\n");
    assert!(code.main.contains("lib.setindex(vars['xs'], 0, 9, codemap["));
}

#[test]
fn test_slice_lowering() {
    let code = compile_ok("xs = [1, 2, 3]\nys = xs[1:2]\nzs = xs[1:]\n");
    assert!(code.main.contains("lib.slice(vars['xs'], 1, 2)"));
    assert!(code.main.contains("lib.slice(vars['xs'], 1, undefined)"));
}

#[test]
fn test_field_access_lowering() {
    let code = compile_ok("c = Circle(10, 10, 5)\nc.x = 20\ny = c.x\n");
    assert!(code.main.contains("lib.setattr(vars['c'], 'x', 20);"));
    assert!(code.main.contains("lib.getattr(vars['c'], 'x')"));
}

// -- cooperative yields ------------------------------------------------------

#[test]
fn test_statement_yields_once_per_row() {
    let code = compile_ok("x = 1\ny = 2\n");
    assert_eq!(code.main.matches("yield 1200;").count(), 1);
    assert_eq!(code.main.matches("yield 2200;").count(), 1);
}

#[test]
fn test_while_gets_gated_sync_yield() {
    let code = compile_ok("i = 0\nwhile i < 3:\n    i = i + 1\n");
    assert!(code.main.contains("var _sync0 = 0;"));
    assert!(code.main.contains("% 16 === 0) { yield 2000; }"));
}

#[test]
fn test_loop_body_has_no_statement_yields() {
    let code = compile_ok("i = 0\nwhile i < 3:\n    i = i + 1\n");
    // the gated sync yield stands in for per-statement yields, so the
    // body must not also suspend on every iteration
    assert!(!code.main.contains("yield 3200;"));
    assert!(code.main.contains("yield 2200;"));
}

#[test]
fn test_no_statement_yields_inside_functions() {
    let code = compile_ok("def f():\n    x = 1\n    return x\n");
    assert!(!code.main.contains("yield 2200;"));
    assert!(!code.main.contains("yield 3200;"));
}

#[test]
fn test_sync_function_becomes_generator_and_call_delegates() {
    let src = "def f(n):\n    i = 0\n    while i < n:\n        i = i + 1\n    return i\nx = f(3)\n";
    let code = compile_ok(src);
    assert!(code.main.contains("vars['f'] = function* (n) {"));
    assert!(code.main.contains("vars['x'] = (yield* vars['f'](3));"));
}

#[test]
fn test_plain_function_stays_plain() {
    let code = compile_ok("def f(a):\n    return a\nx = f(1)\n");
    assert!(code.main.contains("vars['f'] = function (a) {"));
    assert!(code.main.contains("vars['x'] = vars['f'](1);"));
}

// -- scoping -----------------------------------------------------------------

#[test]
fn test_top_level_vars_are_global() {
    let code = compile_ok("x = 1\nx = x + 1\n");
    assert!(code.main.contains("vars['x'] = 1;"));
    assert!(code.main.contains("vars['x'] = (vars['x'] + 1);"));
}

#[test]
fn test_function_locals_are_bare_names() {
    let code = compile_ok("x = 1\ndef f(a):\n    y = a\n    return y\n");
    assert!(code.main.contains("var y = a;"));
    assert!(!code.main.contains("vars['y']"));
}

#[test]
fn test_assignment_in_function_shadows_global() {
    let code = compile_ok("x = 1\ndef f():\n    x = 2\n    return x\n");
    // Python semantics: the inner assignment declares a new local
    assert!(code.main.contains("var x = 2;"));
    assert!(code.main.contains("return x;"));
}

#[test]
fn test_global_read_from_function() {
    let code = compile_ok("x = 1\ndef f():\n    return x + 0\n");
    assert!(code.main.contains("return (vars['x'] + 0);"));
}

#[test]
fn test_non_ascii_locals_renamed_with_comment() {
    let code = compile_ok("def f():\n    \u{91cd}\u{3055} = 1\n    return \u{91cd}\u{3055}\n");
    assert!(code.main.contains("/*\u{91cd}\u{3055}*/"));
    assert!(code.main.contains("var _v"));
}

#[test]
fn test_non_ascii_globals_keep_vars_key() {
    let code = compile_ok("\u{91cd}\u{3055} = 1\n");
    assert!(code.main.contains("vars['\u{91cd}\u{3055}'] = 1;"));
}

// -- diagnostics -------------------------------------------------------------

#[test]
fn test_zenkaku_number_normalized_with_warning() {
    let code = assert_warning("x = \u{ff11}\u{ff12}\n", "Zenkaku");
    assert!(code.main.contains("vars['x'] = 12;"));
}

#[test]
fn test_builtin_names_are_immutable() {
    assert_error("print = 1\n", "Immutable");
}

#[test]
fn test_reassignment_type_mismatch() {
    assert_error("x = 1\nx = 'a'\n", "TypeError");
}

#[test]
fn test_binary_type_error_blames_right_operand() {
    let code = assert_error("x = 1 - 'a'\n", "BinaryTypeError");
    assert!(code.errors[0].params.contains(&"-".to_string()));
}

#[test]
fn test_condition_must_check_against_boolean() {
    let code = assert_error("if 'a':\n    x = 1\n", "TypeError");
    assert!(!code.main.contains("if ('a')"));
    assert_error("while 1:\n    x = 1\n", "TypeError");
}

#[test]
fn test_declared_return_type_requires_a_return() {
    assert_error("def f() -> number:\n    pass\n", "TypeError");
    compile_ok("def g() -> number:\n    return 1\n");
}

#[test]
fn test_return_outside_function_warns() {
    let code = assert_warning("return 1\n", "OnlyInFunction");
    assert!(!code.main.contains("return 1;"));
}

#[test]
fn test_break_outside_loop_warns() {
    let code = assert_warning("break\n", "OnlyInLoop");
    assert!(!code.main.contains("break;"));
}

#[test]
fn test_undefined_method() {
    assert_error("xs = [1]\nxs.explode()\n", "UndefinedMethod");
}

#[test]
fn test_unsupported_builtin() {
    assert_error("s = input()\n", "Unsupported");
}

#[test]
fn test_unknown_option_key_warns() {
    assert_warning("c = Circle(1, 2, 3, frobnicate=1)\n", "UnknownName");
}
