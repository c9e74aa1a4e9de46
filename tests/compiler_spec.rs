use puppy::compiler::compile;

#[test]
fn test_artifact_shape() {
    let code = compile("x = 1\n");
    assert!(code.ok());
    assert!(code.main.starts_with("function* (puppy, codemap) {"));
    assert!(code.main.contains(&code.code));
    assert!(code.main.contains("return 0;"));
    assert!(code.errors.is_empty());
    assert!(code.warnings.is_empty());
}

#[test]
fn test_empty_source_still_produces_routine() {
    let code = compile("");
    assert!(code.ok());
    assert!(code.main.contains("var lib = puppy.lib;"));
    assert!(code.main.contains("return 0;"));
}

#[test]
fn test_comment_only_source() {
    let code = compile("# nothing here\n\n# still nothing\n");
    assert!(code.ok());
}

#[test]
fn test_generated_text_is_structurally_valid() {
    // a program touching most emission paths must pass the balance check,
    // which would otherwise surface as a CompileError
    let src = "\
import math
gravity = -9.8
setGravity(0, gravity)
balls = []
i = 0
while i < 8:
    c = Circle(50 + i * 40, 100, 10, color='red')
    balls.append(c)
    i += 1
def total_x(bs):
    s = 0
    for b in bs:
        s = s + b.x
    return s
print(f'total: {total_x(balls)}')
";
    let code = compile(src);
    assert!(
        !code.errors.iter().any(|e| e.key == "CompileError"),
        "structural validation failed: {:?}",
        code.errors
    );
    assert!(code.ok(), "unexpected errors: {:?}", code.errors);
    assert!(code.main.contains("lib.setGravity(0, vars['gravity'])"));
    assert!(code.main.contains("lib.append(vars['balls'], "));
}

#[test]
fn test_all_diagnostics_carry_positions() {
    let code = compile("x = 1\ny = nosuch\n");
    for e in &code.errors {
        assert!(e.row >= 1);
        assert!(e.col >= 1);
    }
    assert_eq!(code.errors[0].row, 2);
}

#[test]
fn test_codemap_entries_are_deduplicated() {
    // an augmented index assignment reads and writes through one source span
    let code = compile("xs = [1, 2]\nxs[0] += 5\n");
    assert!(code.ok(), "unexpected errors: {:?}", code.errors);
    assert!(code.main.contains("lib.index(vars['xs'], 0, codemap[0])"));
    assert!(code.main.contains("lib.setindex(vars['xs'], 0, "));
    assert_eq!(code.codemap.len(), 1);
}

#[test]
fn test_notices_do_not_fail_compilation() {
    let code = compile("c = Circle(10, 10, 5)\n");
    assert!(code.ok());
    assert!(!code.notices.is_empty());
}
