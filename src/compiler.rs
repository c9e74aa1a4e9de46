/// Compile driver: source text in, `PuppyCode` artifact out.
///
/// The pipeline is lex+parse (with statement-level recovery), a fresh
/// environment per compilation, tree-walking transpilation, wrapping the
/// emitted body in the generator-routine template, and a structural
/// validation pass over the generated text. Compilation itself never fails;
/// everything wrong with the program lands in the artifact's event lists.
use crate::env::{Env, SourceToken};
use crate::messages::{EventKind, SourceEvent};
use crate::parser;
use crate::transpiler;

#[derive(Debug)]
pub struct PuppyCode {
    /// Complete generator routine, ready for the host to load.
    pub main: String,
    /// Raw emitted body, without the wrapper.
    pub code: String,
    pub errors: Vec<SourceEvent>,
    pub warnings: Vec<SourceEvent>,
    pub notices: Vec<SourceEvent>,
    /// Source positions referenced by emitted runtime checks.
    pub codemap: Vec<SourceToken>,
}

impl PuppyCode {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn compile(source: &str) -> PuppyCode {
    let (tree, parse_events) = parser::parse_source(source);
    let mut env = Env::new();
    let mut body = String::new();
    // the root node never cancels; statement-level recovery happens below it
    let _ = transpiler::conv(&mut env, &tree, &mut body);

    let main = format!(
        "function* (puppy, codemap) {{\n  var lib = puppy.lib;\n  var vars = puppy.vars;\n{}  return 0;\n}}",
        body
    );

    let mut errors = parse_events;
    errors.append(&mut env.errors);
    if let Err(msg) = check_structure(&main) {
        errors.push(SourceEvent::at(
            EventKind::Error,
            "CompileError",
            0,
            1,
            1,
            0,
            "",
            vec![msg],
        ));
    }

    PuppyCode {
        main,
        code: body,
        errors,
        warnings: env.warnings,
        notices: env.notices,
        codemap: env.codemap,
    }
}

/// Delimiter-balance scan over the generated routine, skipping string
/// literals and comments. A failure here is a transpiler bug surfacing, so
/// it is reported as a `CompileError` rather than blamed on the program.
fn check_structure(code: &str) -> Result<(), String> {
    let mut stack: Vec<char> = Vec::new();
    let mut chars = code.chars().peekable();
    let mut in_str: Option<char> = None;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if let Some(q) = in_str {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                in_str = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => in_str = Some(c),
            '/' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    let mut prev = ' ';
                    for c2 in chars.by_ref() {
                        if prev == '*' && c2 == '/' {
                            break;
                        }
                        prev = c2;
                    }
                }
            }
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(open) {
                    return Err(format!("unbalanced '{}'", c));
                }
            }
            _ => {}
        }
    }
    if in_str.is_some() {
        return Err("unterminated string literal".to_string());
    }
    if let Some(open) = stack.pop() {
        return Err(format!("unclosed '{}'", open));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structure_accepts_balanced_code() {
        assert!(check_structure("function* () { var x = [1, (2)]; }").is_ok());
    }

    #[test]
    fn test_structure_skips_strings_and_comments() {
        assert!(check_structure("var s = '}('; /* ) */ var t = \"[\";").is_ok());
    }

    #[test]
    fn test_structure_rejects_mismatch() {
        assert!(check_structure("function () { (]").is_err());
        assert!(check_structure("{ [ }").is_err());
        assert!(check_structure("( ( )").is_err());
    }

    #[test]
    fn test_compile_wraps_body() {
        let code = compile("x = 1\n");
        assert!(code.ok());
        assert!(code.main.starts_with("function* (puppy, codemap) {"));
        assert!(code.main.contains("var lib = puppy.lib;"));
        assert!(code.main.contains("var vars = puppy.vars;"));
        assert!(code.main.trim_end().ends_with('}'));
        assert!(code.main.contains("return 0;"));
        assert!(code.main.contains(&code.code));
    }

    #[test]
    fn test_lexer_failure_becomes_syntax_error() {
        let code = compile("x = 'abc\n");
        assert!(!code.ok());
        assert_eq!(code.errors[0].key, "SyntaxError");
    }
}
