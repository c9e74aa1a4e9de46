/// Source-anchored diagnostic events and their human-readable rendering.
///
/// Events are plain data accumulated during one compilation; nothing in the
/// compiler throws them. Rendering looks up a per-key template, substitutes
/// positional parameters (each parameter is itself looked up as a key first,
/// falling back to its literal text), and appends a "possible causes" hint
/// list where one exists. Rendering never fails: an unknown key degrades to
/// showing the raw key and parameters.
use std::time::{SystemTime, UNIX_EPOCH};

use crate::tree::ParseTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Error,
    Warning,
    Notice,
    Info,
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Error => "error",
            EventKind::Warning => "warning",
            EventKind::Notice => "notice",
            EventKind::Info => "info",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceEvent {
    pub kind: EventKind,
    pub key: String,
    pub time: u64,
    pub subject: String,
    pub pos: usize,
    pub row: usize,
    pub col: usize,
    pub len: usize,
    pub params: Vec<String>,
}

impl SourceEvent {
    pub fn new(kind: EventKind, key: impl Into<String>, t: &ParseTree, params: Vec<String>) -> Self {
        let (pos, row, col) = t.begin();
        SourceEvent {
            kind,
            key: key.into(),
            time: now_millis(),
            subject: t.tokenize().to_string(),
            pos,
            row,
            col,
            len: t.length(),
            params,
        }
    }

    pub fn at(
        kind: EventKind,
        key: impl Into<String>,
        pos: usize,
        row: usize,
        col: usize,
        len: usize,
        subject: impl Into<String>,
        params: Vec<String>,
    ) -> Self {
        SourceEvent {
            kind,
            key: key.into(),
            time: now_millis(),
            subject: subject.into(),
            pos,
            row,
            col,
            len,
            params,
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Message templates
// ---------------------------------------------------------------------------

/// `(template, hints)`. `{0}`, `{1}`, ... are positional parameter slots.
fn template(key: &str) -> Option<(&'static str, &'static [&'static str])> {
    let t: (&'static str, &'static [&'static str]) = match key {
        "SyntaxError" => ("Syntax error", &["Check the spelling and indentation of this line"]),
        "UndefinedParseTree" => ("Unsupported syntax ({0})", &[]),
        "UndefinedName" => ("Undefined name: {0}", &["The variable may not be assigned yet"]),
        "UndefinedFunction" => (
            "Undefined function: {0}",
            &["The function may be misspelled", "A package import may be missing"],
        ),
        "UndefinedMethod" => ("Undefined method: {0}", &[]),
        "UnknownPackageName" => ("Unknown package: {0}", &[]),
        "TypeError" => ("Type mismatch: expected {0}, but found {1}", &[]),
        "BinaryTypeError" => (
            "The right side of {0} must be {1}, but found {2}",
            &[],
        ),
        "MissingArguments" => ("Too few arguments for {0}: at least {1} required", &[]),
        "TooManyArguments" => ("Extra arguments for {0} are ignored", &[]),
        "Immutable" => ("{0} cannot be reassigned", &[]),
        "UnknownName" => ("Unknown name: {0}", &[]),
        "InferredPackage" => ("Imported package {0} automatically", &[]),
        "Zenkaku" => (
            "Full-width number {0} was read as {1}",
            &["Prefer half-width digits"],
        ),
        "Unsupported" => ("{0} is not supported in Puppy", &[]),
        "OnlyInFunction" => ("'{0}' does nothing outside a function", &[]),
        "OnlyInLoop" => ("'{0}' does nothing outside a loop", &[]),
        "BadAssignment" => ("Cannot assign to this expression", &[]),
        "CompileError" => (
            "Internal compile error: {0}",
            &["Please report this program as a bug"],
        ),
        _ => return None,
    };
    Some(t)
}

/// Parameter vocabulary: a parameter that is itself a known key renders as
/// its looked-up text; anything else renders literally.
fn vocab(param: &str) -> Option<&'static str> {
    let t = match param {
        "bool" => "a truth value (bool)",
        "number" => "a number",
        "str" => "a string",
        "void" => "nothing (void)",
        "any" => "any value",
        "matter" => "a physics object",
        "vec2" => "a 2D vector",
        "color" => "a color",
        "option" => "keyword options",
        _ => return None,
    };
    Some(t)
}

fn substitute(template: &str, params: &[String]) -> String {
    let mut out = template.to_string();
    for (i, p) in params.iter().enumerate() {
        let slot = format!("{{{}}}", i);
        let text = vocab(p).map(|s| s.to_string()).unwrap_or_else(|| p.clone());
        out = out.replace(&slot, &text);
    }
    out
}

/// Render a single event to a one-or-more-line human-readable message.
pub fn render(event: &SourceEvent) -> String {
    match template(&event.key) {
        Some((tmpl, hints)) => {
            let mut msg = substitute(tmpl, &event.params);
            if !hints.is_empty() {
                for h in hints {
                    msg.push_str("\n  - ");
                    msg.push_str(h);
                }
            }
            msg
        }
        None => {
            // Unknown key: degrade to the raw key plus parameters
            if event.params.is_empty() {
                event.key.clone()
            } else {
                format!("{} ({})", event.key, event.params.join(", "))
            }
        }
    }
}

/// One-line rendering with source position, for CLI output.
pub fn render_line(event: &SourceEvent) -> String {
    let body = render(event);
    let first = body.lines().next().unwrap_or("");
    if event.subject.is_empty() {
        format!("[{}:{}] {}", event.row, event.col, first)
    } else {
        format!("[{}:{}] {}: {}", event.row, event.col, first, event.subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ParseTree, Tag};

    fn event(key: &str, params: Vec<String>) -> SourceEvent {
        let t = ParseTree::new(Tag::Name, 0, 1, 1, 1).with_token("x");
        SourceEvent::new(EventKind::Error, key, &t, params)
    }

    #[test]
    fn test_substitution() {
        let e = event(
            "TypeError",
            vec!["number".to_string(), "str".to_string()],
        );
        let msg = render(&e);
        assert!(msg.contains("a number"));
        assert!(msg.contains("a string"));
    }

    #[test]
    fn test_literal_params_pass_through() {
        let e = event("UndefinedName", vec!["foo".to_string()]);
        assert!(render(&e).contains("foo"));
    }

    #[test]
    fn test_unknown_key_degrades_to_raw_key() {
        let e = event("NoSuchKey", vec!["p".to_string()]);
        let msg = render(&e);
        assert!(msg.contains("NoSuchKey"));
        assert!(msg.contains("p"));
    }

    #[test]
    fn test_hints_appended() {
        let e = event("UndefinedFunction", vec!["foo".to_string()]);
        let msg = render(&e);
        assert!(msg.lines().count() > 1);
    }
}
