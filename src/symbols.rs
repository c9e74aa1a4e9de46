/// Symbol table and package registry.
///
/// A `Symbol` pairs the target-language fragment that stands in for a name
/// with its type signature. Packages are flat maps from a bare name (or an
/// arity-qualified `name@N` variant) to a symbol or an explicit
/// "unsupported" marker. A global name→package index lets the transpiler
/// auto-import a package on first use of one of its members.
use std::collections::HashMap;

use crate::types::Type;

#[derive(Debug, Clone)]
pub struct Symbol {
    /// Literal target-language expression standing in for this name.
    pub code: String,
    pub ty: Type,
    pub mutable: bool,
    /// Refers to a physics body (refined after declaration).
    pub is_matter: bool,
    /// Compiled as a generator; calls must propagate suspension.
    pub is_sync: bool,
}

impl Symbol {
    pub fn new(code: impl Into<String>, ty: Type) -> Self {
        Symbol {
            code: code.into(),
            ty,
            mutable: false,
            is_matter: false,
            is_sync: false,
        }
    }

    pub fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }

    pub fn matter(mut self) -> Self {
        self.is_matter = true;
        self
    }

    /// A symbol is global iff its code indexes the shared variable table.
    pub fn is_global(&self) -> bool {
        self.code.starts_with("vars[")
    }
}

#[derive(Debug, Clone)]
pub enum PackageEntry {
    Sym(Symbol),
    /// Known name that Puppy deliberately does not provide.
    Unsupported(&'static str),
}

pub type Package = HashMap<&'static str, PackageEntry>;

fn sym(code: &str, ty: Type) -> PackageEntry {
    PackageEntry::Sym(Symbol::new(code, ty))
}

fn matter_sym(code: &str, ty: Type) -> PackageEntry {
    PackageEntry::Sym(Symbol::new(code, ty).matter())
}

/// The package implicitly in scope for every program.
pub fn default_package() -> Package {
    let mut p = Package::new();
    p.insert("print", sym("lib.print", Type::func(Type::Void, vec![Type::Any])));
    p.insert(
        "print@2",
        sym("lib.print", Type::func(Type::Void, vec![Type::Any, Type::Any])),
    );
    p.insert(
        "max",
        sym("Math.max", Type::func(Type::Number, vec![Type::Number, Type::Number])),
    );
    p.insert(
        "max@1",
        sym(
            "lib.listMax",
            Type::func(Type::Number, vec![Type::list_of(Type::Number)]),
        ),
    );
    p.insert(
        "min",
        sym("Math.min", Type::func(Type::Number, vec![Type::Number, Type::Number])),
    );
    p.insert(
        "min@1",
        sym(
            "lib.listMin",
            Type::func(Type::Number, vec![Type::list_of(Type::Number)]),
        ),
    );
    p.insert(
        "range",
        sym(
            "lib.range",
            Type::func(Type::list_of(Type::Number), vec![Type::Number, Type::Number]),
        ),
    );
    p.insert(
        "range@1",
        sym(
            "lib.range",
            Type::func(Type::list_of(Type::Number), vec![Type::Number]),
        ),
    );
    p.insert(
        "range@3",
        sym(
            "lib.range",
            Type::func(
                Type::list_of(Type::Number),
                vec![Type::Number, Type::Number, Type::Number],
            ),
        ),
    );
    p.insert(
        "len",
        sym(
            "lib.len",
            Type::func(
                Type::Number,
                vec![Type::Union(vec![Type::Str, Type::list_of(Type::Any)])],
            ),
        ),
    );
    p.insert("int", sym("lib.int", Type::func(Type::Number, vec![Type::Any])));
    p.insert("float", sym("lib.float", Type::func(Type::Number, vec![Type::Any])));
    p.insert("str", sym("lib.str", Type::func(Type::Str, vec![Type::Any])));
    p.insert("repr", sym("lib.repr", Type::func(Type::Str, vec![Type::Any])));
    p.insert("abs", sym("Math.abs", Type::func(Type::Number, vec![Type::Number])));
    p.insert("round", sym("Math.round", Type::func(Type::Number, vec![Type::Number])));
    p.insert("random", sym("Math.random", Type::func(Type::Number, vec![])));
    p.insert("input", PackageEntry::Unsupported("input"));
    p.insert("open", PackageEntry::Unsupported("open"));
    p
}

pub fn math_package() -> Package {
    let mut p = Package::new();
    let f1 = || Type::func(Type::Number, vec![Type::Number]);
    p.insert("pi", sym("Math.PI", Type::Number));
    p.insert("e", sym("Math.E", Type::Number));
    p.insert("sin", sym("Math.sin", f1()));
    p.insert("cos", sym("Math.cos", f1()));
    p.insert("tan", sym("Math.tan", f1()));
    p.insert("sqrt", sym("Math.sqrt", f1()));
    p.insert("floor", sym("Math.floor", f1()));
    p.insert("ceil", sym("Math.ceil", f1()));
    p.insert(
        "pow",
        sym("Math.pow", Type::func(Type::Number, vec![Type::Number, Type::Number])),
    );
    p
}

/// Physics bodies and world controls. The trailing `Option` parameter of the
/// constructors is the keyword-options record and is not counted toward the
/// required argument minimum.
pub fn matter_package() -> Package {
    let mut p = Package::new();
    p.insert(
        "Circle",
        matter_sym(
            "lib.Circle",
            Type::func(
                Type::Matter,
                vec![Type::Number, Type::Number, Type::Number, Type::Option],
            ),
        ),
    );
    p.insert(
        "Rectangle",
        matter_sym(
            "lib.Rectangle",
            Type::func(
                Type::Matter,
                vec![
                    Type::Number,
                    Type::Number,
                    Type::Number,
                    Type::Number,
                    Type::Option,
                ],
            ),
        ),
    );
    p.insert(
        "Line",
        matter_sym(
            "lib.Line",
            Type::func(
                Type::Matter,
                vec![
                    Type::Number,
                    Type::Number,
                    Type::Number,
                    Type::Number,
                    Type::Option,
                ],
            ),
        ),
    );
    p.insert(
        "setGravity",
        sym(
            "lib.setGravity",
            Type::func(Type::Void, vec![Type::Number, Type::Number]),
        ),
    );
    p
}

pub fn package(name: &str) -> Option<Package> {
    match name {
        "" | "python" => Some(default_package()),
        "math" => Some(math_package()),
        "matter" => Some(matter_package()),
        _ => None,
    }
}

/// Global name → package index consulted when a call-site name is not in
/// scope; the whole named package is then auto-imported.
pub fn package_of(name: &str) -> Option<&'static str> {
    match name {
        "sin" | "cos" | "tan" | "sqrt" | "floor" | "ceil" | "pow" => Some("math"),
        "Circle" | "Rectangle" | "Line" | "setGravity" => Some("matter"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Methods and field accessors
// ---------------------------------------------------------------------------

/// Object methods (`recv.name(args)`): the emitted helper takes the receiver
/// as its first argument, and the first parameter of the signature is the
/// receiver type.
pub fn method(name: &str) -> Option<Symbol> {
    let s = match name {
        "append" => Symbol::new(
            "lib.append",
            Type::func(
                Type::Void,
                vec![Type::list_of(Type::Pattern("a")), Type::Pattern("a")],
            ),
        ),
        "find" => Symbol::new(
            "lib.find",
            Type::func(
                Type::Number,
                vec![Type::list_of(Type::Pattern("a")), Type::Pattern("a")],
            ),
        ),
        _ => return None,
    };
    Some(s)
}

/// Property accessor code templates; `{0}` is the receiver, `{1}` the value.
#[derive(Debug, Clone)]
pub struct FieldAccessor {
    pub getter: String,
    pub setter: String,
    pub ty: Type,
}

impl FieldAccessor {
    pub fn generic(name: &str, ty: Type) -> Self {
        FieldAccessor {
            getter: format!("lib.getattr({{0}}, '{}')", name),
            setter: format!("lib.setattr({{0}}, '{}', {{1}})", name),
            ty,
        }
    }
}

/// Statically known fields, consulted before the per-compilation
/// inferred-field cache.
pub fn static_field(name: &str) -> Option<FieldAccessor> {
    let ty = match name {
        "x" | "y" | "width" | "height" | "radius" | "angle" => Type::Number,
        "color" => Type::Union(vec![Type::Color, Type::Str]),
        "font" | "text" | "name" => Type::Str,
        "position" => Type::Vec2,
        _ => return None,
    };
    Some(FieldAccessor::generic(name, ty))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_qualified_entries_exist() {
        let p = default_package();
        assert!(matches!(p.get("max"), Some(PackageEntry::Sym(_))));
        assert!(matches!(p.get("max@1"), Some(PackageEntry::Sym(_))));
        assert!(matches!(p.get("print@2"), Some(PackageEntry::Sym(_))));
    }

    #[test]
    fn test_global_symbol_detection() {
        assert!(Symbol::new("vars['x']", Type::Number).is_global());
        assert!(!Symbol::new("x", Type::Number).is_global());
        assert!(!Symbol::new("lib.print", Type::Any).is_global());
    }

    #[test]
    fn test_package_index() {
        assert_eq!(package_of("sin"), Some("math"));
        assert_eq!(package_of("Circle"), Some("matter"));
        assert_eq!(package_of("nosuch"), None);
    }

    #[test]
    fn test_unsupported_marker() {
        let p = default_package();
        assert!(matches!(p.get("input"), Some(PackageEntry::Unsupported(_))));
    }

    #[test]
    fn test_static_fields() {
        assert!(static_field("x").is_some());
        assert!(static_field("nope").is_none());
        let acc = FieldAccessor::generic("vx", Type::Number);
        assert!(acc.getter.contains("'vx'"));
        assert!(acc.setter.contains("{1}"));
    }
}
