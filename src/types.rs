/// Puppy static type representation.
///
/// Types form a small algebra: named base types, covariant lists, ordered
/// unions, functions as `[return, params...]`, keyword-argument records
/// (`Option`), placeholder patterns used in built-in signatures, and type
/// variables resolved through a union-find pool.
///
/// `accept` is asymmetric: the receiver is the declared/expected type, the
/// argument is the offered one. The relation is deliberately permissive —
/// unresolved variables accept everything and bind opportunistically, which
/// is the ergonomics a teaching language wants, not a soundness bug.
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Bool,
    Number,
    Str,
    Void,
    Any,
    /// Opaque host object handle.
    Object,
    /// 2D vector, produced by two-element numeric tuples.
    Vec2,
    Color,
    /// Physics body handle.
    Matter,
    /// Namespace marker for an imported package.
    Module(String),
    List(Box<Type>),
    Union(Vec<Type>),
    /// `[return, param...]`
    Func(Vec<Type>),
    /// Type variable, resolved through `TypeVarPool`.
    Var(usize),
    /// Keyword-argument record; always mutually accepting with itself.
    Option,
    /// Placeholder in built-in signatures ("a", "b"); instantiated to a
    /// fresh `Var` per call site by `to_var_type`.
    Pattern(&'static str),
}

impl Type {
    pub fn list_of(elem: Type) -> Type {
        Type::List(Box::new(elem))
    }

    pub fn func(ret: Type, params: Vec<Type>) -> Type {
        let mut ts = vec![ret];
        ts.extend(params);
        Type::Func(ts)
    }

    pub fn ret(&self) -> Option<&Type> {
        match self {
            Type::Func(ts) => ts.first(),
            _ => None,
        }
    }

    pub fn params(&self) -> &[Type] {
        match self {
            Type::Func(ts) if !ts.is_empty() => &ts[1..],
            _ => &[],
        }
    }

    /// Does this type still contain signature placeholders?
    pub fn has_alpha(&self) -> bool {
        match self {
            Type::Pattern(_) => true,
            Type::List(e) => e.has_alpha(),
            Type::Union(ts) | Type::Func(ts) => ts.iter().any(|t| t.has_alpha()),
            _ => false,
        }
    }

    /// Instantiate placeholders to fresh type variables, one variable per
    /// placeholder name per call site. `map` must be fresh for each call
    /// so two applications of the same generic never share variables.
    pub fn to_var_type(&self, map: &mut HashMap<&'static str, Type>, pool: &mut TypeVarPool) -> Type {
        match self {
            Type::Pattern(name) => map
                .entry(name)
                .or_insert_with(|| pool.new_var())
                .clone(),
            Type::List(e) => Type::List(Box::new(e.to_var_type(map, pool))),
            Type::Union(ts) => {
                Type::Union(ts.iter().map(|t| t.to_var_type(map, pool)).collect())
            }
            Type::Func(ts) => Type::Func(ts.iter().map(|t| t.to_var_type(map, pool)).collect()),
            _ => self.clone(),
        }
    }

    /// `expected.accept(offered, pool, updating)` — can the offered type be
    /// used where `expected` is declared? When `updating` is true a type
    /// variable met along the way commits its binding (first concrete
    /// binding wins for its whole equivalence class).
    pub fn accept(&self, other: &Type, pool: &mut TypeVarPool, updating: bool) -> bool {
        let a = pool.real_type(self);
        let b = pool.real_type(other);

        match (&a, &b) {
            (Type::Var(x), Type::Var(y)) => {
                if updating {
                    pool.union(*x, *y);
                }
                true
            }
            (Type::Var(x), _) => {
                if updating && !b.has_alpha() {
                    pool.bind(*x, b.clone());
                }
                true
            }
            (_, Type::Var(y)) => {
                if updating && !a.has_alpha() {
                    pool.bind(*y, a.clone());
                }
                true
            }
            // void accepts everything (assignment-compat check), but nothing
            // else accepts void as a real value
            (Type::Void, _) => true,
            (_, Type::Void) => false,
            (Type::Any, _) => true,
            (_, Type::Any) => true,
            (Type::Union(alts), _) => alts.iter().any(|t| t.accept(&b, pool, updating)),
            (Type::List(e1), Type::List(e2)) => {
                if **e1 == Type::Any {
                    true
                } else {
                    e1.accept(e2, pool, updating)
                }
            }
            (Type::Func(ts1), Type::Func(ts2)) => {
                ts1.len() == ts2.len()
                    && ts1
                        .iter()
                        .zip(ts2.iter())
                        .all(|(x, y)| x.accept(y, pool, updating))
            }
            (Type::Option, Type::Option) => true,
            (Type::Module(m1), Type::Module(m2)) => m1 == m2,
            (Type::Pattern(p1), Type::Pattern(p2)) => p1 == p2,
            _ => a == b,
        }
    }

    pub fn display(&self, pool: &TypeVarPool) -> String {
        match self {
            Type::Bool => "bool".to_string(),
            Type::Number => "number".to_string(),
            Type::Str => "str".to_string(),
            Type::Void => "void".to_string(),
            Type::Any => "any".to_string(),
            Type::Object => "object".to_string(),
            Type::Vec2 => "vec2".to_string(),
            Type::Color => "color".to_string(),
            Type::Matter => "matter".to_string(),
            Type::Module(name) => format!("module {}", name),
            Type::List(e) => format!("list[{}]", e.display(pool)),
            Type::Union(ts) => ts
                .iter()
                .map(|t| t.display(pool))
                .collect::<Vec<_>>()
                .join("|"),
            Type::Func(ts) => {
                let ps: Vec<String> = ts[1..].iter().map(|t| t.display(pool)).collect();
                format!("({}) -> {}", ps.join(", "), ts[0].display(pool))
            }
            Type::Var(id) => match pool.binding(*id) {
                Some(t) => t.clone().display(pool),
                None => "any".to_string(),
            },
            Type::Option => "option".to_string(),
            Type::Pattern(name) => name.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Type variable pool (union-find)
// ---------------------------------------------------------------------------

/// Union-find over type variables, owned by the root environment of one
/// compilation (no process-wide state).
///
/// Semantics observed by the rest of the compiler:
///   - merging two unresolved classes aliases all members to one class;
///   - binding a class to a concrete type propagates it to every member;
///   - an already-bound class is never re-opened (first binding wins, a
///     later conflicting binding is dropped, not reconciled).
#[derive(Debug, Default)]
pub struct TypeVarPool {
    classes: Vec<usize>,
    states: Vec<ClassState>,
}

#[derive(Debug)]
struct ClassState {
    members: Vec<usize>,
    bound: Option<Type>,
}

impl TypeVarPool {
    pub fn new() -> Self {
        TypeVarPool::default()
    }

    pub fn new_var(&mut self) -> Type {
        let id = self.classes.len();
        self.classes.push(self.states.len());
        self.states.push(ClassState {
            members: vec![id],
            bound: None,
        });
        Type::Var(id)
    }

    pub fn binding(&self, id: usize) -> Option<&Type> {
        self.states[self.classes[id]].bound.as_ref()
    }

    /// Dereference one level: a bound variable becomes its binding,
    /// everything else is returned unchanged.
    pub fn real_type(&self, ty: &Type) -> Type {
        match ty {
            Type::Var(id) => match self.binding(*id) {
                Some(t) => self.real_type(&t.clone()),
                None => ty.clone(),
            },
            _ => ty.clone(),
        }
    }

    /// Deep resolution for final reporting: unbound variables degrade
    /// to `any`.
    pub fn resolved(&self, ty: &Type) -> Type {
        match ty {
            Type::Var(id) => match self.binding(*id) {
                Some(t) => self.resolved(&t.clone()),
                None => Type::Any,
            },
            Type::List(e) => Type::List(Box::new(self.resolved(e))),
            Type::Union(ts) => Type::Union(ts.iter().map(|t| self.resolved(t)).collect()),
            Type::Func(ts) => Type::Func(ts.iter().map(|t| self.resolved(t)).collect()),
            _ => ty.clone(),
        }
    }

    pub fn bind(&mut self, id: usize, ty: Type) {
        let c = self.classes[id];
        if self.states[c].bound.is_none() {
            self.states[c].bound = Some(ty);
        }
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let ca = self.classes[a];
        let cb = self.classes[b];
        if ca == cb {
            return;
        }
        match (
            self.states[ca].bound.is_some(),
            self.states[cb].bound.is_some(),
        ) {
            // both already concrete: first-wins, never reconciled
            (true, true) => {}
            (false, true) => self.absorb(cb, ca),
            _ => self.absorb(ca, cb),
        }
    }

    fn absorb(&mut self, into: usize, from: usize) {
        let members = std::mem::take(&mut self.states[from].members);
        for m in &members {
            self.classes[*m] = into;
        }
        self.states[into].members.extend(members);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var_id(t: &Type) -> usize {
        match t {
            Type::Var(id) => *id,
            _ => panic!("not a var"),
        }
    }

    #[test]
    fn test_accept_bases() {
        let mut pool = TypeVarPool::new();
        assert!(Type::Number.accept(&Type::Number, &mut pool, false));
        assert!(!Type::Number.accept(&Type::Str, &mut pool, false));
        assert!(Type::Any.accept(&Type::Number, &mut pool, false));
        assert!(!Type::Any.accept(&Type::Void, &mut pool, false));
        assert!(Type::Void.accept(&Type::Number, &mut pool, false));
        assert!(!Type::Number.accept(&Type::Void, &mut pool, false));
    }

    #[test]
    fn test_accept_lists_covariant() {
        let mut pool = TypeVarPool::new();
        assert!(Type::list_of(Type::Any).accept(&Type::list_of(Type::Str), &mut pool, false));
        assert!(Type::list_of(Type::Number)
            .accept(&Type::list_of(Type::Number), &mut pool, false));
        assert!(!Type::list_of(Type::Number).accept(&Type::list_of(Type::Str), &mut pool, false));
        assert!(!Type::list_of(Type::Number).accept(&Type::Number, &mut pool, false));
    }

    #[test]
    fn test_accept_union() {
        let mut pool = TypeVarPool::new();
        let strnum = Type::Union(vec![Type::Str, Type::Number]);
        assert!(strnum.accept(&Type::Str, &mut pool, false));
        assert!(strnum.accept(&Type::Number, &mut pool, false));
        assert!(!strnum.accept(&Type::Bool, &mut pool, false));
    }

    #[test]
    fn test_var_binds_once() {
        let mut pool = TypeVarPool::new();
        let v = pool.new_var();
        assert!(v.accept(&Type::Number, &mut pool, true));
        assert_eq!(pool.real_type(&v), Type::Number);
        // second, different binding is dropped — first wins
        assert!(v.accept(&Type::Str, &mut pool, true));
        assert_eq!(pool.real_type(&v), Type::Number);
    }

    #[test]
    fn test_union_find_order_independent() {
        // bind-after-union and union-after-bind must agree
        let mut pool = TypeVarPool::new();
        let v1 = pool.new_var();
        let v2 = pool.new_var();
        let v3 = pool.new_var();
        pool.union(var_id(&v1), var_id(&v2));
        pool.union(var_id(&v2), var_id(&v3));
        assert!(v3.accept(&Type::Str, &mut pool, true));
        assert_eq!(pool.real_type(&v1), Type::Str);
        assert_eq!(pool.real_type(&v2), Type::Str);

        let mut pool = TypeVarPool::new();
        let v1 = pool.new_var();
        let v2 = pool.new_var();
        let v3 = pool.new_var();
        assert!(v1.accept(&Type::Str, &mut pool, true));
        pool.union(var_id(&v1), var_id(&v2));
        pool.union(var_id(&v2), var_id(&v3));
        assert_eq!(pool.real_type(&v3), Type::Str);
    }

    #[test]
    fn test_to_var_type_fresh_per_call() {
        let mut pool = TypeVarPool::new();
        let sig = Type::func(
            Type::Pattern("a"),
            vec![Type::list_of(Type::Pattern("a"))],
        );
        let mut map1 = HashMap::new();
        let inst1 = sig.to_var_type(&mut map1, &mut pool);
        let mut map2 = HashMap::new();
        let inst2 = sig.to_var_type(&mut map2, &mut pool);
        assert_ne!(inst1, inst2);
        // within one instantiation the same placeholder shares one variable
        match &inst1 {
            Type::Func(ts) => match (&ts[0], &ts[1]) {
                (Type::Var(r), Type::List(e)) => match e.as_ref() {
                    Type::Var(p) => assert_eq!(r, p),
                    other => panic!("unexpected param elem {:?}", other),
                },
                other => panic!("unexpected instantiation {:?}", other),
            },
            other => panic!("unexpected instantiation {:?}", other),
        }
    }

    #[test]
    fn test_pattern_never_binds_a_class() {
        let mut pool = TypeVarPool::new();
        let v = pool.new_var();
        assert!(v.accept(&Type::Pattern("a"), &mut pool, true));
        assert_eq!(pool.binding(var_id(&v)), None);
        assert!(v.accept(&Type::list_of(Type::Pattern("a")), &mut pool, true));
        assert_eq!(pool.binding(var_id(&v)), None);
    }

    #[test]
    fn test_resolved_defaults_to_any() {
        let mut pool = TypeVarPool::new();
        let v = pool.new_var();
        assert_eq!(pool.resolved(&Type::list_of(v)), Type::list_of(Type::Any));
    }
}
