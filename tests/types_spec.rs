use std::collections::HashMap;

use puppy::types::{Type, TypeVarPool};

fn var_id(t: &Type) -> usize {
    match t {
        Type::Var(id) => *id,
        other => panic!("expected a type variable, got {:?}", other),
    }
}

#[test]
fn test_union_then_bind_propagates_to_all_members() {
    let mut pool = TypeVarPool::new();
    let a = pool.new_var();
    let b = pool.new_var();
    let c = pool.new_var();
    pool.union(var_id(&a), var_id(&b));
    pool.union(var_id(&b), var_id(&c));
    assert!(c.accept(&Type::Number, &mut pool, true));
    assert_eq!(pool.real_type(&a), Type::Number);
    assert_eq!(pool.real_type(&b), Type::Number);
    assert_eq!(pool.real_type(&c), Type::Number);
}

#[test]
fn test_bind_then_union_agrees_with_union_then_bind() {
    let mut pool = TypeVarPool::new();
    let a = pool.new_var();
    let b = pool.new_var();
    assert!(a.accept(&Type::Str, &mut pool, true));
    pool.union(var_id(&a), var_id(&b));
    assert_eq!(pool.real_type(&b), Type::Str);
}

#[test]
fn test_first_concrete_binding_wins() {
    let mut pool = TypeVarPool::new();
    let a = pool.new_var();
    let b = pool.new_var();
    assert!(a.accept(&Type::Number, &mut pool, true));
    assert!(b.accept(&Type::Str, &mut pool, true));
    // merging two bound classes must not reconcile or flip either side
    pool.union(var_id(&a), var_id(&b));
    assert_eq!(pool.real_type(&a), Type::Number);
    assert_eq!(pool.real_type(&b), Type::Str);
}

#[test]
fn test_generic_signature_instantiates_fresh_per_call_site() {
    let mut pool = TypeVarPool::new();
    let sig = Type::func(
        Type::Void,
        vec![Type::list_of(Type::Pattern("a")), Type::Pattern("a")],
    );
    let mut map1 = HashMap::new();
    let call1 = sig.to_var_type(&mut map1, &mut pool);
    let mut map2 = HashMap::new();
    let call2 = sig.to_var_type(&mut map2, &mut pool);

    // first call site sees a list of numbers
    assert!(call1.params()[0].accept(&Type::list_of(Type::Number), &mut pool, true));
    assert_eq!(pool.real_type(&call1.params()[1]), Type::Number);
    // the second call site is unaffected and can bind to strings
    assert!(call2.params()[0].accept(&Type::list_of(Type::Str), &mut pool, true));
    assert_eq!(pool.real_type(&call2.params()[1]), Type::Str);
}

#[test]
fn test_accept_is_asymmetric_on_void() {
    let mut pool = TypeVarPool::new();
    assert!(Type::Void.accept(&Type::Number, &mut pool, false));
    assert!(!Type::Number.accept(&Type::Void, &mut pool, false));
}

#[test]
fn test_list_of_any_accepts_every_list() {
    let mut pool = TypeVarPool::new();
    let anylist = Type::list_of(Type::Any);
    assert!(anylist.accept(&Type::list_of(Type::Str), &mut pool, false));
    assert!(anylist.accept(&Type::list_of(Type::list_of(Type::Number)), &mut pool, false));
    assert!(!anylist.accept(&Type::Str, &mut pool, false));
}
