//! Environment chain operations over `EnvironmentCell` (the cell body
//! itself lives in `gc::heap`, since it's a GC-managed cell). Two bind
//! operations: `create` (node-local only; shadowing across scopes is fine,
//! rebinding within one scope isn't) and `update` (walks the whole chain to
//! find the innermost binding).

use crate::gc::{EnvHandle, Heap};
use crate::symbol::Symbol;
use crate::vm::value::Value;

/// Creates a fresh binding in `env` itself (not its ancestors). Returns
/// `false` if `sym` is already bound there — the caller turns that into a
/// fatal `VMError::AlreadyBound`.
pub fn create(heap: &mut Heap, env: EnvHandle, sym: Symbol, value: Value) -> bool {
    heap.environment_mut(env).create(sym, value)
}

/// Linear scan innermost-first through the chain rooted at `env`. Does not
/// perform the frame-0 global fallback — that's a VM-level concern since it
/// crosses frame boundaries, not just environment ones.
pub fn resolve(heap: &Heap, env: EnvHandle, sym: Symbol) -> Option<Value> {
    let mut current = Some(env);
    while let Some(h) = current {
        let cell = heap.environment(h);
        if let Some(ix) = cell.find_local(sym) {
            return Some(cell.values[ix]);
        }
        current = cell.parent;
    }
    None
}

/// Finds and overwrites the innermost binding for `sym` in the chain.
/// Returns `false` if no node in the chain binds it.
pub fn update(heap: &mut Heap, env: EnvHandle, sym: Symbol, value: Value) -> bool {
    let mut current = Some(env);
    while let Some(h) = current {
        let ix = heap.environment(h).find_local(sym);
        if let Some(ix) = ix {
            heap.environment_mut(h).values[ix] = value;
            return true;
        }
        current = heap.environment(h).parent;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Interner;

    fn sym(interner: &mut Interner, name: &str) -> Symbol {
        interner.intern(name)
    }

    #[test]
    fn create_fails_on_redeclaration_in_the_same_node() {
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let env = heap.alloc_environment(None);
        let x = sym(&mut interner, "x");
        assert!(create(&mut heap, env, x, Value::Integer(1)));
        assert!(!create(&mut heap, env, x, Value::Integer(2)));
    }

    #[test]
    fn shadowing_across_scopes_is_allowed() {
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let outer = heap.alloc_environment(None);
        let x = sym(&mut interner, "x");
        create(&mut heap, outer, x, Value::Integer(1));

        let inner = heap.alloc_environment(Some(outer));
        assert!(create(&mut heap, inner, x, Value::Integer(2)));
        assert_eq!(resolve(&heap, inner, x), Some(Value::Integer(2)));
        assert_eq!(resolve(&heap, outer, x), Some(Value::Integer(1)));
    }

    #[test]
    fn resolve_walks_the_parent_chain_innermost_first() {
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let outer = heap.alloc_environment(None);
        let y = sym(&mut interner, "y");
        create(&mut heap, outer, y, Value::Integer(42));

        let inner = heap.alloc_environment(Some(outer));
        assert_eq!(resolve(&heap, inner, y), Some(Value::Integer(42)));
    }

    #[test]
    fn resolve_of_unbound_symbol_is_none() {
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let env = heap.alloc_environment(None);
        let z = sym(&mut interner, "z");
        assert_eq!(resolve(&heap, env, z), None);
    }

    #[test]
    fn update_mutates_the_innermost_binding_only() {
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let outer = heap.alloc_environment(None);
        let x = sym(&mut interner, "x");
        create(&mut heap, outer, x, Value::Integer(1));

        let inner = heap.alloc_environment(Some(outer));
        create(&mut heap, inner, x, Value::Integer(2));

        assert!(update(&mut heap, inner, x, Value::Integer(99)));
        assert_eq!(resolve(&heap, inner, x), Some(Value::Integer(99)));
        assert_eq!(resolve(&heap, outer, x), Some(Value::Integer(1)));
    }

    #[test]
    fn update_of_unbound_symbol_fails() {
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let env = heap.alloc_environment(None);
        let x = sym(&mut interner, "x");
        assert!(!update(&mut heap, env, x, Value::Integer(1)));
    }
}
