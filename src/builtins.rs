//! Builtin registry. A builtin is `{name, arg_count, funcptr}`, bound
//! as a `Value::Builtin` in the global environment before block 0 runs.
//!
//! The funcptr signature takes `&Heap`/`&Interner` in addition to its
//! argument slice — `print` and `len` both need to read through a `String`
//! or `Object` handle to do anything useful, and only the heap can resolve
//! one.

use crate::gc::Heap;
use crate::symbol::Interner;
use crate::vm::errors::{VMError, VMResult};
use crate::vm::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuiltinId(u32);

impl BuiltinId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

pub type BuiltinFn = fn(&[Value], &Heap, &Interner) -> VMResult<Value>;

pub struct BuiltinEntry {
    pub name: &'static str,
    pub arg_count: usize,
    pub funcptr: BuiltinFn,
}

/// The fixed table of builtins, bound into the global environment at
/// startup. Order determines `BuiltinId` values.
#[derive(Default)]
pub struct BuiltinRegistry {
    entries: Vec<BuiltinEntry>,
}

impl BuiltinRegistry {
    pub fn standard() -> Self {
        let mut registry = BuiltinRegistry::default();
        registry.register("print", 1, builtin_print);
        registry.register("len", 1, builtin_len);
        registry
    }

    fn register(&mut self, name: &'static str, arg_count: usize, funcptr: BuiltinFn) -> BuiltinId {
        let id = BuiltinId(self.entries.len() as u32);
        self.entries.push(BuiltinEntry {
            name,
            arg_count,
            funcptr,
        });
        id
    }

    pub fn entry(&self, id: BuiltinId) -> &BuiltinEntry {
        &self.entries[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (BuiltinId, &BuiltinEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (BuiltinId(i as u32), e))
    }

    pub fn call(
        &self,
        id: BuiltinId,
        args: &[Value],
        heap: &Heap,
        interner: &Interner,
    ) -> VMResult<Value> {
        let entry = self.entry(id);
        if args.len() != entry.arg_count {
            return Err(VMError::ArityMismatch {
                expected: entry.arg_count,
                got: args.len(),
                callee: entry.name.to_string(),
            });
        }
        (entry.funcptr)(args, heap, interner)
    }
}

fn builtin_print(args: &[Value], heap: &Heap, interner: &Interner) -> VMResult<Value> {
    println!("{}", args[0].display(heap, interner));
    Ok(Value::Nothing)
}

fn builtin_len(args: &[Value], heap: &Heap, _interner: &Interner) -> VMResult<Value> {
    match &args[0] {
        Value::String(h) => Ok(Value::Integer(heap.string(*h).as_str().len() as i64)),
        Value::Object(h) => Ok(Value::Integer(heap.object(*h).fields.len() as i64)),
        other => Err(VMError::TypeMismatch {
            expected: "string or object".to_string(),
            got: other.type_name().to_string(),
            operation: "len".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_print_and_len() {
        let registry = BuiltinRegistry::standard();
        let names: Vec<&str> = registry.iter().map(|(_, e)| e.name).collect();
        assert!(names.contains(&"print"));
        assert!(names.contains(&"len"));
    }

    #[test]
    fn calling_with_the_wrong_arity_is_fatal() {
        let registry = BuiltinRegistry::standard();
        let heap = Heap::new();
        let interner = Interner::new();
        let (id, _) = registry.iter().find(|(_, e)| e.name == "print").unwrap();
        let err = registry.call(id, &[], &heap, &interner).unwrap_err();
        assert!(matches!(err, VMError::ArityMismatch { .. }));
    }

    #[test]
    fn len_of_a_string() {
        let mut heap = Heap::new();
        let interner = Interner::new();
        let registry = BuiltinRegistry::standard();
        let handle = heap.alloc_string(b"hello".to_vec());
        let (id, _) = registry.iter().find(|(_, e)| e.name == "len").unwrap();
        let result = registry
            .call(id, &[Value::String(handle)], &heap, &interner)
            .unwrap();
        assert_eq!(result, Value::Integer(5));
    }

    #[test]
    fn len_of_a_non_string_non_object_is_a_type_error() {
        let heap = Heap::new();
        let interner = Interner::new();
        let registry = BuiltinRegistry::standard();
        let (id, _) = registry.iter().find(|(_, e)| e.name == "len").unwrap();
        let err = registry
            .call(id, &[Value::Integer(3)], &heap, &interner)
            .unwrap_err();
        assert!(matches!(err, VMError::TypeMismatch { .. }));
    }
}
