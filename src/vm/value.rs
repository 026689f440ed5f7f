//! Value Model. A tagged sum of primitive and heap-reference variants, with
//! the arithmetic/comparison/logical operations and truthiness coercion a
//! small dynamically-typed language needs.

use std::fmt;

use crate::builtins::BuiltinId;
use crate::gc::{CtorHandle, FuncHandle, Heap, ObjHandle, StrHandle};
use crate::symbol::{Interner, Symbol};
use crate::vm::errors::{VMError, VMResult};

/// Handle-identity equality on heap variants falls out of `derive(PartialEq)`
/// automatically: distinct enum variants are never equal, and two heap
/// handles of the same kind compare by their underlying index, never by
/// cell content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Nothing,
    Integer(i64),
    Boolean(bool),
    Symbol(Symbol),
    String(StrHandle),
    Function(FuncHandle),
    Builtin(BuiltinId),
    Constructor(CtorHandle),
    Object(ObjHandle),
}

impl Value {
    /// `Nothing` and `Boolean(false)` are falsey; everything else is truthy.
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nothing | Value::Boolean(false))
    }

    /// Lifts a native bool into a `Boolean` value.
    pub fn raise_bool(b: bool) -> Value {
        Value::Boolean(b)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nothing => "nothing",
            Value::Integer(_) => "integer",
            Value::Boolean(_) => "boolean",
            Value::Symbol(_) => "symbol",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin",
            Value::Constructor(_) => "constructor",
            Value::Object(_) => "object",
        }
    }

    fn as_integer(&self, op: &str) -> VMResult<i64> {
        match self {
            Value::Integer(n) => Ok(*n),
            other => Err(VMError::TypeMismatch {
                expected: "integer".to_string(),
                got: other.type_name().to_string(),
                operation: op.to_string(),
            }),
        }
    }

    pub fn add(a: Value, b: Value) -> VMResult<Value> {
        Ok(Value::Integer(a.as_integer("ADD")? + b.as_integer("ADD")?))
    }

    pub fn subtract(a: Value, b: Value) -> VMResult<Value> {
        Ok(Value::Integer(a.as_integer("SUB")? - b.as_integer("SUB")?))
    }

    pub fn multiply(a: Value, b: Value) -> VMResult<Value> {
        Ok(Value::Integer(a.as_integer("MUL")? * b.as_integer("MUL")?))
    }

    pub fn divide(a: Value, b: Value) -> VMResult<Value> {
        let lhs = a.as_integer("DIV")?;
        let rhs = b.as_integer("DIV")?;
        if rhs == 0 {
            return Err(VMError::DivisionByZero);
        }
        Ok(Value::Integer(lhs / rhs))
    }

    /// Equality is total: same primitive kind compares by value, mixed
    /// kinds (including two different heap kinds) are simply unequal, and
    /// heap aggregates of the same kind compare by handle identity. All of
    /// this is exactly what `derive(PartialEq)` already gives the enum, so
    /// this is just a named entry point for the `EQ`/`NEQ` opcodes.
    pub fn equal(a: &Value, b: &Value) -> bool {
        a == b
    }

    pub fn greater_than(a: Value, b: Value) -> VMResult<bool> {
        Ok(a.as_integer("GT")? > b.as_integer("GT")?)
    }

    pub fn less_than(a: Value, b: Value) -> VMResult<bool> {
        Ok(a.as_integer("LT")? < b.as_integer("LT")?)
    }

    pub fn greater_than_or_equal_to(a: Value, b: Value) -> VMResult<bool> {
        Ok(a.as_integer("GE")? >= b.as_integer("GE")?)
    }

    pub fn less_than_or_equal_to(a: Value, b: Value) -> VMResult<bool> {
        Ok(a.as_integer("LE")? <= b.as_integer("LE")?)
    }

    pub fn and(a: Value, b: Value) -> bool {
        a.truthy() && b.truthy()
    }

    pub fn or(a: Value, b: Value) -> bool {
        a.truthy() || b.truthy()
    }

    pub fn not(a: Value) -> bool {
        !a.truthy()
    }

    /// Panics fatally (returns a `VMError`, never a Rust `panic!`) if `self`
    /// isn't of the named kind.
    pub fn assert_is(&self, expected: &'static str, operation: &str) -> VMResult<()> {
        if self.type_name() == expected {
            Ok(())
        } else {
            Err(VMError::TypeMismatch {
                expected: expected.to_string(),
                got: self.type_name().to_string(),
                operation: operation.to_string(),
            })
        }
    }

    pub fn as_symbol(&self, operation: &str) -> VMResult<Symbol> {
        match self {
            Value::Symbol(s) => Ok(*s),
            other => Err(VMError::TypeMismatch {
                expected: "symbol".to_string(),
                got: other.type_name().to_string(),
                operation: operation.to_string(),
            }),
        }
    }

    pub fn as_object(&self, operation: &str) -> VMResult<ObjHandle> {
        match self {
            Value::Object(h) => Ok(*h),
            other => Err(VMError::TypeMismatch {
                expected: "object".to_string(),
                got: other.type_name().to_string(),
                operation: operation.to_string(),
            }),
        }
    }

    /// A display rendering that resolves symbol names and heap cell
    /// contents, for debug dumps (`TTVM_DEBUG=1`).
    pub fn display(&self, heap: &Heap, interner: &Interner) -> String {
        match self {
            Value::Nothing => "nothing".to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Symbol(s) => format!("'{}", interner.resolve(*s)),
            Value::String(h) => heap.string(*h).as_str().to_string(),
            Value::Function(h) => {
                let f = heap.function(*h);
                format!("function@{}({})", f.block.index(), f.params.len())
            }
            Value::Builtin(id) => format!("builtin@{}", id.index()),
            Value::Constructor(h) => {
                format!("constructor({})", heap.constructor(*h).fields.len())
            }
            Value::Object(h) => {
                let fields: Vec<String> = heap
                    .object(*h)
                    .fields
                    .iter()
                    .map(|(s, v)| {
                        format!("{}: {}", interner.resolve(*s), v.display(heap, interner))
                    })
                    .collect();
                format!("{{{}}}", fields.join(", "))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nothing => write!(f, "nothing"),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Symbol(s) => write!(f, "{}", s),
            Value::String(h) => write!(f, "string@{}", h.raw_index()),
            Value::Function(h) => write!(f, "function@{}", h.raw_index()),
            Value::Builtin(id) => write!(f, "builtin@{}", id.index()),
            Value::Constructor(h) => write!(f, "constructor@{}", h.raw_index()),
            Value::Object(h) => write!(f, "object@{}", h.raw_index()),
        }
    }
}
