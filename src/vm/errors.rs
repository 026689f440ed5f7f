//! Fatal runtime diagnostics. There is no recovery: every `VMError` that
//! reaches the driver's outer loop is printed as a single-line message to
//! stderr and the process exits nonzero.

use std::fmt;

#[derive(Debug, Clone)]
pub enum VMError {
    /// Popped an operand from an empty stack during `operation`.
    StackUnderflow(String),
    /// A `Value` didn't have the type an operation required.
    TypeMismatch {
        expected: String,
        got: String,
        operation: String,
    },
    /// `RESOLVE_BINDING`/`UPDATE_BINDING` found no binding for this symbol
    /// anywhere in the chain (plus the frame-0 fallback, for resolve).
    UndefinedVariable(String),
    /// `CREATE_BINDING` found the symbol already bound in the current node.
    AlreadyBound(String),
    /// `RESOLVE_FIELD`/`UPDATE_FIELD` named a field the object doesn't have.
    NoSuchField(String),
    /// Popped past the bottom of the call stack.
    CallStackUnderflow,
    /// A function/builtin/constructor call's argument count didn't match
    /// the callee's declared arity.
    ArityMismatch {
        expected: usize,
        got: usize,
        callee: String,
    },
    /// `THIS_FUNCTION` executed in a frame with no originating Function
    /// (i.e. at top level).
    NotInAFunction,
    /// The named source file could not be read.
    FileError { filename: String, error: String },
    /// The assembly loader hit malformed input.
    AsmError { line: usize, message: String },
    DivisionByZero,
}

impl fmt::Display for VMError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VMError::StackUnderflow(op) => write!(f, "stack underflow during {}", op),
            VMError::TypeMismatch {
                expected,
                got,
                operation,
            } => write!(f, "{} expects {} but got {}", operation, expected, got),
            VMError::UndefinedVariable(name) => write!(f, "variable '{}' is not bound", name),
            VMError::AlreadyBound(name) => {
                write!(f, "can't create '{}' -- already bound in this scope", name)
            }
            VMError::NoSuchField(name) => write!(f, "no such field '{}' on object", name),
            VMError::CallStackUnderflow => write!(f, "call stack underflow"),
            VMError::ArityMismatch {
                expected,
                got,
                callee,
            } => write!(
                f,
                "{} takes {} argument(s); was passed {}",
                callee, expected, got
            ),
            VMError::NotInAFunction => {
                write!(f, "invalid use of this-function -- not in a function")
            }
            VMError::FileError { filename, error } => {
                write!(f, "file operation failed on {}: {}", filename, error)
            }
            VMError::AsmError { line, message } => {
                write!(f, "assembly error on line {}: {}", line, message)
            }
            VMError::DivisionByZero => write!(f, "division by zero"),
        }
    }
}

impl std::error::Error for VMError {}

pub type VMResult<T> = Result<T, VMError>;
