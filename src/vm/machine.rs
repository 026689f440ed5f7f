//! The stack machine: operand stack, call stack, and the instruction
//! dispatcher (`step`). A `Vm` owns no heap of its own — the driver shares
//! one `Heap`/`BlockStore`/`Interner`/`BuiltinRegistry` across every VM on
//! its stack, since a `SWITCH`ed-in VM must be able to see values the outer
//! VM already allocated.

use crate::builtins::BuiltinRegistry;
use crate::gc::Heap;
use crate::symbol::Interner;
use crate::vm::block::{BlockRef, BlockStore};
use crate::vm::environment;
use crate::vm::errors::{VMError, VMResult};
use crate::vm::frame::CallFrame;
use crate::vm::opcode::Instruction;
use crate::vm::stack::OperandStack;
use crate::vm::value::Value;

/// What happened during one `step()`.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    Ok,
    Halted,
    /// Initialize and push a fresh VM against `BlockRef`. No instruction in
    /// this instruction set currently produces this — it exists so the
    /// driver's multi-VM machinery is exercised and ready for a compiler
    /// that emits file-scope calls as nested evaluations.
    Switch(BlockRef),
}

#[derive(Debug)]
pub struct Vm {
    operand_stack: OperandStack,
    call_stack: Vec<CallFrame>,
}

impl Vm {
    /// Initializes a VM whose bottom frame executes `block` in a fresh
    /// top-level environment (no parent, no originating function), with
    /// every builtin pre-bound by name so ordinary symbol resolution finds
    /// them via the frame-0 fallback.
    pub fn new(heap: &mut Heap, block: BlockRef, interner: &mut Interner, builtins: &BuiltinRegistry) -> Self {
        let env = heap.alloc_environment(None);
        for (id, entry) in builtins.iter() {
            let symbol = interner.intern(entry.name);
            environment::create(heap, env, symbol, Value::Builtin(id));
        }
        Vm {
            operand_stack: OperandStack::new(),
            call_stack: vec![CallFrame::new(block, env, None)],
        }
    }

    pub fn halted(&self) -> bool {
        self.call_stack.is_empty()
    }

    /// The value currently on top of the operand stack, if any. Mainly
    /// useful for tests and debug tooling driving a `Vm` directly rather
    /// than through a `Driver`.
    pub fn peek_operand(&self) -> Option<&Value> {
        self.operand_stack.iter().next_back()
    }

    /// Number of live call frames. Exposed for tests asserting that tail
    /// calls don't grow the call stack.
    pub fn call_stack_depth(&self) -> usize {
        self.call_stack.len()
    }

    fn current_frame(&self) -> VMResult<&CallFrame> {
        self.call_stack
            .last()
            .ok_or(VMError::CallStackUnderflow)
    }

    fn current_frame_mut(&mut self) -> VMResult<&mut CallFrame> {
        self.call_stack
            .last_mut()
            .ok_or(VMError::CallStackUnderflow)
    }

    /// Marks every live root this VM contributes: the operand stack and,
    /// per call frame, its originating Function (if any) and its full
    /// environment chain.
    pub fn mark_roots(&self, heap: &mut Heap) {
        for value in self.operand_stack.iter() {
            heap.mark_value(value);
        }
        for frame in &self.call_stack {
            if let Some(origin) = frame.origin {
                heap.mark_value(&Value::Function(origin));
            }
            heap.mark_environment(frame.env);
        }
    }

    fn pop_value(&mut self, op: &str) -> VMResult<Value> {
        self.operand_stack.pop(op)
    }

    fn pop_integer(&mut self, op: &str) -> VMResult<i64> {
        let v = self.pop_value(op)?;
        match v {
            Value::Integer(n) => Ok(n),
            other => Err(VMError::TypeMismatch {
                expected: "integer".to_string(),
                got: other.type_name().to_string(),
                operation: op.to_string(),
            }),
        }
    }

    fn pop_symbol(&mut self, op: &str) -> VMResult<crate::symbol::Symbol> {
        let v = self.pop_value(op)?;
        v.as_symbol(op)
    }

    fn push(&mut self, value: Value) {
        self.operand_stack.push(value);
    }

    /// Runs one instruction, or one round of implicit returns if the
    /// current frame has run off the end of its block.
    pub fn step(
        &mut self,
        blocks: &BlockStore,
        heap: &mut Heap,
        interner: &Interner,
        builtins: &BuiltinRegistry,
    ) -> VMResult<StepResult> {
        if self.halted() {
            return Ok(StepResult::Halted);
        }

        loop {
            let frame = self.current_frame()?;
            let block_len = blocks.block(frame.block).len();
            if frame.pc < block_len {
                break;
            }

            if self.call_stack.len() == 1 {
                // Exiting global scope: appease the "stack non-empty on pop" invariant.
                self.push(Value::Nothing);
            }
            if self.operand_stack.is_empty() {
                return Err(VMError::StackUnderflow("implicit RETURN".to_string()));
            }
            self.call_stack.pop();

            if self.halted() {
                self.operand_stack.drain();
                return Ok(StepResult::Halted);
            }
        }

        let frame = self.current_frame()?;
        let block = frame.block;
        let pc = frame.pc;
        let instr = blocks.block(block).instructions[pc].clone();
        self.current_frame_mut()?.pc += 1;

        self.dispatch(instr, blocks, heap, interner, builtins)?;
        Ok(StepResult::Ok)
    }

    fn dispatch(
        &mut self,
        instr: Instruction,
        blocks: &BlockStore,
        heap: &mut Heap,
        interner: &Interner,
        builtins: &BuiltinRegistry,
    ) -> VMResult<()> {
        match instr {
            Instruction::Nop => {}
            Instruction::PopAndDiscard => {
                self.pop_value("POP_AND_DISCARD")?;
            }
            Instruction::LoadConst(v) => self.push(v),
            Instruction::CreateBinding => {
                let symbol = self.pop_symbol("CREATE_BINDING")?;
                let value = self.pop_value("CREATE_BINDING")?;
                let env = self.current_frame()?.env;
                if !environment::create(heap, env, symbol, value) {
                    return Err(VMError::AlreadyBound(interner.resolve(symbol).to_string()));
                }
            }
            Instruction::UpdateBinding => {
                let symbol = self.pop_symbol("UPDATE_BINDING")?;
                let value = self.pop_value("UPDATE_BINDING")?;
                let env = self.current_frame()?.env;
                if !environment::update(heap, env, symbol, value) {
                    return Err(VMError::UndefinedVariable(
                        interner.resolve(symbol).to_string(),
                    ));
                }
            }
            Instruction::ResolveBinding => {
                let symbol = self.pop_symbol("RESOLVE_BINDING")?;
                let env = self.current_frame()?.env;
                let value = environment::resolve(heap, env, symbol).or_else(|| {
                    let global_env = self.call_stack[0].env;
                    environment::resolve(heap, global_env, symbol)
                });
                match value {
                    Some(v) => self.push(v),
                    None => {
                        return Err(VMError::UndefinedVariable(
                            interner.resolve(symbol).to_string(),
                        ))
                    }
                }
            }
            Instruction::Add => self.binary_arith(Value::add)?,
            Instruction::Sub => self.binary_arith(Value::subtract)?,
            Instruction::Mul => self.binary_arith(Value::multiply)?,
            Instruction::Div => self.binary_arith(Value::divide)?,
            Instruction::Eq => {
                let (a, b) = self.pop_pair("EQ")?;
                self.push(Value::raise_bool(Value::equal(&a, &b)));
            }
            Instruction::Neq => {
                let (a, b) = self.pop_pair("NEQ")?;
                self.push(Value::raise_bool(!Value::equal(&a, &b)));
            }
            Instruction::Lt => self.binary_cmp(Value::less_than)?,
            Instruction::Le => self.binary_cmp(Value::less_than_or_equal_to)?,
            Instruction::Gt => self.binary_cmp(Value::greater_than)?,
            Instruction::Ge => self.binary_cmp(Value::greater_than_or_equal_to)?,
            Instruction::And => {
                let (a, b) = self.pop_pair("AND")?;
                self.push(Value::raise_bool(Value::and(a, b)));
            }
            Instruction::Or => {
                let (a, b) = self.pop_pair("OR")?;
                self.push(Value::raise_bool(Value::or(a, b)));
            }
            Instruction::Not => {
                let a = self.pop_value("NOT")?;
                self.push(Value::raise_bool(Value::not(a)));
            }
            Instruction::ConstructFunction(block) => {
                let count = self.pop_integer("CONSTRUCT_FUNCTION")? as usize;
                let mut popped = Vec::with_capacity(count);
                for _ in 0..count {
                    popped.push(self.pop_symbol("CONSTRUCT_FUNCTION")?);
                }
                popped.reverse();
                let env = self.current_frame()?.env;
                let handle = heap.alloc_function(block, popped, Some(env));
                self.push(Value::Function(handle));
            }
            Instruction::PopAndCallFunction => self.call_function(blocks, heap, interner, builtins)?,
            Instruction::Return => {
                self.call_stack.pop();
            }
            Instruction::ThisFunction => {
                let origin = self
                    .current_frame()?
                    .origin
                    .ok_or(VMError::NotInAFunction)?;
                self.push(Value::Function(origin));
            }
            Instruction::SymbolToString => {
                let symbol = self.pop_symbol("SYMBOL_TO_STRING")?;
                let handle = heap.alloc_string(interner.resolve(symbol).as_bytes().to_vec());
                self.push(Value::String(handle));
            }
            Instruction::Jump(target) => {
                self.current_frame_mut()?.pc = target;
            }
            Instruction::PopJump(target) => {
                let a = self.pop_value("POP_JUMP")?;
                if !matches!(a, Value::Nothing) {
                    self.current_frame_mut()?.pc = target;
                }
            }
            Instruction::EnterScope => {
                let parent = self.current_frame()?.env;
                let new_env = heap.alloc_environment(Some(parent));
                self.current_frame_mut()?.env = new_env;
            }
            Instruction::ExitScope => {
                let current = self.current_frame()?.env;
                if let Some(parent) = heap.environment(current).parent {
                    self.current_frame_mut()?.env = parent;
                }
            }
            Instruction::ConstructConstructor => {
                let count = self.pop_integer("CONSTRUCT_CONSTRUCTOR")? as usize;
                let mut fields = Vec::with_capacity(count);
                for _ in 0..count {
                    fields.push(self.pop_symbol("CONSTRUCT_CONSTRUCTOR")?);
                }
                let handle = heap.alloc_constructor(fields);
                self.push(Value::Constructor(handle));
            }
            Instruction::ResolveField => {
                let symbol = self.pop_symbol("RESOLVE_FIELD")?;
                let obj = self.pop_value("RESOLVE_FIELD")?;
                let handle = obj.as_object("RESOLVE_FIELD")?;
                let value = *heap
                    .object(handle)
                    .get(symbol)
                    .ok_or_else(|| VMError::NoSuchField(interner.resolve(symbol).to_string()))?;
                self.push(value);
            }
            Instruction::UpdateField => {
                let symbol = self.pop_symbol("UPDATE_FIELD")?;
                let obj = self.pop_value("UPDATE_FIELD")?;
                let handle = obj.as_object("UPDATE_FIELD")?;
                let value = self.pop_value("UPDATE_FIELD")?;
                if !heap.object_mut(handle).set(symbol, value) {
                    return Err(VMError::NoSuchField(interner.resolve(symbol).to_string()));
                }
            }
        }
        Ok(())
    }

    /// True if, from the current instruction pointer onward, the calling
    /// frame does nothing but `EXIT_SCOPE` before either falling off the end
    /// of its block or hitting `RETURN` — i.e. this call's result is the
    /// caller's own result, so the caller's frame can be dropped before the
    /// callee's is pushed instead of after it returns.
    #[cfg(feature = "tco")]
    fn call_in_tail_position(&self, blocks: &BlockStore) -> VMResult<bool> {
        let frame = self.current_frame()?;
        let instructions = &blocks.block(frame.block).instructions;
        let mut i = frame.pc;
        loop {
            if i >= instructions.len() || matches!(instructions[i], Instruction::Return) {
                return Ok(true);
            }
            if !matches!(instructions[i], Instruction::ExitScope) {
                return Ok(false);
            }
            i += 1;
        }
    }

    fn pop_pair(&mut self, op: &str) -> VMResult<(Value, Value)> {
        let b = self.pop_value(op)?;
        let a = self.pop_value(op)?;
        Ok((a, b))
    }

    fn binary_arith(&mut self, f: fn(Value, Value) -> VMResult<Value>) -> VMResult<()> {
        let (a, b) = self.pop_pair("arithmetic")?;
        self.push(f(a, b)?);
        Ok(())
    }

    fn binary_cmp(&mut self, f: fn(Value, Value) -> VMResult<bool>) -> VMResult<()> {
        let (a, b) = self.pop_pair("comparison")?;
        self.push(Value::raise_bool(f(a, b)?));
        Ok(())
    }

    fn call_function(
        &mut self,
        blocks: &BlockStore,
        heap: &mut Heap,
        interner: &Interner,
        builtins: &BuiltinRegistry,
    ) -> VMResult<()> {
        let callee = self.pop_value("POP_AND_CALL_FUNCTION")?;
        match callee {
            Value::Builtin(id) => {
                let argc = self.pop_integer("POP_AND_CALL_FUNCTION")? as usize;
                let entry = builtins.entry(id);
                if argc != entry.arg_count {
                    return Err(VMError::ArityMismatch {
                        expected: entry.arg_count,
                        got: argc,
                        callee: entry.name.to_string(),
                    });
                }
                let mut args = Vec::with_capacity(argc);
                for _ in 0..argc {
                    args.push(self.pop_value("POP_AND_CALL_FUNCTION")?);
                }
                let result = builtins.call(id, &args, heap, interner)?;
                self.push(result);
            }
            Value::Constructor(ctor_handle) => {
                let argc = self.pop_integer("POP_AND_CALL_FUNCTION")? as usize;
                let field_count = heap.constructor(ctor_handle).fields.len();
                if argc != field_count {
                    return Err(VMError::ArityMismatch {
                        expected: field_count,
                        got: argc,
                        callee: "constructor".to_string(),
                    });
                }
                let fields = heap.constructor(ctor_handle).fields.clone();
                let mut bound = Vec::with_capacity(argc);
                for i in 0..argc {
                    let value = self.pop_value("POP_AND_CALL_FUNCTION")?;
                    bound.push((fields[i], value));
                }
                let handle = heap.alloc_object(bound);
                self.push(Value::Object(handle));
            }
            Value::Function(func_handle) => {
                let argc = self.pop_integer("POP_AND_CALL_FUNCTION")? as usize;
                let func = heap.function(func_handle).clone();
                if argc != func.params.len() {
                    return Err(VMError::ArityMismatch {
                        expected: func.params.len(),
                        got: argc,
                        callee: "function".to_string(),
                    });
                }
                #[cfg(feature = "tco")]
                if self.call_in_tail_position(blocks)? {
                    self.call_stack.pop();
                }

                let env = heap.alloc_environment(func.closure);
                self.call_stack
                    .push(CallFrame::new(func.block, env, Some(func_handle)));
                for i in 0..argc {
                    let value = self.pop_value("POP_AND_CALL_FUNCTION")?;
                    if !environment::create(heap, env, func.params[i], value) {
                        return Err(VMError::AlreadyBound(
                            interner.resolve(func.params[i]).to_string(),
                        ));
                    }
                }
            }
            other => {
                return Err(VMError::TypeMismatch {
                    expected: "function, builtin, or constructor".to_string(),
                    got: other.type_name().to_string(),
                    operation: "POP_AND_CALL_FUNCTION".to_string(),
                })
            }
        }
        Ok(())
    }
}
