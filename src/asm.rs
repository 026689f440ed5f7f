//! Assembly loader: a minimal, line-oriented textual notation for the
//! instruction set, existing purely so the engine has a runnable input
//! format without a full source-language compiler. One instruction (or a
//! `LABEL name` / `BLOCK` pseudo-directive) per line; `;` introduces a line
//! comment. Two passes: the first collects each block's instruction lines
//! and label positions, the second parses operands and resolves jump
//! targets.

use crate::gc::Heap;
use crate::symbol::Interner;
use crate::vm::block::{BlockRef, BlockStore};
use crate::vm::errors::{VMError, VMResult};
use crate::vm::opcode::Instruction;
use crate::vm::value::Value;
use std::collections::HashMap;

struct RawBlock {
    /// `(source_line_number, mnemonic, operand)` for every non-directive line.
    lines: Vec<(usize, String, Option<String>)>,
    labels: HashMap<String, usize>,
}

/// Parses `source` into a `BlockStore`, interning symbols and allocating
/// string constants into `heap` as it goes. Block 0 (the first block
/// encountered, implicitly opened before the first line) is the entry
/// point.
pub fn load(source: &str, heap: &mut Heap, interner: &mut Interner) -> VMResult<(BlockStore, BlockRef)> {
    let mut raw_blocks = vec![RawBlock {
        lines: Vec::new(),
        labels: HashMap::new(),
    }];

    for (line_no, raw_line) in source.lines().enumerate() {
        let line_no = line_no + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if line == "BLOCK" {
            raw_blocks.push(RawBlock {
                lines: Vec::new(),
                labels: HashMap::new(),
            });
            continue;
        }

        if let Some(label) = line.strip_prefix("LABEL ") {
            let current = raw_blocks.last_mut().expect("at least one block always exists");
            current
                .labels
                .insert(label.trim().to_string(), current.lines.len());
            continue;
        }

        let mut parts = line.splitn(2, char::is_whitespace);
        let mnemonic = parts.next().unwrap_or("").to_string();
        let operand = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        raw_blocks
            .last_mut()
            .expect("at least one block always exists")
            .lines
            .push((line_no, mnemonic, operand));
    }

    let mut store = BlockStore::new();
    for _ in &raw_blocks {
        store.push_block();
    }

    for (index, raw) in raw_blocks.iter().enumerate() {
        let block_ref = BlockRef::from_index(index);
        let mut instructions = Vec::with_capacity(raw.lines.len());
        for (line_no, mnemonic, operand) in &raw.lines {
            instructions.push(encode(
                *line_no,
                mnemonic,
                operand.as_deref(),
                &raw.labels,
                heap,
                interner,
            )?);
        }
        store.block_mut(block_ref).instructions = instructions;
    }

    Ok((store, BlockRef::TOP_LEVEL))
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(ix) => &line[..ix],
        None => line,
    }
}

fn encode(
    line_no: usize,
    mnemonic: &str,
    operand: Option<&str>,
    labels: &HashMap<String, usize>,
    heap: &mut Heap,
    interner: &mut Interner,
) -> VMResult<Instruction> {
    let err = |message: String| VMError::AsmError { line: line_no, message };

    let require_operand = |name: &str| -> VMResult<&str> {
        operand.ok_or_else(|| err(format!("{} requires an operand", name)))
    };

    match mnemonic {
        "NOP" => Ok(Instruction::Nop),
        "POP_AND_DISCARD" => Ok(Instruction::PopAndDiscard),
        "LOAD_CONST" => {
            let value = parse_const(require_operand("LOAD_CONST")?, heap, interner)
                .map_err(|message| err(message))?;
            Ok(Instruction::LoadConst(value))
        }
        "CREATE_BINDING" => Ok(Instruction::CreateBinding),
        "UPDATE_BINDING" => Ok(Instruction::UpdateBinding),
        "RESOLVE_BINDING" => Ok(Instruction::ResolveBinding),
        "ADD" => Ok(Instruction::Add),
        "SUB" => Ok(Instruction::Sub),
        "MUL" => Ok(Instruction::Mul),
        "DIV" => Ok(Instruction::Div),
        "EQ" => Ok(Instruction::Eq),
        "NEQ" => Ok(Instruction::Neq),
        "LT" => Ok(Instruction::Lt),
        "LE" => Ok(Instruction::Le),
        "GT" => Ok(Instruction::Gt),
        "GE" => Ok(Instruction::Ge),
        "AND" => Ok(Instruction::And),
        "OR" => Ok(Instruction::Or),
        "NOT" => Ok(Instruction::Not),
        "CONSTRUCT_FUNCTION" => {
            let operand = require_operand("CONSTRUCT_FUNCTION")?;
            let index: usize = operand
                .parse()
                .map_err(|_| err(format!("invalid block index '{}'", operand)))?;
            Ok(Instruction::ConstructFunction(BlockRef::from_index(index)))
        }
        "POP_AND_CALL_FUNCTION" => Ok(Instruction::PopAndCallFunction),
        "RETURN" => Ok(Instruction::Return),
        "THIS_FUNCTION" => Ok(Instruction::ThisFunction),
        "SYMBOL_TO_STRING" => Ok(Instruction::SymbolToString),
        "JUMP" => {
            let label = require_operand("JUMP")?;
            let target = labels
                .get(label)
                .ok_or_else(|| err(format!("unresolved label '{}'", label)))?;
            Ok(Instruction::Jump(*target))
        }
        "POP_JUMP" => {
            let label = require_operand("POP_JUMP")?;
            let target = labels
                .get(label)
                .ok_or_else(|| err(format!("unresolved label '{}'", label)))?;
            Ok(Instruction::PopJump(*target))
        }
        "ENTER_SCOPE" => Ok(Instruction::EnterScope),
        "EXIT_SCOPE" => Ok(Instruction::ExitScope),
        "CONSTRUCT_CONSTRUCTOR" => Ok(Instruction::ConstructConstructor),
        "RESOLVE_FIELD" => Ok(Instruction::ResolveField),
        "UPDATE_FIELD" => Ok(Instruction::UpdateField),
        other => Err(err(format!("unknown mnemonic '{}'", other))),
    }
}

/// `LOAD_CONST` operand grammar: `nothing`, `true`/`false`, an integer
/// literal, a `"double-quoted string"` (allocated into the heap), or a
/// `'symbol_name` (interned).
fn parse_const(operand: &str, heap: &mut Heap, interner: &mut Interner) -> Result<Value, String> {
    if operand == "nothing" {
        return Ok(Value::Nothing);
    }
    if operand == "true" {
        return Ok(Value::Boolean(true));
    }
    if operand == "false" {
        return Ok(Value::Boolean(false));
    }
    if let Some(name) = operand.strip_prefix('\'') {
        return Ok(Value::Symbol(interner.intern(name)));
    }
    if let Some(quoted) = operand.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        let handle = heap.alloc_string(quoted.as_bytes().to_vec());
        return Ok(Value::String(handle));
    }
    operand
        .parse::<i64>()
        .map(Value::Integer)
        .map_err(|_| format!("invalid LOAD_CONST operand '{}'", operand))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_single_block_program_assembles() {
        let source = "LOAD_CONST 2\nLOAD_CONST 3\nADD\n";
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let (store, entry) = load(source, &mut heap, &mut interner).unwrap();
        assert_eq!(entry, BlockRef::TOP_LEVEL);
        assert_eq!(store.block(entry).len(), 3);
    }

    #[test]
    fn labels_resolve_to_absolute_instruction_indices() {
        let source = "LOAD_CONST true\nPOP_JUMP skip\nLOAD_CONST 1\nLABEL skip\nLOAD_CONST 2\n";
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let (store, entry) = load(source, &mut heap, &mut interner).unwrap();
        match &store.block(entry).instructions[1] {
            Instruction::PopJump(target) => assert_eq!(*target, 3),
            other => panic!("expected PopJump, got {:?}", other),
        }
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let source = "; a comment\n\nNOP ; trailing comment\n";
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let (store, entry) = load(source, &mut heap, &mut interner).unwrap();
        assert_eq!(store.block(entry).len(), 1);
    }

    #[test]
    fn a_block_directive_opens_a_new_addressable_block() {
        let source = "LOAD_CONST 0\nCONSTRUCT_FUNCTION 1\nBLOCK\nLOAD_CONST 42\n";
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let (store, entry) = load(source, &mut heap, &mut interner).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(entry, BlockRef::TOP_LEVEL);
        match &store.block(entry).instructions[1] {
            Instruction::ConstructFunction(block) => assert_eq!(block.index(), 1),
            other => panic!("expected ConstructFunction, got {:?}", other),
        }
    }

    #[test]
    fn an_unknown_mnemonic_is_a_fatal_asm_error() {
        let source = "BOGUS_OP\n";
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let err = load(source, &mut heap, &mut interner).unwrap_err();
        assert!(matches!(err, VMError::AsmError { line: 1, .. }));
    }

    #[test]
    fn an_unresolved_label_is_a_fatal_asm_error() {
        let source = "JUMP nowhere\n";
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let err = load(source, &mut heap, &mut interner).unwrap_err();
        assert!(matches!(err, VMError::AsmError { .. }));
    }

    #[test]
    fn a_string_constant_allocates_into_the_heap() {
        let source = "LOAD_CONST \"hi\"\n";
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let (store, entry) = load(source, &mut heap, &mut interner).unwrap();
        match &store.block(entry).instructions[0] {
            Instruction::LoadConst(Value::String(handle)) => {
                assert_eq!(heap.string(*handle).as_str(), "hi");
            }
            other => panic!("expected a string constant, got {:?}", other),
        }
    }
}
