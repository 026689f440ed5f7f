//! The driver: owns a stack of cooperating `Vm` instances sharing one
//! `Heap`/`BlockStore`/`Interner`/`BuiltinRegistry`, and the single-threaded
//! step/collect loop that runs them to completion.

use crate::builtins::BuiltinRegistry;
use crate::gc::{GcEngine, GcStats, Heap};
use crate::symbol::Interner;
use crate::vm::block::{BlockRef, BlockStore};
use crate::vm::errors::VMResult;
use crate::vm::machine::{StepResult, Vm};
use tracing::{debug, info};

pub struct Driver {
    blocks: BlockStore,
    heap: Heap,
    interner: Interner,
    builtins: BuiltinRegistry,
    gc: Box<dyn GcEngine>,
    vm_stack: Vec<Vm>,
    trace: bool,
}

impl Driver {
    /// `heap` is the same heap the assembly loader allocated string/symbol
    /// constants into, so those allocations are already live when the first
    /// `Vm` starts marking roots.
    pub fn new(blocks: BlockStore, heap: Heap, interner: Interner, gc: Box<dyn GcEngine>, trace: bool) -> Self {
        Driver {
            blocks,
            heap,
            interner,
            builtins: BuiltinRegistry::standard(),
            gc,
            vm_stack: Vec::new(),
            trace,
        }
    }

    pub fn gc_stats(&self) -> GcStats {
        self.gc.stats(&self.heap)
    }

    pub fn report_gc_stats(&self) {
        let stats = self.gc_stats();
        info!(
            allocated = stats.total_allocated,
            freed = stats.total_freed,
            live = stats.current_allocated,
            cycles = stats.collections_performed,
            "gc stats"
        );
    }

    /// Bootstraps a VM against `entry` and runs every VM on the stack to
    /// completion, one step at a time, with a GC cycle after each step.
    pub fn run(&mut self, entry: BlockRef) -> VMResult<()> {
        let vm = Vm::new(&mut self.heap, entry, &mut self.interner, &self.builtins);
        self.vm_stack.push(vm);

        while let Some(top) = self.vm_stack.last_mut() {
            let response = top.step(&self.blocks, &mut self.heap, &self.interner, &self.builtins)?;

            match response {
                StepResult::Ok => {}
                StepResult::Halted => {
                    self.vm_stack.pop();
                    continue;
                }
                StepResult::Switch(block) => {
                    let new_vm = Vm::new(&mut self.heap, block, &mut self.interner, &self.builtins);
                    self.vm_stack.push(new_vm);
                }
            }

            let vm_stack = &self.vm_stack;
            let freed = self.gc.maybe_collect(&mut self.heap, &mut |heap| {
                for vm in vm_stack {
                    vm.mark_roots(heap);
                }
            });
            if self.trace && freed > 0 {
                debug!(collected = freed, "gc cycle");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::MarkSweepGc;
    use crate::vm::opcode::Instruction;
    use crate::vm::value::Value;

    #[test]
    fn a_single_block_program_runs_to_completion() {
        let mut blocks = BlockStore::new();
        let top = blocks.push_block();
        blocks.block_mut(top).instructions = vec![
            Instruction::LoadConst(Value::Integer(1)),
            Instruction::LoadConst(Value::Integer(2)),
            Instruction::Add,
        ];
        let mut driver = Driver::new(
            blocks,
            Heap::new(),
            Interner::new(),
            Box::new(MarkSweepGc::new(false)),
            false,
        );
        assert!(driver.run(BlockRef::TOP_LEVEL).is_ok());
    }

    #[test]
    fn switching_to_a_second_block_runs_both_vms_to_completion() {
        let mut blocks = BlockStore::new();
        let top = blocks.push_block();
        let second = blocks.push_block();
        blocks.block_mut(second).instructions = vec![Instruction::LoadConst(Value::Integer(7))];
        blocks.block_mut(top).instructions = vec![Instruction::LoadConst(Value::Integer(1))];

        let mut driver = Driver::new(
            blocks,
            Heap::new(),
            Interner::new(),
            Box::new(MarkSweepGc::new(false)),
            false,
        );
        // Exercise SWITCH directly: no instruction in this set emits it, so
        // this drives the driver's multi-VM machinery by hand.
        let vm = Vm::new(&mut driver.heap, top, &mut driver.interner, &driver.builtins);
        driver.vm_stack.push(vm);
        let response = StepResult::Switch(second);
        match response {
            StepResult::Switch(block) => {
                let new_vm = Vm::new(&mut driver.heap, block, &mut driver.interner, &driver.builtins);
                driver.vm_stack.push(new_vm);
            }
            _ => unreachable!(),
        }
        assert_eq!(driver.vm_stack.len(), 2);

        while let Some(top_vm) = driver.vm_stack.last_mut() {
            let step = top_vm
                .step(&driver.blocks, &mut driver.heap, &driver.interner, &driver.builtins)
                .unwrap();
            if step == StepResult::Halted {
                driver.vm_stack.pop();
            }
        }
        assert!(driver.vm_stack.is_empty());
    }
}
