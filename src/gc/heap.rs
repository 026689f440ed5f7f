//! The heap: an arena of typed cells addressed by opaque handles, with a
//! mark bit per cell. One arena per heap-variant kind. This sidesteps
//! shared-ownership machinery while still supporting reference cycles
//! between `Object`s, `Function` closures, and `Environment` chains.

use std::fmt;

use crate::gc::stats::GcStats;
use crate::symbol::Symbol;
use crate::vm::block::BlockRef;
use crate::vm::value::Value;

macro_rules! handle_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(u32);

        impl $name {
            fn index(self) -> usize {
                self.0 as usize
            }

            /// The underlying dense index, for debug display only.
            pub fn raw_index(self) -> u32 {
                self.0
            }
        }
    };
}

handle_type!(StrHandle);
handle_type!(FuncHandle);
handle_type!(CtorHandle);
handle_type!(ObjHandle);
handle_type!(EnvHandle);

/// A heap-allocated string cell: length + bytes.
#[derive(Debug, Clone)]
pub struct StringCell {
    pub bytes: Vec<u8>,
}

impl StringCell {
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or("<invalid utf8>")
    }
}

/// A heap-allocated user function: its block, parameter symbols (in
/// declaration order), and the environment it closed over at construction.
#[derive(Debug, Clone)]
pub struct FunctionCell {
    pub block: BlockRef,
    pub params: Vec<Symbol>,
    pub closure: Option<EnvHandle>,
}

/// A heap-allocated record constructor: its ordered field symbols.
#[derive(Debug, Clone)]
pub struct ConstructorCell {
    pub fields: Vec<Symbol>,
}

/// A heap-allocated record instance. The mapping is an insertion-ordered
/// `Vec` of pairs rather than a hash map, matching the small, fixed-arity,
/// constructor-declared field sets records actually have — the same reason
/// `Environment` below uses the same shape.
#[derive(Debug, Clone)]
pub struct ObjectCell {
    pub fields: Vec<(Symbol, Value)>,
}

impl ObjectCell {
    pub fn get(&self, sym: Symbol) -> Option<&Value> {
        self.fields.iter().find(|(s, _)| *s == sym).map(|(_, v)| v)
    }

    pub fn set(&mut self, sym: Symbol, value: Value) -> bool {
        match self.fields.iter_mut().find(|(s, _)| *s == sym) {
            Some((_, slot)) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// An environment node: ordered bindings plus a parent link. The node itself
/// is a GC cell since a closure's captured environment may outlive the call
/// frame that created it.
#[derive(Debug, Clone)]
pub struct EnvironmentCell {
    pub names: Vec<Symbol>,
    pub values: Vec<Value>,
    pub parent: Option<EnvHandle>,
}

impl EnvironmentCell {
    pub fn new(parent: Option<EnvHandle>) -> Self {
        Self {
            names: Vec::new(),
            values: Vec::new(),
            parent,
        }
    }

    /// Returns `false` (create failed) if `sym` is already bound in this node.
    pub fn create(&mut self, sym: Symbol, value: Value) -> bool {
        if self.names.contains(&sym) {
            return false;
        }
        self.names.push(sym);
        self.values.push(value);
        true
    }

    pub fn find_local(&self, sym: Symbol) -> Option<usize> {
        self.names.iter().position(|&s| s == sym)
    }
}

struct Slot<T> {
    value: Option<T>,
    marked: bool,
}

/// A single typed arena: dense storage plus a free list so swept slots are
/// recycled instead of letting the arena grow without bound.
struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> Arena<T> {
    fn alloc(&mut self, value: T) -> u32 {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Slot {
                value: Some(value),
                marked: false,
            };
            idx
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Slot {
                value: Some(value),
                marked: false,
            });
            idx
        }
    }

    fn get(&self, idx: u32) -> &T {
        self.slots[idx as usize]
            .value
            .as_ref()
            .expect("use of a swept GC handle")
    }

    fn get_mut(&mut self, idx: u32) -> &mut T {
        self.slots[idx as usize]
            .value
            .as_mut()
            .expect("use of a swept GC handle")
    }

    /// Marks `idx`; returns the bit it had *before* this call, so the caller
    /// can avoid re-walking an already-marked subgraph (mandatory for
    /// termination on cycles).
    fn mark(&mut self, idx: u32) -> bool {
        let slot = &mut self.slots[idx as usize];
        let was_marked = slot.marked;
        slot.marked = true;
        was_marked
    }

    fn is_marked(&self, idx: u32) -> bool {
        self.slots[idx as usize].marked
    }

    fn unmark_all(&mut self) {
        for slot in &mut self.slots {
            slot.marked = false;
        }
    }

    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.is_some() && !slot.marked {
                slot.value = None; // drops owned sub-buffers (Vec<u8>, Vec<Symbol>, ...)
                self.free.push(idx as u32);
                freed += 1;
            }
        }
        freed
    }

    fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

/// The heap: one arena per GC-managed cell kind, plus a running allocation
/// count used for the watermark throttle (feature `watermark`).
pub struct Heap {
    strings: Arena<StringCell>,
    functions: Arena<FunctionCell>,
    constructors: Arena<ConstructorCell>,
    objects: Arena<ObjectCell>,
    environments: Arena<EnvironmentCell>,
    stats: GcStats,
    allocations_since_sweep: usize,
    watermark_threshold: usize,
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("strings", &self.strings.live_count())
            .field("functions", &self.functions.live_count())
            .field("constructors", &self.constructors.live_count())
            .field("objects", &self.objects.live_count())
            .field("environments", &self.environments.live_count())
            .finish()
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            strings: Arena::default(),
            functions: Arena::default(),
            constructors: Arena::default(),
            objects: Arena::default(),
            environments: Arena::default(),
            stats: GcStats::default(),
            allocations_since_sweep: 0,
            watermark_threshold: 256,
        }
    }

    pub fn with_watermark_threshold(mut self, threshold: usize) -> Self {
        self.watermark_threshold = threshold;
        self
    }

    fn record_alloc(&mut self) {
        self.stats.total_allocated += 1;
        self.stats.current_allocated += 1;
        self.allocations_since_sweep += 1;
    }

    pub fn alloc_string(&mut self, bytes: Vec<u8>) -> StrHandle {
        self.record_alloc();
        StrHandle(self.strings.alloc(StringCell { bytes }))
    }

    pub fn alloc_function(
        &mut self,
        block: BlockRef,
        params: Vec<Symbol>,
        closure: Option<EnvHandle>,
    ) -> FuncHandle {
        self.record_alloc();
        FuncHandle(self.functions.alloc(FunctionCell {
            block,
            params,
            closure,
        }))
    }

    pub fn alloc_constructor(&mut self, fields: Vec<Symbol>) -> CtorHandle {
        self.record_alloc();
        CtorHandle(self.constructors.alloc(ConstructorCell { fields }))
    }

    pub fn alloc_object(&mut self, fields: Vec<(Symbol, Value)>) -> ObjHandle {
        self.record_alloc();
        ObjHandle(self.objects.alloc(ObjectCell { fields }))
    }

    pub fn alloc_environment(&mut self, parent: Option<EnvHandle>) -> EnvHandle {
        self.record_alloc();
        EnvHandle(self.environments.alloc(EnvironmentCell::new(parent)))
    }

    pub fn string(&self, h: StrHandle) -> &StringCell {
        self.strings.get(h.0)
    }
    pub fn function(&self, h: FuncHandle) -> &FunctionCell {
        self.functions.get(h.0)
    }
    pub fn constructor(&self, h: CtorHandle) -> &ConstructorCell {
        self.constructors.get(h.0)
    }
    pub fn object(&self, h: ObjHandle) -> &ObjectCell {
        self.objects.get(h.0)
    }
    pub fn object_mut(&mut self, h: ObjHandle) -> &mut ObjectCell {
        self.objects.get_mut(h.0)
    }
    pub fn environment(&self, h: EnvHandle) -> &EnvironmentCell {
        self.environments.get(h.0)
    }
    pub fn environment_mut(&mut self, h: EnvHandle) -> &mut EnvironmentCell {
        self.environments.get_mut(h.0)
    }

    // --- Mark phase -----------------------------------------------------

    /// Marks `value` and, transitively, everything it references. Safe on
    /// cycles: each cell's body is only walked the first time it's marked.
    pub fn mark_value(&mut self, value: &Value) {
        match *value {
            Value::Nothing
            | Value::Integer(_)
            | Value::Boolean(_)
            | Value::Symbol(_)
            | Value::Builtin(_) => {}
            Value::String(h) => {
                self.strings.mark(h.0);
            }
            Value::Function(h) => {
                if !self.functions.mark(h.0) {
                    if let Some(closure) = self.function(h).closure {
                        self.mark_environment(closure);
                    }
                }
            }
            Value::Constructor(h) => {
                self.constructors.mark(h.0);
            }
            Value::Object(h) => {
                if !self.objects.mark(h.0) {
                    let fields = self.object(h).fields.clone();
                    for (_, v) in &fields {
                        self.mark_value(v);
                    }
                }
            }
        }
    }

    /// Marks an environment and walks its full parent chain, marking every
    /// binding's value along the way.
    pub fn mark_environment(&mut self, handle: EnvHandle) {
        let mut current = Some(handle);
        while let Some(h) = current {
            if self.environments.mark(h.0) {
                break; // already marked (and so was everything above it)
            }
            let values = self.environment(h).values.clone();
            for v in &values {
                self.mark_value(v);
            }
            current = self.environment(h).parent;
        }
    }

    pub fn unmark_all(&mut self) {
        self.strings.unmark_all();
        self.functions.unmark_all();
        self.constructors.unmark_all();
        self.objects.unmark_all();
        self.environments.unmark_all();
    }

    pub fn sweep(&mut self) -> usize {
        let freed = self.strings.sweep()
            + self.functions.sweep()
            + self.constructors.sweep()
            + self.objects.sweep()
            + self.environments.sweep();
        self.stats.total_freed += freed;
        self.stats.current_allocated = self.stats.current_allocated.saturating_sub(freed);
        self.stats.collections_performed += 1;
        self.allocations_since_sweep = 0;
        freed
    }

    /// Release-mode throttle: true when allocation activity since the last
    /// sweep hasn't reached the configured threshold yet.
    pub fn past_watermark(&self) -> bool {
        self.allocations_since_sweep < self.watermark_threshold
    }

    pub fn stats(&self) -> GcStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_frees_unreached_objects_and_recycles_the_slot() {
        let mut heap = Heap::new();
        let obj = heap.alloc_object(vec![]);
        heap.unmark_all();
        // no mark_value call: obj is unreachable
        let freed = heap.sweep();
        assert_eq!(freed, 1);
        assert_eq!(heap.stats().current_allocated, 0);

        // the freed slot is recycled for the next allocation
        let _again = heap.alloc_object(vec![]);
        assert_eq!(heap.objects.slots.len(), 1);
    }

    #[test]
    fn sweep_keeps_marked_objects() {
        let mut heap = Heap::new();
        let obj = heap.alloc_object(vec![]);
        heap.unmark_all();
        heap.mark_value(&Value::Object(obj));
        let freed = heap.sweep();
        assert_eq!(freed, 0);
        assert_eq!(heap.stats().current_allocated, 1);
    }

    #[test]
    fn cyclic_objects_are_collected_together_once_unreachable() {
        let mut heap = Heap::new();
        let a = heap.alloc_object(vec![]);
        let b = heap.alloc_object(vec![]);
        let sym = crate::symbol::Interner::new().intern("next"); // standalone interner, fine for a plain symbol id
        heap.object_mut(a).fields.push((sym, Value::Object(b)));
        heap.object_mut(b).fields.push((sym, Value::Object(a)));

        heap.unmark_all();
        // no roots reference a or b anymore
        let freed = heap.sweep();
        assert_eq!(freed, 2);
    }

    #[test]
    fn marking_a_cycle_terminates_and_keeps_both_objects() {
        let mut heap = Heap::new();
        let a = heap.alloc_object(vec![]);
        let b = heap.alloc_object(vec![]);
        let mut interner = crate::symbol::Interner::new();
        let sym = interner.intern("next");
        heap.object_mut(a).fields.push((sym, Value::Object(b)));
        heap.object_mut(b).fields.push((sym, Value::Object(a)));

        heap.unmark_all();
        heap.mark_value(&Value::Object(a)); // must terminate despite the cycle
        let freed = heap.sweep();
        assert_eq!(freed, 0);
    }
}
