//! Heap & collector. A tracing mark-and-sweep collector over a typed
//! arena heap (`heap`), with a pluggable collection policy (`GcEngine`)
//! deciding *whether* a cycle runs, separating the mark-sweep and no-op
//! policies behind one trait.

pub mod heap;
pub mod mark_sweep;
pub mod no_gc;
pub mod stats;

pub use heap::{CtorHandle, EnvHandle, FuncHandle, Heap, ObjHandle, StrHandle};
pub use mark_sweep::MarkSweepGc;
pub use no_gc::NoGc;
pub use stats::GcStats;

/// A collection policy: decides whether/when a mark-sweep cycle runs.
/// `mark_roots` is invoked with the heap only when a cycle is going ahead,
/// so the caller can walk every live VM's roots via `Heap::mark_value` /
/// `Heap::mark_environment`.
pub trait GcEngine: std::fmt::Debug {
    fn maybe_collect(&mut self, heap: &mut Heap, mark_roots: &mut dyn FnMut(&mut Heap)) -> usize;
    fn stats(&self, heap: &Heap) -> GcStats;
}

/// Constructs the engine named by `TTVM_GC` (`"mark-sweep"` default, or
/// `"no-gc"`).
pub fn engine_for_name(name: &str, debug_mode: bool) -> Box<dyn GcEngine> {
    match name {
        "no-gc" => Box::new(NoGc::new()),
        _ => Box::new(MarkSweepGc::new(debug_mode)),
    }
}
