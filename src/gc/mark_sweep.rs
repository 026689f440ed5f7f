use crate::gc::heap::Heap;
use crate::gc::stats::GcStats;
use crate::gc::GcEngine;

/// The mark-sweep collection policy: runs a full unmark/mark/sweep cycle,
/// gated by the watermark throttle when the `watermark` feature is enabled.
#[derive(Debug)]
pub struct MarkSweepGc {
    debug_mode: bool,
    collections: usize,
}

impl MarkSweepGc {
    pub fn new(debug_mode: bool) -> Self {
        MarkSweepGc {
            debug_mode,
            collections: 0,
        }
    }
}

impl GcEngine for MarkSweepGc {
    fn maybe_collect(&mut self, heap: &mut Heap, mark_roots: &mut dyn FnMut(&mut Heap)) -> usize {
        #[cfg(feature = "watermark")]
        if heap.past_watermark() {
            return 0;
        }

        heap.unmark_all();
        mark_roots(heap);
        let freed = heap.sweep();
        self.collections += 1;

        if self.debug_mode {
            eprintln!(
                "GC: cycle {} collected {} cell(s), {} remaining",
                self.collections,
                freed,
                heap.stats().current_allocated
            );
        }

        freed
    }

    fn stats(&self, heap: &Heap) -> GcStats {
        heap.stats()
    }
}
