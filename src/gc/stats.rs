//! Allocation counters, reported by `--gc-stats`-style diagnostics (`TTVM_GC_STATS=1`).

#[derive(Debug, Clone, Default)]
pub struct GcStats {
    pub total_allocated: usize,
    pub total_freed: usize,
    pub current_allocated: usize,
    pub collections_performed: usize,
}
