//! Analysis-wide configuration (spec §6).

use crate::solver::bulk::DEFAULT_WORKERS;

/// Tunables the driver and generator consult while building and solving the
/// constraint system. `Default` matches spec.md's stated defaults: nothing
/// collapsed, sinks not dropped early, the full worker pool.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisConfig {
    /// Route every call through an external symbol to the default context
    /// instead of extending the caller's context (spec §6
    /// `collapse_external_context`).
    pub collapse_external_context: bool,
    /// Route every indirect call to the default context instead of
    /// extending the caller's context (spec §6 `collapse_indirect_context`).
    pub collapse_indirect_context: bool,
    /// Stop propagating a value past a location the source/sink service
    /// names as a sink, instead of continuing to carry it forward for any
    /// later query (spec §6 `drop_at_sinks`).
    pub drop_at_sinks: bool,
    /// Worker thread count for [`crate::solver::bulk::solve_many_least_mt`]
    /// (spec §6 `parallel_workers`).
    pub parallel_workers: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            collapse_external_context: false,
            collapse_indirect_context: false,
            drop_at_sinks: false,
            parallel_workers: DEFAULT_WORKERS,
        }
    }
}
