//! External-collaborator contracts (spec §6).
//!
//! Everything in this module is, by design, a trait: building the points-to
//! sets, call graph, and post-dominator tree for a compiled program is
//! explicitly out of scope for this analysis (spec §1 "Out of scope"). Only
//! the taint analysis's *dependence* on their answers is specified here; a
//! caller wires in real implementations (typically backed by a separate
//! points-to/call-graph crate) before running the driver.

use std::collections::BTreeSet;

use crate::flow::{FlowEndpoint, FlowRecord};
use crate::ir::{AbstractLocation, BlockId, FunctionId, Module, ValueId};

/// Supplies points-to information for pointer-typed SSA values (spec §6
/// "Points-to provider"). Both queries may return the empty set; results are
/// assumed stable for the duration of the analysis (consulted only after
/// IR-level module construction completes).
pub trait PointsToProvider {
    /// The direct (one-hop) points-to set of `value`.
    fn direct(&self, value: ValueId) -> BTreeSet<AbstractLocation>;

    /// The reachable (transitive) points-to set of `value`.
    fn reach(&self, value: ValueId) -> BTreeSet<AbstractLocation>;
}

/// A points-to provider that answers every query with the empty set —
/// useful as a conservative stand-in while no real points-to analysis is
/// wired in, and in tests that don't exercise memory flows.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyPointsTo;

impl PointsToProvider for EmptyPointsTo {
    fn direct(&self, _value: ValueId) -> BTreeSet<AbstractLocation> {
        BTreeSet::new()
    }
    fn reach(&self, _value: ValueId) -> BTreeSet<AbstractLocation> {
        BTreeSet::new()
    }
}

/// The resolution of an indirect call site (spec §6 "Call graph provider").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalleeResolution {
    /// A defined function with a body to re-analyze.
    Defined(FunctionId),
    /// An external symbol resolved only through the signature library.
    External(FunctionId),
}

/// Supplies call-graph information (spec §6 "Call graph provider").
pub trait CallGraphProvider {
    /// Enumerates the candidate callees of an indirect call site
    /// (`function`/`block`/`call_value` identify the call instruction).
    fn indirect_targets(
        &self,
        function: FunctionId,
        block: BlockId,
        call_value: ValueId,
        module: &Module,
    ) -> Vec<CalleeResolution>;

    /// The module's root function, if the call graph identifies one.
    fn root(&self) -> Option<FunctionId>;
}

/// A call-graph provider with no indirect-call knowledge: every indirect
/// call resolves to no candidates. Conservative in the sense of adding no
/// spurious flows, not in the taint-soundness sense (spec's own Non-goals
/// already disclaim soundness for memory the points-to analysis can't
/// resolve).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIndirectCalls;

impl CallGraphProvider for NoIndirectCalls {
    fn indirect_targets(
        &self,
        _function: FunctionId,
        _block: BlockId,
        _call_value: ValueId,
        _module: &Module,
    ) -> Vec<CalleeResolution> {
        Vec::new()
    }

    fn root(&self) -> Option<FunctionId> {
        None
    }
}

/// Supplies post-dominance queries within one function (spec §6
/// "Post-dominator provider").
pub trait PostDominatorProvider {
    /// `true` iff `a` post-dominates `b` within `function`.
    fn dominates(&self, function: FunctionId, a: BlockId, b: BlockId) -> bool;
}

/// A post-dominator provider that reports no post-dominance relationships —
/// every successor is treated as part of the control-dependence region.
/// Conservative (adds flows, never drops them): safe to use until a real
/// post-dominator analysis is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrivialPostDominators;

impl PostDominatorProvider for TrivialPostDominators {
    fn dominates(&self, _function: FunctionId, _a: BlockId, _b: BlockId) -> bool {
        false
    }
}

/// Walks the module once before constraint generation and produces a single
/// global flow record naming module-level sources and sinks (spec §6
/// "Source/sink identification service"), e.g. `getenv`'s return value,
/// `system`'s argument, the destination of `memcpy`, or `main`'s parameters.
pub trait SourceSinkProvider {
    fn global_flow_record(&self, module: &Module) -> FlowRecord;

    /// `true` iff `endpoint` is itself recognised as a sink (spec §4.E.3
    /// `sink?`): decides which of the four reserved kinds a record's
    /// constraint lands in, and — when `drop_at_sinks` is enabled — whether
    /// a source channel is held back from `Src` into a separate `Src_sink`.
    /// Defaults to `false`: nothing is a sink until a real identification
    /// service says otherwise.
    fn is_sink(&self, endpoint: FlowEndpoint) -> bool {
        let _ = endpoint;
        false
    }
}

/// A source/sink provider that names nothing module-level, leaving every
/// taint seed to an explicit `api::set_tainted`/`slice` query. The
/// conservative default for callers with no source/sink identification
/// service of their own wired in yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGlobalFlows;

impl SourceSinkProvider for NoGlobalFlows {
    fn global_flow_record(&self, _module: &Module) -> FlowRecord {
        FlowRecord::new(crate::context::DEFAULT_CONTEXT, false)
    }
}
