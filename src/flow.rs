//! `FlowRecord`: the declarative bundle of source/sink channels produced by
//! instruction rules (module E) and signatures (module D), then lowered into
//! constraints by the generator (spec §4.D, §4.E.3).

use crate::context::ContextId;
use crate::ir::{BlockId, FunctionId, ValueId};

/// One endpoint a flow record can name. The four spec §4.D channels
/// (`Value`, `DirectPtr`, `ReachablePtr`, `Varg`) plus a basic-block PC
/// endpoint used by the implicit control-flow rule (spec §4.E.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FlowEndpoint {
    /// The SSA value itself.
    Value(ValueId),
    /// The direct points-to set of a pointer-typed value.
    DirectPtr(ValueId),
    /// The reachable (transitive) points-to set of a pointer-typed value.
    ReachablePtr(ValueId),
    /// A function's varargs structure.
    Varargs(FunctionId),
    /// A basic block's PC variable.
    Block(FunctionId, BlockId),
}

/// A declarative bundle of sources and sinks for one instruction, call
/// site, or signature match (spec §4.D "FlowRecord").
#[derive(Debug, Clone)]
pub struct FlowRecord {
    /// `true` for control/PC-derived flows (spec §3 reserved kinds
    /// `"implicit"`/`"implicit-sinks"`), `false` for direct data flows
    /// (`"default"`/`"default-sinks"`).
    pub implicit: bool,
    /// The context the source endpoints are evaluated in.
    pub source_ctx: ContextId,
    /// The context the sink endpoints are evaluated in.
    pub sink_ctx: ContextId,
    pub sources: Vec<FlowEndpoint>,
    pub sinks: Vec<FlowEndpoint>,
}

impl FlowRecord {
    pub fn new(ctx: ContextId, implicit: bool) -> Self {
        FlowRecord {
            implicit,
            source_ctx: ctx,
            sink_ctx: ctx,
            sources: Vec::new(),
            sinks: Vec::new(),
        }
    }

    pub fn cross_context(source_ctx: ContextId, sink_ctx: ContextId, implicit: bool) -> Self {
        FlowRecord {
            implicit,
            source_ctx,
            sink_ctx,
            sources: Vec::new(),
            sinks: Vec::new(),
        }
    }

    pub fn with_source(mut self, e: FlowEndpoint) -> Self {
        self.sources.push(e);
        self
    }

    pub fn with_sources(mut self, es: impl IntoIterator<Item = FlowEndpoint>) -> Self {
        self.sources.extend(es);
        self
    }

    pub fn with_sink(mut self, e: FlowEndpoint) -> Self {
        self.sinks.push(e);
        self
    }

    pub fn with_sinks(mut self, es: impl IntoIterator<Item = FlowEndpoint>) -> Self {
        self.sinks.extend(es);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() || self.sinks.is_empty()
    }
}
