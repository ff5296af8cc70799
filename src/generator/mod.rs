//! Module E, part 1: per-instruction constraint generation (spec §4.E.3,
//! §4.E.4, §4.E.5). The interprocedural walk itself — which function/context
//! pairs get generated, how calls wire caller and callee together, context
//! updates — lives in [`crate::driver`]; this module only knows how to turn
//! one instruction, intrinsic call, or signature match into a [`FlowRecord`]
//! and then lower that record into constraints.

pub mod control_flow;

use std::collections::HashMap;

use crate::context::ContextId;
use crate::flow::{FlowEndpoint, FlowRecord};
use crate::constraints::{DEFAULT, DEFAULT_SINKS, IMPLICIT, IMPLICIT_SINKS};
use crate::ir::{AbstractLocation, BlockId, FunctionId, Instruction, IntrinsicKind, ValueId};
use crate::kit::Kit;
use crate::lattice::Element;
use crate::providers::{PointsToProvider, SourceSinkProvider};

/// Lazily creates and caches the variable for each (context, entity) pair
/// the generator asks for — the SSA analogue of the teacher's
/// `RegisterMapping`, minus the reaching-definitions machinery an SSA IR
/// doesn't need (every value has exactly one definition).
#[derive(Default)]
pub struct VariablePool {
    values: HashMap<(ContextId, ValueId), Element>,
    locations: HashMap<(ContextId, AbstractLocation), Element>,
    varargs: HashMap<(ContextId, FunctionId), Element>,
    blocks: HashMap<(ContextId, FunctionId, BlockId), Element>,
}

impl VariablePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value_var(&mut self, kit: &mut Kit, ctx: ContextId, v: ValueId) -> Element {
        Self::get_or_create(&mut self.values, kit, (ctx, v), || format!("val({:?},{:?})", ctx, v))
    }

    pub fn location_var(&mut self, kit: &mut Kit, ctx: ContextId, loc: AbstractLocation) -> Element {
        Self::get_or_create(&mut self.locations, kit, (ctx, loc), || format!("loc({:?},{:?})", ctx, loc))
    }

    pub fn varargs_var(&mut self, kit: &mut Kit, ctx: ContextId, f: FunctionId) -> Element {
        Self::get_or_create(&mut self.varargs, kit, (ctx, f), || format!("varargs({:?},{:?})", ctx, f))
    }

    pub fn block_var(&mut self, kit: &mut Kit, ctx: ContextId, f: FunctionId, b: BlockId) -> Element {
        Self::get_or_create(&mut self.blocks, kit, (ctx, f, b), || format!("pc({:?},{:?},{:?})", ctx, f, b))
    }

    fn get_or_create<K: std::hash::Hash + Eq + Copy>(
        map: &mut HashMap<K, Element>,
        kit: &mut Kit,
        key: K,
        describe: impl FnOnce() -> String,
    ) -> Element {
        if let Some(e) = map.get(&key) {
            return e.clone();
        }
        let e = kit.new_var(describe());
        map.insert(key, e.clone());
        e
    }

    /// Resolves one endpoint to the variable(s) it names. `DirectPtr`/
    /// `ReachablePtr` may resolve to zero, one, or many location variables
    /// depending on how precise the points-to provider's answer is; zero is
    /// a legal (if under-approximating) answer.
    pub fn resolve_endpoint(
        &mut self,
        kit: &mut Kit,
        points_to: &impl PointsToProvider,
        ctx: ContextId,
        endpoint: FlowEndpoint,
    ) -> Vec<Element> {
        match endpoint {
            FlowEndpoint::Value(v) => vec![self.value_var(kit, ctx, v)],
            FlowEndpoint::DirectPtr(v) => points_to
                .direct(v)
                .into_iter()
                .map(|loc| self.location_var(kit, ctx, loc))
                .collect(),
            FlowEndpoint::ReachablePtr(v) => points_to
                .reach(v)
                .into_iter()
                .map(|loc| self.location_var(kit, ctx, loc))
                .collect(),
            FlowEndpoint::Varargs(f) => vec![self.varargs_var(kit, ctx, f)],
            FlowEndpoint::Block(f, b) => vec![self.block_var(kit, ctx, f, b)],
        }
    }

    /// Lowers one [`FlowRecord`] into constraints (spec §4.E.3: "`Src` is
    /// the join of every source channel's resolved variable(s); for each
    /// sink `s`, add `Src ⊑ var(s)` in the kind chosen from `(implicit?,
    /// sink?)`"). Each sink lands in exactly one of the four reserved
    /// kinds — whichever one `(record.implicit, source_sink.is_sink(s))`
    /// picks — never in both. When `drop_at_sinks` is set, source channels
    /// `source_sink` itself recognises as sinks are held out of `Src` and
    /// instead feed a separate `Src_sink` that only ever flows into the
    /// `*-sinks` kind (spec §4.E.3 second paragraph), so default taint can't
    /// silently cross a declared sink unless a query asks for it. A record
    /// that resolves to no (non-held-out) sources or no sinks (e.g. a
    /// `DirectPtr` endpoint whose points-to set is empty) is dropped
    /// silently; under-approximating here is the documented behavior when
    /// the points-to provider can't resolve a pointer (spec §1 Non-goals).
    pub fn emit_record(
        &mut self,
        kit: &mut Kit,
        points_to: &impl PointsToProvider,
        source_sink: &impl SourceSinkProvider,
        drop_at_sinks: bool,
        record: &FlowRecord,
    ) {
        let mut plain_sources: Vec<Element> = Vec::new();
        let mut sink_sources: Vec<Element> = Vec::new();
        for endpoint in &record.sources {
            let held_out = drop_at_sinks && source_sink.is_sink(*endpoint);
            for var in self.resolve_endpoint(kit, points_to, record.source_ctx, *endpoint) {
                if held_out {
                    sink_sources.push(var);
                } else {
                    plain_sources.push(var);
                }
            }
        }
        let sinks: Vec<(FlowEndpoint, Element)> = record
            .sinks
            .iter()
            .flat_map(|e| {
                self.resolve_endpoint(kit, points_to, record.sink_ctx, *e)
                    .into_iter()
                    .map(move |var| (*e, var))
            })
            .collect();
        if (plain_sources.is_empty() && sink_sources.is_empty()) || sinks.is_empty() {
            return;
        }

        let src = join_sources(kit, plain_sources);
        let src_sink = join_sources(kit, sink_sources);

        for (endpoint, sink_var) in sinks {
            if let Some(src) = &src {
                let kind = kind_for(record.implicit, source_sink.is_sink(endpoint));
                kit.add_constraint(kind, src.clone(), sink_var.clone(), record.implicit);
            }
            if let Some(src_sink) = &src_sink {
                let kind = kind_for(record.implicit, true);
                kit.add_constraint(kind, src_sink.clone(), sink_var, record.implicit);
            }
        }
    }
}

fn join_sources(kit: &mut Kit, sources: Vec<Element>) -> Option<Element> {
    match sources.len() {
        0 => None,
        1 => sources.into_iter().next(),
        _ => Some(kit.join_many(sources)),
    }
}

/// The `(implicit?, sink?)` dispatch table from spec §4.E.3.
fn kind_for(implicit: bool, sink: bool) -> &'static str {
    match (implicit, sink) {
        (false, false) => DEFAULT,
        (false, true) => DEFAULT_SINKS,
        (true, false) => IMPLICIT,
        (true, true) => IMPLICIT_SINKS,
    }
}

/// The explicit, direct data-flow rule for every instruction except `Call`
/// and `Intrinsic` (handled by the driver and [`intrinsic_flow_record`]
/// respectively) and `Fence` (no flow at all) (spec §4.E.3).
pub fn explicit_flow_for_instruction(ctx: ContextId, instr: &Instruction) -> Option<FlowRecord> {
    match instr {
        Instruction::Simple { value, operands, .. } => Some(
            FlowRecord::new(ctx, false)
                .with_sources(operands.iter().map(|o| FlowEndpoint::Value(*o)))
                .with_sink(FlowEndpoint::Value(*value)),
        ),
        Instruction::Load { value, pointer, .. } => Some(
            FlowRecord::new(ctx, false)
                .with_source(FlowEndpoint::DirectPtr(*pointer))
                .with_sink(FlowEndpoint::Value(*value)),
        ),
        Instruction::Store { pointer, value, .. } => Some(
            FlowRecord::new(ctx, false)
                .with_source(FlowEndpoint::Value(*value))
                .with_sink(FlowEndpoint::DirectPtr(*pointer)),
        ),
        Instruction::AtomicRmw { value, pointer, operand, .. } => Some(
            FlowRecord::new(ctx, false)
                .with_sources([FlowEndpoint::DirectPtr(*pointer), FlowEndpoint::Value(*operand)])
                .with_sinks([FlowEndpoint::Value(*value), FlowEndpoint::DirectPtr(*pointer)]),
        ),
        Instruction::AtomicCmpXchg { value, pointer, expected, new, .. } => Some(
            FlowRecord::new(ctx, false)
                .with_sources([
                    FlowEndpoint::DirectPtr(*pointer),
                    FlowEndpoint::Value(*expected),
                    FlowEndpoint::Value(*new),
                ])
                .with_sinks([FlowEndpoint::Value(*value), FlowEndpoint::DirectPtr(*pointer)]),
        ),
        Instruction::VaArg { value, pointer, va_list_owner } => Some(
            FlowRecord::new(ctx, false)
                .with_sources([FlowEndpoint::Varargs(*va_list_owner), FlowEndpoint::DirectPtr(*pointer)])
                .with_sink(FlowEndpoint::Value(*value)),
        ),
        Instruction::Call { .. } | Instruction::Intrinsic { .. } | Instruction::Fence => None,
    }
}

/// The intrinsic dispatch rule (spec §4.E.5: "Intrinsics are dispatched
/// directly by the generator, not through the signature library"). `args`
/// follows the usual C-intrinsic convention: `(dest, src, ...)` for the
/// memory intrinsics, `(dest_va_list, ...)` for the varargs ones.
pub fn intrinsic_flow_record(
    ctx: ContextId,
    function: FunctionId,
    value: Option<ValueId>,
    kind: &IntrinsicKind,
    args: &[ValueId],
) -> Option<FlowRecord> {
    match kind {
        IntrinsicKind::MemCpy | IntrinsicKind::MemMove => {
            let (dest, src) = (*args.first()?, *args.get(1)?);
            Some(
                FlowRecord::new(ctx, false)
                    .with_source(FlowEndpoint::ReachablePtr(src))
                    .with_sink(FlowEndpoint::ReachablePtr(dest)),
            )
        }
        IntrinsicKind::MemSet => {
            let (dest, val) = (*args.first()?, *args.get(1)?);
            Some(
                FlowRecord::new(ctx, false)
                    .with_source(FlowEndpoint::Value(val))
                    .with_sink(FlowEndpoint::ReachablePtr(dest)),
            )
        }
        IntrinsicKind::VaStart => {
            let list = *args.first()?;
            Some(
                FlowRecord::new(ctx, false)
                    .with_source(FlowEndpoint::Varargs(function))
                    .with_sink(FlowEndpoint::DirectPtr(list)),
            )
        }
        IntrinsicKind::VaCopy => {
            let (dest, src) = (*args.first()?, *args.get(1)?);
            Some(
                FlowRecord::new(ctx, false)
                    .with_source(FlowEndpoint::DirectPtr(src))
                    .with_sink(FlowEndpoint::DirectPtr(dest)),
            )
        }
        IntrinsicKind::VaEnd => None,
        IntrinsicKind::Math(_) => {
            let value = value?;
            Some(
                FlowRecord::new(ctx, false)
                    .with_sources(args.iter().map(|a| FlowEndpoint::Value(*a)))
                    .with_sink(FlowEndpoint::Value(value)),
            )
        }
        IntrinsicKind::Unknown(name) => {
            log::debug!("no flow model for intrinsic `{}`; skipping", name);
            None
        }
    }
}

/// The implicit control-dependence rule (spec §4.E.4): the branch
/// condition flows into the PC variable of every control-dependent block,
/// and every value defined in such a block receives an implicit flow from
/// that block's PC variable. The second half (PC-to-defined-value) is
/// unconditional per block — whether it actually carries taint depends
/// entirely on whether some branch's condition made that PC variable
/// tainted at solve time.
pub fn pc_to_defined_values(ctx: ContextId, function: FunctionId, block: BlockId, instructions: &[Instruction]) -> Vec<FlowRecord> {
    instructions
        .iter()
        .filter_map(|i| i.defined_value())
        .map(|v| {
            FlowRecord::new(ctx, true)
                .with_source(FlowEndpoint::Block(function, block))
                .with_sink(FlowEndpoint::Value(v))
        })
        .collect()
}
