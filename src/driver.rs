//! Module E, part 2: the context-sensitive interprocedural driver (spec
//! §4.E.1, §4.E.2).
//!
//! The driver does not solve anything itself — it only decides which
//! `(FunctionId, ContextId)` analysis units are reachable and generates
//! every constraint those units' instructions induce, context by context,
//! directly into one shared [`Kit`]. Solving happens afterwards, once, over
//! the whole resulting constraint graph (module C) — there is no
//! per-function summary step to merge.

use std::collections::{HashSet, VecDeque};

use crate::config::AnalysisConfig;
use crate::context::{CallSiteId, ContextId, ContextManager, Sensitivity, DEFAULT_CONTEXT};
use crate::flow::{FlowEndpoint, FlowRecord};
use crate::generator::{self, control_flow, VariablePool};
use crate::ir::{Callee, Function, Instruction, IntrinsicKind, Module, Terminator};
use crate::kit::Kit;
use crate::providers::{CallGraphProvider, CalleeResolution, PointsToProvider, PostDominatorProvider, SourceSinkProvider};
use crate::signatures::{CallSite, SignatureLibrary};
use crate::util::FileDebugLogger;

/// Runs the interprocedural analysis over `module`, producing a [`Kit`]
/// whose `default`/`default-sinks`/`implicit`/`implicit-sinks` kinds hold
/// every constraint the reachable program induces (spec §4.E.1/§4.E.2).
pub struct Driver<'a, P, C, D, S> {
    module: &'a Module,
    kit: Kit,
    pool: VariablePool,
    ctx_mgr: ContextManager,
    points_to: &'a P,
    call_graph: &'a C,
    post_dominators: &'a D,
    source_sink: &'a S,
    signatures: SignatureLibrary,
    config: AnalysisConfig,
    debug: FileDebugLogger,
    visited: HashSet<(crate::ir::FunctionId, ContextId)>,
}

impl<'a, P, C, D, S> Driver<'a, P, C, D, S>
where
    P: PointsToProvider,
    C: CallGraphProvider,
    D: PostDominatorProvider,
    S: SourceSinkProvider,
{
    pub fn new(
        module: &'a Module,
        points_to: &'a P,
        call_graph: &'a C,
        post_dominators: &'a D,
        source_sink: &'a S,
        config: AnalysisConfig,
        debug: FileDebugLogger,
    ) -> Self {
        Driver {
            module,
            kit: Kit::new(),
            pool: VariablePool::new(),
            ctx_mgr: ContextManager::new(1, Sensitivity::CallSiteContext),
            points_to,
            call_graph,
            post_dominators,
            source_sink,
            signatures: SignatureLibrary::new(),
            config,
            debug,
            visited: HashSet::new(),
        }
    }

    /// Runs the whole-program analysis and returns the populated [`Kit`]
    /// together with the [`VariablePool`] that names every variable it
    /// created, consuming the driver. Callers need the pool back to resolve
    /// `(ContextId, ValueId)` pairs to the same `Element::Var`s the generator
    /// wired into the constraint graph — a fresh `VariablePool` would mint
    /// unconnected variables instead.
    pub fn run(mut self) -> (Kit, VariablePool) {
        let global = self.source_sink.global_flow_record(self.module);
        self.emit(&global);

        let mut queue: VecDeque<(crate::ir::FunctionId, ContextId)> = VecDeque::new();
        // Spec §4.E.1: if the module names a `main`, seed only it; otherwise
        // every externally-linkable function is a potential entry point.
        if let Some(main) = self.module.main() {
            queue.push_back((main.id, DEFAULT_CONTEXT));
        } else {
            for f in &self.module.functions {
                if f.externally_linkable {
                    queue.push_back((f.id, DEFAULT_CONTEXT));
                }
            }
        }
        if let Some(root) = self.call_graph.root() {
            queue.push_back((root, DEFAULT_CONTEXT));
        }

        self.drain(&mut queue);

        // Second pass (spec §4.E.1): any function with a body that the first
        // pass never reached (dead code, or simply missed by an incomplete
        // call graph) still gets constrained, under the default context, so
        // a later query against it doesn't silently see an empty summary.
        for f in &self.module.functions {
            if !self.visited.iter().any(|(fid, _)| *fid == f.id) {
                queue.push_back((f.id, DEFAULT_CONTEXT));
            }
        }
        self.drain(&mut queue);

        (self.kit, self.pool)
    }

    /// Lowers `record` into constraints, threading this run's source/sink
    /// identification service and `drop_at_sinks` flag through to
    /// [`generator::VariablePool::emit_record`] so every call site picks up
    /// the sink-routing rule (spec §4.E.3) without repeating its arguments.
    fn emit(&mut self, record: &FlowRecord) {
        self.pool
            .emit_record(&mut self.kit, self.points_to, self.source_sink, self.config.drop_at_sinks, record);
    }

    fn drain(&mut self, queue: &mut VecDeque<(crate::ir::FunctionId, ContextId)>) {
        while let Some((fid, ctx)) = queue.pop_front() {
            if !self.visited.insert((fid, ctx)) {
                continue;
            }
            let Some(function) = self.module.function(fid) else {
                log::debug!("skipping unreachable-as-defined function id {:?} (no body in module)", fid);
                continue;
            };
            self.debug
                .log_to_fname(&format!("unit-{}-{}.txt", function.name, ctx.0), &|| {
                    format!("analyzing {} under context {:?}", function.name, ctx)
                })
                .ok();
            let discovered = self.process_function(function, ctx);
            queue.extend(discovered);
        }
    }

    fn process_function(&mut self, function: &Function, ctx: ContextId) -> Vec<(crate::ir::FunctionId, ContextId)> {
        let blocks = self.module.block_map(function);
        let mut discovered = Vec::new();

        for block in &function.blocks {
            for record in generator::pc_to_defined_values(ctx, function.id, block.id, &block.instructions) {
                self.emit(&record);
            }

            for (index, instr) in block.instructions.iter().enumerate() {
                match instr {
                    Instruction::Call { value, callee, args } => {
                        let site = CallSiteId { function: function.id, block: block.id, index: index as u32 };
                        discovered.extend(self.process_call(function, ctx, site, callee, args, *value));
                    }
                    Instruction::Intrinsic { value, kind, args } => {
                        if let Some(record) = generator::intrinsic_flow_record(ctx, function.id, *value, kind, args) {
                            self.emit(&record);
                        }
                        self.log_unknown_intrinsic(kind);
                    }
                    other => {
                        if let Some(record) = generator::explicit_flow_for_instruction(ctx, other) {
                            self.emit(&record);
                        }
                    }
                }
            }

            if let Some((cond, successors)) = branch_condition(&block.terminator) {
                let dependent = control_flow::sink_blocks_for_terminator(function.id, block.id, &successors, &blocks, self.post_dominators);
                for dep in dependent {
                    let record = FlowRecord::new(ctx, true)
                        .with_source(FlowEndpoint::Value(cond))
                        .with_sink(FlowEndpoint::Block(function.id, dep));
                    self.emit(&record);
                }
            }

            if let Terminator::Invoke { callee, args, result, .. } = &block.terminator {
                let site = CallSiteId { function: function.id, block: block.id, index: block.instructions.len() as u32 };
                discovered.extend(self.process_call(function, ctx, site, callee, args, *result));
            }
        }

        discovered
    }

    fn log_unknown_intrinsic(&self, kind: &IntrinsicKind) {
        if let IntrinsicKind::Unknown(name) = kind {
            log::debug!("function body contains unmodeled intrinsic `{}`", name);
        }
    }

    /// Resolves one call/invoke instruction's callee(s) and wires the
    /// corresponding flows: parameter passing and return-value flow for a
    /// defined callee (queuing it for analysis under an updated context),
    /// or a signature match for an external one (spec §4.E.5, §4.D).
    fn process_call(
        &mut self,
        caller: &Function,
        caller_ctx: ContextId,
        site: CallSiteId,
        callee: &Callee,
        args: &[crate::ir::ValueId],
        ret: Option<crate::ir::ValueId>,
    ) -> Vec<(crate::ir::FunctionId, ContextId)> {
        match callee {
            Callee::Direct(target) => {
                if let Some(resolution) = self.resolve_direct(*target) {
                    self.apply_resolution(caller, caller_ctx, site, resolution, args, ret, false)
                } else {
                    log::debug!("call to unknown function id {:?}; no flow emitted", target);
                    Vec::new()
                }
            }
            Callee::Indirect(fn_ptr) => {
                let targets = self.call_graph.indirect_targets(caller.id, site.block, *fn_ptr, self.module);
                let mut discovered = Vec::new();
                for resolution in targets {
                    discovered.extend(self.apply_resolution(caller, caller_ctx, site, resolution, args, ret, true));
                }
                discovered
            }
        }
    }

    fn resolve_direct(&self, target: crate::ir::FunctionId) -> Option<CalleeResolution> {
        if self.module.function(target).is_some() {
            Some(CalleeResolution::Defined(target))
        } else if self.module.external(target).is_some() {
            Some(CalleeResolution::External(target))
        } else {
            None
        }
    }

    fn apply_resolution(
        &mut self,
        caller: &Function,
        caller_ctx: ContextId,
        site: CallSiteId,
        resolution: CalleeResolution,
        args: &[crate::ir::ValueId],
        ret: Option<crate::ir::ValueId>,
        indirect: bool,
    ) -> Vec<(crate::ir::FunctionId, ContextId)> {
        match resolution {
            CalleeResolution::External(id) => {
                let name = self.module.name_of(id).unwrap_or("<unknown external>").to_owned();
                let effective_ctx = if self.config.collapse_external_context { DEFAULT_CONTEXT } else { caller_ctx };
                let call_site = CallSite {
                    callee_name: &name,
                    args,
                    ret,
                    calling_function: caller.id,
                    calling_block: site.block,
                    ctx: effective_ctx,
                };
                let matched = self.signatures.resolve(&call_site);
                self.emit(&matched.explicit);
                if let Some(implicit) = &matched.implicit {
                    self.emit(implicit);
                }
                Vec::new()
            }
            CalleeResolution::Defined(callee_id) => {
                let callee_ctx = if indirect {
                    self.ctx_mgr
                        .update_indirect_context(caller_ctx, caller.id, site, self.config.collapse_indirect_context)
                } else {
                    self.ctx_mgr.update_context(caller_ctx, caller.id, site)
                };
                let Some(callee) = self.module.function(callee_id) else {
                    return Vec::new();
                };
                self.wire_call(caller_ctx, callee_ctx, callee, args, ret);
                vec![(callee_id, callee_ctx)]
            }
        }
    }

    /// Parameter passing (caller arg values and varargs into the callee's
    /// context) and return-value flow (every `Return`/`Resume` site in the
    /// callee back into the call's own value) (spec §4.E.5 items 2-3).
    fn wire_call(&mut self, caller_ctx: ContextId, callee_ctx: ContextId, callee: &Function, args: &[crate::ir::ValueId], ret: Option<crate::ir::ValueId>) {
        for param in &callee.params {
            if let Some(&arg) = args.get(param.index) {
                let record = FlowRecord::cross_context(caller_ctx, callee_ctx, false)
                    .with_source(FlowEndpoint::Value(arg))
                    .with_sink(FlowEndpoint::Value(param.value));
                self.emit(&record);
            }
        }
        if callee.is_variadic && args.len() > callee.params.len() {
            let record = FlowRecord::cross_context(caller_ctx, callee_ctx, false)
                .with_sources(args[callee.params.len()..].iter().map(|a| FlowEndpoint::Value(*a)))
                .with_sink(FlowEndpoint::Varargs(callee.id));
            self.emit(&record);
        }

        if let Some(ret_value) = ret {
            for block in &callee.blocks {
                let operand = match &block.terminator {
                    Terminator::Return { operand: Some(op), .. } => Some(*op),
                    Terminator::Resume { operand, .. } => Some(*operand),
                    _ => None,
                };
                if let Some(op) = operand {
                    let record = FlowRecord::cross_context(callee_ctx, caller_ctx, false)
                        .with_source(FlowEndpoint::Value(op))
                        .with_sink(FlowEndpoint::Value(ret_value));
                    self.emit(&record);
                }
            }
        }
    }
}

/// Extracts the condition value and successor set from a branching
/// terminator, if it has one (`Branch`/`Return`/`Resume`/`Unreachable` are
/// unconditional or have no successors, so they contribute nothing to the
/// implicit-flow rule).
fn branch_condition(term: &Terminator) -> Option<(crate::ir::ValueId, Vec<crate::ir::BlockId>)> {
    match term {
        Terminator::CondBranch { cond, if_true, if_false } => Some((*cond, vec![*if_true, *if_false])),
        Terminator::Switch { value, default, cases } => {
            let mut targets = vec![*default];
            targets.extend(cases.iter().map(|(_, b)| *b));
            Some((*value, targets))
        }
        Terminator::IndirectBr { address, possible } => Some((*address, possible.clone())),
        _ => None,
    }
}
