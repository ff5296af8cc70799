//! Module D: the signature library (spec §4.D).
//!
//! A signature accepts or rejects a call site and, when it accepts, emits a
//! [`FlowRecord`] summarizing the flows the external call induces. Modeled
//! after the teacher's `constraint_generation::SubprocedureLocators` trait
//! (`get_type_variables_and_constraints_for_arg`) — "a pluggable resolver
//! queried by the generator at call sites" — generalized from resolving
//! type variables to emitting taint flow records.

mod stdlib;

use crate::context::ContextId;
use crate::flow::{FlowEndpoint, FlowRecord};
use crate::ir::{BlockId, FunctionId, ValueId};

/// A signature's full answer for one call site: the explicit flow (present
/// whenever the signature matches) plus an optional implicit flow routed
/// through the `implicit`/`implicit-sinks` kinds instead. `OverflowChecks` is
/// the one signature that needs both (spec §4.D: "flows all argument values
/// (explicit) and the calling basic block (implicit) into the return
/// value").
pub struct SignatureMatch {
    pub explicit: FlowRecord,
    pub implicit: Option<FlowRecord>,
}

/// Everything a signature needs to decide whether it applies and, if so,
/// what flows to report.
pub struct CallSite<'a> {
    pub callee_name: &'a str,
    pub args: &'a [ValueId],
    pub ret: Option<ValueId>,
    pub calling_function: FunctionId,
    pub calling_block: BlockId,
    pub ctx: ContextId,
}

/// A model of one external function's (or function family's) flow
/// behavior.
pub trait Signature {
    /// Returns `Some(match)` if this signature recognizes `call`, `None`
    /// otherwise. Registration order matters: the library tries signatures
    /// in order and uses the first match (spec §4.D).
    fn try_apply(&self, call: &CallSite) -> Option<SignatureMatch>;

    fn name(&self) -> &'static str;
}

/// Accepts callees whose name starts with `____jf_check` (e.g. overflow
/// sanitizer helpers): flows every argument value (explicit) and the
/// calling basic block (implicit) into the return value; no memory flows.
pub struct OverflowChecks;

impl Signature for OverflowChecks {
    fn name(&self) -> &'static str {
        "OverflowChecks"
    }

    fn try_apply(&self, call: &CallSite) -> Option<SignatureMatch> {
        if !call.callee_name.starts_with("____jf_check") {
            return None;
        }
        let ret = call.ret?;
        let explicit = FlowRecord::new(call.ctx, false)
            .with_sources(call.args.iter().map(|a| FlowEndpoint::Value(*a)))
            .with_sink(FlowEndpoint::Value(ret));
        let implicit = FlowRecord::new(call.ctx, true)
            .with_source(FlowEndpoint::Block(call.calling_function, call.calling_block))
            .with_sink(FlowEndpoint::Value(ret));
        Some(SignatureMatch { explicit, implicit: Some(implicit) })
    }
}

/// Accepts every call site; if the callee returns a value, every argument
/// *value* flows into the return (spec §4.D "ArgsToRet"). Registered last
/// as the fallback — every call site is guaranteed to match something.
pub struct ArgsToRet;

impl Signature for ArgsToRet {
    fn name(&self) -> &'static str {
        "ArgsToRet"
    }

    fn try_apply(&self, call: &CallSite) -> Option<SignatureMatch> {
        let ret = call.ret?;
        let explicit = FlowRecord::new(call.ctx, false)
            .with_sources(call.args.iter().map(|a| FlowEndpoint::Value(*a)))
            .with_sink(FlowEndpoint::Value(ret));
        Some(SignatureMatch { explicit, implicit: None })
    }
}

/// The ordered dispatch list: `OverflowChecks`, then `StdLib`, then
/// `ArgsToRet` as the catch-all (spec §4.D, §7 "Unknown call" — `ArgsToRet`
/// accepts everything, so reaching no signature should never happen).
pub struct SignatureLibrary {
    signatures: Vec<Box<dyn Signature + Send + Sync>>,
}

impl Default for SignatureLibrary {
    fn default() -> Self {
        SignatureLibrary {
            signatures: vec![
                Box::new(OverflowChecks),
                Box::new(stdlib::StdLib),
                Box::new(ArgsToRet),
            ],
        }
    }
}

impl SignatureLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tries every registered signature in order, returning the first
    /// match. Panics if none match (spec §7: with `ArgsToRet` always
    /// registered this is an unreachable, fatal condition).
    pub fn resolve(&self, call: &CallSite) -> SignatureMatch {
        for sig in &self.signatures {
            if let Some(matched) = sig.try_apply(call) {
                log::debug!("signature `{}` matched callee `{}`", sig.name(), call.callee_name);
                return matched;
            }
        }
        panic!(
            "no signature accepted external call to `{}`; ArgsToRet should have matched unconditionally",
            call.callee_name
        );
    }
}
