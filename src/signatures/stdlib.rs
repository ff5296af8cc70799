//! The `StdLib` signature (spec §4.D item 2): a table-driven model of a
//! fixed set of well-known C library functions, looked up by exact name
//! with binary search — the teacher's own preference for small sorted
//! tables over building a registry/hash map for fixed dispatch data (see
//! `node_context::points_to`'s direct match-based dispatch).

use super::{CallSite, Signature, SignatureMatch};
use crate::flow::{FlowEndpoint, FlowRecord};
use crate::ir::ValueId;

/// Which argument(s) a [`Tagged`] endpoint names.
#[derive(Clone, Copy)]
enum ArgTag {
    Ret,
    Arg(usize),
    AllArgs,
    /// All arguments at or after a fixed index — a concretization of
    /// spec §4.D's abstract `VarArgs` tag to a fixed starting index, since
    /// the table itself (not the call site) is what knows where a given
    /// function's variadic arguments start.
    VarArgsFrom(usize),
}

/// Which channel a [`Tagged`] endpoint reads/writes.
#[derive(Clone, Copy)]
enum Channel {
    Value,
    DirectPtr,
    ReachablePtr,
}

#[derive(Clone, Copy)]
struct Tagged(ArgTag, Channel);

const fn t(arg: ArgTag, channel: Channel) -> Tagged {
    Tagged(arg, channel)
}

struct Entry {
    name: &'static str,
    sources: &'static [Tagged],
    sinks: &'static [Tagged],
}

use ArgTag::*;
use Channel::*;

/// Sorted by `name` — required for [`StdLib::lookup`]'s binary search.
/// `memcpy`/`memmove`/`memset` are deliberately absent: spec §4.D notes
/// they are modeled "via the intrinsic path" (see
/// `generator::intrinsics`), not through this table.
static TABLE: &[Entry] = &[
    Entry { name: "__cxa_begin_catch", sources: &[], sinks: &[] },
    Entry { name: "__cxa_end_catch", sources: &[], sinks: &[] },
    Entry { name: "__cxa_rethrow", sources: &[], sinks: &[] },
    Entry { name: "__cxa_throw", sources: &[], sinks: &[] },
    Entry {
        name: "calloc",
        sources: &[t(Arg(0), Value), t(Arg(1), Value)],
        sinks: &[t(Ret, Value)],
    },
    Entry {
        name: "fclose",
        sources: &[],
        sinks: &[],
    },
    Entry {
        name: "fgetc",
        sources: &[t(Arg(0), Value)],
        sinks: &[t(Ret, Value)],
    },
    Entry {
        name: "fopen",
        sources: &[t(Arg(0), Value)],
        sinks: &[t(Ret, Value)],
    },
    Entry {
        name: "fputc",
        sources: &[t(Arg(0), Value)],
        sinks: &[t(Ret, Value)],
    },
    Entry {
        name: "fread",
        sources: &[t(Arg(1), Value), t(Arg(2), Value)],
        sinks: &[t(Arg(0), DirectPtr)],
    },
    Entry {
        name: "free",
        sources: &[],
        sinks: &[],
    },
    Entry {
        name: "fwrite",
        sources: &[t(Arg(0), DirectPtr), t(Arg(1), Value), t(Arg(2), Value)],
        sinks: &[t(Ret, Value)],
    },
    Entry {
        name: "malloc",
        sources: &[t(Arg(0), Value)],
        sinks: &[t(Ret, Value)],
    },
    Entry {
        name: "pow",
        sources: &[t(AllArgs, Value)],
        sinks: &[t(Ret, Value)],
    },
    Entry {
        name: "qsort",
        sources: &[t(Arg(0), DirectPtr), t(Arg(1), Value), t(Arg(2), Value)],
        sinks: &[t(Arg(0), DirectPtr)],
    },
    Entry {
        name: "realloc",
        sources: &[t(Arg(0), Value), t(Arg(0), DirectPtr), t(Arg(1), Value)],
        sinks: &[t(Ret, Value), t(Ret, DirectPtr)],
    },
    Entry {
        name: "sin",
        sources: &[t(AllArgs, Value)],
        sinks: &[t(Ret, Value)],
    },
    Entry {
        name: "snprintf",
        sources: &[t(Arg(2), Value), t(VarArgsFrom(3), Value)],
        sinks: &[t(Arg(0), DirectPtr), t(Ret, Value)],
    },
    Entry {
        name: "sprintf",
        sources: &[t(Arg(1), Value), t(VarArgsFrom(2), Value)],
        sinks: &[t(Arg(0), DirectPtr), t(Ret, Value)],
    },
    Entry {
        name: "sqrt",
        sources: &[t(AllArgs, Value)],
        sinks: &[t(Ret, Value)],
    },
    Entry {
        name: "strcmp",
        sources: &[t(Arg(0), DirectPtr), t(Arg(1), DirectPtr)],
        sinks: &[t(Ret, Value)],
    },
    Entry {
        name: "strcpy",
        sources: &[t(Arg(1), Value), t(Arg(1), DirectPtr)],
        sinks: &[t(Arg(0), DirectPtr), t(Ret, Value)],
    },
    Entry {
        name: "strlen",
        sources: &[t(Arg(0), DirectPtr)],
        sinks: &[t(Ret, Value)],
    },
];

fn resolve_arg(tag: ArgTag, args: &[ValueId], ret: Option<ValueId>) -> Vec<ValueId> {
    match tag {
        ArgTag::Ret => ret.into_iter().collect(),
        ArgTag::Arg(i) => args.get(i).copied().into_iter().collect(),
        ArgTag::AllArgs => args.to_vec(),
        ArgTag::VarArgsFrom(i) => args.get(i..).map(|s| s.to_vec()).unwrap_or_default(),
    }
}

fn endpoint(channel: Channel, v: ValueId) -> FlowEndpoint {
    match channel {
        Channel::Value => FlowEndpoint::Value(v),
        Channel::DirectPtr => FlowEndpoint::DirectPtr(v),
        Channel::ReachablePtr => FlowEndpoint::ReachablePtr(v),
    }
}

fn resolve_tagged(tagged: &[Tagged], args: &[ValueId], ret: Option<ValueId>) -> Vec<FlowEndpoint> {
    tagged
        .iter()
        .flat_map(|Tagged(tag, channel)| {
            resolve_arg(*tag, args, ret)
                .into_iter()
                .map(move |v| endpoint(*channel, v))
        })
        .collect()
}

pub struct StdLib;

impl StdLib {
    fn lookup(name: &str) -> Option<&'static Entry> {
        TABLE
            .binary_search_by_key(&name, |e| e.name)
            .ok()
            .map(|i| &TABLE[i])
    }
}

impl Signature for StdLib {
    fn name(&self) -> &'static str {
        "StdLib"
    }

    fn try_apply(&self, call: &CallSite) -> Option<SignatureMatch> {
        let entry = Self::lookup(call.callee_name)?;
        // Spec §4.D: "If the table names a function but lists no sources,
        // the record is empty" — still a match (so later signatures, i.e.
        // ArgsToRet, are *not* tried), just with no constraints to emit.
        let sources = resolve_tagged(entry.sources, call.args, call.ret);
        let sinks = resolve_tagged(entry.sinks, call.args, call.ret);
        let explicit = FlowRecord::new(call.ctx, false)
            .with_sources(sources)
            .with_sinks(sinks);
        Some(SignatureMatch { explicit, implicit: None })
    }
}
