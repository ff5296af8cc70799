//! Bounded caller-history contexts (spec §3 "Context", §4.E.2, §9 "Context
//! manager"). `ContextId(0)` is always the empty/default context, reused for
//! indirect and external calls when the corresponding collapse flag is set
//! (spec §6).

use indexmap::IndexMap;

use crate::ir::{BlockId, FunctionId};

/// A small integer identifying one canonicalized bounded caller sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ContextId(pub u32);

/// `ContextId(0)`: the empty context, used for `main`'s initial seed and
/// reused for collapsed indirect/external calls.
pub const DEFAULT_CONTEXT: ContextId = ContextId(0);

/// Which call-site identity `update_context` appends to a sequence (spec
/// §4.E.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensitivity {
    /// Append the caller function's identity.
    CallerContext,
    /// Append the call instruction's own identity.
    CallSiteContext,
}

/// Identifies one call instruction's static location, used as the
/// `CallSiteContext` element and as a dependency key in the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallSiteId {
    pub function: FunctionId,
    pub block: BlockId,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum ContextElem {
    Function(FunctionId),
    CallSite(CallSiteId),
}

/// Interns bounded context sequences into small [`ContextId`]s (spec §9
/// "replace pointer-keyed intern set with an arena of contexts addressed by
/// small integers").
pub struct ContextManager {
    k: usize,
    sensitivity: Sensitivity,
    interned: IndexMap<Vec<ContextElem>, ContextId>,
}

impl ContextManager {
    /// `k` is the call-site-sensitivity bound (spec.md fixes `k=1`, but the
    /// manager itself is not hard-coded to it).
    pub fn new(k: usize, sensitivity: Sensitivity) -> Self {
        let mut interned = IndexMap::new();
        interned.insert(Vec::new(), DEFAULT_CONTEXT);
        ContextManager {
            k,
            sensitivity,
            interned,
        }
    }

    pub fn default_context(&self) -> ContextId {
        DEFAULT_CONTEXT
    }

    fn intern(&mut self, seq: Vec<ContextElem>) -> ContextId {
        if let Some(id) = self.interned.get(&seq) {
            return *id;
        }
        let id = ContextId(self.interned.len() as u32);
        self.interned.insert(seq, id);
        id
    }

    fn sequence(&self, id: ContextId) -> &[ContextElem] {
        self.interned
            .get_index(id.0 as usize)
            .map(|(seq, _)| seq.as_slice())
            .unwrap_or(&[])
    }

    /// Appends the caller function (`CallerContext`) or the call
    /// instruction's own identity (`CallSiteContext`) to `old`'s sequence,
    /// truncating the front until the length is `<= k` (spec §4.E.2).
    pub fn update_context(
        &mut self,
        old: ContextId,
        caller: FunctionId,
        call_site: CallSiteId,
    ) -> ContextId {
        let mut seq = self.sequence(old).to_vec();
        let elem = match self.sensitivity {
            Sensitivity::CallerContext => ContextElem::Function(caller),
            Sensitivity::CallSiteContext => ContextElem::CallSite(call_site),
        };
        seq.push(elem);
        while seq.len() > self.k.max(1) {
            seq.remove(0);
        }
        if self.k == 0 {
            seq.clear();
        }
        self.intern(seq)
    }

    /// As [`ContextManager::update_context`], but returns the default
    /// context when `collapse` is set (spec §6
    /// `collapse_indirect_context`/`collapse_external_context`).
    pub fn update_indirect_context(
        &mut self,
        old: ContextId,
        caller: FunctionId,
        call_site: CallSiteId,
        collapse: bool,
    ) -> ContextId {
        if collapse {
            self.default_context()
        } else {
            self.update_context(old, caller, call_site)
        }
    }

    pub fn len(&self) -> usize {
        self.interned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interned.is_empty()
    }
}
