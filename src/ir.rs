//! Concrete SSA IR types the constraint generator (module E) walks.
//!
//! Parsing a compiled program into this shape, building its call graph, and
//! answering points-to/post-dominator queries over it are explicitly out of
//! scope for this crate (spec §1, §6) — those are modeled purely as trait
//! contracts in [`crate::providers`]. This module exists because no upstream
//! IR-producing crate is part of this corpus; it is deliberately shaped
//! after the subset of `cwe_checker_lib::intermediate_representation` the
//! teacher crate imports (`Def`, `Jmp`, `Term`, `Blk`, `Sub`) so the
//! generator's instruction dispatch reads the same way the teacher's does.
//! `serde` derives let a frontend hand this analysis a JSON module, just as
//! the teacher's `bin/json_to_constraints` reads a JSON IR export.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identity of an SSA value within the function that defines it. Includes
/// formal parameters, instruction results, and the synthetic "site" values
/// of `Return`/`Resume` terminators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValueId(pub u32);

/// Identity of a basic block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(pub u32);

/// Identity of a function, unique within a [`Module`] (covers both defined
/// functions and external symbols).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

/// Opaque, identity-only handle for a may-alias memory object, supplied by
/// the external points-to analysis (spec §3 "Abstract location"; §9
/// "Points-to opaqueness"). The core never inspects it beyond set
/// membership and equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AbstractLocation(pub u64);

/// The callee of a `Call` instruction or `Invoke` terminator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Callee {
    /// A statically-known target (may be a defined function or an external
    /// symbol — see [`Module::function`] vs [`Module::external`]).
    Direct(FunctionId),
    /// A call through a function-pointer value; resolved by the call-graph
    /// provider (spec §6 "Call graph provider").
    Indirect(ValueId),
}

/// Tags the instructions that share the plain "operand/PC-to-value" flow
/// rule (spec §4.E.4): implicit flow from the enclosing block's PC, and
/// explicit flow from every operand, into the instruction's own value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SimpleOp {
    BinaryOp,
    Cmp,
    Cast,
    Select,
    Phi,
    GetElementPtr,
    Alloca,
    InsertElement,
    ExtractElement,
    ShuffleVector,
    InsertValue,
    ExtractValue,
    LandingPad,
}

/// An LLVM-style intrinsic call, dispatched directly by the generator
/// rather than through the signature library (spec §4.D "Intrinsics are
/// dispatched directly by the generator, not by this library").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IntrinsicKind {
    MemCpy,
    MemMove,
    MemSet,
    VaStart,
    VaEnd,
    VaCopy,
    /// `sqrt`, `pow`, `sin`, `cos`, ... — treated as operand/PC-to-value.
    Math(String),
    /// Anything else: no constraints, logged at debug level (spec §4.E.5).
    Unknown(String),
}

/// One instruction within a basic block.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Instruction {
    Simple {
        value: ValueId,
        op: SimpleOp,
        operands: Vec<ValueId>,
    },
    Load {
        value: ValueId,
        pointer: ValueId,
        size: u32,
    },
    Store {
        pointer: ValueId,
        value: ValueId,
        size: u32,
    },
    AtomicRmw {
        value: ValueId,
        pointer: ValueId,
        operand: ValueId,
        size: u32,
    },
    AtomicCmpXchg {
        value: ValueId,
        pointer: ValueId,
        expected: ValueId,
        new: ValueId,
        size: u32,
    },
    VaArg {
        value: ValueId,
        pointer: ValueId,
        va_list_owner: FunctionId,
    },
    Call {
        value: Option<ValueId>,
        callee: Callee,
        args: Vec<ValueId>,
    },
    Intrinsic {
        value: Option<ValueId>,
        kind: IntrinsicKind,
        args: Vec<ValueId>,
    },
    /// No flow (spec §4.E.4 "Unreachable, Fence: no flow").
    Fence,
}

impl Instruction {
    /// The value this instruction defines, if any.
    pub fn defined_value(&self) -> Option<ValueId> {
        match self {
            Instruction::Simple { value, .. } => Some(*value),
            Instruction::Load { value, .. } => Some(*value),
            Instruction::Store { .. } => None,
            Instruction::AtomicRmw { value, .. } => Some(*value),
            Instruction::AtomicCmpXchg { value, .. } => Some(*value),
            Instruction::VaArg { value, .. } => Some(*value),
            Instruction::Call { value, .. } => *value,
            Instruction::Intrinsic { value, .. } => *value,
            Instruction::Fence => None,
        }
    }
}

/// The control-flow-affecting instruction ending a basic block.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Terminator {
    /// `site` is a synthetic value identifying *this* return site (a
    /// function may have several), used as the source side of the call's
    /// return-flow rule (spec §4.E.5 item 3).
    Return {
        operand: Option<ValueId>,
        site: ValueId,
    },
    Branch {
        target: BlockId,
    },
    CondBranch {
        cond: ValueId,
        if_true: BlockId,
        if_false: BlockId,
    },
    Switch {
        value: ValueId,
        default: BlockId,
        cases: Vec<(i64, BlockId)>,
    },
    IndirectBr {
        address: ValueId,
        possible: Vec<BlockId>,
    },
    Invoke {
        callee: Callee,
        args: Vec<ValueId>,
        normal: BlockId,
        unwind: BlockId,
        result: Option<ValueId>,
    },
    Resume {
        operand: ValueId,
        site: ValueId,
    },
    Unreachable,
}

impl Terminator {
    /// Successor blocks within the owning function, in CFG edge order.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Return { .. } | Terminator::Resume { .. } | Terminator::Unreachable => {
                Vec::new()
            }
            Terminator::Branch { target } => vec![*target],
            Terminator::CondBranch { if_true, if_false, .. } => vec![*if_true, *if_false],
            Terminator::Switch { default, cases, .. } => {
                let mut v = vec![*default];
                v.extend(cases.iter().map(|(_, b)| *b));
                v
            }
            Terminator::IndirectBr { possible, .. } => possible.clone(),
            Terminator::Invoke { normal, unwind, .. } => vec![*normal, *unwind],
        }
    }
}

/// A basic block: a straight-line instruction list ending in one
/// [`Terminator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

/// One parameter of a function: its SSA value identity plus its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Parameter {
    pub value: ValueId,
    pub index: usize,
}

/// A defined function (has a body).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub params: Vec<Parameter>,
    pub is_variadic: bool,
    pub entry: BlockId,
    pub blocks: Vec<BasicBlock>,
    /// Visible to callers outside the module (seeds the driver's initial
    /// worklist when no `main` exists, spec §4.E.1).
    pub externally_linkable: bool,
}

impl Function {
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks
            .iter()
            .find(|b| b.id == id)
            .unwrap_or_else(|| panic!("unknown block {:?} in function {}", id, self.name))
    }

    pub fn entry_block(&self) -> &BasicBlock {
        self.block(self.entry)
    }
}

/// A symbol with no body, resolved by the signature library (module D)
/// rather than by re-analyzing a function (spec §4.D).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSymbol {
    pub id: FunctionId,
    pub name: String,
}

/// A whole compiled program.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    pub functions: Vec<Function>,
    pub externals: Vec<ExternalSymbol>,
}

impl Module {
    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.iter().find(|f| f.id == id)
    }

    pub fn external(&self, id: FunctionId) -> Option<&ExternalSymbol> {
        self.externals.iter().find(|e| e.id == id)
    }

    pub fn external_by_name(&self, name: &str) -> Option<&ExternalSymbol> {
        self.externals.iter().find(|e| e.name == name)
    }

    pub fn name_of(&self, id: FunctionId) -> Option<&str> {
        self.function(id)
            .map(|f| f.name.as_str())
            .or_else(|| self.external(id).map(|e| e.name.as_str()))
    }

    /// Spec §4.E.1: if the module has a `main`, the driver seeds only it.
    pub fn main(&self) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == "main")
    }

    pub fn block_map(&self, f: &Function) -> BTreeMap<BlockId, &BasicBlock> {
        f.blocks.iter().map(|b| (b.id, b)).collect()
    }
}
