//! In-memory program representation.
//!
//! Instructions are addressed by a function-unique `id` rather than by
//! position, so that inserting instructions never invalidates operands.
//! Blocks are addressed by index; blocks are never inserted or removed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Type {
    #[default]
    Void,
    Int {
        bits: u32,
    },
    Float {
        bits: u32,
    },
    Ptr {
        pointee: Box<Type>,
    },
    Array {
        len: u64,
        elem: Box<Type>,
    },
    /// Unsized named type.
    Opaque {
        name: String,
    },
}

/// Byte size used for pointers when nothing better is known.
pub const POINTER_SIZE: u64 = 8;

impl Type {
    pub fn ptr(pointee: Type) -> Type {
        Type::Ptr {
            pointee: Box::new(pointee),
        }
    }

    pub fn int(bits: u32) -> Type {
        Type::Int { bits }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr { .. })
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr { pointee } => Some(pointee),
            _ => None,
        }
    }

    /// Allocation size in bytes, `None` for unsized types.
    pub fn alloc_size(&self) -> Option<u64> {
        match self {
            Type::Void | Type::Opaque { .. } => None,
            Type::Int { bits } | Type::Float { bits } => Some(u64::from(bits.div_ceil(8)).max(1)),
            Type::Ptr { .. } => Some(POINTER_SIZE),
            Type::Array { len, elem } => elem.alloc_size().and_then(|s| s.checked_mul(*len)),
        }
    }

    /// Size of the pointee, falling back to the pointer size for unsized pointees.
    pub fn pointee_size(&self) -> u64 {
        self.pointee()
            .and_then(Type::alloc_size)
            .unwrap_or(POINTER_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constant {
    Int { value: i64 },
    Float { value: f64 },
    Null,
}

/// An operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Value {
    Inst { id: u32 },
    Param { index: usize },
    Global { name: String },
    Const { value: Constant },
}

impl Value {
    pub fn is_constant(&self) -> bool {
        matches!(self, Value::Const { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Shl,
    UDiv,
    SDiv,
    And,
    Or,
    Xor,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

impl BinOp {
    /// Operators that carry `nsw`/`nuw` flags.
    pub fn is_overflowing(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Shl)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl Predicate {
    pub fn is_equality(self) -> bool {
        matches!(self, Predicate::Eq | Predicate::Ne)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    Binary {
        opcode: BinOp,
        lhs: Value,
        rhs: Value,
        #[serde(default)]
        nsw: bool,
        #[serde(default)]
        nuw: bool,
    },
    Gep {
        base: Value,
        #[serde(default)]
        indices: Vec<Value>,
        #[serde(default)]
        inbounds: bool,
    },
    Load {
        ptr: Value,
        #[serde(default)]
        align: u64,
        #[serde(default)]
        volatile: bool,
    },
    Store {
        ptr: Value,
        value: Value,
        #[serde(default)]
        align: u64,
        #[serde(default)]
        volatile: bool,
    },
    #[serde(rename = "icmp")]
    ICmp {
        pred: Predicate,
        lhs: Value,
        rhs: Value,
    },
    /// Block terminator; `cond` is `None` for unconditional branches.
    Br {
        #[serde(default)]
        cond: Option<Value>,
        targets: Vec<usize>,
    },
    Call {
        callee: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Pointer or bit cast; looked through when finding speculated values.
    Cast { value: Value },
    Phi {
        #[serde(default)]
        incoming: Vec<Value>,
    },
    Ret {
        #[serde(default)]
        value: Option<Value>,
    },
    Other {
        opcode: String,
        #[serde(default)]
        operands: Vec<Value>,
    },
}

impl Op {
    pub fn opcode(&self) -> &str {
        match self {
            Op::Binary { .. } => "binary",
            Op::Gep { .. } => "gep",
            Op::Load { .. } => "load",
            Op::Store { .. } => "store",
            Op::ICmp { .. } => "icmp",
            Op::Br { .. } => "br",
            Op::Call { .. } => "call",
            Op::Cast { .. } => "cast",
            Op::Phi { .. } => "phi",
            Op::Ret { .. } => "ret",
            Op::Other { opcode, .. } => opcode,
        }
    }

    pub fn may_access_memory(&self) -> bool {
        matches!(self, Op::Load { .. } | Op::Store { .. } | Op::Call { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub invariant_load: bool,
    pub dereferenceable: Option<u64>,
    /// Alignment of the loaded pointer.
    pub align: Option<u64>,
    /// Ids of the parallel loops this access belongs to.
    pub parallel_loop_access: Vec<u32>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        *self == Metadata::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ty: Type,
    pub kind: Op,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl Instruction {
    pub fn new(id: u32, ty: Type, kind: Op) -> Self {
        Self {
            id,
            name: String::new(),
            ty,
            kind,
            metadata: Metadata::default(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn has_name(&self) -> bool {
        !self.name.is_empty()
    }

    /// Non-volatile load or store.
    pub fn is_simple_access(&self) -> bool {
        matches!(
            self.kind,
            Op::Load { volatile: false, .. } | Op::Store { volatile: false, .. }
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub insts: Vec<Instruction>,
}

impl Block {
    pub fn terminator(&self) -> Option<&Instruction> {
        self.insts.last()
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ParamAttrs: u16 {
        const NO_ALIAS = 1 << 0;
        const NO_CAPTURE = 1 << 1;
        const READ_NONE = 1 << 2;
        const READ_ONLY = 1 << 3;
        const WRITE_ONLY = 1 << 4;
        const RETURNED = 1 << 5;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FnAttrs: u16 {
        const NO_UNWIND = 1 << 0;
        const READ_NONE = 1 << 1;
        const READ_ONLY = 1 << 2;
        const WRITE_ONLY = 1 << 3;
        const ARG_MEM_ONLY = 1 << 4;
        const INACCESSIBLE_MEM_ONLY = 1 << 5;
        const INACCESSIBLE_OR_ARG_MEM_ONLY = 1 << 6;
        const SPECULATABLE = 1 << 7;
        const RET_NO_ALIAS = 1 << 8;
    }
}

impl FnAttrs {
    /// Any attribute restricting which memory may be accessed.
    pub const LOCATION_LIMITS: FnAttrs = FnAttrs::ARG_MEM_ONLY
        .union(FnAttrs::INACCESSIBLE_MEM_ONLY)
        .union(FnAttrs::INACCESSIBLE_OR_ARG_MEM_ONLY);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    #[serde(default)]
    pub name: String,
    pub ty: Type,
    #[serde(default)]
    pub num_uses: u32,
    #[serde(default)]
    pub attrs: ParamAttrs,
    /// Known dereferenceable bytes, 0 if none.
    #[serde(default)]
    pub dereferenceable: u64,
    /// Known alignment, 0 if none.
    #[serde(default)]
    pub align: u64,
}

impl Param {
    pub fn new(name: &str, ty: Type, num_uses: u32) -> Self {
        Self {
            name: name.to_string(),
            ty,
            num_uses,
            attrs: ParamAttrs::empty(),
            dereferenceable: 0,
            align: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    #[default]
    External,
    Internal,
}

/// A natural loop. `header`, `blocks`, `latches` and `exiting` are block
/// indices; `parent` is an index into the owning function's `loops`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loop {
    /// Loop metadata id, assigned when the loop is first annotated.
    #[serde(default)]
    pub id: Option<u32>,
    pub header: usize,
    pub blocks: Vec<usize>,
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default)]
    pub latches: Vec<usize>,
    #[serde(default)]
    pub exiting: Vec<usize>,
    #[serde(default)]
    pub parallel: bool,
}

impl Loop {
    pub fn contains(&self, block: usize) -> bool {
        self.blocks.contains(&block)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub linkage: Linkage,
    #[serde(default)]
    pub num_uses: u32,
    #[serde(default)]
    pub return_type: Type,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub loops: Vec<Loop>,
    #[serde(default)]
    pub attrs: FnAttrs,
    /// Known dereferenceable bytes of the returned pointer, 0 if none.
    #[serde(default)]
    pub ret_dereferenceable: u64,
}

impl Function {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            linkage: Linkage::External,
            num_uses: 0,
            return_type: Type::Void,
            params: Vec::new(),
            blocks: Vec::new(),
            loops: Vec::new(),
            attrs: FnAttrs::empty(),
            ret_dereferenceable: 0,
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn is_intrinsic(&self) -> bool {
        self.name.starts_with("llvm.")
    }

    pub fn has_internal_linkage(&self) -> bool {
        self.linkage == Linkage::Internal
    }

    /// `(block index, instruction)` in walk order.
    pub fn instructions(&self) -> impl Iterator<Item = (usize, &Instruction)> {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(b, block)| block.insts.iter().map(move |inst| (b, inst)))
    }

    /// `(block index, instruction index)` of the instruction with `id`.
    pub fn locate(&self, id: u32) -> Option<(usize, usize)> {
        self.blocks.iter().enumerate().find_map(|(b, block)| {
            block
                .insts
                .iter()
                .position(|inst| inst.id == id)
                .map(|i| (b, i))
        })
    }

    pub fn inst(&self, id: u32) -> Option<&Instruction> {
        self.locate(id).map(|(b, i)| &self.blocks[b].insts[i])
    }

    pub fn inst_mut(&mut self, id: u32) -> Option<&mut Instruction> {
        let (b, i) = self.locate(id)?;
        Some(&mut self.blocks[b].insts[i])
    }

    /// Fresh instruction id.
    pub fn next_inst_id(&self) -> u32 {
        self.instructions()
            .map(|(_, inst)| inst.id + 1)
            .max()
            .unwrap_or(0)
    }

    /// Name of an operand, if it has one.
    pub fn value_name<'a>(&'a self, value: &'a Value) -> Option<&'a str> {
        let name = match value {
            Value::Inst { id } => self.inst(*id)?.name.as_str(),
            Value::Param { index } => self.params.get(*index)?.name.as_str(),
            Value::Global { name } => name.as_str(),
            Value::Const { .. } => return None,
        };
        (!name.is_empty()).then_some(name)
    }

    /// Index of the first instruction that is not a phi.
    pub fn first_insertion_point(&self, block: usize) -> usize {
        self.blocks
            .get(block)
            .map(|b| {
                b.insts
                    .iter()
                    .take_while(|inst| matches!(inst.kind, Op::Phi { .. }))
                    .count()
            })
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalInit {
    /// Constant character data (`const char X[] = "..."`).
    String(String),
    /// Address of another global (`const char *X = "..."`).
    Ref(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Global {
    pub name: String,
    #[serde(default)]
    pub init: Option<GlobalInit>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub globals: Vec<Global>,
}

impl Module {
    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Returns the index of the declaration `name`, adding it if missing.
    pub fn get_or_insert_declaration(&mut self, name: &str, return_type: Type) -> usize {
        if let Some(index) = self.function_index(name) {
            return index;
        }
        let mut decl = Function::new(name);
        decl.return_type = return_type;
        self.functions.push(decl);
        self.functions.len() - 1
    }

    /// Character data for `name`, following at most one reference.
    pub fn global_string(&self, name: &str) -> Option<&str> {
        match self.global(name)?.init.as_ref()? {
            GlobalInit::String(s) => Some(s.as_str()),
            GlobalInit::Ref(target) => match self.global(target)?.init.as_ref()? {
                GlobalInit::String(s) => Some(s.as_str()),
                GlobalInit::Ref(_) => None,
            },
        }
    }
}
