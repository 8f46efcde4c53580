//! The instruction IR analysed by the correlator.
//!
//! `#[shape]` lowers the body of every constructor and `&self` method of a type into a flat list
//! of [`Insn`] values for a small stack machine. Every expression pushes exactly one abstract
//! value; statements pop what they do not use.
//!
//! The IR only has to be precise about data flow between constructor parameters, locals and
//! fields. Anything the lowering does not understand becomes [`Insn::Opaque`] (an unknown value)
//! and any control flow becomes a [`Insn::Branch`] / [`Insn::Label`] pair, which ends the current
//! basic block.
//!
//! Struct construction `Self { x: a, y: b * 2 }` lowers to:
//!
//! ```text
//! LoadSelf  LoadParam(0)                   PutField("x")
//! LoadSelf  LoadParam(1) LoadConst Binary(Mul) PutField("y")
//! LoadSelf  Return
//! ```
//!
//! and the accessor `fn x(&self) -> i32 { self.x }` to `LoadSelf GetField("x") Return`.

use std::fmt;

/// A single instruction of the lowered method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insn {
    /// Pushes the receiver, or the object under construction inside a constructor.
    LoadSelf,
    /// Pushes the constructor parameter at the given index.
    LoadParam(usize),
    /// Pushes the local variable stored in the given slot.
    LoadLocal(usize),
    /// Pops a value into the given local slot.
    StoreLocal(usize),
    /// Pushes a literal, constant or static.
    LoadConst,
    /// Pops an object and pushes the named field.
    GetField(&'static str),
    /// Pops a value and an object, storing the value into the named field.
    PutField(&'static str),
    /// Pops two operands and pushes the result.
    Binary(BinaryOp),
    /// Pops one operand and pushes the result.
    Unary(UnaryOp),
    /// Pops one operand and pushes it converted with `as`.
    Cast,
    /// Pops `argc` values (receiver first for method calls) and pushes the result.
    Invoke {
        /// Method or function name, without its path.
        name: &'static str,
        /// Number of popped operands, including the receiver.
        argc: usize,
    },
    /// Discards the top of the stack.
    Pop,
    /// Pushes a value the lowering could not describe.
    Opaque,
    /// Control flow leaves the current basic block.
    Branch,
    /// A new basic block starts here.
    Label,
    /// Pops the returned value and leaves the method.
    Return,
}

impl Insn {
    /// Returns `true` for instructions that end a basic block.
    pub fn ends_block(&self) -> bool {
        matches!(self, Self::Branch | Self::Label | Self::Return)
    }
}

/// Binary operators, compound assignments included (`a += b` lowers to `Add`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    BitXor,
    BitAnd,
    BitOr,
    Shl,
    Shr,
    Eq,
    Lt,
    Le,
    Ne,
    Ge,
    Gt,
}

/// Unary operators. Dereferences and borrows are transparent and never lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadSelf => write!(f, "load_self"),
            Self::LoadParam(i) => write!(f, "load_param {i}"),
            Self::LoadLocal(slot) => write!(f, "load_local {slot}"),
            Self::StoreLocal(slot) => write!(f, "store_local {slot}"),
            Self::LoadConst => write!(f, "load_const"),
            Self::GetField(name) => write!(f, "get_field {name}"),
            Self::PutField(name) => write!(f, "put_field {name}"),
            Self::Binary(op) => write!(f, "binary {op:?}"),
            Self::Unary(op) => write!(f, "unary {op:?}"),
            Self::Cast => write!(f, "cast"),
            Self::Invoke { name, argc } => write!(f, "invoke {name}/{argc}"),
            Self::Pop => write!(f, "pop"),
            Self::Opaque => write!(f, "opaque"),
            Self::Branch => write!(f, "branch"),
            Self::Label => write!(f, "label"),
            Self::Return => write!(f, "return"),
        }
    }
}

/// Renders a body one instruction per line, for debugging correlation failures.
pub fn disassemble(body: &[Insn]) -> String {
    body.iter()
        .enumerate()
        .map(|(offset, insn)| format!("{offset:>4}: {insn}"))
        .collect::<Vec<_>>()
        .join("\n")
}
