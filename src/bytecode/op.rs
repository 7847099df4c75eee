use strum::FromRepr;

/// The instruction set.
///
/// Encoding: one opcode byte; opcodes from [`Opcode::StoreName`] upwards are
/// followed by a 16-bit little-endian operand. An `ExtendedArg` prefix
/// contributes 16 additional high-order bits to the next instruction's
/// operand, so common operands stay compact while large ones remain
/// expressible.
///
/// Jump operands: `JumpForward`, `ForIter` and the three `Setup*` opcodes are
/// relative to the following instruction; `JumpAbsolute`, the conditional
/// jumps and `ContinueLoop` carry absolute offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    PopTop,
    RotTwo,
    RotThree,
    RotFour,
    DupTop,
    UnaryPositive,
    UnaryNegative,
    UnaryNot,
    UnaryInvert,
    BinaryPower,
    BinaryMultiply,
    /// Classic division: floor for two integers, true division otherwise,
    /// unless the code object carries the future-division flag.
    BinaryDivide,
    BinaryTrueDivide,
    BinaryFloorDivide,
    BinaryModulo,
    BinaryAdd,
    BinarySubtract,
    BinaryLshift,
    BinaryRshift,
    BinaryAnd,
    BinaryXor,
    BinaryOr,
    BinarySubscr,
    StoreSubscr,
    DeleteSubscr,
    GetIter,
    BreakLoop,
    WithCleanup,
    ImportStar,
    ReturnValue,
    YieldValue,
    PopBlock,
    EndFinally,

    // Everything from here down takes an operand.
    StoreName,
    DeleteName,
    LoadName,
    LoadConst,
    LoadFast,
    StoreFast,
    DeleteFast,
    LoadGlobal,
    StoreGlobal,
    DeleteGlobal,
    LoadAttr,
    StoreAttr,
    DeleteAttr,
    LoadClosure,
    LoadDeref,
    StoreDeref,
    BuildTuple,
    BuildList,
    BuildMap,
    BuildSlice,
    UnpackSequence,
    CompareOp,
    JumpForward,
    JumpAbsolute,
    PopJumpIfFalse,
    PopJumpIfTrue,
    JumpIfFalseOrPop,
    JumpIfTrueOrPop,
    ForIter,
    SetupLoop,
    SetupExcept,
    SetupFinally,
    ContinueLoop,
    RaiseVarargs,
    /// Operand packs positional count in the low byte and keyword-pair count
    /// in the second byte.
    CallFunction,
    CallFunctionVar,
    CallFunctionKw,
    CallFunctionVarKw,
    MakeFunction,
    MakeClosure,
    DupTopX,
    ImportName,
    ImportFrom,
    ExtendedArg,
}

impl Opcode {
    /// Whether the opcode is followed by an operand.
    #[inline]
    pub fn has_arg(self) -> bool {
        self as u8 >= Self::StoreName as u8
    }

    /// Whether the operand is an offset relative to the next instruction.
    #[inline]
    pub fn is_relative_jump(self) -> bool {
        matches!(
            self,
            Self::JumpForward
                | Self::ForIter
                | Self::SetupLoop
                | Self::SetupExcept
                | Self::SetupFinally
        )
    }

    /// Whether the operand is an absolute instruction offset.
    #[inline]
    pub fn is_absolute_jump(self) -> bool {
        matches!(
            self,
            Self::JumpAbsolute
                | Self::PopJumpIfFalse
                | Self::PopJumpIfTrue
                | Self::JumpIfFalseOrPop
                | Self::JumpIfTrueOrPop
                | Self::ContinueLoop
        )
    }
}

/// An invalid opcode byte was fetched, meaning the instruction stream is
/// corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidOpcodeError(pub u8);

impl std::fmt::Display for InvalidOpcodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid opcode: {}", self.0)
    }
}

impl std::error::Error for InvalidOpcodeError {}

impl TryFrom<u8> for Opcode {
    type Error = InvalidOpcodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_repr(byte).ok_or(InvalidOpcodeError(byte))
    }
}

/// Operand of [`Opcode::CompareOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum CompareOp {
    Lt = 0,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
    /// Matches a raised exception against a class or tuple of classes, used
    /// by `except` clause dispatch.
    ExcMatch,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Is => "is",
            Self::IsNot => "is not",
            Self::ExcMatch => "exception match",
        }
    }
}
