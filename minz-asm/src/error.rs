//! Error kinds produced while assembling (spec.md §7).

/// Everything that can go wrong turning source text into bytes.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AsmError {
    /// A line could not be tokenized at all.
    #[error("{line}: syntax error: {message}")]
    Syntax {
        /// 1-based source line number.
        line: u32,
        /// What went wrong.
        message: String,
    },

    /// `mnemonic` is not recognized, or not recognized with the given
    /// operand shape.
    #[error("{line}: unknown instruction `{mnemonic} {operands}`")]
    UnknownMnemonic {
        /// 1-based source line number.
        line: u32,
        /// The mnemonic as written.
        mnemonic: String,
        /// The operand text as written, for the error message.
        operands: String,
    },

    /// An expression referenced a symbol that was never defined by the end
    /// of pass one.
    #[error("{line}: undefined symbol `{name}`")]
    UndefinedSymbol {
        /// 1-based source line number.
        line: u32,
        /// The symbol name.
        name: String,
    },

    /// The same symbol was assigned twice to different values.
    #[error("{line}: symbol `{name}` is already defined")]
    DuplicateSymbol {
        /// 1-based source line number.
        line: u32,
        /// The symbol name.
        name: String,
    },

    /// An expression was malformed (mismatched parens, trailing operator).
    #[error("{line}: bad expression: {message}")]
    Expression {
        /// 1-based source line number.
        line: u32,
        /// What went wrong.
        message: String,
    },

    /// A relative jump (`JR`/`DJNZ`) target is out of the signed 8-bit
    /// displacement range.
    #[error("{line}: relative jump to `{target:#06x}` is out of range (displacement {displacement})")]
    RelativeRangeExceeded {
        /// 1-based source line number.
        line: u32,
        /// The target address.
        target: u16,
        /// The out-of-range signed displacement that was computed.
        displacement: i32,
    },

    /// A directive was used incorrectly (bad argument count, unknown
    /// directive, `ENDM` without `MACRO`, ...).
    #[error("{line}: directive error: {message}")]
    Directive {
        /// 1-based source line number.
        line: u32,
        /// What went wrong.
        message: String,
    },

    /// A macro was invoked with the wrong number of arguments, or a macro
    /// name collided with an existing one.
    #[error("{line}: macro error: {message}")]
    Macro {
        /// 1-based source line number.
        line: u32,
        /// What went wrong.
        message: String,
    },
}

/// Convenience alias used throughout this crate.
pub type AsmResult<T> = Result<T, AsmError>;
