//! Error kinds produced by the codegen core (spec.md §7).

use crate::features::Feature;
use minz_asm::AsmError;
use minz_ir::Op;

/// Everything that can go wrong driving a `generate` call.
#[derive(thiserror::Error, Debug)]
pub enum CodegenError {
    /// `options.target` is not a registered backend name.
    #[error("unknown codegen target `{0}`")]
    UnknownTarget(String),

    /// The request asked for a feature the backend denies.
    #[error("backend `{backend}` does not support {feature:?}")]
    UnsupportedFeature {
        /// The backend that was asked.
        backend: &'static str,
        /// The feature it denied.
        feature: Feature,
    },

    /// An opcode could not be lowered by the selected backend. This is
    /// non-fatal: generation continues and a `TODO` comment is emitted in
    /// its place (spec.md §7); the variant exists so the warning can still
    /// be reported through a typed channel rather than only as text.
    #[error("backend `{backend}` cannot lower opcode {op:?} in function `{function}`")]
    UnsupportedOpcode {
        /// The backend that could not lower the opcode.
        backend: &'static str,
        /// The offending opcode.
        op: Op,
        /// The function it occurred in.
        function: String,
    },

    /// A memory-layout constraint was violated (origin + size beyond RAM,
    /// COM program not based at 0x0100, MSX ROM oversized, ...).
    #[error("memory layout error: {0}")]
    MemoryLayout(String),

    /// The requested output format's packager rejected the input.
    #[error("output format error: {0}")]
    OutputFormat(String),

    /// Propagated from the embedded Z80 assembler when a Z80-family
    /// backend's emitted text fails to assemble.
    #[error(transparent)]
    Assembler(#[from] AsmError),

    /// Propagated from the IR crate (reserved for future IR-level
    /// validation; no construction site exists in this core yet).
    #[error("invalid IR: {0}")]
    InvalidIr(String),
}

/// Convenience alias used throughout this crate.
pub type CodegenResult<T> = Result<T, CodegenError>;
