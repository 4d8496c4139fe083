//! IR data model for the MinZ code generator.
//!
//! This crate defines the input contract consumed by `minz-codegen`: an
//! ordered [`Module`] of [`Function`]s, built and owned upstream by the
//! MinZ parser and semantic analyzer. Everything here is a plain data
//! structure — no analysis, lowering, or emission lives in this crate.

#![warn(missing_docs)]

mod entities;
mod function;
mod instruction;
mod module;
mod types;

pub use entities::{FixedReg, StringId, VReg};
pub use function::{FunctionFlags, Local, Param, RegMask, Z80Reg};
pub use function::Function;
pub use instruction::{CmpOp, Instruction, Label, Op, PrintKind};
pub use module::{Global, Module, StringLit};
pub use types::{Basic, Type};
