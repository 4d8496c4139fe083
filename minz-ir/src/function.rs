//! Functions: the unit of codegen.

use crate::instruction::Instruction;
use crate::types::Type;
use std::collections::HashMap;

/// A named, typed function parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    /// Parameter name, as it appears in `LoadParam` instructions and in
    /// SMC anchor labels.
    pub name: String,
    /// Parameter type.
    pub ty: Type,
}

/// A named, typed local variable.
#[derive(Clone, Debug, PartialEq)]
pub struct Local {
    /// Local name.
    pub name: String,
    /// Local type.
    pub ty: Type,
}

/// An abstract Z80 register file bit, used by [`Function::used_registers`]
/// and [`Function::modified_registers`]. Non-Z80 backends ignore this mask
/// entirely; it exists because the prologue/epilogue leanness decisions in
/// spec.md §4.3 are specified in terms of it.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[repr(u16)]
pub enum Z80Reg {
    A = 1 << 0,
    F = 1 << 1,
    B = 1 << 2,
    C = 1 << 3,
    D = 1 << 4,
    E = 1 << 5,
    H = 1 << 6,
    L = 1 << 7,
    Ix = 1 << 8,
    Iy = 1 << 9,
    AShadow = 1 << 10,
    FShadow = 1 << 11,
    BShadow = 1 << 12,
    CShadow = 1 << 13,
    DShadow = 1 << 14,
    EShadow = 1 << 15,
}

/// A bitset over [`Z80Reg`].
#[derive(Copy, Clone, PartialEq, Eq, Default, Debug, Hash)]
pub struct RegMask(pub u16);

impl RegMask {
    /// The empty mask.
    pub fn empty() -> RegMask {
        RegMask(0)
    }

    /// Set `reg` in the mask.
    pub fn insert(&mut self, reg: Z80Reg) {
        self.0 |= reg as u16;
    }

    /// `true` if `reg` is set in the mask.
    pub fn contains(&self, reg: Z80Reg) -> bool {
        self.0 & (reg as u16) != 0
    }

    /// `true` if any of the main (non-shadow) register-pair bits are set.
    pub fn uses_shadow_registers(&self) -> bool {
        const SHADOW_MASK: u16 = Z80Reg::AShadow as u16
            | Z80Reg::FShadow as u16
            | Z80Reg::BShadow as u16
            | Z80Reg::CShadow as u16
            | Z80Reg::DShadow as u16
            | Z80Reg::EShadow as u16;
        self.0 & SHADOW_MASK != 0
    }
}

/// Advisory flags attached to a function by upstream analysis, per
/// spec.md §3. The codegen core only ever *reads* these, except that the
/// feature gate (component C) may clear the SMC-related ones when the
/// selected backend lacks SMC capability.
#[derive(Copy, Clone, PartialEq, Eq, Default, Debug, Hash)]
pub struct FunctionFlags {
    /// The function opted into SMC parameter passing.
    pub smc_enabled: bool,
    /// SMC is the default for this function's calling convention (as
    /// opposed to having been explicitly requested).
    pub smc_default: bool,
    /// At least one true-SMC (pointer-patching) site is used.
    pub uses_true_smc: bool,
    /// The function (transitively) calls itself.
    pub recursive: bool,
    /// The function has a tail-recursive call site eligible for a loop
    /// rewrite upstream (informational only; this core does not rewrite
    /// tail calls).
    pub has_tail_recursion: bool,
    /// The function is an interrupt handler.
    pub is_interrupt: bool,
}

/// A single function in an IR [`Module`](crate::Module).
#[derive(Clone, Debug)]
pub struct Function {
    /// Function name. May contain `.` separators (module-qualified);
    /// backends whose label grammar forbids `.` rewrite it to `_` at
    /// emission time (spec.md §4.2).
    pub name: String,
    /// Ordered parameter list.
    pub params: Vec<Param>,
    /// Return type; `Type::void()` if the function returns nothing.
    pub return_type: Type,
    /// Named locals.
    pub locals: Vec<Local>,
    /// Flat instruction sequence.
    pub instructions: Vec<Instruction>,
    /// Advisory flags set by upstream analysis.
    pub flags: FunctionFlags,
    /// Registers read by this function's body.
    pub used_registers: RegMask,
    /// Registers written by this function's body; the Z80 emitter's
    /// prologue/epilogue uses exactly this mask to decide what to
    /// push/pop (spec.md §4.3).
    pub modified_registers: RegMask,
    /// For SMC-enabled functions: parameter name → intra-function byte
    /// offset of its anchor. Populated by the Z80 emitter as it emits the
    /// anchors, not expected to be populated upstream.
    pub smc_anchors: HashMap<String, u32>,
}

impl Function {
    /// Construct an empty function with the given name, parameters and
    /// return type; everything else defaults to empty/false.
    pub fn new(name: impl Into<String>, params: Vec<Param>, return_type: Type) -> Function {
        Function {
            name: name.into(),
            params,
            return_type,
            locals: Vec::new(),
            instructions: Vec::new(),
            flags: FunctionFlags::default(),
            used_registers: RegMask::empty(),
            modified_registers: RegMask::empty(),
            smc_anchors: HashMap::new(),
        }
    }

    /// The parameter named `name`, if any.
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Clear every SMC-related flag. Used by the feature gate
    /// (component C) when the selected backend denies SMC (spec.md
    /// §4.1).
    pub fn clear_smc_flags(&mut self) {
        self.flags.smc_enabled = false;
        self.flags.smc_default = false;
        self.flags.uses_true_smc = false;
        self.smc_anchors.clear();
    }

    /// Rewrite `name`'s `.` separators to `_`, as the generic driver
    /// (component D) does for targets whose label grammar forbids dots
    /// (spec.md §4.2).
    pub fn label_safe_name(&self) -> String {
        self.name.replace('.', "_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_smc_flags_clears_anchors() {
        let mut f = Function::new("f", vec![], Type::void());
        f.flags.smc_enabled = true;
        f.smc_anchors.insert("n".into(), 4);
        f.clear_smc_flags();
        assert!(!f.flags.smc_enabled);
        assert!(f.smc_anchors.is_empty());
    }

    #[test]
    fn label_safe_name_rewrites_dots() {
        let f = Function::new("Mod.sub.f", vec![], Type::void());
        assert_eq!(f.label_safe_name(), "Mod_sub_f");
    }

    #[test]
    fn reg_mask_shadow_detection() {
        let mut m = RegMask::empty();
        assert!(!m.uses_shadow_registers());
        m.insert(Z80Reg::BShadow);
        assert!(m.uses_shadow_registers());
        assert!(m.contains(Z80Reg::BShadow));
        assert!(!m.contains(Z80Reg::B));
    }
}
