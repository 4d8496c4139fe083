//! The closed set of backend feature tags (spec.md §4.1) and the capability
//! map every backend is queried through.

use std::fmt;

/// One capability tag a backend may or may not support.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Feature {
    /// Self-modifying-code parameter passing.
    SelfModifyingCode,
    /// Interrupt handler functions.
    Interrupts,
    /// A shadow register bank (Z80's `EXX`/`EX AF,AF'`).
    ShadowRegisters,
    /// 16-bit pointers.
    Pointer16,
    /// 24-bit pointers.
    Pointer24,
    /// 32-bit pointers.
    Pointer32,
    /// Hardware floating point.
    FloatingPoint,
    /// Fixed-point arithmetic types.
    FixedPoint,
    /// Inline target-assembly passthrough.
    InlineAssembly,
    /// Indirect (register/computed) calls.
    IndirectCalls,
    /// Bit set/reset/test instructions.
    BitManipulation,
    /// A fast zero-page (or equivalent) addressing region.
    ZeroPage,
    /// Block move/fill instructions (`LDIR`, memcpy intrinsics, ...).
    BlockInstructions,
    /// Hardware multiply.
    HardwareMultiply,
    /// Hardware divide.
    HardwareDivide,
}

/// The full tag set, for iterating a backend's capabilities.
pub const ALL_FEATURES: &[Feature] = &[
    Feature::SelfModifyingCode,
    Feature::Interrupts,
    Feature::ShadowRegisters,
    Feature::Pointer16,
    Feature::Pointer24,
    Feature::Pointer32,
    Feature::FloatingPoint,
    Feature::FixedPoint,
    Feature::InlineAssembly,
    Feature::IndirectCalls,
    Feature::BitManipulation,
    Feature::ZeroPage,
    Feature::BlockInstructions,
    Feature::HardwareMultiply,
    Feature::HardwareDivide,
];

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A backend's yes/no answer for every [`Feature`]. Stored as data (a
/// fixed-size bool table keyed by tag position) rather than trait-method
/// dispatch per tag, per spec.md §9's "capability is data" guidance — a
/// new backend only has to list which tags it flips on.
#[derive(Copy, Clone, Debug)]
pub struct FeatureSet([bool; ALL_FEATURES.len()]);

impl FeatureSet {
    /// A feature set with every tag denied. Backends build from this with
    /// [`FeatureSet::with`].
    pub const fn none() -> FeatureSet {
        FeatureSet([false; ALL_FEATURES.len()])
    }

    fn position(feature: Feature) -> usize {
        ALL_FEATURES
            .iter()
            .position(|f| *f == feature)
            .expect("ALL_FEATURES is exhaustive over Feature")
    }

    /// Builder-style: return a copy with `feature` granted.
    pub fn with(mut self, feature: Feature) -> FeatureSet {
        self.0[Self::position(feature)] = true;
        self
    }

    /// `true` if `feature` is granted.
    pub fn supports(&self, feature: Feature) -> bool {
        self.0[Self::position(feature)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_denies_everything() {
        let fs = FeatureSet::none();
        for f in ALL_FEATURES {
            assert!(!fs.supports(*f));
        }
    }

    #[test]
    fn with_grants_exactly_one() {
        let fs = FeatureSet::none().with(Feature::SelfModifyingCode);
        assert!(fs.supports(Feature::SelfModifyingCode));
        assert!(!fs.supports(Feature::Interrupts));
    }

    #[test]
    fn with_is_pure_and_total() {
        // supports() must be a pure function of the constructed set —
        // calling it twice gives the same answer (spec.md §8 invariant).
        let fs = FeatureSet::none().with(Feature::ZeroPage);
        assert_eq!(fs.supports(Feature::ZeroPage), fs.supports(Feature::ZeroPage));
    }
}
