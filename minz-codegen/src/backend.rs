//! The `Backend` trait every target implements, and the feature gate that
//! sits in front of every `generate` call (components C, spec.md §4.1).

use crate::error::{CodegenError, CodegenResult};
use crate::features::{Feature, FeatureSet};
use crate::options::GenOptions;
use crate::target_config::TargetConfig;
use minz_ir::Module;

/// Every codegen target implements this. Modeled as a trait with an
/// associated capability set rather than deep inheritance, per spec.md
/// §9's "Backend polymorphism" guidance.
pub trait Backend {
    /// The canonical backend name (not an alias).
    fn name(&self) -> &'static str;

    /// This backend's capability answers.
    fn features(&self) -> FeatureSet;

    /// `true` if this backend supports `feature`. A thin, total wrapper
    /// over [`Backend::features`] so callers don't need to import
    /// `FeatureSet` just to ask one question.
    fn supports(&self, feature: Feature) -> bool {
        self.features().supports(feature)
    }

    /// Lower `module` to this target's assembly text. Callers should go
    /// through [`generate`] rather than calling this directly, so the
    /// feature gate runs first.
    fn generate(&self, module: &Module, options: &GenOptions) -> CodegenResult<String>;

    /// The output file extension, including the leading dot.
    fn file_extension(&self) -> &'static str;

    /// Static memory-layout/packaging configuration for this target.
    fn target_config(&self) -> &TargetConfig;
}

/// Apply the feature gate (spec.md §4.1) and run `backend.generate`.
///
/// 1. If `options` requests SMC or true-SMC against a backend that denies
///    it, fail fast with [`CodegenError::UnsupportedFeature`].
/// 2. If SMC is unsupported, clear every SMC-related flag on every
///    function in a private copy of `module` (the module is the backend's
///    own copy from this point on — spec.md calls this a "defensive
///    rewrite").
/// 3. If SMC is supported and requested globally, set the per-function
///    SMC-enabled flag on every function.
pub fn generate(
    backend: &dyn Backend,
    module: &Module,
    options: &GenOptions,
) -> CodegenResult<String> {
    if options.enable_smc && !backend.supports(Feature::SelfModifyingCode) {
        return Err(CodegenError::UnsupportedFeature {
            backend: backend.name(),
            feature: Feature::SelfModifyingCode,
        });
    }
    if options.enable_true_smc && !backend.supports(Feature::SelfModifyingCode) {
        return Err(CodegenError::UnsupportedFeature {
            backend: backend.name(),
            feature: Feature::SelfModifyingCode,
        });
    }

    let mut module = module.clone();
    if !backend.supports(Feature::SelfModifyingCode) {
        for f in &mut module.functions {
            f.clear_smc_flags();
        }
    } else if options.enable_smc {
        for f in &mut module.functions {
            f.flags.smc_enabled = true;
        }
    }

    backend.generate(&module, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSet;
    use minz_ir::{Function, Type};

    struct DenySmc;
    impl Backend for DenySmc {
        fn name(&self) -> &'static str {
            "deny"
        }
        fn features(&self) -> FeatureSet {
            FeatureSet::none()
        }
        fn generate(&self, module: &Module, _options: &GenOptions) -> CodegenResult<String> {
            Ok(format!(
                "smc_enabled={}",
                module.functions.first().map(|f| f.flags.smc_enabled).unwrap_or(false)
            ))
        }
        fn file_extension(&self) -> &'static str {
            ".s"
        }
        fn target_config(&self) -> &TargetConfig {
            unimplemented!("not needed for this test")
        }
    }

    #[test]
    fn requesting_smc_against_a_denying_backend_fails_fast() {
        let backend = DenySmc;
        let module = Module::new("m");
        let opts = GenOptions::new().with_smc(true);
        let err = generate(&backend, &module, &opts).unwrap_err();
        assert!(matches!(err, CodegenError::UnsupportedFeature { .. }));
    }

    #[test]
    fn smc_flags_are_cleared_when_unsupported_even_without_a_request() {
        let backend = DenySmc;
        let mut module = Module::new("m");
        let mut f = Function::new("f", vec![], Type::void());
        f.flags.smc_enabled = true;
        module.functions.push(f);
        let opts = GenOptions::new();
        let text = generate(&backend, &module, &opts).unwrap();
        assert_eq!(text, "smc_enabled=false");
    }
}
