//! The multi-backend code generator core: a feature-gated registry of
//! target backends (component B/C, spec.md §4.1) sitting in front of each
//! target's emitter (component E, spec.md §4.3-4.5), with shared output
//! packaging (component H, spec.md §4.6) and a table-driven scaffold
//! (component D, spec.md §4.2) for the lightest targets.
//!
//! The two external interfaces spec.md §6 names are [`generate`] here and
//! [`minz_asm::assemble`] in the sibling assembler crate; this crate adds
//! [`assemble_and_package`] to chain the two for the Z80-family targets
//! whose emitted text is meant to be fed back through the embedded
//! assembler (spec.md §2's data-flow line).

#![warn(missing_docs)]

mod backend;
mod error;
mod features;
mod isa;
mod options;
mod packager;
mod registry;
mod target_config;
mod toolkit;

pub use backend::Backend;
pub use error::{CodegenError, CodegenResult};
pub use features::{Feature, FeatureSet, ALL_FEATURES};
pub use options::{ConfigValue, GenOptions, OptLevel};
pub use packager::{validate_memory_layout, LayoutWarning};
pub use registry::{BackendFactory, Registry};
pub use target_config::{RawImage, TargetConfig};
pub use toolkit::{
    opcode_key, BackendToolkit, CallingConvention, IntegerIdiom, Placeholder, Template,
    ToolkitBuilder,
};

use minz_ir::Module;

/// The codegen entry point (spec.md §6): resolve `target_name` against the
/// built-in registry, run the feature gate, and lower `module` to that
/// target's assembly (or assembly-adjacent) text.
///
/// Every call constructs its own backend instance and its own registry, in
/// keeping with spec.md §5's "backends are not thread-safe, each
/// invocation gets a fresh one" and §9's "no module-level globals" rule.
pub fn generate(module: &Module, target_name: &str, options: &GenOptions) -> CodegenResult<String> {
    let registry = Registry::with_builtins();
    let target = registry.get(target_name)?;
    backend::generate(target.as_ref(), module, options)
}

/// Assemble `source` against `cfg`'s standard platform symbols, package the
/// result with `cfg`'s packager, and log (never fail on) any
/// [`LayoutWarning`]s.
///
/// This is the part of spec.md §2's data-flow line ("...assembly text →
/// (Z80 targets only) assembler + instruction table → raw bytes →
/// packager") that lives above the two standalone crates: callers of a
/// Z80-family backend run `generate` to get text, then this to get bytes.
pub fn assemble_and_package(cfg: &TargetConfig, source: &str) -> CodegenResult<Vec<u8>> {
    let assembled = minz_asm::assemble(source, cfg.standard_symbols)?;
    let image = RawImage { bytes: assembled.bytes, origin: assembled.origin };
    for warning in validate_memory_layout(cfg, &image) {
        log::warn!("{}: memory layout warning: {:?}", cfg.name, warning);
    }
    (cfg.packager)(cfg, &image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{Function, Type};

    #[test]
    fn generate_rejects_unknown_target() {
        let module = Module::new("m");
        let err = generate(&module, "does-not-exist", &GenOptions::new()).unwrap_err();
        assert!(matches!(err, CodegenError::UnknownTarget(_)));
    }

    #[test]
    fn generate_routes_to_the_named_backend() {
        let mut module = Module::new("m");
        module.functions.push(Function::new("f", vec![], Type::void()));
        let text = generate(&module, "z80", &GenOptions::new()).expect("z80 generation succeeds");
        assert!(text.contains("f:"));
    }

    #[test]
    fn generate_is_deterministic() {
        let mut module = Module::new("m");
        module.functions.push(Function::new("f", vec![], Type::void()));
        let a = generate(&module, "c", &GenOptions::new()).unwrap();
        let b = generate(&module, "c", &GenOptions::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn smc_request_against_a_non_smc_backend_fails_fast() {
        let module = Module::new("m");
        let options = GenOptions::new().with_smc(true);
        let err = generate(&module, "c", &options).unwrap_err();
        assert!(matches!(err, CodegenError::UnsupportedFeature { .. }));
    }
}
