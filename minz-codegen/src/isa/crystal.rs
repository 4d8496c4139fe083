//! The Crystal backend (spec.md OVERVIEW: "a table-driven scaffold for
//! further targets"): the lightest emitter, built directly on the shared
//! [`crate::toolkit`] rather than a bespoke per-opcode match.

use crate::backend::Backend;
use crate::error::CodegenResult;
use crate::features::{Feature, FeatureSet};
use crate::options::GenOptions;
use crate::packager;
use crate::target_config::TargetConfig;
use crate::toolkit::{BackendToolkit, CallingConvention, IntegerIdiom, Template, ToolkitBuilder};
use minz_ir::Module;
use std::sync::OnceLock;

fn target_config() -> &'static TargetConfig {
    static CONFIG: OnceLock<TargetConfig> = OnceLock::new();
    CONFIG.get_or_init(|| TargetConfig {
        name: "crystal",
        file_extension: ".cr",
        default_origin: 0,
        ram_start: 0,
        ram_size: 0,
        rom_start: None,
        rom_size: None,
        screen_base: None,
        stack_top: 0,
        standard_symbols: &[],
        packager: packager::raw,
    })
}

fn toolkit() -> &'static BackendToolkit {
    static TOOLKIT: OnceLock<BackendToolkit> = OnceLock::new();
    TOOLKIT.get_or_init(|| {
        ToolkitBuilder::new()
            .integer_idiom(IntegerIdiom::Decimal)
            .mnemonic("const", "# load constant")
            .mnemonic("move", "# move")
            .mnemonic("add", "add")
            .mnemonic("sub", "sub")
            .mnemonic("mul", "mul")
            .mnemonic("div", "div")
            .mnemonic("rem", "rem")
            .mnemonic("and", "band")
            .mnemonic("or", "bor")
            .mnemonic("xor", "bxor")
            .mnemonic("shl", "shl")
            .mnemonic("shr", "shr")
            .mnemonic("not", "bnot")
            .mnemonic("neg", "neg")
            .mnemonic("jump", "goto")
            .mnemonic("label", "# label")
            .mnemonic("call", "call")
            .mnemonic("return", "return")
            .mnemonic("load_var", "load_var")
            .mnemonic("store_var", "store_var")
            .mnemonic("load_param", "# parameter")
            .mnemonic("print", "puts")
            .calling_convention(CallingConvention {
                registers_for_params: false,
                return_register: "result",
                prologue: Template::parse("def run"),
                epilogue: Template::parse("end"),
            })
            .build()
    })
}

/// The Crystal backend: the repository's reference implementation of how
/// little code [`crate::toolkit::generic_drive`] needs to stand up a new
/// target.
#[derive(Default)]
pub struct CrystalBackend;

impl Backend for CrystalBackend {
    fn name(&self) -> &'static str {
        "crystal"
    }

    fn features(&self) -> FeatureSet {
        FeatureSet::none().with(Feature::Pointer32).with(Feature::HardwareMultiply).with(Feature::HardwareDivide)
    }

    fn generate(&self, module: &Module, options: &GenOptions) -> CodegenResult<String> {
        let mut unsupported = Vec::new();
        let text = crate::toolkit::generic_drive(toolkit(), module, |func, inst| {
            unsupported.push((func.name.clone(), inst.op.clone()));
        });
        for (function, op) in &unsupported {
            log::warn!("crystal: no lowering for {:?} in function `{}`", op, function);
        }
        if options.debug {
            log::debug!("crystal: generated {} bytes for module `{}`", text.len(), module.name);
        }
        Ok(text)
    }

    fn file_extension(&self) -> &'static str {
        ".cr"
    }

    fn target_config(&self) -> &TargetConfig {
        target_config()
    }
}

pub(super) fn factory() -> Box<dyn Backend> {
    Box::new(CrystalBackend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{Function, Instruction, Op, Type};

    #[test]
    fn generic_driver_produces_a_function_label() {
        let mut module = Module::new("m");
        module.functions.push(Function::new("f", vec![], Type::void()));
        let backend = CrystalBackend;
        let options = GenOptions::new();
        let text = crate::backend::generate(&backend, &module, &options).expect("generation succeeds");
        assert!(text.contains("f:"));
        assert!(text.contains("def run"));
    }

    #[test]
    fn mapped_opcodes_use_their_mnemonic() {
        let mut module = Module::new("m");
        let mut f = Function::new("f", vec![], Type::void());
        f.instructions.push(Instruction::new(Op::Return));
        module.functions.push(f);
        let backend = CrystalBackend;
        let text = crate::backend::generate(&backend, &module, &GenOptions::new()).unwrap();
        assert!(text.contains("return"));
        assert!(!text.contains("TODO"));
    }

    #[test]
    fn no_smc_feature_is_granted() {
        let backend = CrystalBackend;
        assert!(!backend.supports(Feature::SelfModifyingCode));
    }
}
