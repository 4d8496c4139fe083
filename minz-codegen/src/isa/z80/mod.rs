//! The Z80 backend: full-featured SMC-aware emitter targeting the ZX
//! Spectrum's `.SNA` snapshot format.

mod emit;
pub mod smc;

pub(crate) use emit::EmitWarning;

use crate::backend::Backend;
use crate::error::CodegenResult;
use crate::features::{Feature, FeatureSet};
use crate::options::GenOptions;
use crate::packager;
use crate::target_config::TargetConfig;
use minz_ir::Module;
use std::sync::OnceLock;

/// Lower a module for the CP/M variant: same instruction lowering as the
/// native backend, but `Op::Print` routes through inline BDOS calls.
pub(crate) fn emit_for_cpm(module: &Module) -> (String, Vec<EmitWarning>) {
    emit::emit_module_for(module, emit::Platform::Cpm)
}

fn target_config() -> &'static TargetConfig {
    static CONFIG: OnceLock<TargetConfig> = OnceLock::new();
    CONFIG.get_or_init(|| TargetConfig {
        name: "z80",
        file_extension: ".a80",
        default_origin: 0x8000,
        ram_start: 0x4000,
        ram_size: 0xC000,
        rom_start: None,
        rom_size: None,
        screen_base: Some(0x4000),
        stack_top: 0xFFFF,
        standard_symbols: &[],
        packager: packager::sna,
    })
}

/// The Z80 backend (spec.md §4.3): the richest backend, with full
/// self-modifying-code, shadow-register, and interrupt-handler support.
#[derive(Default)]
pub struct Z80Backend;

impl Backend for Z80Backend {
    fn name(&self) -> &'static str {
        "z80"
    }

    fn features(&self) -> FeatureSet {
        FeatureSet::none()
            .with(Feature::SelfModifyingCode)
            .with(Feature::Interrupts)
            .with(Feature::ShadowRegisters)
            .with(Feature::Pointer16)
            .with(Feature::InlineAssembly)
            .with(Feature::IndirectCalls)
            .with(Feature::BitManipulation)
            .with(Feature::BlockInstructions)
    }

    fn generate(&self, module: &Module, options: &GenOptions) -> CodegenResult<String> {
        let (text, warnings) = emit::emit_module(module);
        for warning in warnings {
            match warning {
                emit::EmitWarning::UnsupportedOpcode { function, op } => {
                    log::warn!("z80: no lowering for {:?} in function `{}`", op, function);
                }
            }
        }
        if options.debug {
            log::debug!("z80: generated {} bytes of assembly text for module `{}`", text.len(), module.name);
        }
        Ok(text)
    }

    fn file_extension(&self) -> &'static str {
        ".a80"
    }

    fn target_config(&self) -> &TargetConfig {
        target_config()
    }
}

pub(super) fn factory() -> Box<dyn Backend> {
    Box::new(Z80Backend)
}
