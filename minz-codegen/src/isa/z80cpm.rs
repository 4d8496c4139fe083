//! The CP/M Z80 backend variant: identical instruction lowering to
//! [`super::z80`], but targeting a `.COM` program image with the BDOS
//! entry point pre-populated as a standard symbol.

use crate::backend::Backend;
use crate::error::CodegenResult;
use crate::features::{Feature, FeatureSet};
use crate::options::GenOptions;
use crate::packager;
use crate::target_config::TargetConfig;
use minz_ir::Module;
use std::sync::OnceLock;

fn target_config() -> &'static TargetConfig {
    static CONFIG: OnceLock<TargetConfig> = OnceLock::new();
    CONFIG.get_or_init(|| TargetConfig {
        name: "z80cpm",
        file_extension: ".z80",
        default_origin: 0x0100,
        ram_start: 0x0100,
        ram_size: 0xFF00,
        rom_start: None,
        rom_size: None,
        screen_base: None,
        stack_top: 0xFFFF,
        // BDOS function 2 ("console output") is how every `print` op
        // resolves on this platform; see spec.md §4.3's CP/M variant.
        standard_symbols: &[("BDOS", 0x0005), ("BDOS_CONOUT", 2)],
        packager: packager::com,
    })
}

/// The CP/M-hosted Z80 backend.
#[derive(Default)]
pub struct Z80CpmBackend;

impl Backend for Z80CpmBackend {
    fn name(&self) -> &'static str {
        "z80cpm"
    }

    fn features(&self) -> FeatureSet {
        FeatureSet::none()
            .with(Feature::SelfModifyingCode)
            .with(Feature::Pointer16)
            .with(Feature::InlineAssembly)
            .with(Feature::IndirectCalls)
            .with(Feature::BitManipulation)
            .with(Feature::BlockInstructions)
    }

    fn generate(&self, module: &Module, options: &GenOptions) -> CodegenResult<String> {
        let (text, warnings) = super::z80::emit_for_cpm(module);
        for warning in warnings {
            let super::z80::EmitWarning::UnsupportedOpcode { function, op } = warning;
            log::warn!("z80cpm: no lowering for {:?} in function `{}`", op, function);
        }
        if options.debug {
            log::debug!("z80cpm: generated {} bytes for module `{}`", text.len(), module.name);
        }
        Ok(text)
    }

    fn file_extension(&self) -> &'static str {
        ".z80"
    }

    fn target_config(&self) -> &TargetConfig {
        target_config()
    }
}

pub(super) fn factory() -> Box<dyn Backend> {
    Box::new(Z80CpmBackend)
}
