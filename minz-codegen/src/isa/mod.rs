//! The concrete per-target backends (component E, spec.md §4.3-4.5) and
//! their registration into a [`crate::registry::Registry`].

mod c;
mod crystal;
mod gb;
mod i8080;
mod llvm;
mod m68000;
mod mos6502;
mod wasm;
mod z80;
mod z80cpm;

use crate::registry::Registry;

/// Register every built-in backend, under its canonical name plus every
/// alias spec.md §6 lists (currently just the `m68k`/`i8080` groups).
pub fn register_builtins(registry: &mut Registry) {
    registry.register("z80", &[], z80::factory);
    registry.register("z80cpm", &[], z80cpm::factory);
    registry.register("i8080", &["8080", "intel8080"], i8080::factory);
    registry.register("6502", &[], mos6502::factory);
    registry.register("m68k", &["68000", "68k"], m68000::factory);
    registry.register("gb", &[], gb::factory);
    registry.register("wasm", &[], wasm::factory);
    registry.register("llvm", &[], llvm::factory);
    registry.register("c", &[], c::factory);
    registry.register("crystal", &[], crystal::factory);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_backend_is_reachable() {
        let mut registry = Registry::empty();
        register_builtins(&mut registry);
        let names = registry.list();
        for expected in ["z80", "z80cpm", "i8080", "6502", "m68k", "gb", "wasm", "llvm", "c", "crystal"] {
            assert!(names.contains(&expected), "missing backend `{}`", expected);
        }
    }
}
