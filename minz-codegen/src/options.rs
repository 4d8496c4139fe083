//! Codegen request configuration (spec.md §6).

use std::collections::HashMap;

/// A value in the [`GenOptions::custom`] escape hatch. A small closed enum
/// rather than a generic JSON value, per SPEC_FULL.md §4.0 — this crate
/// does not otherwise need a JSON dependency and every known custom knob
/// so far is one of these three shapes.
#[derive(Clone, PartialEq, Debug)]
pub enum ConfigValue {
    /// A boolean knob.
    Bool(bool),
    /// An integer knob.
    Int(i64),
    /// A string knob.
    Str(String),
}

/// Optimization level requested for a `generate` call.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum OptLevel {
    /// No optimization.
    #[default]
    O0,
    /// Light optimization (lean prologues/epilogues, peephole-level).
    O1,
    /// Aggressive optimization, including SMC where requested.
    O2,
}

/// The recognized fields of a `generate(module, target, options)` request.
#[derive(Clone, Debug, Default)]
pub struct GenOptions {
    /// Optimization level.
    pub optimization_level: OptLevel,
    /// Request self-modifying-code parameter passing where the backend
    /// supports it.
    pub enable_smc: bool,
    /// Request true-SMC (pointer-patching) where the backend supports it.
    pub enable_true_smc: bool,
    /// Override the default origin/load address for this generation.
    pub target_address: Option<u16>,
    /// Emit extra diagnostic comments/log lines (SPEC_FULL.md §4.11's
    /// register-pressure diagnostics, for instance).
    pub debug: bool,
    /// Backend-specific escape hatch.
    pub custom: HashMap<String, ConfigValue>,
}

impl GenOptions {
    /// Options requesting no SMC, no debug output, default optimization.
    pub fn new() -> GenOptions {
        GenOptions::default()
    }

    /// Builder-style: request SMC.
    pub fn with_smc(mut self, on: bool) -> GenOptions {
        self.enable_smc = on;
        self
    }

    /// Builder-style: request true-SMC.
    pub fn with_true_smc(mut self, on: bool) -> GenOptions {
        self.enable_true_smc = on;
        self
    }
}
