//! The backend registry (component B, spec.md §4.1): a name (and alias) to
//! factory mapping.

use crate::backend::Backend;
use crate::error::{CodegenError, CodegenResult};
use std::collections::HashMap;

/// Constructs a fresh [`Backend`] instance. Each codegen invocation gets
/// its own instance (spec.md §5: "backends themselves are not
/// thread-safe — each codegen invocation must use a freshly constructed
/// backend instance"), so the registry stores factories, not instances.
pub type BackendFactory = fn() -> Box<dyn Backend>;

/// Process-wide-shaped but independently constructible mapping from
/// backend name (and aliases) to factory. Deliberately *not* a global: a
/// fresh [`Registry`] is cheap to build and tests construct their own, per
/// spec.md §9's preference for locally-owned state over module globals.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, BackendFactory>,
}

impl Registry {
    /// An empty registry.
    pub fn empty() -> Registry {
        Registry::default()
    }

    /// A registry with every built-in backend (and its aliases)
    /// registered.
    pub fn with_builtins() -> Registry {
        let mut registry = Registry::empty();
        crate::isa::register_builtins(&mut registry);
        registry
    }

    /// Register `factory` under `name` and every entry of `aliases`. Later
    /// registrations under an already-used name silently replace the
    /// earlier one (mirrors a plain `HashMap::insert`; there is no
    /// first-registration-wins rule in spec.md).
    pub fn register(&mut self, name: &str, aliases: &[&str], factory: BackendFactory) {
        self.factories.insert(name.to_string(), factory);
        for alias in aliases {
            self.factories.insert(alias.to_string(), factory);
        }
    }

    /// Construct a fresh backend instance for `name`, or
    /// [`CodegenError::UnknownTarget`] if `name` is not registered (under
    /// any alias).
    pub fn get(&self, name: &str) -> CodegenResult<Box<dyn Backend>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| CodegenError::UnknownTarget(name.to_string()))
    }

    /// The distinct set of canonical backend names known to this
    /// registry, i.e. one entry per [`Backend::name`], not one per alias.
    pub fn list(&self) -> Vec<&'static str> {
        let mut seen = std::collections::HashSet::new();
        let mut names = Vec::new();
        for factory in self.factories.values() {
            let name = factory().name();
            if seen.insert(name) {
                names.push(name);
            }
        }
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSet;
    use crate::options::GenOptions;
    use crate::target_config::TargetConfig;
    use minz_ir::Module;

    struct Stub;
    impl Backend for Stub {
        fn name(&self) -> &'static str {
            "stub"
        }
        fn features(&self) -> FeatureSet {
            FeatureSet::none()
        }
        fn generate(&self, _module: &Module, _options: &GenOptions) -> CodegenResult<String> {
            Ok(String::new())
        }
        fn file_extension(&self) -> &'static str {
            ".s"
        }
        fn target_config(&self) -> &TargetConfig {
            unimplemented!()
        }
    }

    fn make_stub() -> Box<dyn Backend> {
        Box::new(Stub)
    }

    #[test]
    fn aliases_resolve_to_the_same_backend_name() {
        let mut registry = Registry::empty();
        registry.register("stub", &["stub-alias", "stubbed"], make_stub);
        assert_eq!(registry.get("stub").unwrap().name(), "stub");
        assert_eq!(registry.get("stub-alias").unwrap().name(), "stub");
        assert_eq!(registry.get("stubbed").unwrap().name(), "stub");
    }

    #[test]
    fn unknown_name_is_an_error() {
        let registry = Registry::empty();
        let err = registry.get("does-not-exist").unwrap_err();
        assert!(matches!(err, CodegenError::UnknownTarget(_)));
    }

    #[test]
    fn list_deduplicates_aliases() {
        let mut registry = Registry::empty();
        registry.register("stub", &["stub-alias"], make_stub);
        assert_eq!(registry.list(), vec!["stub"]);
    }

    #[test]
    fn builtin_aliases_resolve_to_the_same_backend() {
        let registry = Registry::with_builtins();
        assert_eq!(registry.get("m68k").unwrap().name(), registry.get("68000").unwrap().name());
        assert_eq!(registry.get("68k").unwrap().name(), registry.get("m68k").unwrap().name());
        assert_eq!(registry.get("i8080").unwrap().name(), registry.get("8080").unwrap().name());
        assert_eq!(
            registry.get("intel8080").unwrap().name(),
            registry.get("i8080").unwrap().name()
        );
    }
}
