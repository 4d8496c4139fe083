//! The Z80 SMC planner (component F, spec.md §4.3).
//!
//! This module owns the naming and bookkeeping for self-modifying-code
//! parameter anchors; [`super::emit`] calls into it while lowering a
//! function's body and its recursive call sites.

use minz_ir::Function;
use std::collections::HashMap;

/// The anchor label for parameter `param_name` of function `func_name`.
///
/// Uses the callee's actual first parameter name, not a placeholder —
/// spec.md §9's Open Question notes the original 8080 emitter had a bug
/// using a fixed `<caller>_param_param` placeholder that broke for
/// differently-named first parameters; this core always derives the label
/// from the real parameter.
pub fn anchor_label(func_name: &str, param_name: &str) -> String {
    format!("{}_param_{}", func_name.replace('.', "_"), param_name)
}

/// Assigns each SMC-enabled function's parameters an anchor, in
/// declaration order, and records the assignment back onto the function's
/// `smc_anchors` map (name → intra-function byte offset), satisfying
/// spec.md §3's invariant that every parameter of an SMC-enabled function
/// has exactly one anchor site before any use.
///
/// Returns the ordered `(param_name, anchor_label, width_bytes)` triples
/// the emitter needs to lay out the anchors at function entry.
pub fn plan_anchors(func: &mut Function) -> Vec<(String, String, u32)> {
    let mut offset = 0u32;
    let mut plan = Vec::new();
    for param in &func.params {
        let label = anchor_label(&func.name, &param.name);
        let width = param.ty.size_of().max(1);
        func.smc_anchors.insert(param.name.clone(), offset);
        plan.push((param.name.clone(), label, width));
        offset += width;
    }
    plan
}

/// A lookup from parameter name to its anchor label, built once per
/// function and threaded through the instruction-lowering loop.
pub fn anchor_labels(func_name: &str, plan: &[(String, String, u32)]) -> HashMap<String, String> {
    let _ = func_name;
    plan.iter().map(|(name, label, _)| (name.clone(), label.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{Function, Param, Type};

    #[test]
    fn anchor_label_uses_callee_param_name() {
        assert_eq!(anchor_label("f", "n"), "f_param_n");
        assert_eq!(anchor_label("Mod.f", "count"), "Mod_f_param_count");
    }

    #[test]
    fn plan_anchors_assigns_one_offset_per_parameter_in_order() {
        let mut f = Function::new(
            "f",
            vec![
                Param { name: "a".into(), ty: Type::u8() },
                Param { name: "n".into(), ty: Type::u16() },
            ],
            Type::void(),
        );
        let plan = plan_anchors(&mut f);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].0, "a");
        assert_eq!(plan[0].2, 1);
        assert_eq!(plan[1].0, "n");
        assert_eq!(plan[1].2, 2);
        assert_eq!(*f.smc_anchors.get("a").unwrap(), 0);
        assert_eq!(*f.smc_anchors.get("n").unwrap(), 1);
    }
}
