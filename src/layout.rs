//! Bundle memory-layout descriptor for the dynamic API.
//!
//! A single constant record published under `<bundle>_config`; a caller
//! with no compile-time knowledge of the model reads it at load time to
//! size the three arenas and locate the symbol table.

use crate::alloc::{AllocationPlan, Arena};
use crate::ir::BundleIr;

/// Aggregate runtime memory-layout descriptor of a bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleConfig {
    /// Size of the constant weights arena, in bytes.
    pub constant_arena_size: u64,
    /// Size of the mutable weights arena, in bytes.
    pub mutable_arena_size: u64,
    /// Size of the activations arena, in bytes.
    pub activations_arena_size: u64,
    /// Alignment used for weights and activations.
    pub alignment: u64,
    /// Number of entries in the symbol table.
    pub num_symbols: u64,
    /// Name of the symbol-table global this config points at.
    pub symbol_table: String,
}

/// Name of the emitted config global, derived from the bundle name.
pub fn config_name(bundle_name: &str) -> String {
    format!("{bundle_name}_config")
}

/// Build the config record from the allocation plan.
pub fn build_config(ir: &BundleIr, plan: &AllocationPlan, symbol_table: String) -> BundleConfig {
    BundleConfig {
        constant_arena_size: plan.arena_size(Arena::Constant),
        mutable_arena_size: plan.arena_size(Arena::Mutable),
        activations_arena_size: plan.arena_size(Arena::Activations),
        alignment: plan.alignment(),
        num_symbols: ir.placeholders().len() as u64,
        symbol_table,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{AllocationPlanner, BumpPlanner};
    use crate::ir::{Constant, ElemType};
    use crate::symtab::symbol_table_name;

    #[test]
    fn config_mirrors_plan() {
        let mut ir = BundleIr::new();
        ir.add_constant(Constant::from_f32("w", vec![4], &[0.0; 4]).unwrap());
        ir.add_placeholder("input", ElemType::F32, vec![2]);
        ir.add_placeholder("output", ElemType::F32, vec![2]);
        ir.add_activation("tmp", 32);
        let plan = BumpPlanner::default().plan(&ir).unwrap();

        let config = build_config(&ir, &plan, symbol_table_name("net"));
        assert_eq!(config.constant_arena_size, plan.arena_size(Arena::Constant));
        assert_eq!(config.mutable_arena_size, plan.arena_size(Arena::Mutable));
        assert_eq!(
            config.activations_arena_size,
            plan.arena_size(Arena::Activations)
        );
        assert_eq!(config.alignment, 64);
        assert_eq!(config.num_symbols, 2);
        assert_eq!(config.symbol_table, "netSymbolTable");
        assert_eq!(
            config.constant_arena_size
                + config.mutable_arena_size
                + config.activations_arena_size,
            plan.total_size()
        );
    }

    #[test]
    fn config_name_derives_from_bundle() {
        assert_eq!(config_name("net"), "net_config");
    }
}
