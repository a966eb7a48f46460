//! Symbol-table records for the dynamic bundle API.
//!
//! One entry per placeholder, in declaration order. Constants never
//! appear here: their addresses are folded into the generated code and
//! their payloads ship in the weights file.

use crate::alloc::AllocationPlan;
use crate::error::Result;
use crate::ir::BundleIr;

/// Kind flag marking a mutable variable. The current design emits no
/// other kind; constants are never represented as placeholders.
pub const SYMBOL_KIND_MUTABLE: u8 = 1;

/// One runtime-resolvable symbol of a generated bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolTableEntry {
    /// Placeholder name.
    pub name: String,
    /// Offset within the mutable arena, in bytes.
    pub offset: u64,
    /// Number of elements inside this variable.
    pub size: u64,
    /// Variable kind; always [`SYMBOL_KIND_MUTABLE`].
    pub kind: u8,
}

/// Name of the emitted symbol-table global, derived from the bundle name.
pub fn symbol_table_name(bundle_name: &str) -> String {
    format!("{bundle_name}SymbolTable")
}

/// Build the symbol table for every placeholder of `ir`.
///
/// Declaration order of the placeholders is the sole source of artifact
/// determinism for this component and is preserved exactly.
pub fn build_symbol_table(ir: &BundleIr, plan: &AllocationPlan) -> Result<Vec<SymbolTableEntry>> {
    let mut entries = Vec::with_capacity(ir.placeholders().len());
    for p in ir.placeholders() {
        entries.push(SymbolTableEntry {
            name: p.name.clone(),
            offset: plan.offset_of(&p.name)?,
            size: p.num_elements() as u64,
            kind: SYMBOL_KIND_MUTABLE,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{AllocationPlanner, BumpPlanner};
    use crate::ir::ElemType;

    #[test]
    fn one_entry_per_placeholder_in_order() {
        let mut ir = BundleIr::new();
        ir.add_placeholder("input", ElemType::F32, vec![3]);
        ir.add_placeholder("output", ElemType::F32, vec![5]);
        let plan = BumpPlanner::default().plan(&ir).unwrap();

        let table = build_symbol_table(&ir, &plan).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].name, "input");
        assert_eq!(table[0].offset, 0);
        assert_eq!(table[0].size, 3);
        assert_eq!(table[1].name, "output");
        assert_eq!(table[1].offset, 64);
        assert_eq!(table[1].size, 5);
    }

    #[test]
    fn entries_are_always_mutable() {
        let mut ir = BundleIr::new();
        ir.add_placeholder("x", ElemType::I8, vec![10]);
        let plan = BumpPlanner::default().plan(&ir).unwrap();
        let table = build_symbol_table(&ir, &plan).unwrap();
        assert!(table.iter().all(|e| e.kind == SYMBOL_KIND_MUTABLE));
    }

    #[test]
    fn table_name_derives_from_bundle() {
        assert_eq!(symbol_table_name("net"), "netSymbolTable");
    }
}
