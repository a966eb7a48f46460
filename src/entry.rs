//! Bundle entry-point synthesis.
//!
//! The produced function has a fixed 3-pointer signature
//! `(constantArenaBase, mutableArenaBase, activationsArenaBase)` with
//! external linkage, named after the bundle's declared entry name. It
//! demotes the internal computation entry to internal linkage and
//! forwards the three arena pointers plus a constant offsets table into
//! it. Because the offsets are constants, the backend can fold them
//! into absolute addressing.

use crate::alloc::AllocationPlan;
use crate::codegen::{CodeGen, EntryFunction};
use crate::error::Result;
use crate::ir::BundleIr;

/// Build the entry-function value object.
///
/// The offsets table covers every planned value: constants first, then
/// placeholders, then activations, each in declaration order.
pub fn build_entry_function(
    ir: &BundleIr,
    plan: &AllocationPlan,
    entry_name: &str,
    inner_name: &str,
) -> Result<EntryFunction> {
    let mut offsets = Vec::new();
    for c in ir.constants() {
        offsets.push(plan.offset_of(&c.var.name)?);
    }
    for p in ir.placeholders() {
        offsets.push(plan.offset_of(&p.name)?);
    }
    for a in ir.activations() {
        offsets.push(plan.offset_of(&a.name)?);
    }
    Ok(EntryFunction {
        name: entry_name.to_string(),
        inner_name: inner_name.to_string(),
        offsets,
    })
}

/// Demote the internal entry and emit the bundle entry point.
pub fn emit_entry_function(backend: &mut dyn CodeGen, entry: &EntryFunction) -> Result<()> {
    backend.internalize(&entry.inner_name);
    backend.emit_entry_function(entry)
}
