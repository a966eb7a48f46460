//! Ahead-of-time bundle emission for memory-planned compute graphs.
//!
//! Takes an already-optimized, address-planned function and emits a
//! self-contained deployable artifact set: a code artifact (machine
//! code or a portable intermediate form), a binary weights blob, and a
//! C-compatible header describing the memory contract — so a caller can
//! link or load the model without the compiler present, down to
//! bare-metal targets with no file system or OS.
//!
//! Two API flavors trade compile-time layout knowledge for runtime
//! flexibility: the dynamic flavor publishes a config record and symbol
//! table resolved at load time; the static flavor fixes every offset in
//! header macros. Output is deterministic and byte-identical for
//! identical input.

pub mod alloc;
pub mod codegen;
pub mod entry;
pub mod error;
pub mod header;
pub mod ir;
pub mod layout;
pub mod saver;
pub mod symtab;
pub mod weights;

pub use alloc::{AllocationPlan, AllocationPlanner, Arena, BumpPlanner, DEFAULT_ALIGNMENT};
pub use codegen::{CodeGen, CodeModel, RelocModel, TargetSpec, TextBackend};
pub use error::{BundleError, Result};
pub use ir::{Activation, BundleIr, Constant, ElemType, WeightKind, WeightVariable};
pub use layout::BundleConfig;
pub use saver::{ApiFlavor, BundleArtifacts, BundleSaver, ExternalCompiler, SaveOptions};
pub use symtab::SymbolTableEntry;

/// Save a bundle in one call: plan addresses, synthesize the entry,
/// compile the module, and write the artifact set.
pub fn save_bundle<B: CodeGen>(
    ir: &BundleIr,
    planner: &dyn AllocationPlanner,
    backend: B,
    options: SaveOptions,
) -> Result<BundleArtifacts> {
    BundleSaver::new(ir, backend, options).save(planner)
}
