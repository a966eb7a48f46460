//! C header generation.
//!
//! One double-inclusion-guarded header per bundle, in one of two
//! mutually exclusive flavors. The common block carries its own guard
//! so headers of several bundles can coexist in a translation unit.
//! The model-info block is documentation only and never affects the
//! ABI; the entry prototype is present in both flavors and must match
//! the synthesized entry function exactly.

use std::fmt::Write as _;
use std::fs::File;
use std::io::Write as _;
use std::path::Path;

use crate::alloc::{AllocationPlan, Arena};
use crate::error::{BundleError, Result};
use crate::ir::BundleIr;
use crate::saver::ApiFlavor;

/// Common definitions for the dynamic API: record layouts a loader
/// needs to interpret the bundle at run time.
const DYNAMIC_COMMON_DEFINES: &str = r#"
// Type describing a symbol table entry of a generated bundle.
struct SymbolTableEntry {
  // Name of a variable.
  const char *name;
  // Offset of the variable inside the memory area.
  uint64_t offset;
  // The number of elements inside this variable.
  uint64_t size;
  // Variable kind: 1 if it is a mutable variable, 0 otherwise.
  char kind;
};

// Type describing the config of a generated bundle.
struct BundleConfig {
  // Size of the constant weight variables memory area.
  uint64_t constantWeightVarsMemSize;
  // Size of the mutable weight variables memory area.
  uint64_t mutableWeightVarsMemSize;
  // Size of the activations memory area.
  uint64_t activationsMemSize;
  // Alignment to be used for weights and activations.
  uint64_t alignment;
  // Number of symbols in the symbol table.
  uint64_t numSymbols;
  // Symbol table.
  const SymbolTableEntry *symbolTable;
};
"#;

/// Common definitions for the static API: alignment and
/// address-computation macros for compile-time-fixed layouts.
const STATIC_COMMON_DEFINES: &str = r#"
// Memory alignment definition with given alignment size
// for static allocation of memory.
#define BUNDLE_MEM_ALIGN(size)  __attribute__((aligned(size)))

// Macro function to get the absolute address of a
// placeholder using the base address of the mutable
// weight buffer and placeholder offset definition.
#define BUNDLE_GET_ADDR(mutableBaseAddr, placeholderOff)  (((uint8_t*)(mutableBaseAddr)) + placeholderOff)
"#;

/// Render the model-info documentation block.
fn model_info(ir: &BundleIr, plan: &AllocationPlan, bundle_name: &str) -> Result<String> {
    let mut info = String::new();
    writeln!(info, "// Model name: \"{bundle_name}\"").unwrap();
    writeln!(info, "// Total data size: {} (bytes)", plan.total_size()).unwrap();
    writeln!(info, "// Placeholders:").unwrap();
    for p in ir.placeholders() {
        writeln!(info, "//").unwrap();
        writeln!(info, "//   Name: \"{}\"", p.name).unwrap();
        writeln!(info, "//   Type: {}", p.elem.c_name()).unwrap();
        writeln!(info, "//   Shape: {}", p.shape_string()).unwrap();
        writeln!(info, "//   Size: {} (elements)", p.num_elements()).unwrap();
        writeln!(info, "//   Size: {} (bytes)", p.size_bytes()).unwrap();
        writeln!(info, "//   Offset: {} (bytes)", plan.offset_of(&p.name)?).unwrap();
    }
    info.push_str("//");
    Ok(info)
}

/// Render the API block for the selected flavor.
fn api_block(
    ir: &BundleIr,
    plan: &AllocationPlan,
    flavor: ApiFlavor,
    bundle_name: &str,
    entry_name: &str,
) -> Result<String> {
    let upper = bundle_name.to_uppercase();
    let mut api = String::from("\n");

    match flavor {
        ApiFlavor::Dynamic => {
            writeln!(api, "// Bundle memory configuration (memory layout)").unwrap();
            writeln!(api, "extern BundleConfig {bundle_name}_config;").unwrap();
            writeln!(api).unwrap();
        }
        ApiFlavor::Static => {
            let name_max_len = ir
                .placeholders()
                .iter()
                .map(|p| p.name.len())
                .max()
                .unwrap_or(0);

            writeln!(
                api,
                "// Placeholder address offsets within mutable buffer (bytes)"
            )
            .unwrap();
            for p in ir.placeholders() {
                let pad = " ".repeat(name_max_len - p.name.len());
                writeln!(
                    api,
                    "#define {upper}_{}{pad}  {}",
                    p.name,
                    plan.offset_of(&p.name)?
                )
                .unwrap();
            }
            writeln!(api).unwrap();

            writeln!(api, "// Memory sizes (bytes)").unwrap();
            writeln!(
                api,
                "#define {upper}_CONSTANT_MEM_SIZE     {}",
                plan.arena_size(Arena::Constant)
            )
            .unwrap();
            writeln!(
                api,
                "#define {upper}_MUTABLE_MEM_SIZE      {}",
                plan.arena_size(Arena::Mutable)
            )
            .unwrap();
            writeln!(
                api,
                "#define {upper}_ACTIVATIONS_MEM_SIZE  {}",
                plan.arena_size(Arena::Activations)
            )
            .unwrap();
            writeln!(api).unwrap();
            writeln!(api, "// Memory alignment (bytes)").unwrap();
            writeln!(api, "#define {upper}_MEM_ALIGN  {}", plan.alignment()).unwrap();
            writeln!(api).unwrap();
        }
    }

    writeln!(api, "// Bundle entry point (inference function). Arguments:").unwrap();
    writeln!(api, "//   (1) Base address of the constant weights area.").unwrap();
    writeln!(api, "//   (2) Base address of the mutable weights area.").unwrap();
    writeln!(api, "//   (3) Base address of the activations area.").unwrap();
    writeln!(api, "void {entry_name}(uint8_t*, uint8_t*, uint8_t*);").unwrap();
    Ok(api)
}

/// Render the complete header text.
pub fn render_header(
    ir: &BundleIr,
    plan: &AllocationPlan,
    flavor: ApiFlavor,
    bundle_name: &str,
    entry_name: &str,
) -> Result<String> {
    let upper = bundle_name.to_uppercase();
    let common = match flavor {
        ApiFlavor::Dynamic => DYNAMIC_COMMON_DEFINES,
        ApiFlavor::Static => STATIC_COMMON_DEFINES,
    };
    let info = model_info(ir, plan, bundle_name)?;
    let api = api_block(ir, plan, flavor, bundle_name, entry_name)?;

    Ok(format!(
        r#"// Bundle API header file
// Auto-generated file. Do not edit!
#ifndef _BUNDLE_{upper}_H
#define _BUNDLE_{upper}_H

#include <stdint.h>

// ---------------------------------------------------------------
//                       Common definitions
// ---------------------------------------------------------------
#ifndef _BUNDLE_COMMON_DEFS
#define _BUNDLE_COMMON_DEFS
{common}
#endif

// ---------------------------------------------------------------
//                          Bundle API
// ---------------------------------------------------------------
{info}
// NOTE: Placeholders are allocated within the "mutableWeight"
// buffer and are identified using an offset relative to base.
// ---------------------------------------------------------------
#ifdef __cplusplus
extern "C" {{
#endif
{api}
#ifdef __cplusplus
}}
#endif
#endif
"#
    ))
}

/// Write the header file. Failure to open the output path is fatal.
pub fn write_header(
    path: &Path,
    ir: &BundleIr,
    plan: &AllocationPlan,
    flavor: ApiFlavor,
    bundle_name: &str,
    entry_name: &str,
) -> Result<()> {
    let text = render_header(ir, plan, flavor, bundle_name, entry_name)?;
    let mut file = File::create(path).map_err(|e| BundleError::open(path, e))?;
    file.write_all(text.as_bytes())
        .map_err(|e| BundleError::write(path, e))
}
