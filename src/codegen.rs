//! Narrow code-generation capability interface.
//!
//! The saver deliberately sees only a small surface of the backend:
//! target setup, module naming, global-record emission, entry-function
//! emission, codegen finalization, and artifact serialization. Records
//! and functions are handed over as declarative value objects; how they
//! become instructions and data is the backend's business.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BundleError, Result};
use crate::layout::BundleConfig;
use crate::symtab::SymbolTableEntry;

/// Target description forwarded to the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Target triple, e.g. `thumbv7em-none-eabihf`. Empty means host.
    pub triple: String,
    pub arch: String,
    pub cpu: String,
    pub features: Vec<String>,
}

/// Code model for object emission. Object files generate properly only
/// in the small model, which is the default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeModel {
    #[default]
    Small,
    Medium,
    Large,
}

/// Relocation model for object emission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelocModel {
    #[default]
    Static,
    Pic,
}

/// A module-level constant record to be emitted, built ahead of time as
/// a plain value and lowered by the backend in one pass.
#[derive(Clone, Debug)]
pub enum GlobalRecord {
    /// Internal-linkage array of symbol-table entries.
    SymbolTable {
        name: String,
        entries: Vec<SymbolTableEntry>,
    },
    /// External-linkage bundle config aggregate.
    Config { name: String, config: BundleConfig },
}

impl GlobalRecord {
    pub fn name(&self) -> &str {
        match self {
            GlobalRecord::SymbolTable { name, .. } => name,
            GlobalRecord::Config { name, .. } => name,
        }
    }
}

/// The synthesized bundle entry point, as a declarative value.
///
/// The signature is fixed: three byte-pointer parameters (constant
/// arena base, mutable arena base, activations arena base). The body
/// forwards those pointers plus the constant offsets table into the
/// internal entry.
#[derive(Clone, Debug)]
pub struct EntryFunction {
    /// External name of the entry; the header prototype must match it.
    pub name: String,
    /// Internal computation entry this function forwards to.
    pub inner_name: String,
    /// Offsets table the backend may fold into absolute addressing.
    pub offsets: Vec<u64>,
}

/// Number of pointer parameters of every bundle entry function.
pub const ENTRY_PARAM_COUNT: usize = 3;

/// Capability interface the bundle saver requires from a backend.
pub trait CodeGen {
    /// Record target triple/arch/cpu/features and code/reloc models.
    /// Must be called before any emission.
    fn init_target(
        &mut self,
        target: &TargetSpec,
        code_model: CodeModel,
        reloc_model: RelocModel,
    ) -> Result<()>;

    fn set_bundle_name(&mut self, name: &str);
    fn bundle_name(&self) -> &str;

    /// Demote a symbol to internal linkage.
    fn internalize(&mut self, symbol: &str);

    /// Lower a declarative record into a module-level constant.
    fn emit_global_record(&mut self, record: &GlobalRecord) -> Result<()>;

    /// Whether a global of this name has been emitted into the module.
    fn has_global(&self, name: &str) -> bool;

    /// Lower the synthesized bundle entry point.
    fn emit_entry_function(&mut self, entry: &EntryFunction) -> Result<()>;

    /// Compile the augmented module. After this call the module is
    /// sealed; only serialization remains.
    fn perform_codegen(&mut self) -> Result<()>;

    /// Serialize the compiled module as a machine-code object.
    fn write_object(&mut self, path: &Path) -> Result<()>;

    /// Serialize the compiled module in the portable intermediate form.
    fn write_portable(&mut self, path: &Path) -> Result<()>;
}

/// Reference backend emitting a deterministic textual module.
///
/// Stands in for a machine-code backend in tests and host-side smoke
/// runs: the rendered text is byte-stable for identical input, so every
/// determinism property of the pipeline can be checked against it.
#[derive(Debug, Default)]
pub struct TextBackend {
    target: Option<(TargetSpec, CodeModel, RelocModel)>,
    bundle_name: String,
    internalized: BTreeSet<String>,
    globals: Vec<GlobalRecord>,
    entry: Option<EntryFunction>,
    compiled: Option<String>,
}

impl TextBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn require_target(&self) -> Result<&(TargetSpec, CodeModel, RelocModel)> {
        self.target
            .as_ref()
            .ok_or_else(|| BundleError::Codegen("target was never configured".into()))
    }

    fn render(&self) -> Result<String> {
        let (target, code_model, reloc_model) = self.require_target()?;
        let mut out = String::new();
        writeln!(out, "; bundle module '{}'", self.bundle_name).unwrap();
        writeln!(
            out,
            "target triple = \"{}\" arch = \"{}\" cpu = \"{}\" features = \"{}\"",
            target.triple,
            target.arch,
            target.cpu,
            target.features.join(",")
        )
        .unwrap();
        writeln!(
            out,
            "code_model = {:?} reloc_model = {:?}",
            code_model, reloc_model
        )
        .unwrap();

        for record in &self.globals {
            match record {
                GlobalRecord::SymbolTable { name, entries } => {
                    writeln!(
                        out,
                        "@{name} = internal constant [{} x {{ i8*, i64, i64, i8 }}] [",
                        entries.len()
                    )
                    .unwrap();
                    for e in entries {
                        writeln!(
                            out,
                            "  {{ \"{}\", {}, {}, {} }},",
                            e.name, e.offset, e.size, e.kind
                        )
                        .unwrap();
                    }
                    writeln!(out, "]").unwrap();
                }
                GlobalRecord::Config { name, config } => {
                    writeln!(
                        out,
                        "@{name} = constant {{ i64, i64, i64, i64, i64, ptr }} \
                         {{ {}, {}, {}, {}, {}, @{} }}",
                        config.constant_arena_size,
                        config.mutable_arena_size,
                        config.activations_arena_size,
                        config.alignment,
                        config.num_symbols,
                        config.symbol_table
                    )
                    .unwrap();
                }
            }
        }

        if let Some(entry) = &self.entry {
            let linkage = if self.internalized.contains(&entry.inner_name) {
                "internal "
            } else {
                ""
            };
            writeln!(
                out,
                "declare {linkage}void @{}(ptr, ptr, ptr, ptr)",
                entry.inner_name
            )
            .unwrap();
            let params: Vec<String> = (0..ENTRY_PARAM_COUNT)
                .map(|i| format!("ptr %{i}"))
                .collect();
            let params = params.join(", ");
            writeln!(out, "define void @{}({params}) {{", entry.name).unwrap();
            writeln!(out, "entry:").unwrap();
            let offsets: Vec<String> = entry.offsets.iter().map(|o| o.to_string()).collect();
            writeln!(
                out,
                "  %offsets = constant [{} x i64] [{}]",
                entry.offsets.len(),
                offsets.join(", ")
            )
            .unwrap();
            writeln!(
                out,
                "  call void @{}({params}, ptr %offsets)",
                entry.inner_name
            )
            .unwrap();
            writeln!(out, "  ret void").unwrap();
            writeln!(out, "}}").unwrap();
        }
        Ok(out)
    }

    fn require_compiled(&self) -> Result<&str> {
        self.compiled
            .as_deref()
            .ok_or_else(|| BundleError::Codegen("codegen was never performed".into()))
    }
}

impl CodeGen for TextBackend {
    fn init_target(
        &mut self,
        target: &TargetSpec,
        code_model: CodeModel,
        reloc_model: RelocModel,
    ) -> Result<()> {
        if self.target.is_some() {
            return Err(BundleError::Codegen("target configured twice".into()));
        }
        self.target = Some((target.clone(), code_model, reloc_model));
        Ok(())
    }

    fn set_bundle_name(&mut self, name: &str) {
        self.bundle_name = name.to_string();
    }

    fn bundle_name(&self) -> &str {
        &self.bundle_name
    }

    fn internalize(&mut self, symbol: &str) {
        self.internalized.insert(symbol.to_string());
    }

    fn emit_global_record(&mut self, record: &GlobalRecord) -> Result<()> {
        self.require_target()?;
        if self.has_global(record.name()) {
            return Err(BundleError::Codegen(format!(
                "global '{}' emitted twice",
                record.name()
            )));
        }
        self.globals.push(record.clone());
        Ok(())
    }

    fn has_global(&self, name: &str) -> bool {
        self.globals.iter().any(|g| g.name() == name)
    }

    fn emit_entry_function(&mut self, entry: &EntryFunction) -> Result<()> {
        self.require_target()?;
        if self.entry.is_some() {
            return Err(BundleError::Codegen("entry function emitted twice".into()));
        }
        self.entry = Some(entry.clone());
        Ok(())
    }

    fn perform_codegen(&mut self) -> Result<()> {
        let text = self.render()?;
        debug!(bundle = %self.bundle_name, bytes = text.len(), "module compiled");
        self.compiled = Some(text);
        Ok(())
    }

    fn write_object(&mut self, path: &Path) -> Result<()> {
        let text = self.require_compiled()?.to_string();
        fs::write(path, text).map_err(|e| BundleError::write(path, e))
    }

    fn write_portable(&mut self, path: &Path) -> Result<()> {
        let text = self.require_compiled()?.to_string();
        fs::write(path, text).map_err(|e| BundleError::write(path, e))
    }
}
