//! Bundle save pipeline.
//!
//! [`BundleSaver`] owns the allocation plan, the backend module, and
//! every output file for the duration of one `save()` call. The
//! pipeline is single-threaded, synchronous, and run-to-completion:
//! target configuration, address planning, module augmentation, code
//! generation, artifact writing. Any failure aborts the whole run;
//! a failed run may leave a truncated artifact set behind, and
//! re-running the pipeline is the only recovery path.

use std::path::PathBuf;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::alloc::{AllocationPlan, AllocationPlanner};
use crate::codegen::{CodeGen, CodeModel, GlobalRecord, RelocModel, TargetSpec};
use crate::entry;
use crate::error::{BundleError, Result};
use crate::header;
use crate::ir::BundleIr;
use crate::layout;
use crate::symtab;
use crate::weights;

/// Which header/linkage convention the bundle is emitted with.
///
/// Dynamic exposes the memory layout at run time through a config
/// record and symbol table; static fixes it at compile time through
/// macros, suiting bare-metal targets with no file system or OS.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFlavor {
    #[default]
    Dynamic,
    Static,
}

/// External downstream compiler taking the portable intermediate form
/// to the final machine-code object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCompiler {
    /// Command to invoke.
    pub command: String,
    /// Options passed before the input file.
    pub options: Vec<String>,
}

/// Configuration surface of one `save()` invocation.
///
/// The flavor selector is an explicit field here, not process-global
/// state; two savers with different flavors can coexist.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SaveOptions {
    pub flavor: ApiFlavor,
    pub target: TargetSpec,
    pub code_model: CodeModel,
    pub reloc_model: RelocModel,
    pub output_dir: PathBuf,
    pub bundle_name: String,
    /// Entry-point name; defaults to the bundle name.
    pub entry_name: String,
    pub external_compiler: Option<ExternalCompiler>,
}

impl SaveOptions {
    pub fn new(output_dir: impl Into<PathBuf>, bundle_name: impl Into<String>) -> Self {
        let bundle_name = bundle_name.into();
        Self {
            flavor: ApiFlavor::default(),
            target: TargetSpec::default(),
            code_model: CodeModel::default(),
            reloc_model: RelocModel::default(),
            output_dir: output_dir.into(),
            entry_name: bundle_name.clone(),
            bundle_name,
            external_compiler: None,
        }
    }

    pub fn with_flavor(mut self, flavor: ApiFlavor) -> Self {
        self.flavor = flavor;
        self
    }
}

/// The artifact set produced by a successful `save()`.
#[derive(Clone, Debug)]
pub struct BundleArtifacts {
    /// Final machine-code object (or reference-backend module).
    pub code: PathBuf,
    /// Portable intermediate form, present when an external compiler
    /// was involved.
    pub portable: Option<PathBuf>,
    /// Binary weights, padded to the constant arena size.
    pub weights: PathBuf,
    /// C header describing the memory contract.
    pub header: PathBuf,
    /// Textual weights dump, static flavor only.
    pub weights_txt: Option<PathBuf>,
}

/// Pipeline progress. Strictly forward; any failure aborts in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SaveState {
    Uninitialized,
    TargetConfigured,
    MemoryAllocated,
    EntrySynthesized,
    CodeGenerated,
    ArtifactsWritten,
}

/// Name of the internal computation entry the code generator produced.
/// The synthesized bundle entry demotes and forwards to it.
pub const INTERNAL_ENTRY: &str = "main";

/// One-shot coordinator: builds every artifact of a bundle.
pub struct BundleSaver<'a, B: CodeGen> {
    ir: &'a BundleIr,
    backend: B,
    options: SaveOptions,
    state: SaveState,
}

impl<'a, B: CodeGen> BundleSaver<'a, B> {
    pub fn new(ir: &'a BundleIr, backend: B, options: SaveOptions) -> Self {
        Self {
            ir,
            backend,
            options,
            state: SaveState::Uninitialized,
        }
    }

    fn advance(&mut self, next: SaveState) {
        debug_assert!(next > self.state);
        debug!(from = ?self.state, to = ?next, "save pipeline step");
        self.state = next;
    }

    /// Run the whole pipeline and return the produced artifact paths.
    pub fn save(mut self, planner: &dyn AllocationPlanner) -> Result<BundleArtifacts> {
        let bundle = self.options.bundle_name.clone();

        self.backend
            .init_target(&self.options.target, self.options.code_model, self.options.reloc_model)?;
        self.backend.set_bundle_name(&bundle);
        self.advance(SaveState::TargetConfigured);

        // Address assignment for weights and activations, once per save.
        let plan = planner.plan(self.ir)?;
        plan.validate(self.ir)?;
        self.advance(SaveState::MemoryAllocated);

        let entry_fn = entry::build_entry_function(
            self.ir,
            &plan,
            &self.options.entry_name,
            INTERNAL_ENTRY,
        )?;
        entry::emit_entry_function(&mut self.backend, &entry_fn)?;
        self.advance(SaveState::EntrySynthesized);

        let artifacts = self.produce_bundle(&plan)?;
        self.advance(SaveState::ArtifactsWritten);
        info!(bundle = %bundle, "bundle saved");
        Ok(artifacts)
    }

    /// Augment the module with the dynamic-flavor records, compile it,
    /// and write the artifact set in strict order: code, weights,
    /// header, optional text dump.
    fn produce_bundle(&mut self, plan: &AllocationPlan) -> Result<BundleArtifacts> {
        let bundle = self.options.bundle_name.clone();
        let dir = self.options.output_dir.clone();

        // Symbol table and bundle config exist only in the dynamic API.
        if self.options.flavor == ApiFlavor::Dynamic {
            self.emit_symbol_table(plan)?;
            self.emit_bundle_config(plan)?;
        }

        let extension = if self.options.external_compiler.is_some() {
            "bc"
        } else {
            "o"
        };
        let code_path = dir.join(format!("{bundle}.{extension}"));
        let weights_path = dir.join(format!("{bundle}.weights"));
        let header_path = dir.join(format!("{bundle}.h"));
        debug!(
            bundle = %bundle,
            code = %code_path.display(),
            weights = %weights_path.display(),
            header = %header_path.display(),
            "producing bundle"
        );

        self.backend.perform_codegen()?;
        self.advance(SaveState::CodeGenerated);

        let (code, portable) = if let Some(cc) = self.options.external_compiler.clone() {
            self.backend.write_portable(&code_path)?;
            let object_path = dir.join(format!("{bundle}.o"));
            run_external_compiler(&cc, &code_path, &object_path)?;
            (object_path, Some(code_path))
        } else {
            self.backend.write_object(&code_path)?;
            (code_path, None)
        };

        weights::write_weights(&weights_path, self.ir, plan)?;
        header::write_header(
            &header_path,
            self.ir,
            plan,
            self.options.flavor,
            &bundle,
            &self.options.entry_name,
        )?;

        // The static API additionally ships the weights as a C array.
        let weights_txt = if self.options.flavor == ApiFlavor::Static {
            let txt_path = dir.join(format!("{bundle}.inc"));
            weights::write_weights_txt(&weights_path, &txt_path)?;
            Some(txt_path)
        } else {
            None
        };

        Ok(BundleArtifacts {
            code,
            portable,
            weights: weights_path,
            header: header_path,
            weights_txt,
        })
    }

    fn emit_symbol_table(&mut self, plan: &AllocationPlan) -> Result<()> {
        let entries = symtab::build_symbol_table(self.ir, plan)?;
        self.backend.emit_global_record(&GlobalRecord::SymbolTable {
            name: symtab::symbol_table_name(&self.options.bundle_name),
            entries,
        })
    }

    fn emit_bundle_config(&mut self, plan: &AllocationPlan) -> Result<()> {
        let table_name = symtab::symbol_table_name(&self.options.bundle_name);
        // The config points at the symbol table; emitting it without one
        // is a defect in the pipeline, not a recoverable condition.
        if !self.backend.has_global(&table_name) {
            return Err(BundleError::MissingModuleArtifact(table_name));
        }
        let config = layout::build_config(self.ir, plan, table_name);
        self.backend.emit_global_record(&GlobalRecord::Config {
            name: layout::config_name(&self.options.bundle_name),
            config,
        })
    }
}

/// Hand the portable form to the external downstream compiler. Blocking;
/// a non-zero exit is fatal and reports the failing command.
fn run_external_compiler(
    cc: &ExternalCompiler,
    input: &std::path::Path,
    output: &std::path::Path,
) -> Result<()> {
    let rendered = format!(
        "{} {} {} -o {}",
        cc.command,
        cc.options.join(" "),
        input.display(),
        output.display()
    );
    debug!(command = %rendered, "running external compiler");
    let status = Command::new(&cc.command)
        .args(&cc.options)
        .arg(input)
        .arg("-o")
        .arg(output)
        .status()
        .map_err(|e| BundleError::ExternalCompiler {
            command: rendered.clone(),
            status: e.to_string(),
        })?;
    if !status.success() {
        return Err(BundleError::ExternalCompiler {
            command: rendered,
            status: status.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{AllocationPlanner as _, BumpPlanner};
    use crate::codegen::TextBackend;
    use crate::ir::{Constant, ElemType};

    fn sample_ir() -> BundleIr {
        let mut ir = BundleIr::new();
        ir.add_constant(Constant::from_f32("w", vec![2], &[1.0, 2.0]).unwrap());
        ir.add_placeholder("input", ElemType::F32, vec![2]);
        ir.add_placeholder("output", ElemType::F32, vec![2]);
        ir.add_activation("tmp", 32);
        ir
    }

    #[test]
    fn default_flavor_is_dynamic() {
        let opts = SaveOptions::new("/tmp", "net");
        assert_eq!(opts.flavor, ApiFlavor::Dynamic);
        assert_eq!(opts.entry_name, "net");
    }

    #[test]
    fn dynamic_save_produces_artifact_set() {
        let ir = sample_ir();
        let dir = tempfile::tempdir().unwrap();
        let opts = SaveOptions::new(dir.path(), "net");
        let saver = BundleSaver::new(&ir, TextBackend::new(), opts);
        let artifacts = saver.save(&BumpPlanner::default()).unwrap();

        assert!(artifacts.code.exists());
        assert!(artifacts.weights.exists());
        assert!(artifacts.header.exists());
        assert!(artifacts.weights_txt.is_none());
        assert!(artifacts.portable.is_none());
        assert_eq!(artifacts.code.file_name().unwrap(), "net.o");

        let module = std::fs::read_to_string(&artifacts.code).unwrap();
        assert!(module.contains("@netSymbolTable"));
        assert!(module.contains("@net_config"));
    }

    #[test]
    fn static_save_adds_text_dump_and_drops_records() {
        let ir = sample_ir();
        let dir = tempfile::tempdir().unwrap();
        let opts = SaveOptions::new(dir.path(), "net").with_flavor(ApiFlavor::Static);
        let saver = BundleSaver::new(&ir, TextBackend::new(), opts);
        let artifacts = saver.save(&BumpPlanner::default()).unwrap();

        let txt = artifacts.weights_txt.expect("static flavor dumps weights text");
        assert!(txt.exists());
        assert_eq!(txt.file_name().unwrap(), "net.inc");

        let module = std::fs::read_to_string(&artifacts.code).unwrap();
        assert!(!module.contains("SymbolTable"));
        assert!(!module.contains("net_config"));
    }

    #[test]
    fn config_without_symbol_table_is_fatal() {
        let ir = sample_ir();
        let plan = BumpPlanner::default().plan(&ir).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let opts = SaveOptions::new(dir.path(), "net");
        let mut saver = BundleSaver::new(&ir, TextBackend::new(), opts);
        // No symbol table was emitted into the module.
        let err = saver.emit_bundle_config(&plan).unwrap_err();
        match err {
            BundleError::MissingModuleArtifact(name) => assert_eq!(name, "netSymbolTable"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unopenable_output_dir_is_fatal() {
        let ir = sample_ir();
        let dir = tempfile::tempdir().unwrap();
        let opts = SaveOptions::new(dir.path().join("missing"), "net");
        let saver = BundleSaver::new(&ir, TextBackend::new(), opts);
        let err = saver.save(&BumpPlanner::default()).unwrap_err();
        assert!(matches!(err, BundleError::Write { .. }));
    }

    #[test]
    fn external_compiler_failure_is_fatal_and_names_command() {
        let ir = sample_ir();
        let dir = tempfile::tempdir().unwrap();
        let mut opts = SaveOptions::new(dir.path(), "net");
        opts.external_compiler = Some(ExternalCompiler {
            command: "false".into(),
            options: vec![],
        });
        let saver = BundleSaver::new(&ir, TextBackend::new(), opts);
        let err = saver.save(&BumpPlanner::default()).unwrap_err();
        match err {
            BundleError::ExternalCompiler { command, .. } => {
                assert!(command.contains("net.bc"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn external_compiler_takes_portable_form() {
        let ir = sample_ir();
        let dir = tempfile::tempdir().unwrap();
        let mut opts = SaveOptions::new(dir.path(), "net");
        // `true` accepts any arguments and exits 0, standing in for a
        // downstream compiler without depending on a toolchain.
        opts.external_compiler = Some(ExternalCompiler {
            command: "true".into(),
            options: vec![],
        });
        let saver = BundleSaver::new(&ir, TextBackend::new(), opts);
        let artifacts = saver.save(&BumpPlanner::default()).unwrap();
        let portable = artifacts.portable.expect("portable form written");
        assert_eq!(portable.file_name().unwrap(), "net.bc");
        assert!(portable.exists());
        assert_eq!(artifacts.code.file_name().unwrap(), "net.o");
    }
}
