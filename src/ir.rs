//! Data model consumed from the graph layer.
//!
//! The bundle saver does not build or optimize graphs; it receives an
//! already-lowered function as a [`BundleIr`]: named weight variables
//! with shapes, constant payloads, and scratch activation buffers. The
//! enumeration order of constants and placeholders is declaration
//! order and is a stable guarantee — every downstream artifact
//! (symbol table, header, weights file) derives its determinism from it.

use crate::error::{BundleError, Result};

/// Element type of a weight variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElemType {
    F32,
    I64,
    I32,
    I8,
    U8,
    Bool,
}

impl ElemType {
    /// Size of one element in bytes.
    pub fn byte_width(self) -> usize {
        match self {
            ElemType::F32 | ElemType::I32 => 4,
            ElemType::I64 => 8,
            ElemType::I8 | ElemType::U8 | ElemType::Bool => 1,
        }
    }

    /// C type name used in generated header documentation.
    pub fn c_name(self) -> &'static str {
        match self {
            ElemType::F32 => "float",
            ElemType::I64 => "int64_t",
            ElemType::I32 => "int32_t",
            ElemType::I8 => "int8_t",
            ElemType::U8 => "uint8_t",
            ElemType::Bool => "bool",
        }
    }
}

/// Kind of a weight variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightKind {
    /// Compile-time-known payload, serialized into the weights file.
    Constant,
    /// Caller-supplied at load time (model inputs and outputs).
    Mutable,
}

/// A named, typed, shaped memory region of the compiled model.
#[derive(Clone, Debug)]
pub struct WeightVariable {
    pub name: String,
    pub kind: WeightKind,
    pub elem: ElemType,
    /// Ordered dimensions.
    pub dims: Vec<usize>,
}

impl WeightVariable {
    pub fn new(name: impl Into<String>, kind: WeightKind, elem: ElemType, dims: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            kind,
            elem,
            dims,
        }
    }

    /// Number of elements (product of dimensions; 1 for a scalar).
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Total payload size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.num_elements() * self.elem.byte_width()
    }

    /// Shape rendered as `[d0, d1, ...]` for header documentation.
    pub fn shape_string(&self) -> String {
        let dims: Vec<String> = self.dims.iter().map(|d| d.to_string()).collect();
        format!("[{}]", dims.join(", "))
    }
}

/// A constant weight: variable plus its literal payload bytes.
#[derive(Clone, Debug)]
pub struct Constant {
    pub var: WeightVariable,
    payload: Vec<u8>,
}

impl Constant {
    /// Build a constant from raw payload bytes.
    ///
    /// The payload length must match the variable's declared byte size.
    pub fn from_bytes(
        name: impl Into<String>,
        elem: ElemType,
        dims: Vec<usize>,
        payload: Vec<u8>,
    ) -> Result<Self> {
        let var = WeightVariable::new(name, WeightKind::Constant, elem, dims);
        if payload.len() != var.size_bytes() {
            return Err(BundleError::Plan(format!(
                "constant '{}' payload is {} bytes, declared size is {}",
                var.name,
                payload.len(),
                var.size_bytes()
            )));
        }
        Ok(Self { var, payload })
    }

    /// Build an f32 constant from typed data.
    pub fn from_f32(name: impl Into<String>, dims: Vec<usize>, data: &[f32]) -> Result<Self> {
        Self::from_bytes(name, ElemType::F32, dims, bytemuck::cast_slice(data).to_vec())
    }

    /// Build an i32 constant from typed data.
    pub fn from_i32(name: impl Into<String>, dims: Vec<usize>, data: &[i32]) -> Result<Self> {
        Self::from_bytes(name, ElemType::I32, dims, bytemuck::cast_slice(data).to_vec())
    }

    /// Raw payload bytes, exactly `var.size_bytes()` long.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// A scratch activation buffer. Participates in address planning but is
/// never serialized and never appears in the symbol table.
#[derive(Clone, Debug)]
pub struct Activation {
    pub name: String,
    pub size_bytes: usize,
}

/// The memory-planned function handed to the bundle saver.
///
/// Constants, placeholders, and activations are kept in declaration
/// order; the slice accessors never reorder.
#[derive(Clone, Debug, Default)]
pub struct BundleIr {
    constants: Vec<Constant>,
    placeholders: Vec<WeightVariable>,
    activations: Vec<Activation>,
}

impl BundleIr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_constant(&mut self, constant: Constant) {
        self.constants.push(constant);
    }

    /// Declare a model input/output. Placeholders are always mutable.
    pub fn add_placeholder(&mut self, name: impl Into<String>, elem: ElemType, dims: Vec<usize>) {
        self.placeholders
            .push(WeightVariable::new(name, WeightKind::Mutable, elem, dims));
    }

    pub fn add_activation(&mut self, name: impl Into<String>, size_bytes: usize) {
        self.activations.push(Activation {
            name: name.into(),
            size_bytes,
        });
    }

    /// Constants in declaration order.
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    /// Placeholders in declaration order.
    pub fn placeholders(&self) -> &[WeightVariable] {
        &self.placeholders
    }

    /// Activations in declaration order.
    pub fn activations(&self) -> &[Activation] {
        &self.activations
    }
}
