//! Allocation-plan contract.
//!
//! The address-assignment algorithm itself is external to this
//! subsystem; it is consumed as an oracle behind [`AllocationPlanner`].
//! What this module owns is the *shape* of its answer — an
//! [`AllocationPlan`] partitioning every value into three arenas — and
//! the invariants a plan must satisfy before artifacts are emitted.

use std::collections::HashMap;

use crate::error::{BundleError, Result};
use crate::ir::BundleIr;

/// Default alignment for weights and activations, in bytes.
pub const DEFAULT_ALIGNMENT: u64 = 64;

/// One of the three disjoint memory regions of a compiled bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Arena {
    /// Read-only constant weights, backed by the weights file.
    Constant,
    /// Caller-supplied inputs and outputs.
    Mutable,
    /// Scratch space for intermediate tensors.
    Activations,
}

/// Byte offsets for every value of a function, partitioned into arenas.
///
/// Offsets are assigned exactly once per `save()`; re-assigning a name
/// is an error, and the plan is immutable once handed to the saver.
#[derive(Clone, Debug)]
pub struct AllocationPlan {
    alignment: u64,
    arena_sizes: [u64; 3],
    offsets: HashMap<String, (Arena, u64)>,
}

fn arena_index(arena: Arena) -> usize {
    match arena {
        Arena::Constant => 0,
        Arena::Mutable => 1,
        Arena::Activations => 2,
    }
}

impl AllocationPlan {
    pub fn new(alignment: u64) -> Self {
        Self {
            alignment,
            arena_sizes: [0; 3],
            offsets: HashMap::new(),
        }
    }

    /// Record the offset of a named value within an arena.
    pub fn assign(&mut self, name: impl Into<String>, arena: Arena, offset: u64) -> Result<()> {
        let name = name.into();
        if self.offsets.contains_key(&name) {
            return Err(BundleError::Plan(format!(
                "'{name}' was assigned an address twice"
            )));
        }
        self.offsets.insert(name, (arena, offset));
        Ok(())
    }

    pub fn set_arena_size(&mut self, arena: Arena, size: u64) {
        self.arena_sizes[arena_index(arena)] = size;
    }

    pub fn arena_size(&self, arena: Arena) -> u64 {
        self.arena_sizes[arena_index(arena)]
    }

    /// Sum of the three arena sizes; documented in the header.
    pub fn total_size(&self) -> u64 {
        self.arena_sizes.iter().sum()
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Offset of a named value. Missing names are fatal: the saver only
    /// queries values the planner was given.
    pub fn offset_of(&self, name: &str) -> Result<u64> {
        self.offsets
            .get(name)
            .map(|&(_, off)| off)
            .ok_or_else(|| BundleError::Plan(format!("no address assigned for '{name}'")))
    }

    pub fn arena_of(&self, name: &str) -> Result<Arena> {
        self.offsets
            .get(name)
            .map(|&(arena, _)| arena)
            .ok_or_else(|| BundleError::Plan(format!("no address assigned for '{name}'")))
    }

    /// Check the plan against the function it claims to cover.
    ///
    /// Constants may alias each other, so only range containment is
    /// required there; mutable offsets must additionally be unique.
    pub fn validate(&self, ir: &BundleIr) -> Result<()> {
        for c in ir.constants() {
            self.check_range(&c.var.name, Arena::Constant, c.var.size_bytes() as u64)?;
        }
        let mut seen_mutable = Vec::new();
        for p in ir.placeholders() {
            self.check_range(&p.name, Arena::Mutable, p.size_bytes() as u64)?;
            let off = self.offset_of(&p.name)?;
            if seen_mutable.contains(&off) {
                return Err(BundleError::Plan(format!(
                    "placeholder '{}' shares mutable-arena offset {off}",
                    p.name
                )));
            }
            seen_mutable.push(off);
        }
        for a in ir.activations() {
            self.check_range(&a.name, Arena::Activations, a.size_bytes as u64)?;
        }
        Ok(())
    }

    fn check_range(&self, name: &str, expected: Arena, size: u64) -> Result<()> {
        let arena = self.arena_of(name)?;
        if arena != expected {
            return Err(BundleError::Plan(format!(
                "'{name}' was planned into {arena:?}, expected {expected:?}"
            )));
        }
        let off = self.offset_of(name)?;
        let end = off + size;
        if end > self.arena_size(arena) {
            return Err(BundleError::Plan(format!(
                "'{name}' [{off}, {end}) exceeds {arena:?} arena size {}",
                self.arena_size(arena)
            )));
        }
        Ok(())
    }
}

/// The external address-assignment oracle.
pub trait AllocationPlanner {
    fn plan(&self, ir: &BundleIr) -> Result<AllocationPlan>;
}

/// Round `value` up to the next multiple of `align`.
pub fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Reference planner: sequential aligned placement, no reuse.
///
/// Real deployments plug in the production allocator; this one exists
/// so the pipeline is usable and testable end to end.
#[derive(Clone, Copy, Debug)]
pub struct BumpPlanner {
    pub alignment: u64,
}

impl Default for BumpPlanner {
    fn default() -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
        }
    }
}

impl AllocationPlanner for BumpPlanner {
    fn plan(&self, ir: &BundleIr) -> Result<AllocationPlan> {
        let mut plan = AllocationPlan::new(self.alignment);

        let mut cursor = 0u64;
        for c in ir.constants() {
            plan.assign(c.var.name.clone(), Arena::Constant, cursor)?;
            cursor = align_up(cursor + c.var.size_bytes() as u64, self.alignment);
        }
        plan.set_arena_size(Arena::Constant, cursor);

        cursor = 0;
        for p in ir.placeholders() {
            plan.assign(p.name.clone(), Arena::Mutable, cursor)?;
            cursor = align_up(cursor + p.size_bytes() as u64, self.alignment);
        }
        plan.set_arena_size(Arena::Mutable, cursor);

        cursor = 0;
        for a in ir.activations() {
            plan.assign(a.name.clone(), Arena::Activations, cursor)?;
            cursor = align_up(cursor + a.size_bytes as u64, self.alignment);
        }
        plan.set_arena_size(Arena::Activations, cursor);

        Ok(plan)
    }
}
