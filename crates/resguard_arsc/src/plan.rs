//! The chunk sequence recorded by the decode pass and replayed by the encoder.

use crate::chunk::{
    RES_STRING_POOL_TYPE, RES_TABLE_LIBRARY_TYPE, RES_TABLE_PACKAGE_TYPE, RES_TABLE_TYPE,
    RES_TABLE_TYPE_SPEC_TYPE, RES_TABLE_TYPE_TYPE,
};
use crate::table::KeyWidth;

/// Where to write the new spec name index of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPatch {
    /// Offset of the key field from the start of the type chunk.
    pub offset: usize,
    pub width: KeyWidth,
    pub res_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkStep {
    Table,
    TableStrings,
    Package { index: usize },
    TypeNames,
    SpecNames { package: usize },
    Library,
    TypeSpec { type_id: u8 },
    Type { type_id: u8, patches: Vec<KeyPatch> },
    /// Closes the package opened by the last `Package` step. Reads nothing.
    PackageEnd,
    /// A chunk copied through without interpretation.
    Opaque { chunk_type: u16 },
}

impl WalkStep {
    /// The chunk type the encoder must find in the input for this step.
    pub fn chunk_type(&self) -> u16 {
        match self {
            WalkStep::Table => RES_TABLE_TYPE,
            WalkStep::TableStrings | WalkStep::TypeNames | WalkStep::SpecNames { .. } => {
                RES_STRING_POOL_TYPE
            }
            WalkStep::Package { .. } | WalkStep::PackageEnd => RES_TABLE_PACKAGE_TYPE,
            WalkStep::Library => RES_TABLE_LIBRARY_TYPE,
            WalkStep::TypeSpec { .. } => RES_TABLE_TYPE_SPEC_TYPE,
            WalkStep::Type { .. } => RES_TABLE_TYPE_TYPE,
            WalkStep::Opaque { chunk_type } => *chunk_type,
        }
    }
}

/// Ordered steps, one per chunk the decoder visited.
#[derive(Debug, Clone, Default)]
pub struct WalkPlan {
    steps: Vec<WalkStep>,
}

impl WalkPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: WalkStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[WalkStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
