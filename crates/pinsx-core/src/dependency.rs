use crate::error::ProviderError;
use crate::state_codec::CONSTRUCTION_SLOT;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

const WORD_BITS: usize = u64::BITS as usize;

/// Row-major bit table: rows are transition groups or labels, columns are
/// state slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyMatrix {
    rows: usize,
    cols: usize,
    words_per_row: usize,
    bits: Vec<u64>,
}

impl DependencyMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        let words_per_row = cols.div_ceil(WORD_BITS);
        Self {
            rows,
            cols,
            words_per_row,
            bits: vec![0; rows * words_per_row],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn set(&mut self, row: usize, col: usize) -> Result<(), ProviderError> {
        if row >= self.rows || col >= self.cols {
            return Err(ProviderError::descriptor(format!(
                "cell ({row}, {col}) outside of a {}x{} dependency matrix",
                self.rows, self.cols
            )));
        }
        self.mark(row, col);
        Ok(())
    }

    fn mark(&mut self, row: usize, col: usize) {
        let word = row * self.words_per_row + col / WORD_BITS;
        self.bits[word] |= 1u64 << (col % WORD_BITS);
    }

    pub fn get(&self, row: usize, col: usize) -> bool {
        if row >= self.rows || col >= self.cols {
            return false;
        }
        let word = row * self.words_per_row + col / WORD_BITS;
        self.bits[word] & (1u64 << (col % WORD_BITS)) != 0
    }

    pub fn fill(&mut self) {
        for row in 0..self.rows {
            for col in 0..self.cols {
                self.mark(row, col);
            }
        }
    }

    pub fn row_ones(&self, row: usize) -> usize {
        (0..self.cols).filter(|&col| self.get(row, col)).count()
    }

    pub fn is_full(&self) -> bool {
        (0..self.rows).all(|row| self.row_ones(row) == self.cols)
    }

    /// Renders one row as `'+'` (dependent) and `'-'` characters.
    pub fn row_to_string(&self, row: usize) -> String {
        (0..self.cols)
            .map(|col| if self.get(row, col) { '+' } else { '-' })
            .collect()
    }

    pub fn to_rows(&self) -> Vec<String> {
        (0..self.rows).map(|row| self.row_to_string(row)).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyPolicy {
    /// Every group reads and writes every slot; every label reads every slot.
    #[default]
    Full,
    /// Uses the slot dependencies reported by the model, falling back to
    /// `Full` when the model cannot analyse itself.
    Analyzed,
}

/// Per-row payload slot indices (0-based, excluding the construction slot).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotDependencies {
    pub reads: Vec<BTreeSet<usize>>,
    pub writes: Vec<BTreeSet<usize>>,
    pub labels: Vec<BTreeSet<usize>>,
    /// Slots where some initial state differs from the construction payload.
    pub initial_writes: BTreeSet<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyMatrices {
    pub combined: DependencyMatrix,
    pub read: DependencyMatrix,
    pub write: DependencyMatrix,
    pub label: DependencyMatrix,
}

impl DependencyMatrices {
    /// Every matrix has one column per state vector slot, construction slot
    /// included.
    pub fn full(groups: usize, labels: usize, state_length: usize) -> Self {
        let mut matrices = Self::empty(groups, labels, state_length);
        matrices.combined.fill();
        matrices.read.fill();
        matrices.write.fill();
        matrices.label.fill();
        matrices
    }

    fn empty(groups: usize, labels: usize, state_length: usize) -> Self {
        Self {
            combined: DependencyMatrix::new(groups, state_length),
            read: DependencyMatrix::new(groups, state_length),
            write: DependencyMatrix::new(groups, state_length),
            label: DependencyMatrix::new(labels, state_length),
        }
    }

    pub fn build(
        policy: DependencyPolicy,
        groups: usize,
        labels: usize,
        state_length: usize,
        analysed: Option<SlotDependencies>,
    ) -> Result<Self, ProviderError> {
        match (policy, analysed) {
            (DependencyPolicy::Full, _) => Ok(Self::full(groups, labels, state_length)),
            (DependencyPolicy::Analyzed, Some(deps)) => {
                Self::from_dependencies(groups, labels, state_length, &deps)
            }
            (DependencyPolicy::Analyzed, None) => {
                warn!("model reports no slot dependencies; declaring full dependency matrices");
                Ok(Self::full(groups, labels, state_length))
            }
        }
    }

    fn from_dependencies(
        groups: usize,
        labels: usize,
        state_length: usize,
        deps: &SlotDependencies,
    ) -> Result<Self, ProviderError> {
        if deps.reads.len() != groups || deps.writes.len() != groups {
            return Err(ProviderError::model_load(format!(
                "dependency analysis covers {} read / {} write groups, model has {groups}",
                deps.reads.len(),
                deps.writes.len()
            )));
        }
        if deps.labels.len() != labels {
            return Err(ProviderError::model_load(format!(
                "dependency analysis covers {} labels, model has {labels}",
                deps.labels.len()
            )));
        }

        let payload_slots = state_length.saturating_sub(1);
        let column = |slot: usize| -> Result<usize, ProviderError> {
            if slot >= payload_slots {
                return Err(ProviderError::model_load(format!(
                    "dependency on slot {slot} outside of {payload_slots} payload slots"
                )));
            }
            Ok(slot + 1)
        };

        let mut matrices = Self::empty(groups, labels, state_length);
        for group in 0..groups {
            // Every group inspects the construction flag and clears it.
            matrices.read.set(group, CONSTRUCTION_SLOT)?;
            matrices.write.set(group, CONSTRUCTION_SLOT)?;
            matrices.combined.set(group, CONSTRUCTION_SLOT)?;
            for &slot in &deps.reads[group] {
                let col = column(slot)?;
                matrices.read.set(group, col)?;
                matrices.combined.set(group, col)?;
            }
            // The construction vector is answered by every group, so a slot
            // the initial states assign is written by every group.
            for &slot in deps.writes[group].iter().chain(&deps.initial_writes) {
                let col = column(slot)?;
                matrices.write.set(group, col)?;
                matrices.combined.set(group, col)?;
            }
        }
        for (label, slots) in deps.labels.iter().enumerate() {
            for &slot in slots {
                matrices.label.set(label, column(slot)?)?;
            }
        }
        Ok(matrices)
    }
}
