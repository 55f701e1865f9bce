use crate::dependency::SlotDependencies;
use crate::error::ProviderError;
use std::path::Path;

/// Immutable model loaded once per file and shared by every worker.
pub trait ModelTemplate: Send + Sync + 'static {
    type Context: ExecutionContext;

    /// Payload slots, excluding the construction slot.
    fn slot_count(&self) -> usize;
    fn transition_group_count(&self) -> usize;
    fn label_names(&self) -> &[String];

    fn slot_name(&self, slot: usize) -> String {
        format!("state{}", slot + 1)
    }

    /// Payload carried by the construction vector, if the model defines one.
    fn construction_state(&self) -> Option<Vec<i32>> {
        None
    }

    fn dependencies(&self) -> Option<SlotDependencies> {
        None
    }

    fn create_context(&self) -> Result<Self::Context, ProviderError>;
}

/// Per-worker mutable evaluation state.
pub trait ExecutionContext: Send + 'static {
    fn decode(&mut self, payload: &[i32]) -> Result<(), ProviderError>;
    fn initial_states(&mut self) -> Result<Vec<Vec<i32>>, ProviderError>;
    fn compute_successors(&mut self, group: usize) -> Result<Vec<Vec<i32>>, ProviderError>;
    fn evaluate_label(&mut self, label: usize) -> Result<bool, ProviderError>;
}

pub trait ModelLoader: Send + Sync {
    type Template: ModelTemplate;

    fn load_definition(&self, path: &Path) -> Result<Self::Template, ProviderError>;
}
