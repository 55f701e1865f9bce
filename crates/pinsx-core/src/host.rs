use crate::dependency::DependencyMatrix;
use crate::lts::{LabelProvider, TransitionProvider};
use crate::lts_type::{LtsType, TypeId};
use crate::state_codec::StateVector;
use std::sync::Arc;

/// Fatal-abort capability handed to the providers; must stop the run.
pub trait Abort: Send + Sync {
    fn abort(&self, exit_code: i32);
}

/// Registration surface of the exploration engine. Calls arrive in load
/// order: descriptor, enumeration values, initial state, callbacks, matrices.
pub trait Host {
    fn set_lts_type(&mut self, lts_type: Arc<LtsType>);
    fn put_enum_value(&mut self, type_id: TypeId, ordinal: u32, value: &str);
    fn set_initial_state(&mut self, state: StateVector);
    fn set_next_state(&mut self, provider: Arc<dyn TransitionProvider>);
    fn set_state_label(&mut self, provider: Arc<dyn LabelProvider>);
    fn set_dm_info(&mut self, matrix: Arc<DependencyMatrix>);
    fn set_dm_info_read(&mut self, matrix: Arc<DependencyMatrix>);
    fn set_dm_info_must_write(&mut self, matrix: Arc<DependencyMatrix>);
    fn set_state_label_info(&mut self, matrix: Arc<DependencyMatrix>);
    fn abort_handle(&self) -> Arc<dyn Abort>;

    fn abort(&self, exit_code: i32) {
        self.abort_handle().abort(exit_code);
    }
}
