use crate::dependency::DependencyMatrix;
use crate::host::{Abort, Host};
use crate::lts::{LabelProvider, TransitionProvider};
use crate::lts_type::{LtsType, TypeId, BOOL_TYPE_NAME};
use crate::state_codec::StateVector;
use serde::Serialize;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

const NOT_ABORTED: i32 = i32::MIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Registration {
    LtsType,
    EnumValue,
    InitialState,
    NextState,
    StateLabel,
    DmInfo,
    DmInfoRead,
    DmInfoMustWrite,
    StateLabelInfo,
}

/// Remembers the first abort code instead of terminating the process.
#[derive(Debug)]
pub struct AbortLatch {
    code: AtomicI32,
}

impl Default for AbortLatch {
    fn default() -> Self {
        Self {
            code: AtomicI32::new(NOT_ABORTED),
        }
    }
}

impl AbortLatch {
    pub fn code(&self) -> Option<i32> {
        match self.code.load(Ordering::SeqCst) {
            NOT_ABORTED => None,
            code => Some(code),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.code().is_some()
    }
}

impl Abort for AbortLatch {
    fn abort(&self, exit_code: i32) {
        let _ = self.code.compare_exchange(
            NOT_ABORTED,
            exit_code,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

/// In-process host: records everything the provider registers so the
/// callbacks can be driven directly.
#[derive(Default)]
pub struct RecordingHost {
    registrations: Vec<Registration>,
    lts_type: Option<Arc<LtsType>>,
    enum_values: Vec<(TypeId, u32, String)>,
    initial_state: Option<StateVector>,
    next_state: Option<Arc<dyn TransitionProvider>>,
    state_label: Option<Arc<dyn LabelProvider>>,
    dm_info: Option<Arc<DependencyMatrix>>,
    dm_info_read: Option<Arc<DependencyMatrix>>,
    dm_info_must_write: Option<Arc<DependencyMatrix>>,
    state_label_info: Option<Arc<DependencyMatrix>>,
    latch: Arc<AbortLatch>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn is_registered(&self) -> bool {
        !self.registrations.is_empty()
    }

    pub fn lts_type(&self) -> Option<&LtsType> {
        self.lts_type.as_deref()
    }

    pub fn enum_values(&self) -> &[(TypeId, u32, String)] {
        &self.enum_values
    }

    pub fn initial_state(&self) -> Option<&StateVector> {
        self.initial_state.as_ref()
    }

    pub fn dm_info(&self) -> Option<&DependencyMatrix> {
        self.dm_info.as_deref()
    }

    pub fn dm_info_read(&self) -> Option<&DependencyMatrix> {
        self.dm_info_read.as_deref()
    }

    pub fn dm_info_must_write(&self) -> Option<&DependencyMatrix> {
        self.dm_info_must_write.as_deref()
    }

    pub fn state_label_info(&self) -> Option<&DependencyMatrix> {
        self.state_label_info.as_deref()
    }

    pub fn abort_code(&self) -> Option<i32> {
        self.latch.code()
    }

    pub fn is_aborted(&self) -> bool {
        self.latch.is_aborted()
    }

    /// Calls the registered next-state callback and collects its reports.
    /// Returns `None` when no callback has been registered.
    pub fn next_states(&self, group: usize, state: &[i32]) -> Option<Vec<StateVector>> {
        let provider = self.next_state.as_ref()?;
        let mut out = Vec::new();
        provider.next_states(group, state, &mut |_, slots| {
            out.push(StateVector::from_slots(slots.to_vec()))
        });
        Some(out)
    }

    pub fn state_label(&self, label: usize, state: &[i32]) -> Option<i32> {
        let provider = self.state_label.as_ref()?;
        Some(provider.state_label(label, state))
    }

    /// Ordinal the provider registered for a boolean symbolic value.
    pub fn bool_ordinal(&self, value: &str) -> Option<u32> {
        let lts_type = self.lts_type.as_ref()?;
        let bool_type = lts_type.find_type(BOOL_TYPE_NAME)?;
        self.enum_values
            .iter()
            .find(|(type_id, _, known)| *type_id == bool_type && known == value)
            .map(|(_, ordinal, _)| *ordinal)
    }
}

impl Host for RecordingHost {
    fn set_lts_type(&mut self, lts_type: Arc<LtsType>) {
        self.registrations.push(Registration::LtsType);
        self.lts_type = Some(lts_type);
    }

    fn put_enum_value(&mut self, type_id: TypeId, ordinal: u32, value: &str) {
        self.registrations.push(Registration::EnumValue);
        self.enum_values.push((type_id, ordinal, value.to_string()));
    }

    fn set_initial_state(&mut self, state: StateVector) {
        self.registrations.push(Registration::InitialState);
        self.initial_state = Some(state);
    }

    fn set_next_state(&mut self, provider: Arc<dyn TransitionProvider>) {
        self.registrations.push(Registration::NextState);
        self.next_state = Some(provider);
    }

    fn set_state_label(&mut self, provider: Arc<dyn LabelProvider>) {
        self.registrations.push(Registration::StateLabel);
        self.state_label = Some(provider);
    }

    fn set_dm_info(&mut self, matrix: Arc<DependencyMatrix>) {
        self.registrations.push(Registration::DmInfo);
        self.dm_info = Some(matrix);
    }

    fn set_dm_info_read(&mut self, matrix: Arc<DependencyMatrix>) {
        self.registrations.push(Registration::DmInfoRead);
        self.dm_info_read = Some(matrix);
    }

    fn set_dm_info_must_write(&mut self, matrix: Arc<DependencyMatrix>) {
        self.registrations.push(Registration::DmInfoMustWrite);
        self.dm_info_must_write = Some(matrix);
    }

    fn set_state_label_info(&mut self, matrix: Arc<DependencyMatrix>) {
        self.registrations.push(Registration::StateLabelInfo);
        self.state_label_info = Some(matrix);
    }

    fn abort_handle(&self) -> Arc<dyn Abort> {
        Arc::clone(&self.latch) as Arc<dyn Abort>
    }
}

impl std::fmt::Debug for RecordingHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingHost")
            .field("registrations", &self.registrations)
            .field("abort_code", &self.abort_code())
            .finish()
    }
}
