
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionInfo {
    pub group: usize,
}

/// Receives one successor vector per call.
pub type TransitionCallback<'a> = dyn FnMut(&TransitionInfo, &[i32]) + 'a;

/// Next-state entry point registered with the host. Faults never cross this
/// boundary: the implementation aborts the run instead and reports 0.
pub trait TransitionProvider: Send + Sync {
    fn next_states(
        &self,
        group: usize,
        state: &[i32],
        callback: &mut TransitionCallback<'_>,
    ) -> usize;
}

/// State-label entry point registered with the host; returns the ordinal of
/// the boolean result.
pub trait LabelProvider: Send + Sync {
    fn state_label(&self, label: usize, state: &[i32]) -> i32;
}
