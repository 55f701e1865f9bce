use crate::enumeration::BOOL_TRUE;
use crate::error::{EXIT_OK, EXIT_PROPERTY_VIOLATED};
use crate::recording_host::RecordingHost;
use crate::state_codec::StateVector;
use crate::types::{Stats, Status};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExploreOptions {
    pub workers: usize,
    pub invariant: Option<String>,
    pub max_states: Option<u64>,
}

impl Default for ExploreOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            invariant: None,
            max_states: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExploreError {
    #[error("no model has been registered with the host")]
    NotLoaded,
    #[error("unknown state label `{0}`")]
    UnknownInvariant(String),
    #[error("cannot start worker pool: {0}")]
    ThreadPool(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExploreOutcome {
    pub stats: Stats,
    pub violation: Option<StateVector>,
    pub abort_code: Option<i32>,
    pub truncated: bool,
}

impl ExploreOutcome {
    pub fn exit_code(&self) -> i32 {
        match (&self.abort_code, &self.violation) {
            (Some(code), _) => *code,
            (None, Some(_)) => EXIT_PROPERTY_VIOLATED,
            (None, None) => EXIT_OK,
        }
    }

    pub fn status(&self) -> Status {
        match self.exit_code() {
            EXIT_OK => Status::Pass,
            EXIT_PROPERTY_VIOLATED => Status::Fail,
            _ => Status::Error,
        }
    }
}

struct Setup {
    construction: StateVector,
    groups: usize,
    invariant: Option<(usize, i32)>,
}

impl Setup {
    fn from_host(host: &RecordingHost, options: &ExploreOptions) -> Result<Self, ExploreError> {
        let lts_type = host.lts_type().ok_or(ExploreError::NotLoaded)?;
        let construction = host.initial_state().ok_or(ExploreError::NotLoaded)?.clone();
        let groups = host.dm_info().ok_or(ExploreError::NotLoaded)?.rows();
        let invariant = match &options.invariant {
            Some(name) => {
                let label = lts_type
                    .find_label(name)
                    .ok_or_else(|| ExploreError::UnknownInvariant(name.clone()))?;
                let holds = host.bool_ordinal(BOOL_TRUE).ok_or(ExploreError::NotLoaded)?;
                Some((label, holds as i32))
            }
            None => None,
        };
        Ok(Self {
            construction,
            groups,
            invariant,
        })
    }

    fn violates(&self, host: &RecordingHost, state: &StateVector) -> bool {
        match self.invariant {
            Some((label, holds)) => host.state_label(label, state.as_slice()) != Some(holds),
            None => false,
        }
    }

    fn successors(&self, host: &RecordingHost, state: &StateVector) -> Vec<StateVector> {
        (0..self.groups)
            .flat_map(|group| host.next_states(group, state.as_slice()).unwrap_or_default())
            .collect()
    }
}

struct Frontier {
    visited: HashSet<StateVector>,
    states: u64,
    transitions: u64,
    violation: Option<StateVector>,
    truncated: bool,
}

impl Frontier {
    fn new() -> Self {
        Self {
            visited: HashSet::new(),
            states: 0,
            transitions: 0,
            violation: None,
            truncated: false,
        }
    }

    fn admit(&mut self, state: StateVector, max_states: Option<u64>) -> Option<StateVector> {
        if self.visited.contains(&state) {
            return None;
        }
        if max_states.is_some_and(|max| self.states >= max) {
            self.truncated = true;
            return None;
        }
        self.visited.insert(state.clone());
        self.states += 1;
        Some(state)
    }

    fn finish(self, host: &RecordingHost) -> ExploreOutcome {
        let outcome = ExploreOutcome {
            stats: Stats {
                states: Some(self.states),
                transitions: Some(self.transitions),
            },
            violation: self.violation,
            abort_code: host.abort_code(),
            truncated: self.truncated,
        };
        info!(
            states = self.states,
            transitions = self.transitions,
            exit_code = outcome.exit_code(),
            "exploration finished"
        );
        outcome
    }
}

/// Breadth-first exploration over the callbacks registered with `host`.
/// The first call always uses the construction vector; stops at the first
/// invariant violation or provider abort.
pub fn explore(host: &RecordingHost, options: &ExploreOptions) -> Result<ExploreOutcome, ExploreError> {
    let setup = Setup::from_host(host, options)?;
    if options.workers.max(1) == 1 {
        Ok(explore_sequential(host, &setup, options))
    } else {
        explore_parallel(host, &setup, options)
    }
}

fn explore_sequential(host: &RecordingHost, setup: &Setup, options: &ExploreOptions) -> ExploreOutcome {
    let mut frontier = Frontier::new();
    let mut queue = VecDeque::new();
    let mut pending = host
        .next_states(0, setup.construction.as_slice())
        .unwrap_or_default();
    frontier.transitions += pending.len() as u64;

    'search: loop {
        for state in pending.drain(..) {
            let Some(state) = frontier.admit(state, options.max_states) else {
                continue;
            };
            if setup.violates(host, &state) {
                frontier.violation = Some(state);
                break 'search;
            }
            queue.push_back(state);
        }
        if host.is_aborted() {
            break;
        }
        let Some(state) = queue.pop_front() else {
            break;
        };
        pending = setup.successors(host, &state);
        frontier.transitions += pending.len() as u64;
    }

    frontier.finish(host)
}

fn explore_parallel(
    host: &RecordingHost,
    setup: &Setup,
    options: &ExploreOptions,
) -> Result<ExploreOutcome, ExploreError> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(options.workers.max(1))
        .build()
        .map_err(|err| ExploreError::ThreadPool(err.to_string()))?;

    let mut frontier = Frontier::new();
    let mut batch = host
        .next_states(0, setup.construction.as_slice())
        .unwrap_or_default();
    frontier.transitions += batch.len() as u64;

    while !batch.is_empty() && !host.is_aborted() {
        let admitted = batch
            .into_iter()
            .filter_map(|state| frontier.admit(state, options.max_states))
            .collect::<Vec<_>>();

        let checked = pool.install(|| {
            admitted
                .par_iter()
                .map(|state| setup.violates(host, state))
                .collect::<Vec<_>>()
        });
        if let Some(index) = checked.iter().position(|violated| *violated) {
            frontier.violation = Some(admitted[index].clone());
            break;
        }

        debug!(frontier = admitted.len(), states = frontier.states, "expanding frontier");
        let expanded = pool.install(|| {
            admitted
                .par_iter()
                .map(|state| setup.successors(host, state))
                .collect::<Vec<_>>()
        });

        batch = Vec::new();
        for successors in expanded {
            frontier.transitions += successors.len() as u64;
            batch.extend(successors);
        }
    }

    Ok(frontier.finish(host))
}
