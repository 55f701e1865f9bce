use crate::error::ProviderError;
use serde::{Deserialize, Serialize};

pub const CONSTRUCTION_SLOT: usize = 0;
pub const SLOT_BYTES: usize = std::mem::size_of::<i32>();

/// Flat state exchanged with the engine. Slot 0 is the construction flag:
/// `1` requests the initial states, `0` marks a real state whose payload
/// occupies the remaining slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateVector(Vec<i32>);

impl StateVector {
    pub fn from_slots(slots: Vec<i32>) -> Self {
        Self(slots)
    }

    pub fn construction(payload: &[i32]) -> Self {
        let mut slots = Vec::with_capacity(payload.len() + 1);
        slots.push(1);
        slots.extend_from_slice(payload);
        Self(slots)
    }

    pub fn is_construction(&self) -> bool {
        is_construction(&self.0)
    }

    pub fn payload(&self) -> &[i32] {
        self.0.get(1..).unwrap_or(&[])
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<i32> {
        self.0
    }
}

impl AsRef<[i32]> for StateVector {
    fn as_ref(&self) -> &[i32] {
        &self.0
    }
}

pub fn is_construction(slots: &[i32]) -> bool {
    slots.get(CONSTRUCTION_SLOT) == Some(&1)
}

pub trait StateCodec<S> {
    fn encode(&self, state: &S) -> Result<StateVector, ProviderError>;
    fn decode<'a>(&self, slots: &'a [i32]) -> Result<&'a [i32], ProviderError>;
}

/// Codec for models whose internal state already is a row of `i32` slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCodec {
    slot_count: usize,
}

impl SlotCodec {
    pub fn new(slot_count: usize) -> Self {
        Self { slot_count }
    }

    /// Payload slots, excluding the construction slot.
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn state_length(&self) -> usize {
        self.slot_count + 1
    }

    pub fn check_length(&self, slots: &[i32]) -> Result<(), ProviderError> {
        if slots.len() != self.state_length() {
            return Err(ProviderError::malformed(format!(
                "expected {} slots, got {}",
                self.state_length(),
                slots.len()
            )));
        }
        Ok(())
    }
}

impl StateCodec<Vec<i32>> for SlotCodec {
    fn encode(&self, state: &Vec<i32>) -> Result<StateVector, ProviderError> {
        if state.len() != self.slot_count {
            return Err(ProviderError::malformed(format!(
                "model produced a payload of {} slots, expected {}",
                state.len(),
                self.slot_count
            )));
        }
        let mut slots = Vec::with_capacity(self.state_length());
        slots.push(0);
        slots.extend_from_slice(state);
        Ok(StateVector(slots))
    }

    fn decode<'a>(&self, slots: &'a [i32]) -> Result<&'a [i32], ProviderError> {
        self.check_length(slots)?;
        if is_construction(slots) {
            return Err(ProviderError::malformed(
                "construction vector cannot be decoded into a model state",
            ));
        }
        Ok(&slots[1..])
    }
}
