use crate::lts_type::TypeId;
use std::collections::BTreeMap;

pub const BOOL_FALSE: &str = "false";
pub const BOOL_TRUE: &str = "true";

/// Symbolic values of enum-typed labels, numbered per type in registration
/// order. Ordinals never change once handed out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumerationRegistry {
    values: BTreeMap<TypeId, Vec<String>>,
}

impl EnumerationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_id: TypeId, value: &str) -> u32 {
        let values = self.values.entry(type_id).or_default();
        if let Some(ordinal) = values.iter().position(|known| known == value) {
            return ordinal as u32;
        }
        values.push(value.to_string());
        (values.len() - 1) as u32
    }

    pub fn ordinal(&self, type_id: TypeId, value: &str) -> Option<u32> {
        self.values
            .get(&type_id)?
            .iter()
            .position(|known| known == value)
            .map(|ordinal| ordinal as u32)
    }

    pub fn value(&self, type_id: TypeId, ordinal: u32) -> Option<&str> {
        self.values
            .get(&type_id)?
            .get(ordinal as usize)
            .map(String::as_str)
    }

    pub fn values(&self, type_id: TypeId) -> &[String] {
        self.values.get(&type_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every `(type, ordinal, value)` triple, grouped by type.
    pub fn entries(&self) -> impl Iterator<Item = (TypeId, u32, &str)> + '_ {
        self.values.iter().flat_map(|(type_id, values)| {
            values
                .iter()
                .enumerate()
                .map(move |(ordinal, value)| (*type_id, ordinal as u32, value.as_str()))
        })
    }
}
