use crate::error::ProviderError;
use serde::Serialize;

pub const INT_TYPE_NAME: &str = "int";
pub const BOOL_TYPE_NAME: &str = "bool";
pub const CONSTRUCTION_SLOT_NAME: &str = "__construction__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TypeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeFormat {
    Direct,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeDecl {
    pub name: String,
    pub format: TypeFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotDecl {
    pub name: String,
    pub type_id: TypeId,
}

/// Finalized descriptor of the state vector and its labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LtsType {
    types: Vec<TypeDecl>,
    slots: Vec<SlotDecl>,
    labels: Vec<SlotDecl>,
}

impl LtsType {
    pub fn state_length(&self) -> usize {
        self.slots.len()
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    pub fn slots(&self) -> &[SlotDecl] {
        &self.slots
    }

    pub fn labels(&self) -> &[SlotDecl] {
        &self.labels
    }

    pub fn types(&self) -> &[TypeDecl] {
        &self.types
    }

    pub fn type_decl(&self, type_id: TypeId) -> Option<&TypeDecl> {
        self.types.get(type_id.0)
    }

    pub fn find_type(&self, name: &str) -> Option<TypeId> {
        self.types
            .iter()
            .position(|decl| decl.name == name)
            .map(TypeId)
    }

    pub fn find_label(&self, name: &str) -> Option<usize> {
        self.labels.iter().position(|label| label.name == name)
    }
}

#[derive(Debug)]
pub struct LtsTypeBuilder {
    types: Vec<TypeDecl>,
    int_type: TypeId,
    bool_type: TypeId,
    slots: Vec<Option<String>>,
    labels: Vec<Option<String>>,
}

impl LtsTypeBuilder {
    pub fn begin(slot_count: usize) -> Self {
        let mut builder = Self {
            types: Vec::new(),
            int_type: TypeId(0),
            bool_type: TypeId(0),
            slots: vec![None; slot_count],
            labels: Vec::new(),
        };
        builder.int_type = builder.put_type(INT_TYPE_NAME, TypeFormat::Direct);
        builder.bool_type = builder.put_type(BOOL_TYPE_NAME, TypeFormat::Enum);
        builder
    }

    fn put_type(&mut self, name: &str, format: TypeFormat) -> TypeId {
        if let Some(index) = self.types.iter().position(|decl| decl.name == name) {
            return TypeId(index);
        }
        self.types.push(TypeDecl {
            name: name.to_string(),
            format,
        });
        TypeId(self.types.len() - 1)
    }

    pub fn int_type(&self) -> TypeId {
        self.int_type
    }

    pub fn bool_type(&self) -> TypeId {
        self.bool_type
    }

    pub fn declare_slot(&mut self, index: usize, name: impl Into<String>) -> Result<(), ProviderError> {
        let count = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or_else(|| {
            ProviderError::descriptor(format!("slot {index} out of range ({count} slots)"))
        })?;
        *slot = Some(name.into());
        Ok(())
    }

    pub fn declare_labels(&mut self, count: usize) {
        self.labels = vec![None; count];
    }

    pub fn declare_label(&mut self, index: usize, name: impl Into<String>) -> Result<(), ProviderError> {
        let count = self.labels.len();
        let label = self.labels.get_mut(index).ok_or_else(|| {
            ProviderError::descriptor(format!("label {index} out of range ({count} labels)"))
        })?;
        *label = Some(name.into());
        Ok(())
    }

    pub fn finalize(self) -> Result<LtsType, ProviderError> {
        if self.slots.is_empty() {
            return Err(ProviderError::descriptor("state vector has no slots"));
        }

        let int_type = self.int_type;
        let slots = self
            .slots
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                name.map(|name| SlotDecl {
                    name,
                    type_id: int_type,
                })
                .ok_or_else(|| ProviderError::descriptor(format!("slot {index} was not declared")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let bool_type = self.bool_type;
        let labels = self
            .labels
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                name.map(|name| SlotDecl {
                    name,
                    type_id: bool_type,
                })
                .ok_or_else(|| {
                    ProviderError::descriptor(format!("label {index} was not declared"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LtsType {
            types: self.types,
            slots,
            labels,
        })
    }
}
