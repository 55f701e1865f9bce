use crate::dependency::SlotDependencies;
use crate::error::ProviderError;
use crate::guarded_expr::{CompiledExpr, Expr};
use crate::model::{ExecutionContext, ModelLoader, ModelTemplate};
use crate::provider::{LoaderRecord, Plugin};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub const GCM_MAGIC: &str = "pinsx-model-v1";
pub const GCM_EXTENSION: &str = "gcm";
pub const PLUGIN_NAME: &str = "pinsx guarded-command model";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDefinition {
    pub variables: Vec<VariableDef>,
    pub groups: Vec<GroupDef>,
    #[serde(default)]
    pub labels: Vec<LabelDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<Vec<Vec<i32>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub construction: Option<Vec<i32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableDef {
    pub name: String,
    #[serde(default)]
    pub init: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupDef {
    pub name: String,
    pub commands: Vec<CommandDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandDef {
    pub guard: Expr,
    #[serde(default)]
    pub updates: Vec<(String, Expr)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelDef {
    pub name: String,
    pub expr: Expr,
}

impl ModelDefinition {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProviderError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|err| ProviderError::model_load(format!("model is not utf8: {err}")))?;
        let (header, body) = text.split_once('\n').unwrap_or((text, ""));
        if header.trim_end_matches('\r') != GCM_MAGIC {
            return Err(ProviderError::model_load(format!(
                "missing `{GCM_MAGIC}` header"
            )));
        }
        serde_json::from_str(body)
            .map_err(|err| ProviderError::model_load(format!("invalid model definition: {err}")))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProviderError> {
        let body = serde_json::to_string_pretty(self)
            .map_err(|err| ProviderError::model_load(format!("cannot serialize model: {err}")))?;
        Ok(format!("{GCM_MAGIC}\n{body}\n").into_bytes())
    }
}

#[derive(Debug)]
struct Command {
    guard: CompiledExpr,
    updates: Vec<(usize, CompiledExpr)>,
}

#[derive(Debug)]
struct Group {
    commands: Vec<Command>,
}

/// Compiled guarded-command model. Each enabled command of a group yields
/// one successor; its updates are applied simultaneously.
#[derive(Debug)]
pub struct GuardedModel {
    variable_names: Vec<String>,
    group_names: Vec<String>,
    label_names: Vec<String>,
    groups: Vec<Group>,
    labels: Vec<CompiledExpr>,
    initial: Vec<Vec<i32>>,
    construction: Option<Vec<i32>>,
}

impl GuardedModel {
    pub fn compile(definition: &ModelDefinition) -> Result<Self, ProviderError> {
        let mut slots = HashMap::new();
        for (index, variable) in definition.variables.iter().enumerate() {
            if slots.insert(variable.name.clone(), index).is_some() {
                return Err(ProviderError::model_load(format!(
                    "duplicate variable `{}`",
                    variable.name
                )));
            }
        }
        if definition.groups.is_empty() {
            return Err(ProviderError::model_load("model declares no transition groups"));
        }

        let groups = definition
            .groups
            .iter()
            .map(|group| -> Result<Group, ProviderError> {
                let commands = group
                    .commands
                    .iter()
                    .map(|command| compile_command(command, &slots))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Group { commands })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let labels = definition
            .labels
            .iter()
            .map(|label| label.expr.compile(&slots))
            .collect::<Result<Vec<_>, _>>()?;

        let slot_count = definition.variables.len();
        let initial = match &definition.initial {
            Some(initial) => initial.clone(),
            None => vec![definition.variables.iter().map(|var| var.init).collect()],
        };
        if let Some(bad) = initial.iter().find(|state| state.len() != slot_count) {
            return Err(ProviderError::model_load(format!(
                "initial state has {} slots, expected {slot_count}",
                bad.len()
            )));
        }

        Ok(Self {
            variable_names: definition.variables.iter().map(|var| var.name.clone()).collect(),
            group_names: definition.groups.iter().map(|group| group.name.clone()).collect(),
            label_names: definition.labels.iter().map(|label| label.name.clone()).collect(),
            groups,
            labels,
            initial,
            construction: definition.construction.clone(),
        })
    }

    pub fn variable_names(&self) -> &[String] {
        &self.variable_names
    }

    pub fn group_names(&self) -> &[String] {
        &self.group_names
    }
}

fn compile_command(
    command: &CommandDef,
    slots: &HashMap<String, usize>,
) -> Result<Command, ProviderError> {
    let guard = command.guard.compile(slots)?;
    let mut seen = BTreeSet::new();
    let updates = command
        .updates
        .iter()
        .map(|(name, expr)| -> Result<(usize, CompiledExpr), ProviderError> {
            let slot = *slots
                .get(name)
                .ok_or_else(|| ProviderError::model_load(format!("unknown variable `{name}`")))?;
            if !seen.insert(slot) {
                return Err(ProviderError::model_load(format!(
                    "variable `{name}` updated twice in one command"
                )));
            }
            Ok((slot, expr.compile(slots)?))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Command { guard, updates })
}

impl ModelTemplate for Arc<GuardedModel> {
    type Context = GuardedContext;

    fn slot_count(&self) -> usize {
        self.variable_names.len()
    }

    fn transition_group_count(&self) -> usize {
        self.groups.len()
    }

    fn label_names(&self) -> &[String] {
        &self.label_names
    }

    fn slot_name(&self, slot: usize) -> String {
        self.variable_names
            .get(slot)
            .cloned()
            .unwrap_or_else(|| format!("state{}", slot + 1))
    }

    fn construction_state(&self) -> Option<Vec<i32>> {
        self.construction.clone()
    }

    fn dependencies(&self) -> Option<SlotDependencies> {
        let mut deps = SlotDependencies::default();
        for group in &self.groups {
            let mut reads = BTreeSet::new();
            let mut writes = BTreeSet::new();
            for command in &group.commands {
                command.guard.collect_reads(&mut reads);
                for (slot, expr) in &command.updates {
                    expr.collect_reads(&mut reads);
                    writes.insert(*slot);
                }
            }
            deps.reads.push(reads);
            deps.writes.push(writes);
        }
        deps.labels = self.labels.iter().map(CompiledExpr::reads).collect();
        Some(deps)
    }

    fn create_context(&self) -> Result<GuardedContext, ProviderError> {
        Ok(GuardedContext {
            model: Arc::clone(self),
            current: vec![0; self.variable_names.len()],
        })
    }
}

#[derive(Debug)]
pub struct GuardedContext {
    model: Arc<GuardedModel>,
    current: Vec<i32>,
}

impl ExecutionContext for GuardedContext {
    fn decode(&mut self, payload: &[i32]) -> Result<(), ProviderError> {
        if payload.len() != self.current.len() {
            return Err(ProviderError::malformed(format!(
                "expected a payload of {} slots, got {}",
                self.current.len(),
                payload.len()
            )));
        }
        self.current.copy_from_slice(payload);
        Ok(())
    }

    fn initial_states(&mut self) -> Result<Vec<Vec<i32>>, ProviderError> {
        Ok(self.model.initial.clone())
    }

    fn compute_successors(&mut self, group: usize) -> Result<Vec<Vec<i32>>, ProviderError> {
        let group = self.model.groups.get(group).ok_or_else(|| {
            ProviderError::evaluation(format!("model has no transition group {group}"))
        })?;
        let mut successors = Vec::new();
        for command in &group.commands {
            if !command.guard.holds(&self.current)? {
                continue;
            }
            let mut next = self.current.clone();
            for (slot, expr) in &command.updates {
                let value = expr.eval(&self.current)?;
                next[*slot] = i32::try_from(value).map_err(|_| {
                    ProviderError::evaluation(format!(
                        "value {value} assigned to `{}` does not fit in 32 bits",
                        self.model.variable_names[*slot]
                    ))
                })?;
            }
            successors.push(next);
        }
        Ok(successors)
    }

    fn evaluate_label(&mut self, label: usize) -> Result<bool, ProviderError> {
        self.model
            .labels
            .get(label)
            .ok_or_else(|| ProviderError::evaluation(format!("model has no state label {label}")))?
            .holds(&self.current)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GuardedLoader;

impl ModelLoader for GuardedLoader {
    type Template = Arc<GuardedModel>;

    fn load_definition(&self, path: &Path) -> Result<Self::Template, ProviderError> {
        let bytes = fs::read(path)
            .map_err(|err| ProviderError::model_load_at(path, format!("cannot read model: {err}")))?;
        let definition = ModelDefinition::from_bytes(&bytes)?;
        Ok(Arc::new(GuardedModel::compile(&definition)?))
    }
}

pub fn plugin() -> Plugin {
    Plugin::new(PLUGIN_NAME).with_loader(LoaderRecord::new(GCM_EXTENSION, GuardedLoader))
}
