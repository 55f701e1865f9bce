use crate::context_pool::ContextPool;
use crate::dependency::{DependencyMatrices, DependencyMatrix, DependencyPolicy, SlotDependencies};
use crate::enumeration::{EnumerationRegistry, BOOL_FALSE, BOOL_TRUE};
use crate::error::{ProviderError, EXIT_PROVIDER_FAILURE};
use crate::host::{Abort, Host};
use crate::lts::{LabelProvider, TransitionCallback, TransitionInfo, TransitionProvider};
use crate::lts_type::{LtsType, LtsTypeBuilder, TypeId, CONSTRUCTION_SLOT_NAME};
use crate::model::{ExecutionContext, ModelLoader, ModelTemplate};
use crate::state_codec::{is_construction, SlotCodec, StateCodec, StateVector, SLOT_BYTES};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderOptions {
    pub dependency_policy: DependencyPolicy,
}

/// Everything the host needs, built completely before the first
/// registration call so a failed load registers nothing.
#[derive(Debug)]
pub struct LoadSession<T: ModelTemplate> {
    template: Arc<T>,
    codec: SlotCodec,
    lts_type: LtsType,
    bool_type: TypeId,
    enumerations: EnumerationRegistry,
    initial_state: StateVector,
    matrices: DependencyMatrices,
}

impl<T: ModelTemplate> LoadSession<T> {
    pub fn prepare(template: T, options: &ProviderOptions) -> Result<Self, ProviderError> {
        let slot_count = template.slot_count();
        let group_count = template.transition_group_count();
        let label_names = template.label_names().to_vec();

        if slot_count == 0 {
            return Err(ProviderError::model_load(
                "models without any state slots are not supported",
            ));
        }
        if group_count == 0 {
            return Err(ProviderError::model_load(
                "models need at least one transition group",
            ));
        }

        let codec = SlotCodec::new(slot_count);
        let state_length = codec.state_length();
        info!(
            groups = group_count,
            labels = label_names.len(),
            "state vector has {} slots ({} bytes)",
            state_length,
            state_length * SLOT_BYTES
        );

        let mut builder = LtsTypeBuilder::begin(state_length);
        builder.declare_slot(0, CONSTRUCTION_SLOT_NAME)?;
        for slot in 0..slot_count {
            builder.declare_slot(slot + 1, template.slot_name(slot))?;
        }
        builder.declare_labels(label_names.len());
        for (index, name) in label_names.iter().enumerate() {
            debug!(label = index, name = %name, "declared state label");
            builder.declare_label(index, name.clone())?;
        }
        let bool_type = builder.bool_type();
        let lts_type = builder.finalize()?;

        let mut enumerations = EnumerationRegistry::new();
        enumerations.register(bool_type, BOOL_FALSE);
        enumerations.register(bool_type, BOOL_TRUE);

        let construction_payload = match template.construction_state() {
            Some(payload) if payload.len() != slot_count => {
                return Err(ProviderError::model_load(format!(
                    "construction state has {} slots, expected {slot_count}",
                    payload.len()
                )));
            }
            Some(payload) => payload,
            None => vec![0; slot_count],
        };
        let initial_state = StateVector::construction(&construction_payload);

        let analysed = match options.dependency_policy {
            DependencyPolicy::Full => None,
            DependencyPolicy::Analyzed => template
                .dependencies()
                .map(|deps| with_initial_writes(&template, deps, &construction_payload))
                .transpose()?,
        };
        let matrices = DependencyMatrices::build(
            options.dependency_policy,
            group_count,
            label_names.len(),
            state_length,
            analysed,
        )?;

        Ok(Self {
            template: Arc::new(template),
            codec,
            lts_type,
            bool_type,
            enumerations,
            initial_state,
            matrices,
        })
    }

    pub fn lts_type(&self) -> &LtsType {
        &self.lts_type
    }

    pub fn matrices(&self) -> &DependencyMatrices {
        &self.matrices
    }

    pub fn register(self, host: &mut dyn Host) -> Arc<LoadedModel<T>> {
        let lts_type = Arc::new(self.lts_type);
        host.set_lts_type(Arc::clone(&lts_type));
        for (type_id, ordinal, value) in self.enumerations.entries() {
            host.put_enum_value(type_id, ordinal, value);
        }
        host.set_initial_state(self.initial_state.clone());

        let bool_false = ordinal_slot(&self.enumerations, self.bool_type, BOOL_FALSE);
        let bool_true = ordinal_slot(&self.enumerations, self.bool_type, BOOL_TRUE);
        let DependencyMatrices {
            combined,
            read,
            write,
            label,
        } = self.matrices;
        let model = Arc::new(LoadedModel {
            lts_type,
            codec: self.codec,
            enumerations: self.enumerations,
            bool_false,
            bool_true,
            initial_state: self.initial_state,
            combined: Arc::new(combined),
            read: Arc::new(read),
            write: Arc::new(write),
            label: Arc::new(label),
            contexts: ContextPool::new(self.template),
            abort: host.abort_handle(),
        });

        host.set_next_state(Arc::clone(&model) as Arc<dyn TransitionProvider>);
        host.set_state_label(Arc::clone(&model) as Arc<dyn LabelProvider>);
        host.set_dm_info(Arc::clone(&model.combined));
        host.set_dm_info_read(Arc::clone(&model.read));
        host.set_dm_info_must_write(Arc::clone(&model.write));
        host.set_state_label_info(Arc::clone(&model.label));
        model
    }
}

/// Adds the slots that the initial states assign away from the construction
/// payload; answering the construction vector writes them in every group.
fn with_initial_writes<T: ModelTemplate>(
    template: &T,
    mut deps: SlotDependencies,
    construction: &[i32],
) -> Result<SlotDependencies, ProviderError> {
    let initial_states = template.create_context()?.initial_states()?;
    for state in &initial_states {
        for (slot, (value, base)) in state.iter().zip(construction).enumerate() {
            if value != base {
                deps.initial_writes.insert(slot);
            }
        }
    }
    Ok(deps)
}

fn ordinal_slot(enumerations: &EnumerationRegistry, type_id: TypeId, value: &str) -> i32 {
    enumerations
        .ordinal(type_id, value)
        .map(|ordinal| ordinal as i32)
        .unwrap_or_default()
}

/// A model registered with the host. Serves both callback entry points for
/// the rest of the run.
pub struct LoadedModel<T: ModelTemplate> {
    lts_type: Arc<LtsType>,
    codec: SlotCodec,
    enumerations: EnumerationRegistry,
    bool_false: i32,
    bool_true: i32,
    initial_state: StateVector,
    combined: Arc<DependencyMatrix>,
    read: Arc<DependencyMatrix>,
    write: Arc<DependencyMatrix>,
    label: Arc<DependencyMatrix>,
    contexts: ContextPool<T>,
    abort: Arc<dyn Abort>,
}

impl<T: ModelTemplate> LoadedModel<T> {
    pub fn lts_type(&self) -> &LtsType {
        &self.lts_type
    }

    pub fn enumerations(&self) -> &EnumerationRegistry {
        &self.enumerations
    }

    pub fn initial_state(&self) -> &StateVector {
        &self.initial_state
    }

    pub fn combined_matrix(&self) -> &DependencyMatrix {
        &self.combined
    }

    pub fn read_matrix(&self) -> &DependencyMatrix {
        &self.read
    }

    pub fn write_matrix(&self) -> &DependencyMatrix {
        &self.write
    }

    pub fn label_matrix(&self) -> &DependencyMatrix {
        &self.label
    }

    pub fn contexts(&self) -> &ContextPool<T> {
        &self.contexts
    }

    pub fn group_count(&self) -> usize {
        self.combined.rows()
    }

    /// Reports every successor of `state` in `group` through `callback` and
    /// returns how many were reported. Successors are encoded before the
    /// first report, so a failing call reports nothing.
    pub fn compute_next(
        &self,
        group: usize,
        state: &[i32],
        callback: &mut TransitionCallback<'_>,
    ) -> Result<usize, ProviderError> {
        self.codec.check_length(state)?;

        let successors = if is_construction(state) {
            self.contexts.with_context(|context| context.initial_states())?
        } else {
            if group >= self.group_count() {
                return Err(ProviderError::evaluation(format!(
                    "transition group {group} out of range ({} groups)",
                    self.group_count()
                )));
            }
            let payload = self.codec.decode(state)?;
            self.contexts.with_context(|context| {
                context.decode(payload)?;
                context.compute_successors(group)
            })?
        };

        let encoded = successors
            .iter()
            .map(|payload| self.codec.encode(payload))
            .collect::<Result<Vec<_>, _>>()?;

        let info = TransitionInfo { group };
        for vector in &encoded {
            callback(&info, vector.as_slice());
        }
        Ok(encoded.len())
    }

    /// Collecting variant of [`compute_next`](Self::compute_next).
    pub fn successors(&self, group: usize, state: &[i32]) -> Result<Vec<StateVector>, ProviderError> {
        let mut out = Vec::new();
        self.compute_next(group, state, &mut |_, slots| {
            out.push(StateVector::from_slots(slots.to_vec()))
        })?;
        Ok(out)
    }

    pub fn check_label(&self, label: usize, state: &[i32]) -> Result<bool, ProviderError> {
        self.codec.check_length(state)?;
        if label >= self.lts_type.label_count() {
            return Err(ProviderError::evaluation(format!(
                "state label {label} out of range ({} labels)",
                self.lts_type.label_count()
            )));
        }
        if is_construction(state) {
            debug!(label, "state label requested for the construction vector");
            return Ok(false);
        }

        let payload = self.codec.decode(state)?;
        self.contexts.with_context(|context| {
            context.decode(payload)?;
            context.evaluate_label(label)
        })
    }

    pub fn label_ordinal(&self, value: bool) -> i32 {
        if value {
            self.bool_true
        } else {
            self.bool_false
        }
    }

    fn fail(&self, err: &ProviderError) {
        error!(kind = err.kind_str(), error = %err, "provider call failed; aborting exploration");
        self.abort.abort(EXIT_PROVIDER_FAILURE);
    }
}

impl<T: ModelTemplate> TransitionProvider for LoadedModel<T> {
    fn next_states(
        &self,
        group: usize,
        state: &[i32],
        callback: &mut TransitionCallback<'_>,
    ) -> usize {
        match self.compute_next(group, state, callback) {
            Ok(count) => count,
            Err(err) => {
                self.fail(&err);
                0
            }
        }
    }
}

impl<T: ModelTemplate> LabelProvider for LoadedModel<T> {
    fn state_label(&self, label: usize, state: &[i32]) -> i32 {
        match self.check_label(label, state) {
            Ok(value) => self.label_ordinal(value),
            Err(err) => {
                self.fail(&err);
                self.bool_false
            }
        }
    }
}

impl<T: ModelTemplate> std::fmt::Debug for LoadedModel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("state_length", &self.lts_type.state_length())
            .field("labels", &self.lts_type.label_count())
            .field("groups", &self.group_count())
            .field("contexts", &self.contexts)
            .finish()
    }
}

pub fn load_model<L: ModelLoader>(
    loader: &L,
    path: &Path,
    host: &mut dyn Host,
    options: &ProviderOptions,
) -> Result<Arc<LoadedModel<L::Template>>, ProviderError> {
    let template = loader
        .load_definition(path)
        .map_err(|err| err.with_path(path))?;
    let session = LoadSession::prepare(template, options).map_err(|err| err.with_path(path))?;
    Ok(session.register(host))
}

type LoadFn = dyn Fn(&Path, &mut dyn Host, &ProviderOptions) -> Result<(), ProviderError> + Send + Sync;

pub struct LoaderRecord {
    extension: &'static str,
    load: Box<LoadFn>,
}

impl LoaderRecord {
    pub fn new<L>(extension: &'static str, loader: L) -> Self
    where
        L: ModelLoader + 'static,
    {
        Self {
            extension,
            load: Box::new(move |path, host, options| {
                load_model(&loader, path, host, options).map(|_| ())
            }),
        }
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }
}

impl std::fmt::Debug for LoaderRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderRecord")
            .field("extension", &self.extension)
            .finish()
    }
}

/// Load entry points keyed by model file extension.
#[derive(Debug)]
pub struct Plugin {
    name: &'static str,
    loaders: Vec<LoaderRecord>,
}

impl Plugin {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            loaders: Vec::new(),
        }
    }

    pub fn with_loader(mut self, record: LoaderRecord) -> Self {
        self.loaders.push(record);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn extensions(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.loaders.iter().map(LoaderRecord::extension)
    }

    pub fn try_load(
        &self,
        path: &Path,
        host: &mut dyn Host,
        options: &ProviderOptions,
    ) -> Result<(), ProviderError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| ProviderError::model_load_at(path, "model file has no extension"))?;
        let record = self
            .loaders
            .iter()
            .find(|record| record.extension == extension)
            .ok_or_else(|| {
                ProviderError::model_load_at(
                    path,
                    format!("no loader registered for extension `{extension}`"),
                )
            })?;
        (record.load)(path, host, options)
    }

    /// Host-facing entry point: a failed load is logged and aborts the run.
    pub fn load(
        &self,
        path: &Path,
        host: &mut dyn Host,
        options: &ProviderOptions,
    ) -> Result<(), ProviderError> {
        self.try_load(path, host, options).inspect_err(|err| {
            error!(plugin = self.name, error = %err, "model load failed");
            host.abort(EXIT_PROVIDER_FAILURE);
        })
    }
}
