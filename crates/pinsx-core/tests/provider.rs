use pinsx_core::guarded::{GCM_EXTENSION, PLUGIN_NAME};
use pinsx_core::lts_type::CONSTRUCTION_SLOT_NAME;
use pinsx_core::{
    load_model, plugin, DependencyPolicy, ExecutionContext, GuardedLoader, Host, LoadSession,
    ModelTemplate, ProviderError, ProviderOptions, RecordingHost, Registration, StateVector,
    BOOL_FALSE, BOOL_TRUE, EXIT_PROVIDER_FAILURE,
};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn case(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("tests")
        .join("cases")
        .join(name)
}

fn load(name: &str) -> RecordingHost {
    let mut host = RecordingHost::new();
    plugin()
        .load(&case(name), &mut host, &ProviderOptions::default())
        .expect("load model");
    host
}

#[test]
fn plugin_serves_gcm_models() {
    let plugin = plugin();
    assert_eq!(plugin.name(), PLUGIN_NAME);
    assert_eq!(plugin.extensions().collect::<Vec<_>>(), [GCM_EXTENSION]);
}

#[test]
fn counter_registers_everything_in_order() {
    let host = load("counter.gcm");
    assert_eq!(
        host.registrations(),
        &[
            Registration::LtsType,
            Registration::EnumValue,
            Registration::EnumValue,
            Registration::InitialState,
            Registration::NextState,
            Registration::StateLabel,
            Registration::DmInfo,
            Registration::DmInfoRead,
            Registration::DmInfoMustWrite,
            Registration::StateLabelInfo,
        ]
    );
    assert_eq!(host.abort_code(), None);
}

#[test]
fn counter_descriptor_includes_construction_slot() {
    let host = load("counter.gcm");
    let lts_type = host.lts_type().expect("lts type");
    assert_eq!(lts_type.state_length(), 3);
    assert_eq!(lts_type.label_count(), 1);
    let names: Vec<_> = lts_type.slots().iter().map(|slot| slot.name.as_str()).collect();
    assert_eq!(names, [CONSTRUCTION_SLOT_NAME, "x", "y"]);
    assert_eq!(lts_type.labels()[0].name, "invariant");

    assert_eq!(host.bool_ordinal(BOOL_FALSE), Some(0));
    assert_eq!(host.bool_ordinal(BOOL_TRUE), Some(1));
    assert_eq!(
        host.initial_state().map(StateVector::as_slice),
        Some(&[1, 0, 0][..])
    );
}

#[test]
fn full_matrices_have_one_column_per_slot() {
    let host = load("counter.gcm");
    for matrix in [
        host.dm_info().expect("dm"),
        host.dm_info_read().expect("read"),
        host.dm_info_must_write().expect("write"),
    ] {
        assert_eq!((matrix.rows(), matrix.cols()), (1, 3));
        assert!(matrix.is_full());
    }
    let labels = host.state_label_info().expect("labels");
    assert_eq!((labels.rows(), labels.cols()), (1, 3));
    assert!(labels.is_full());
}

#[test]
fn analyzed_matrices_follow_model_reads_and_writes() {
    let mut host = RecordingHost::new();
    let options = ProviderOptions {
        dependency_policy: DependencyPolicy::Analyzed,
    };
    plugin()
        .load(&case("pair.gcm"), &mut host, &options)
        .expect("load pair");

    assert_eq!(host.dm_info().expect("dm").to_rows(), ["++-+", "+-++"]);
    assert_eq!(host.dm_info_read().expect("read").to_rows(), ["++--", "+-+-"]);
    assert_eq!(
        host.dm_info_must_write().expect("write").to_rows(),
        ["++-+", "+-++"]
    );
    assert_eq!(
        host.state_label_info().expect("labels").to_rows(),
        ["-++-", "-++-"]
    );
}

#[test]
fn analyzed_write_rows_cover_initial_state_assignment() {
    let mut host = RecordingHost::new();
    let options = ProviderOptions {
        dependency_policy: DependencyPolicy::Analyzed,
    };
    plugin()
        .load(&case("pair.gcm"), &mut host, &options)
        .expect("load pair");
    let construction = host.initial_state().expect("initial state").clone();
    let write = host.dm_info_must_write().expect("write");
    let combined = host.dm_info().expect("dm");

    for group in 0..write.rows() {
        let successors = host
            .next_states(group, construction.as_slice())
            .expect("construction successors");
        for successor in &successors {
            for (col, (after, before)) in successor
                .as_slice()
                .iter()
                .zip(construction.as_slice())
                .enumerate()
            {
                if after != before {
                    assert!(write.get(group, col), "group {group} writes column {col}");
                    assert!(combined.get(group, col), "group {group} touches column {col}");
                }
            }
        }
    }
}

#[test]
fn construction_vector_yields_declared_initial_state() {
    let host = load("counter.gcm");
    let successors = host.next_states(0, &[1, 0, 0]).expect("next state callback");
    assert_eq!(successors, vec![StateVector::from_slots(vec![0, 1, 0])]);
}

#[test]
fn construction_ignores_the_group_argument() {
    let host = load("pair.gcm");
    let first = host.next_states(0, &[1, 0, 0, 0]).expect("group 0");
    let second = host.next_states(1, &[1, 0, 0, 0]).expect("group 1");
    assert_eq!(first, second);
    assert_eq!(first, vec![StateVector::from_slots(vec![0, 0, 0, 7])]);
    assert!(!host.is_aborted());
}

#[test]
fn successors_clear_the_construction_flag() {
    let host = load("counter.gcm");
    let successors = host.next_states(0, &[0, 1, 0]).expect("next");
    assert_eq!(
        successors,
        vec![
            StateVector::from_slots(vec![0, 2, 0]),
            StateVector::from_slots(vec![0, 1, 1]),
        ]
    );
    assert!(successors.iter().all(|state| state.as_slice()[0] == 0));

    let again = host.next_states(0, &[0, 1, 0]).expect("next again");
    assert_eq!(again, successors);
}

#[test]
fn labels_use_boolean_ordinals_and_are_idempotent() {
    let host = load("pair.gcm");
    let holds = host.bool_ordinal(BOOL_TRUE).expect("true") as i32;
    let fails = host.bool_ordinal(BOOL_FALSE).expect("false") as i32;

    assert_eq!(host.state_label(0, &[0, 1, 1, 7]), Some(holds));
    assert_eq!(host.state_label(0, &[0, 2, 2, 7]), Some(fails));
    assert_eq!(host.state_label(1, &[0, 2, 1, 7]), Some(fails));
    assert_eq!(host.state_label(1, &[0, 2, 1, 7]), Some(fails));
    assert_eq!(host.state_label(1, &[0, 1, 1, 7]), Some(holds));
    assert!(!host.is_aborted());
}

#[test]
fn label_of_construction_vector_is_false() {
    let host = load("counter.gcm");
    let fails = host.bool_ordinal(BOOL_FALSE).expect("false") as i32;
    assert_eq!(host.state_label(0, &[1, 0, 0]), Some(fails));
    assert!(!host.is_aborted());
}

#[test]
fn truncated_model_registers_nothing_and_aborts() {
    let mut host = RecordingHost::new();
    let err = plugin()
        .load(&case("truncated.gcm"), &mut host, &ProviderOptions::default())
        .expect_err("truncated model");
    assert!(matches!(err, ProviderError::ModelLoad { path: Some(_), .. }));
    assert!(!host.is_registered());
    assert!(host.lts_type().is_none());
    assert_eq!(host.abort_code(), Some(EXIT_PROVIDER_FAILURE));
}

#[test]
fn unknown_extension_is_a_load_error() {
    let mut host = RecordingHost::new();
    let err = plugin()
        .try_load(&case("counter.json"), &mut host, &ProviderOptions::default())
        .expect_err("unknown extension");
    assert!(err.to_string().contains("no loader registered"));
    assert!(!host.is_registered());
    assert!(!host.is_aborted());
}

#[test]
fn model_without_slots_is_rejected() {
    let temp = TempDir::new().expect("tmp dir");
    let path = temp.path().join("empty.gcm");
    fs::write(
        &path,
        "pinsx-model-v1\n{\"variables\":[],\"groups\":[{\"name\":\"idle\",\"commands\":[]}]}\n",
    )
    .expect("write model");

    let mut host = RecordingHost::new();
    let err = load_model(&GuardedLoader, &path, &mut host, &ProviderOptions::default())
        .expect_err("no slots");
    assert!(matches!(err, ProviderError::ModelLoad { .. }));
    assert!(err.to_string().contains("state slots"));
    assert!(!host.is_registered());
}

#[test]
fn evaluation_failure_aborts_with_255() {
    let host = load("faulty.gcm");
    let initial = host.next_states(0, &[1, 0]).expect("initial");
    assert_eq!(initial, vec![StateVector::from_slots(vec![0, 2])]);
    assert_eq!(
        host.next_states(0, &[0, 8]).expect("next"),
        vec![StateVector::from_slots(vec![0, 1])]
    );
    assert!(!host.is_aborted());

    let reported = host.next_states(0, &[0, 1]).expect("failing call");
    assert!(reported.is_empty());
    assert_eq!(host.abort_code(), Some(EXIT_PROVIDER_FAILURE));
}

#[test]
fn wrong_length_vector_aborts() {
    let host = load("counter.gcm");
    let reported = host.next_states(0, &[0, 1]).expect("call");
    assert!(reported.is_empty());
    assert_eq!(host.abort_code(), Some(EXIT_PROVIDER_FAILURE));
}

#[test]
fn out_of_range_group_and_label_are_errors() {
    let mut host = RecordingHost::new();
    let model = load_model(
        &GuardedLoader,
        &case("counter.gcm"),
        &mut host,
        &ProviderOptions::default(),
    )
    .expect("load");
    assert!(matches!(
        model.successors(1, &[0, 1, 0]),
        Err(ProviderError::Evaluation(_))
    ));
    assert!(matches!(
        model.check_label(1, &[0, 1, 0]),
        Err(ProviderError::Evaluation(_))
    ));
    assert!(matches!(
        model.successors(0, &[0, 1, 0, 0]),
        Err(ProviderError::MalformedState(_))
    ));
}

struct ScriptedModel {
    successors: Vec<Vec<i32>>,
}

struct ScriptedContext {
    successors: Vec<Vec<i32>>,
}

impl ModelTemplate for ScriptedModel {
    type Context = ScriptedContext;

    fn slot_count(&self) -> usize {
        2
    }

    fn transition_group_count(&self) -> usize {
        1
    }

    fn label_names(&self) -> &[String] {
        &[]
    }

    fn construction_state(&self) -> Option<Vec<i32>> {
        Some(vec![4, 4])
    }

    fn create_context(&self) -> Result<ScriptedContext, ProviderError> {
        Ok(ScriptedContext {
            successors: self.successors.clone(),
        })
    }
}

impl ExecutionContext for ScriptedContext {
    fn decode(&mut self, _payload: &[i32]) -> Result<(), ProviderError> {
        Ok(())
    }

    fn initial_states(&mut self) -> Result<Vec<Vec<i32>>, ProviderError> {
        Ok(vec![vec![0, 0]])
    }

    fn compute_successors(&mut self, _group: usize) -> Result<Vec<Vec<i32>>, ProviderError> {
        Ok(self.successors.clone())
    }

    fn evaluate_label(&mut self, _label: usize) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

#[test]
fn failing_call_reports_no_successor() {
    let template = ScriptedModel {
        successors: vec![vec![1, 1], vec![2]],
    };
    let session = LoadSession::prepare(template, &ProviderOptions::default()).expect("prepare");
    let mut host = RecordingHost::new();
    let model = session.register(&mut host);

    let mut reported = 0;
    let err = model
        .compute_next(0, &[0, 0, 0], &mut |_, _| reported += 1)
        .expect_err("short successor");
    assert!(matches!(err, ProviderError::MalformedState(_)));
    assert_eq!(reported, 0);
}

#[test]
fn explicit_construction_payload_is_registered() {
    let template = ScriptedModel {
        successors: Vec::new(),
    };
    let session = LoadSession::prepare(template, &ProviderOptions::default()).expect("prepare");
    let mut host = RecordingHost::new();
    session.register(&mut host);
    assert_eq!(
        host.initial_state().map(StateVector::as_slice),
        Some(&[1, 4, 4][..])
    );
    assert_eq!(
        host.next_states(0, &[1, 4, 4]).expect("initial"),
        vec![StateVector::from_slots(vec![0, 0, 0])]
    );
}

#[test]
fn host_abort_defaults_to_abort_handle() {
    let host = RecordingHost::new();
    host.abort(EXIT_PROVIDER_FAILURE);
    host.abort(3);
    assert_eq!(host.abort_code(), Some(EXIT_PROVIDER_FAILURE));
}
