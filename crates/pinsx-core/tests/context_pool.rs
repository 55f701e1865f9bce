use pinsx_core::{ContextPool, ExecutionContext, ModelTemplate, ProviderError, WorkerId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Default)]
struct CountingModel {
    created: AtomicUsize,
}

struct CountingContext {
    id: usize,
    decoded: Vec<i32>,
}

impl ModelTemplate for CountingModel {
    type Context = CountingContext;

    fn slot_count(&self) -> usize {
        1
    }

    fn transition_group_count(&self) -> usize {
        1
    }

    fn label_names(&self) -> &[String] {
        &[]
    }

    fn create_context(&self) -> Result<CountingContext, ProviderError> {
        Ok(CountingContext {
            id: self.created.fetch_add(1, Ordering::SeqCst),
            decoded: Vec::new(),
        })
    }
}

impl ExecutionContext for CountingContext {
    fn decode(&mut self, payload: &[i32]) -> Result<(), ProviderError> {
        self.decoded = payload.to_vec();
        Ok(())
    }

    fn initial_states(&mut self) -> Result<Vec<Vec<i32>>, ProviderError> {
        Ok(vec![vec![0]])
    }

    fn compute_successors(&mut self, _group: usize) -> Result<Vec<Vec<i32>>, ProviderError> {
        Ok(vec![self.decoded.iter().map(|value| value + 1).collect()])
    }

    fn evaluate_label(&mut self, _label: usize) -> Result<bool, ProviderError> {
        Ok(false)
    }
}

#[test]
fn contexts_are_created_lazily_and_reused_per_thread() {
    let pool = ContextPool::new(Arc::new(CountingModel::default()));
    assert!(pool.is_empty());

    let first = pool.with_context(|context| Ok(context.id)).expect("first");
    let second = pool.with_context(|context| Ok(context.id)).expect("second");
    assert_eq!(first, second);
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.template().created.load(Ordering::SeqCst), 1);
}

#[test]
fn each_worker_thread_gets_its_own_context() {
    let pool = ContextPool::new(Arc::new(CountingModel::default()));

    let ids = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let pool = &pool;
                scope.spawn(move || {
                    let mut seen = Vec::new();
                    for round in 0..50 {
                        let value = worker * 1000 + round;
                        let (id, successor) = pool
                            .with_context(|context| {
                                context.decode(&[value])?;
                                let next = context.compute_successors(0)?;
                                Ok((context.id, next))
                            })
                            .expect("with context");
                        assert_eq!(successor, vec![vec![value + 1]]);
                        seen.push(id);
                    }
                    seen
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("join worker"))
            .collect::<Vec<_>>()
    });

    assert_eq!(pool.len(), 4);
    for seen in &ids {
        assert!(seen.iter().all(|id| *id == seen[0]));
    }
    let mut distinct: Vec<_> = ids.iter().map(|seen| seen[0]).collect();
    distinct.sort_unstable();
    distinct.dedup();
    assert_eq!(distinct.len(), 4);
}

#[test]
fn explicit_task_ids_get_separate_contexts() {
    let pool = ContextPool::new(Arc::new(CountingModel::default()));
    let a = pool
        .with_context_for(WorkerId::Task(1), |context| Ok(context.id))
        .expect("task 1");
    let b = pool
        .with_context_for(WorkerId::Task(2), |context| Ok(context.id))
        .expect("task 2");
    let again = pool
        .with_context_for(WorkerId::Task(1), |context| Ok(context.id))
        .expect("task 1 again");
    assert_ne!(a, b);
    assert_eq!(a, again);
    assert_eq!(pool.len(), 2);
}

#[test]
fn context_errors_propagate_unchanged() {
    let pool = ContextPool::new(Arc::new(CountingModel::default()));
    let err = pool
        .with_context(|_| -> Result<(), ProviderError> {
            Err(ProviderError::evaluation("boom"))
        })
        .expect_err("error");
    assert_eq!(err, ProviderError::evaluation("boom"));
}

#[test]
fn racing_lookups_for_one_worker_create_a_single_context() {
    let pool = ContextPool::new(Arc::new(CountingModel::default()));

    let ids = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = &pool;
                scope.spawn(move || {
                    pool.with_context_for(WorkerId::Task(7), |context| Ok(context.id))
                        .expect("shared task")
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("join worker"))
            .collect::<Vec<_>>()
    });

    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.template().created.load(Ordering::SeqCst), 1);
}
