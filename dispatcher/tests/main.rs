use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use garimpo_dispatcher::{
    spawn, Dispatcher, Event, MockOutcome, MockProbe, NotificationHub, PipelineConfig, Priority,
    ProbeSet, Source, TaskStatus,
};
use garimpo_taskpool::{memory_store, BreakerRegistry, ProgressTracker, QueueManager};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Config tuned for tests: immediate retries, fast worker polling, 1s pump.
fn fast_config() -> PipelineConfig {
    PipelineConfig {
        retry_base_delay_secs: 0,
        retry_pump_interval_secs: 1,
        worker_idle_delay_ms: 20,
        ..PipelineConfig::default()
    }
}

fn dispatcher(id: &str, config: PipelineConfig) -> Dispatcher {
    Dispatcher::new(memory_store(id), NotificationHub::spawn(), config)
}

fn target_params() -> HashMap<String, serde_json::Value> {
    HashMap::from([
        ("name".to_string(), serde_json::json!("João Silva")),
        ("cpf_cnpj".to_string(), serde_json::json!("123.456.789-00")),
        ("state".to_string(), serde_json::json!("MG")),
    ])
}

/// Drain events until `done` matches one, or panic after `deadline`.
async fn collect_until(
    rx: &mut mpsc::Receiver<Event>,
    deadline: Duration,
    done: impl Fn(&Event) -> bool,
) -> Vec<Event> {
    let mut events = Vec::new();
    let outcome = tokio::time::timeout(deadline, async {
        loop {
            let event = rx.recv().await.expect("hub closed");
            let stop = done(&event);
            events.push(event);
            if stop {
                break;
            }
        }
    })
    .await;
    if outcome.is_err() {
        panic!("deadline waiting for event; got {} events", events.len());
    }
    events
}

async fn wait_for_status(
    dispatcher: &mut Dispatcher,
    task_id: &str,
    status: TaskStatus,
    deadline: Duration,
) {
    tokio::time::timeout(deadline, async {
        loop {
            if let Some(task) = dispatcher.status(task_id).unwrap() {
                if task.status == status {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("task {task_id} never reached {status}"));
}

#[tokio::test]
async fn test_happy_path_all_sources_complete() {
    let mut dispatcher = dispatcher("test_happy_path", fast_config());
    let mut rx = dispatcher.hub().subscribe("inv-1");

    let probes = ProbeSet::uniform(|source| {
        MockProbe::always_succeeding(serde_json::json!({
            "source": source.as_str(),
            "results": [{"owner": "João Silva"}],
            "count": 1,
        }))
    });
    let cancel = CancellationToken::new();
    let handles = spawn(&dispatcher, &probes, cancel.clone());

    let task_ids = dispatcher
        .launch_investigation("inv-1", target_params(), Priority::Normal)
        .unwrap();
    assert_eq!(task_ids.len(), Source::all().len());

    // Per-source priority adjustments applied at dispatch.
    let receita = dispatcher.status(&task_ids[&Source::Receita]).unwrap().unwrap();
    assert_eq!(receita.priority, Priority::High);
    let gazette = dispatcher
        .status(&task_ids[&Source::DiarioOficial])
        .unwrap()
        .unwrap();
    assert_eq!(gazette.priority, Priority::Low);
    let car = dispatcher.status(&task_ids[&Source::Car]).unwrap().unwrap();
    assert_eq!(car.priority, Priority::Normal);

    let events = collect_until(&mut rx, Duration::from_secs(10), |event| {
        matches!(event, Event::InvestigationProgress { percentage, .. } if *percentage == 100.0)
    })
    .await;

    let completed = events
        .iter()
        .filter(|event| matches!(event, Event::TaskCompleted { .. }))
        .count();
    assert_eq!(completed, 6);
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::InvestigationProgress { .. })));

    let progress = dispatcher.progress("inv-1").unwrap();
    assert_eq!(progress.total, 6);
    assert_eq!(progress.completed, 6);
    assert_eq!(progress.failed, 0);
    assert_eq!(progress.running, 0);
    assert_eq!(progress.pending, 0);
    assert_eq!(progress.percentage, 100.0);

    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }
}

#[tokio::test]
async fn test_retry_then_succeed_event_order() {
    let mut dispatcher = dispatcher("test_retry_then_succeed", fast_config());
    let mut rx = dispatcher.hub().subscribe("inv-1");

    let mut probes = ProbeSet::new();
    probes.insert(
        Source::Car,
        Arc::new(MockProbe::scripted(
            vec![
                MockOutcome::Fail("SICAR instável".to_string()),
                MockOutcome::Fail("SICAR instável".to_string()),
            ],
            MockOutcome::Succeed(serde_json::json!({"count": 3})),
        )),
    );
    let cancel = CancellationToken::new();
    let handles = spawn(&dispatcher, &probes, cancel.clone());

    let task_id = dispatcher
        .launch_single(Source::Car, "inv-1", target_params(), Priority::Normal, None)
        .unwrap();

    let events = collect_until(&mut rx, Duration::from_secs(15), |event| {
        matches!(event, Event::TaskCompleted { .. })
    })
    .await;

    let lifecycle: Vec<&'static str> = events
        .iter()
        .filter(|event| match event {
            Event::TaskStarted { task_id: id, .. }
            | Event::TaskCompleted { task_id: id, .. }
            | Event::TaskRetrying { task_id: id, .. }
            | Event::TaskFailed { task_id: id, .. } => id == &task_id,
            _ => false,
        })
        .map(Event::event_type)
        .collect();
    assert_eq!(
        lifecycle,
        vec![
            "task_started",
            "task_retrying",
            "task_started",
            "task_retrying",
            "task_started",
            "task_completed",
        ]
    );

    let task = dispatcher.status(&task_id).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.attempt, 2);
    assert!(task.completed_at.is_some());

    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }
}

#[tokio::test]
async fn test_exhausted_retries_open_breaker() {
    let config = PipelineConfig {
        breaker_threshold: 3,
        worker_timeout_secs: HashMap::from([(Source::Receita, 0)]),
        ..fast_config()
    };
    let mut dispatcher = dispatcher("test_exhausted_retries", config);
    let mut rx = dispatcher.hub().subscribe("inv-1");

    let mut probes = ProbeSet::new();
    probes.insert(
        Source::Receita,
        Arc::new(MockProbe::always_hanging(Duration::from_secs(600))),
    );
    let cancel = CancellationToken::new();
    let handles = spawn(&dispatcher, &probes, cancel.clone());

    let task_id = dispatcher
        .launch_single(
            Source::Receita,
            "inv-1",
            target_params(),
            Priority::Normal,
            Some(3),
        )
        .unwrap();

    let events = collect_until(&mut rx, Duration::from_secs(15), |event| {
        matches!(event, Event::TaskFailed { .. })
    })
    .await;

    let task = dispatcher.status(&task_id).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.attempt, 3);
    assert!(task.error.as_deref().unwrap_or("").contains("timed out"));

    let breaker = dispatcher.circuit_breaker(Source::Receita).unwrap();
    assert!(breaker.consecutive_failures >= 3);
    assert!(breaker.is_open);

    let opened = events
        .iter()
        .filter(|event| matches!(event, Event::CircuitBreakerOpened { .. }))
        .count();
    assert_eq!(opened, 1);

    let progress = dispatcher.progress("inv-1").unwrap();
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.percentage, 100.0);

    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }
}

#[tokio::test]
async fn test_open_breaker_refuses_admission() {
    let mut dispatcher = dispatcher("test_breaker_refuses_admission", fast_config());

    // Trip CAR's breaker directly at the storage layer.
    let mut breaker = BreakerRegistry::new(
        memory_store("test_breaker_refuses_admission"),
        5,
        Duration::from_secs(60),
    );
    for _ in 0..5 {
        breaker.record_failure(Source::Car).unwrap();
    }

    let err = dispatcher
        .launch_single(Source::Car, "inv-2", target_params(), Priority::Normal, None)
        .unwrap_err();
    assert!(err.to_string().contains("admission refused"));

    // No record was created and the investigation stayed empty.
    assert_eq!(dispatcher.progress("inv-2").unwrap().total, 0);

    // The fan-out skips the broken source but admits the other five.
    let task_ids = dispatcher
        .launch_investigation("inv-2", target_params(), Priority::Normal)
        .unwrap();
    assert_eq!(task_ids.len(), 5);
    assert!(!task_ids.contains_key(&Source::Car));
    assert_eq!(dispatcher.progress("inv-2").unwrap().total, 5);
}

#[tokio::test]
async fn test_priority_ordering_on_dequeue() {
    let mut dispatcher = dispatcher("test_priority_ordering", fast_config());

    // No workers: enqueue, then drain by hand and watch the order.
    let t1 = dispatcher
        .launch_single(
            Source::Cartorios,
            "inv-1",
            target_params(),
            Priority::Normal,
            None,
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(3)).await;
    let t2 = dispatcher
        .launch_single(
            Source::Cartorios,
            "inv-1",
            target_params(),
            Priority::High,
            None,
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(3)).await;
    let t3 = dispatcher
        .launch_single(
            Source::Cartorios,
            "inv-1",
            target_params(),
            Priority::Normal,
            None,
        )
        .unwrap();

    let store = memory_store("test_priority_ordering");
    let mut queue = QueueManager::new(
        store.clone(),
        BreakerRegistry::new(store.clone(), 5, Duration::from_secs(60)),
        ProgressTracker::new(store),
    );
    let order: Vec<String> = std::iter::from_fn(|| {
        queue
            .dequeue(Source::Cartorios)
            .unwrap()
            .map(|task| task.id)
    })
    .collect();
    assert_eq!(order, vec![t2, t1, t3]);
}

#[tokio::test]
async fn test_cancel_while_queued_running_and_parked() {
    // Long retry delay keeps the parked task parked for the whole test.
    let config = PipelineConfig {
        retry_base_delay_secs: 120,
        worker_idle_delay_ms: 20,
        ..PipelineConfig::default()
    };
    let mut dispatcher = dispatcher("test_cancel_mixed_states", config);

    // Workers only for CAR (slow success) and INCRA (fails once, then parks).
    let mut probes = ProbeSet::new();
    probes.insert(
        Source::Car,
        Arc::new(MockProbe::scripted(
            vec![MockOutcome::Hang(Duration::from_secs(2))],
            MockOutcome::Succeed(serde_json::json!({"count": 0})),
        )),
    );
    probes.insert(
        Source::Incra,
        Arc::new(MockProbe::always_failing("INCRA fora do ar")),
    );
    let cancel = CancellationToken::new();
    let handles = spawn(&dispatcher, &probes, cancel.clone());

    // A: PENDING forever (no worker for its source).
    let task_a = dispatcher
        .launch_single(
            Source::DiarioOficial,
            "inv-3",
            target_params(),
            Priority::Normal,
            None,
        )
        .unwrap();
    // B: RUNNING inside the CAR worker when we cancel.
    let task_b = dispatcher
        .launch_single(Source::Car, "inv-3", target_params(), Priority::Normal, None)
        .unwrap();
    // C: parked in the retry set.
    let task_c = dispatcher
        .launch_single(
            Source::Incra,
            "inv-3",
            target_params(),
            Priority::Normal,
            None,
        )
        .unwrap();

    wait_for_status(
        &mut dispatcher,
        &task_b,
        TaskStatus::Running,
        Duration::from_secs(5),
    )
    .await;
    wait_for_status(
        &mut dispatcher,
        &task_c,
        TaskStatus::Retrying,
        Duration::from_secs(5),
    )
    .await;

    let cancelled = dispatcher.cancel_investigation("inv-3").unwrap();
    assert_eq!(cancelled, 2);

    let a = dispatcher.status(&task_a).unwrap().unwrap();
    assert_eq!(a.status, TaskStatus::Cancelled);
    let c = dispatcher.status(&task_c).unwrap().unwrap();
    assert_eq!(c.status, TaskStatus::Cancelled);

    // B was not preempted; it runs to completion.
    wait_for_status(
        &mut dispatcher,
        &task_b,
        TaskStatus::Completed,
        Duration::from_secs(5),
    )
    .await;

    let progress = dispatcher.progress("inv-3").unwrap();
    assert_eq!(progress.total, 3);
    assert_eq!(progress.cancelled, 2);
    assert_eq!(progress.completed + progress.failed, 1);
    assert_eq!(progress.running, 0);

    // Cancelling again is a no-op and leaves the states untouched.
    assert_eq!(dispatcher.cancel_investigation("inv-3").unwrap(), 0);
    let progress_again = dispatcher.progress("inv-3").unwrap();
    assert_eq!(progress_again.cancelled, 2);
    assert_eq!(progress_again.task_states, progress.task_states);

    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }
}

#[tokio::test]
async fn test_cancelled_investigation_forfeits_remaining_attempts() {
    // The probe hangs long enough for the cancel to land mid-flight, then
    // the attempt fails; the failure handler must not schedule a retry.
    let config = PipelineConfig {
        worker_timeout_secs: HashMap::from([(Source::Car, 1)]),
        worker_idle_delay_ms: 20,
        ..PipelineConfig::default()
    };
    let mut dispatcher = dispatcher("test_cancel_forfeits_attempts", config);

    let mut probes = ProbeSet::new();
    probes.insert(
        Source::Car,
        Arc::new(MockProbe::always_hanging(Duration::from_secs(600))),
    );
    let cancel = CancellationToken::new();
    let handles = spawn(&dispatcher, &probes, cancel.clone());

    let task_id = dispatcher
        .launch_single(Source::Car, "inv-4", target_params(), Priority::Normal, None)
        .unwrap();
    wait_for_status(
        &mut dispatcher,
        &task_id,
        TaskStatus::Running,
        Duration::from_secs(5),
    )
    .await;

    // Running task is not cancelled in place.
    assert_eq!(dispatcher.cancel_investigation("inv-4").unwrap(), 0);

    // After the timeout the task settles as FAILED on its first attempt
    // instead of parking for a retry.
    wait_for_status(
        &mut dispatcher,
        &task_id,
        TaskStatus::Failed,
        Duration::from_secs(5),
    )
    .await;
    let task = dispatcher.status(&task_id).unwrap().unwrap();
    assert_eq!(task.attempt, 1);

    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }
}

#[tokio::test]
async fn test_queue_stats_and_retry_parked() {
    let config = PipelineConfig {
        retry_base_delay_secs: 120,
        worker_idle_delay_ms: 20,
        ..PipelineConfig::default()
    };
    let mut dispatcher = dispatcher("test_queue_stats", config);

    let mut probes = ProbeSet::new();
    probes.insert(
        Source::Incra,
        Arc::new(MockProbe::always_failing("INCRA fora do ar")),
    );
    let cancel = CancellationToken::new();
    let handles = spawn(&dispatcher, &probes, cancel.clone());

    // Two queued for a workerless source, one parked in the retry set.
    dispatcher
        .launch_single(Source::Car, "inv-5", target_params(), Priority::Normal, None)
        .unwrap();
    dispatcher
        .launch_single(Source::Car, "inv-5", target_params(), Priority::High, None)
        .unwrap();
    let parked = dispatcher
        .launch_single(
            Source::Incra,
            "inv-5",
            target_params(),
            Priority::Normal,
            None,
        )
        .unwrap();
    wait_for_status(
        &mut dispatcher,
        &parked,
        TaskStatus::Retrying,
        Duration::from_secs(5),
    )
    .await;

    let stats = dispatcher.queue_stats(Some(Source::Car)).unwrap();
    assert_eq!(stats.queue.total_queued, 2);
    assert_eq!(stats.queue.sources[0].bands[&Priority::High], 1);
    assert_eq!(stats.retry_parked, 1);

    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }
}
