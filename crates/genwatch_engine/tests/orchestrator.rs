mod support;

use std::time::{Duration, Instant};

use genwatch_core::{
    update, Effect, GenerationConfig, JobId, JobKind, JobStatus, Msg, ObserverOutcome,
    ProjectorState,
};
use genwatch_engine::{
    CancelOutcome, EngineEvent, ObserverUpdate, Orchestrator, PollSettings, StreamSettings,
};
use support::{document, init_logging, FakeBackend};

fn fast_polls() -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(10),
        max_polls: 400,
        completion_grace: Duration::from_millis(10),
    }
}

/// Collects events until `done` matches one or the wait budget runs out.
fn collect_until(
    orchestrator: &Orchestrator,
    mut done: impl FnMut(&EngineEvent) -> bool,
) -> Vec<EngineEvent> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut events = Vec::new();
    while Instant::now() < deadline {
        if let Some(event) = orchestrator.recv_timeout(Duration::from_millis(50)) {
            let finished = done(&event);
            events.push(event);
            if finished {
                break;
            }
        }
    }
    events
}

/// Hands the engine-bound effects of one projector step to the orchestrator.
fn run_effects(orchestrator: &Orchestrator, effects: Vec<Effect>) {
    for effect in effects {
        match effect {
            Effect::Reconnect { job_id, kind } => orchestrator.reconnect(job_id, kind),
            Effect::Cancel { job_id, .. } => orchestrator.cancel(job_id),
            Effect::StopObserver { job_id } => {
                orchestrator.stop_observer(&job_id);
            }
            _ => {}
        }
    }
}

#[test]
fn submitted_document_is_observed_to_completion() {
    init_logging();
    let backend = FakeBackend::new();
    backend.push_document(Ok(document(JobStatus::Generating, 1)));
    backend.push_document(Ok(document(JobStatus::Completed, 2)));
    let orchestrator =
        Orchestrator::with_backend(backend.clone(), fast_polls(), StreamSettings::default())
            .unwrap();

    orchestrator.submit(
        JobKind::Document,
        "ws-1".to_string(),
        GenerationConfig {
            title: "Cells".to_string(),
            ..GenerationConfig::default()
        },
    );
    let events = collect_until(&orchestrator, |event| {
        matches!(event, EngineEvent::Submitted { .. })
    });
    let Some(EngineEvent::Submitted { job_id, kind, .. }) = events.last().cloned() else {
        panic!("no submission event: {events:?}");
    };
    assert_eq!(kind, JobKind::Document);
    assert_eq!(FakeBackend::count(&backend.started), 1);

    orchestrator.start_observer(job_id.clone(), kind, 10);
    let events = collect_until(&orchestrator, |event| {
        matches!(
            event,
            EngineEvent::Observer(observed) if observed.is_finished()
        )
    });
    let finished = events
        .iter()
        .filter(|event| matches!(event, EngineEvent::Observer(observed) if observed.is_finished()))
        .count();
    assert_eq!(finished, 1);
    assert!(events.iter().any(|event| matches!(
        event,
        EngineEvent::Observer(observed)
            if observed.update == ObserverUpdate::Finished { outcome: ObserverOutcome::Completed, items: None }
    )));
    // A finished observer leaves the registry.
    assert_eq!(orchestrator.active_observers(), 0);
}

#[test]
fn events_from_a_stopped_observer_are_dropped() {
    init_logging();
    let backend = FakeBackend::new();
    backend.push_document(Ok(document(JobStatus::Generating, 3)));
    let orchestrator =
        Orchestrator::with_backend(backend.clone(), fast_polls(), StreamSettings::default())
            .unwrap();
    let id = JobId::new("doc-1");

    orchestrator.start_observer(id.clone(), JobKind::Document, 10);
    // Let a few polls land in the channel before stopping.
    std::thread::sleep(Duration::from_millis(100));
    assert!(orchestrator.stop_observer(&id));
    assert!(!orchestrator.stop_observer(&id));

    assert!(orchestrator.recv_timeout(Duration::from_millis(100)).is_none());
}

#[test]
fn cancel_reports_its_outcome() {
    init_logging();
    let backend = FakeBackend::new();
    backend.push_document(Ok(document(JobStatus::Generating, 0)));
    let orchestrator =
        Orchestrator::with_backend(backend.clone(), fast_polls(), StreamSettings::default())
            .unwrap();
    let id = JobId::new("doc-1");

    orchestrator.start_observer(id.clone(), JobKind::Document, 10);
    orchestrator.cancel(id.clone());
    let events = collect_until(&orchestrator, |event| {
        matches!(event, EngineEvent::CancelFinished { .. })
    });
    assert!(events.contains(&EngineEvent::CancelFinished {
        job_id: id.clone(),
        outcome: CancelOutcome::Acknowledged,
    }));

    orchestrator.cancel(id.clone());
    let events = collect_until(&orchestrator, |event| {
        matches!(event, EngineEvent::CancelFinished { .. })
    });
    assert_eq!(
        events.last(),
        Some(&EngineEvent::CancelFinished {
            job_id: id,
            outcome: CancelOutcome::AlreadyStopped,
        })
    );
    assert_eq!(FakeBackend::count(&backend.cancels), 1);
}

#[test]
fn reconnect_announces_attach_before_observer_events() {
    init_logging();
    let backend = FakeBackend::new();
    backend.push_document(Ok(document(JobStatus::Generating, 2)));
    let orchestrator =
        Orchestrator::with_backend(backend.clone(), fast_polls(), StreamSettings::default())
            .unwrap();
    let id = JobId::new("doc-1");

    orchestrator.reconnect(id.clone(), JobKind::Document);
    let events = collect_until(&orchestrator, |event| {
        matches!(
            event,
            EngineEvent::Observer(observed) if matches!(observed.update, ObserverUpdate::LogLines(_))
        )
    });
    assert_eq!(
        events.first(),
        Some(&EngineEvent::ReconnectAttached {
            job_id: id,
            status: JobStatus::Generating,
        })
    );
    assert_eq!(orchestrator.active_observers(), 1);
}

#[test]
fn stop_on_attach_notice_leaves_no_observer_behind() {
    init_logging();
    let backend = FakeBackend::new();
    backend.push_document(Ok(document(JobStatus::Generating, 2)));
    let orchestrator =
        Orchestrator::with_backend(backend.clone(), fast_polls(), StreamSettings::default())
            .unwrap();

    for n in 0..50 {
        let id = JobId::new(format!("doc-{n}"));
        orchestrator.reconnect(id.clone(), JobKind::Document);
        let events = collect_until(&orchestrator, |event| {
            matches!(event, EngineEvent::ReconnectAttached { .. })
        });
        assert!(
            matches!(events.last(), Some(EngineEvent::ReconnectAttached { job_id, .. }) if *job_id == id),
            "no attach notice: {events:?}"
        );
        // The observer is registered by the time the notice is read.
        assert!(orchestrator.stop_observer(&id));
        assert_eq!(orchestrator.active_observers(), 0);
    }
    assert!(orchestrator.recv_timeout(Duration::from_millis(100)).is_none());
}

#[test]
fn cancel_during_reconnect_reaches_the_backend_once_attached() {
    init_logging();
    let backend = FakeBackend::new();
    backend.push_document(Ok(document(JobStatus::Generating, 2)));
    let orchestrator =
        Orchestrator::with_backend(backend.clone(), fast_polls(), StreamSettings::default())
            .unwrap();
    let id = JobId::new("doc-1");

    let (state, effects) = update(
        ProjectorState::new(),
        Msg::ReconnectRequested {
            job_id: id.clone(),
            kind: JobKind::Document,
        },
    );
    run_effects(&orchestrator, effects);
    let (state, effects) = update(state, Msg::CancelClicked { job_id: id.clone() });
    run_effects(&orchestrator, effects);

    let events = collect_until(&orchestrator, |event| {
        matches!(event, EngineEvent::ReconnectAttached { .. })
    });
    let Some(EngineEvent::ReconnectAttached { job_id, status }) = events.last().cloned() else {
        panic!("no attach notice: {events:?}");
    };
    let (_, effects) = update(state, Msg::ReconnectAttached { job_id, status });
    run_effects(&orchestrator, effects);

    let events = collect_until(&orchestrator, |event| {
        matches!(event, EngineEvent::CancelFinished { .. })
    });
    assert_eq!(
        events.last(),
        Some(&EngineEvent::CancelFinished {
            job_id: id,
            outcome: CancelOutcome::Acknowledged,
        })
    );
    assert_eq!(FakeBackend::count(&backend.cancels), 1);
    assert_eq!(orchestrator.active_observers(), 0);
}

#[test]
fn restart_is_reported_for_the_same_job() {
    init_logging();
    let backend = FakeBackend::new();
    let orchestrator =
        Orchestrator::with_backend(backend.clone(), fast_polls(), StreamSettings::default())
            .unwrap();
    let id = JobId::new("doc-1");

    orchestrator.restart(id.clone(), None);
    let events = collect_until(&orchestrator, |event| {
        matches!(event, EngineEvent::Restarted { .. })
    });
    assert_eq!(
        events.last(),
        Some(&EngineEvent::Restarted {
            job_id: id,
            config: None,
        })
    );
    assert_eq!(FakeBackend::count(&backend.restarts), 1);
}
