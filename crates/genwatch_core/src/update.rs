use engine_logging::engine_debug;

use crate::state::ObservedJob;
use crate::{
    AbortReason, Effect, GenerationConfig, JobHandle, JobId, JobKind, JobStatus, Msg,
    ObserverOutcome, Phase, ProjectorState, StatusChange, Transport,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: ProjectorState, msg: Msg) -> (ProjectorState, Vec<Effect>) {
    let effects = match msg {
        Msg::ConfigChanged {
            kind,
            workspace_id,
            config,
        } => {
            state.form.kind = Some(kind);
            state.form.workspace_id = workspace_id;
            state.form.config = config;
            state.form.error = None;
            state.mark_dirty();
            Vec::new()
        }
        Msg::SubmitClicked => submit(&mut state),
        Msg::JobSubmitted {
            job_id,
            kind,
            config,
        } => job_submitted(&mut state, job_id, kind, config),
        Msg::SubmitFailed { job_id, message } => {
            let job = match job_id {
                Some(id) => state.jobs.get_mut(&id),
                None => None,
            };
            match job {
                Some(job) => {
                    job.restart_pending = false;
                    job.last_error = Some(message);
                }
                None => {
                    state.form.submitting = false;
                    state.form.error = Some(message);
                }
            }
            state.mark_dirty();
            Vec::new()
        }
        Msg::ReconnectRequested { job_id, kind } => {
            let mut effects = release_focus(&mut state, &job_id);
            if let Some(job) = state.jobs.get(&job_id) {
                if job.phase.has_observer() {
                    // Already attached or attaching; the engine replaces the observer anyway.
                    state.focused = Some(job_id);
                    state.mark_dirty();
                    return (state, effects);
                }
            }
            let job = state.jobs.entry(job_id.clone()).or_insert_with(|| {
                ObservedJob::new(
                    JobHandle::new(job_id.clone(), kind, GenerationConfig::default()),
                    Phase::Connecting,
                )
            });
            job.phase = Phase::Connecting;
            job.cancel_pending = false;
            job.last_error = None;
            // The fresh observer re-emits the whole remote log from the start.
            job.handle.reset_observation();
            state.focused = Some(job_id.clone());
            state.mark_dirty();
            effects.push(Effect::Reconnect { job_id, kind });
            effects
        }
        Msg::ReconnectAttached { job_id, status } => {
            let Some(job) = state.jobs.get_mut(&job_id) else {
                return (state, vec![Effect::StopObserver { job_id }]);
            };
            if job.cancel_pending {
                // Cancelled while the status fetch was in flight and the job is
                // still running: stop the new observer and tell the backend.
                job.cancel_pending = false;
                let kind = job.handle.kind();
                return (state, vec![Effect::Cancel { job_id, kind }]);
            }
            if job.phase != Phase::Connecting {
                // Moved away while the status fetch was in flight.
                return (state, vec![Effect::StopObserver { job_id }]);
            }
            if job.handle.status().is_terminal() && !status.is_terminal() {
                // Restarted elsewhere since we last looked: a new attempt.
                job.handle.begin_new_attempt(None);
                job.terminal_handled = false;
            }
            apply_status(job, status);
            job.phase = Phase::Observing {
                transport: Transport::for_kind(job.handle.kind()),
            };
            state.mark_dirty();
            Vec::new()
        }
        Msg::ReconnectTerminal {
            job_id,
            status,
            logs,
            items,
        } => {
            if let Some(job) = state.jobs.get_mut(&job_id) {
                // Already over remotely, nothing left to cancel.
                job.cancel_pending = false;
                if job.phase == Phase::Connecting {
                    apply_status(job, status);
                    job.handle.append_logs(logs);
                    if !items.is_empty() {
                        job.handle.replace_items(items);
                    }
                    // Rendered directly; the terminal transition happened while nobody watched.
                    job.phase = Phase::from_status(status, job.handle.kind());
                    job.terminal_handled = true;
                    state.mark_dirty();
                }
            }
            Vec::new()
        }
        Msg::ReconnectFailed { job_id, message } => {
            if let Some(job) = state.jobs.get_mut(&job_id) {
                job.cancel_pending = false;
                if job.phase == Phase::Connecting {
                    job.phase = Phase::Aborted {
                        reason: AbortReason::Unreachable,
                    };
                    job.last_error = Some(message);
                    state.mark_dirty();
                }
            }
            Vec::new()
        }
        Msg::LogLines { job_id, lines } => {
            if let Some(job) = observing_mut(&mut state, &job_id) {
                if job.handle.append_logs(lines) > 0 {
                    state.mark_dirty();
                }
            }
            Vec::new()
        }
        Msg::ProgressChanged { job_id, percent } => {
            if let Some(job) = observing_mut(&mut state, &job_id) {
                if job.handle.record_progress(percent) {
                    state.mark_dirty();
                }
            }
            Vec::new()
        }
        Msg::StatusObserved { job_id, status } => {
            if let Some(job) = observing_mut(&mut state, &job_id) {
                if apply_status(job, status) {
                    state.mark_dirty();
                }
            }
            Vec::new()
        }
        Msg::ItemReceived {
            job_id,
            index,
            item,
        } => {
            if let Some(job) = observing_mut(&mut state, &job_id) {
                if job.handle.push_item(index, item) {
                    state.mark_dirty();
                }
            }
            Vec::new()
        }
        Msg::ObserverFinished {
            job_id,
            outcome,
            items,
        } => observer_finished(&mut state, job_id, outcome, items),
        Msg::CancelClicked { job_id } => {
            let Some(job) = state.jobs.get_mut(&job_id) else {
                return (state, Vec::new());
            };
            if !job.phase.has_observer() {
                return (state, Vec::new());
            }
            // Local-first: the user stops watching whether or not the backend agrees.
            let connecting = job.phase == Phase::Connecting;
            job.phase = Phase::Aborted {
                reason: AbortReason::Cancelled,
            };
            let kind = job.handle.kind();
            let mut effects = Vec::new();
            if connecting {
                // No observer to stop yet; the attach notice sends the cancel.
                job.cancel_pending = true;
            } else {
                effects.push(Effect::Cancel {
                    job_id: job_id.clone(),
                    kind,
                });
            }
            if !job.terminal_handled {
                job.terminal_handled = true;
                effects.push(Effect::ResetForm);
            }
            state.mark_dirty();
            effects
        }
        Msg::RestartClicked { job_id, config } => {
            let Some(job) = state.jobs.get_mut(&job_id) else {
                return (state, Vec::new());
            };
            let restartable = job.handle.kind() == JobKind::Document
                && job.phase.is_terminal()
                && !job.restart_pending;
            if !restartable {
                return (state, Vec::new());
            }
            if let Some(config) = config.as_ref() {
                if let Err(issue) = config.validate() {
                    job.last_error = Some(issue.to_string());
                    state.mark_dirty();
                    return (state, Vec::new());
                }
            }
            job.restart_pending = true;
            job.last_error = None;
            state.mark_dirty();
            vec![Effect::Restart { job_id, config }]
        }
        Msg::RestoreActiveJobs(snapshots) => {
            let mut effects = Vec::new();
            for snapshot in snapshots {
                if state.jobs.contains_key(&snapshot.job_id) {
                    continue;
                }
                let config = GenerationConfig {
                    title: snapshot.title,
                    ..GenerationConfig::default()
                };
                let handle = JobHandle::new(snapshot.job_id.clone(), snapshot.kind, config);
                state
                    .jobs
                    .insert(snapshot.job_id.clone(), ObservedJob::new(handle, Phase::Connecting));
                if state.focused.is_none() {
                    state.focused = Some(snapshot.job_id.clone());
                }
                effects.push(Effect::Reconnect {
                    job_id: snapshot.job_id,
                    kind: snapshot.kind,
                });
            }
            if !effects.is_empty() {
                state.mark_dirty();
            }
            effects
        }
        Msg::JobFocused { job_id } => {
            if state.jobs.contains_key(&job_id) && state.focused.as_ref() != Some(&job_id) {
                state.focused = Some(job_id);
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::ViewClosed => {
            let mut effects = Vec::new();
            for (job_id, job) in state.jobs.iter_mut() {
                if job.phase.has_observer() {
                    job.phase = Phase::Detached;
                    effects.push(Effect::StopObserver {
                        job_id: job_id.clone(),
                    });
                }
            }
            if !effects.is_empty() {
                state.mark_dirty();
            }
            effects
        }
        Msg::Tick | Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn submit(state: &mut ProjectorState) -> Vec<Effect> {
    if state.form.submitting {
        return Vec::new();
    }
    let Some(kind) = state.form.kind else {
        state.form.error = Some("choose what to generate first".to_string());
        state.mark_dirty();
        return Vec::new();
    };
    if state.form.workspace_id.trim().is_empty() {
        state.form.error = Some("a workspace is required".to_string());
        state.mark_dirty();
        return Vec::new();
    }
    if let Err(issue) = state.form.config.validate() {
        state.form.error = Some(issue.to_string());
        state.mark_dirty();
        return Vec::new();
    }
    state.form.submitting = true;
    state.form.error = None;
    state.mark_dirty();
    vec![Effect::Submit {
        kind,
        workspace_id: state.form.workspace_id.clone(),
        config: state.form.config.clone(),
    }]
}

fn job_submitted(
    state: &mut ProjectorState,
    job_id: JobId,
    kind: JobKind,
    config: GenerationConfig,
) -> Vec<Effect> {
    let mut effects = release_focus(state, &job_id);
    let transport = Transport::for_kind(kind);
    let question_count = config.effective_question_count();

    match state.jobs.get_mut(&job_id) {
        Some(job) if job.restart_pending => {
            if job.handle.begin_new_attempt(Some(config)).is_none() {
                return effects;
            }
            job.restart_pending = false;
            job.terminal_handled = false;
            job.last_error = None;
            job.phase = Phase::Observing { transport };
        }
        Some(_) => {
            // Duplicate acknowledgement for a job already known.
            return effects;
        }
        None => {
            state.form.submitting = false;
            let handle = JobHandle::new(job_id.clone(), kind, config);
            state
                .jobs
                .insert(job_id.clone(), ObservedJob::new(handle, Phase::Observing { transport }));
        }
    }

    state.focused = Some(job_id.clone());
    state.mark_dirty();
    effects.push(Effect::StartObserver {
        job_id,
        kind,
        question_count,
    });
    effects
}

fn observer_finished(
    state: &mut ProjectorState,
    job_id: JobId,
    outcome: ObserverOutcome,
    items: Option<Vec<serde_json::Value>>,
) -> Vec<Effect> {
    let Some(job) = observing_mut(state, &job_id) else {
        return Vec::new();
    };
    if let Some(items) = items {
        job.handle.replace_items(items);
    }
    if let Some(status) = outcome.observed_status() {
        apply_status(job, status);
    }
    job.phase = Phase::from_outcome(outcome);
    let kind = job.handle.kind();

    let mut effects = Vec::new();
    if !job.terminal_handled {
        job.terminal_handled = true;
        if outcome.is_ready() {
            effects.push(Effect::OpenResult {
                job_id: job_id.clone(),
                kind,
            });
        }
        effects.push(Effect::ResetForm);
    }
    state.mark_dirty();
    effects
}

/// Keying rule: before the surface moves to `next`, the job it currently
/// shows loses its observer so two observers never drive the same view.
fn release_focus(state: &mut ProjectorState, next: &JobId) -> Vec<Effect> {
    let Some(current) = state.focused.clone() else {
        return Vec::new();
    };
    if &current == next {
        return Vec::new();
    }
    match state.jobs.get_mut(&current) {
        Some(job) if job.phase.has_observer() => {
            job.phase = Phase::Detached;
            vec![Effect::StopObserver { job_id: current }]
        }
        _ => Vec::new(),
    }
}

fn observing_mut<'a>(state: &'a mut ProjectorState, job_id: &JobId) -> Option<&'a mut ObservedJob> {
    state
        .jobs
        .get_mut(job_id)
        .filter(|job| matches!(job.phase, Phase::Observing { .. }))
}

/// Applies a remote status; returns whether it advanced.
fn apply_status(job: &mut ObservedJob, status: JobStatus) -> bool {
    match job.handle.apply_status(status) {
        StatusChange::Advanced { .. } => true,
        StatusChange::Unchanged => false,
        StatusChange::Rejected { current, requested } => {
            engine_debug!(
                "job {}: ignoring status {} after {}",
                job.handle.id(),
                requested.label(),
                current.label()
            );
            false
        }
    }
}
