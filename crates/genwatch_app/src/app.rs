use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use engine_logging::{engine_debug, engine_info};
use genwatch_core::{
    update, AbortReason, ActiveJobSnapshot, Effect, GenerationConfig, JobId, JobKind, Msg, Phase,
    ProjectorState,
};
use genwatch_engine::EngineEvent;

use crate::effects::{event_to_msg, EffectRunner};
use crate::persistence;
use crate::render::{phase_text, stamped, Renderer};

const TICK: Duration = Duration::from_millis(250);

/// What this run of the watcher was started for.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Submit {
        kind: JobKind,
        workspace_id: String,
        config: GenerationConfig,
    },
    Watch {
        job_id: JobId,
        kind: JobKind,
    },
    Resume,
    Cancel {
        job_id: JobId,
        kind: JobKind,
    },
    Restart {
        job_id: JobId,
        config: Option<GenerationConfig>,
    },
}

/// Action held back until a reconnect tells us where the job stands.
#[derive(Debug, Clone, PartialEq)]
enum FollowUp {
    Cancel(JobId),
    Restart(JobId, Option<GenerationConfig>),
}

/// How the run ended, from the focused job's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Finished,
    Detached,
    Failed(String),
}

pub struct App {
    state: ProjectorState,
    runner: EffectRunner,
    renderer: Renderer,
    state_dir: PathBuf,
    saved: Vec<ActiveJobSnapshot>,
    /// Jobs with a cancel or restart request still on the wire.
    awaiting: HashSet<JobId>,
    follow_up: Option<FollowUp>,
    detached: bool,
}

impl App {
    pub fn new(runner: EffectRunner, state_dir: PathBuf) -> Self {
        let saved = persistence::load_active_jobs(&state_dir);
        Self {
            state: ProjectorState::new(),
            runner,
            renderer: Renderer::new(),
            state_dir,
            saved,
            awaiting: HashSet::new(),
            follow_up: None,
            detached: false,
        }
    }

    pub fn run(mut self, intent: Intent, detach_after: Option<Duration>) -> RunOutcome {
        self.begin(intent);
        let started = Instant::now();

        while !self.settled() {
            match self.runner.next_event(TICK) {
                Some(event) => self.handle_event(event),
                None => self.dispatch(Msg::Tick),
            }
            self.resolve_follow_up();

            let expired = detach_after.is_some_and(|limit| started.elapsed() >= limit);
            if expired && !self.detached {
                engine_info!("Detaching after {:?}", started.elapsed());
                self.detached = true;
                self.dispatch(Msg::ViewClosed);
            }
        }

        self.persist();
        self.outcome()
    }

    fn begin(&mut self, intent: Intent) {
        match intent {
            Intent::Submit {
                kind,
                workspace_id,
                config,
            } => {
                self.dispatch(Msg::ConfigChanged {
                    kind,
                    workspace_id,
                    config,
                });
                self.dispatch(Msg::SubmitClicked);
            }
            Intent::Watch { job_id, kind } => {
                self.dispatch(Msg::ReconnectRequested { job_id, kind });
            }
            Intent::Resume => {
                let saved = self.saved.clone();
                if saved.is_empty() {
                    println!("{}", stamped("nothing to resume"));
                }
                self.dispatch(Msg::RestoreActiveJobs(saved));
            }
            Intent::Cancel { job_id, kind } => {
                self.follow_up = Some(FollowUp::Cancel(job_id.clone()));
                self.dispatch(Msg::ReconnectRequested { job_id, kind });
            }
            Intent::Restart { job_id, config } => {
                self.follow_up = Some(FollowUp::Restart(job_id.clone(), config));
                self.dispatch(Msg::ReconnectRequested {
                    job_id,
                    kind: JobKind::Document,
                });
            }
        }
    }

    fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;

        for effect in &effects {
            if let Effect::Cancel { job_id, .. } | Effect::Restart { job_id, .. } = effect {
                self.awaiting.insert(job_id.clone());
            }
        }
        for effect in self.runner.enqueue(effects) {
            self.present(effect);
        }

        if self.state.consume_dirty() {
            for line in self.renderer.render(&self.state) {
                println!("{}", stamped(&line));
            }
            self.persist();
        }
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match &event {
            EngineEvent::CancelFinished { job_id, outcome } => {
                println!("{}", stamped(&format!("[{job_id}] cancel: {outcome:?}")));
                self.awaiting.remove(job_id);
            }
            EngineEvent::Restarted { job_id, .. } => {
                self.awaiting.remove(job_id);
            }
            EngineEvent::SubmitFailed {
                job_id: Some(job_id),
                ..
            } => {
                self.awaiting.remove(job_id);
            }
            _ => {}
        }
        if let Some(msg) = event_to_msg(event, &self.state) {
            self.dispatch(msg);
        }
    }

    fn present(&mut self, effect: Effect) {
        match effect {
            Effect::OpenResult { job_id, kind } => {
                let items = self
                    .state
                    .handle(&job_id)
                    .map(|handle| handle.items().len())
                    .unwrap_or_default();
                let line = match kind {
                    JobKind::Document => format!("[{job_id}] document is ready"),
                    JobKind::TestQuestions => format!("[{job_id}] {items} question(s) ready"),
                };
                println!("{}", stamped(&line));
            }
            Effect::ResetForm => engine_debug!("Form reset"),
            other => engine_debug!("Nothing to present for {:?}", other),
        }
    }

    /// Fires a held-back cancel or restart once the reconnect settled.
    fn resolve_follow_up(&mut self) {
        let Some(follow_up) = self.follow_up.clone() else {
            return;
        };
        let (job_id, msg) = match follow_up {
            FollowUp::Cancel(job_id) => {
                let msg = Msg::CancelClicked {
                    job_id: job_id.clone(),
                };
                (job_id, msg)
            }
            FollowUp::Restart(job_id, config) => {
                let msg = Msg::RestartClicked {
                    job_id: job_id.clone(),
                    config,
                };
                (job_id, msg)
            }
        };
        let Some(phase) = self.state.job_phase(&job_id) else {
            self.follow_up = None;
            return;
        };
        if phase == Phase::Connecting {
            return;
        }
        self.follow_up = None;

        let applicable = match msg {
            Msg::CancelClicked { .. } => matches!(phase, Phase::Observing { .. }),
            _ => phase.is_terminal(),
        };
        if applicable {
            self.dispatch(msg);
        } else {
            println!(
                "{}",
                stamped(&format!("[{job_id}] nothing to do, job is {}", phase_text(phase)))
            );
        }
    }

    /// Nothing is being submitted, observed, or waited on.
    fn settled(&self) -> bool {
        let view = self.state.view();
        !view.submitting
            && self.follow_up.is_none()
            && !self.state.has_pending_cancel()
            && self.awaiting.is_empty()
            && !view.jobs.iter().any(|row| row.phase.has_observer())
    }

    fn persist(&mut self) {
        let active = self.state.active_jobs_snapshot();
        if active != self.saved {
            persistence::save_active_jobs(&self.state_dir, &active);
            self.saved = active;
        }
    }

    fn outcome(&self) -> RunOutcome {
        let view = self.state.view();
        if let Some(error) = view.form_error {
            return RunOutcome::Failed(error);
        }
        if self.detached {
            return RunOutcome::Detached;
        }
        let Some(row) = view.focused else {
            return RunOutcome::Finished;
        };
        match (row.phase, row.error) {
            (
                Phase::Aborted {
                    reason: AbortReason::Cancelled,
                },
                _,
            ) => RunOutcome::Finished,
            (Phase::Detached, _) => RunOutcome::Detached,
            (Phase::Aborted { .. }, None) => {
                RunOutcome::Failed(format!("{}: {}", row.job_id, phase_text(row.phase)))
            }
            (_, Some(error)) => RunOutcome::Failed(format!("{}: {error}", row.job_id)),
            _ => RunOutcome::Finished,
        }
    }
}
