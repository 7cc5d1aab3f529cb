mod app;
mod cli;
mod config;
mod effects;
mod persistence;
mod render;

use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use engine_logging::engine_info;
use genwatch_core::{GenerationConfig, JobId, JobKind};
use genwatch_engine::ensure_state_dir;

use crate::app::{App, Intent, RunOutcome};
use crate::cli::{Cli, Command};
use crate::config::AppConfig;
use crate::effects::EffectRunner;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("invalid configuration")?;
    ensure_state_dir(&config.state_dir).context("could not prepare the state directory")?;
    engine_logging::initialize(config.log_destination, config.log_level, &config.state_dir);
    engine_info!("genwatch starting against {}", config.base_url);

    let runner =
        EffectRunner::new(config.engine_settings()).context("could not start the engine")?;

    let (intent, detach_after) = match cli.command {
        Command::Answer {
            test_id,
            question_id,
            answer,
        } => {
            runner
                .answer(&JobId::new(test_id), &question_id, &answer)
                .context("answer was not recorded")?;
            println!("answer recorded");
            return Ok(());
        }
        Command::Finish { test_id } => {
            runner
                .complete_test(&JobId::new(test_id))
                .context("test was not completed")?;
            println!("test completed");
            return Ok(());
        }
        Command::Document {
            workspace,
            form,
            pages,
            watch,
        } => {
            let config = GenerationConfig {
                page_count: pages,
                ..form.into_config()
            };
            (
                Intent::Submit {
                    kind: JobKind::Document,
                    workspace_id: workspace,
                    config,
                },
                watch.detach_after,
            )
        }
        Command::Quiz {
            workspace,
            form,
            questions,
            watch,
        } => {
            let config = GenerationConfig {
                question_count: questions,
                ..form.into_config()
            };
            (
                Intent::Submit {
                    kind: JobKind::TestQuestions,
                    workspace_id: workspace,
                    config,
                },
                watch.detach_after,
            )
        }
        Command::Watch {
            job_id,
            kind,
            watch,
        } => (
            Intent::Watch {
                job_id: JobId::new(job_id),
                kind: kind.into(),
            },
            watch.detach_after,
        ),
        Command::Resume { watch } => (Intent::Resume, watch.detach_after),
        Command::Cancel { job_id, kind } => (
            Intent::Cancel {
                job_id: JobId::new(job_id),
                kind: kind.into(),
            },
            None,
        ),
        Command::Restart {
            job_id,
            title,
            instructions,
            watch,
        } => {
            let config = title.map(|title| GenerationConfig {
                title,
                custom_instructions: instructions,
                ..GenerationConfig::default()
            });
            (
                Intent::Restart {
                    job_id: JobId::new(job_id),
                    config,
                },
                watch.detach_after,
            )
        }
    };

    let app = App::new(runner, config.state_dir.clone());
    match app.run(intent, detach_after.map(Duration::from_secs)) {
        RunOutcome::Finished => Ok(()),
        RunOutcome::Detached => {
            println!("stopped watching; run `genwatch resume` to pick the job(s) back up");
            Ok(())
        }
        RunOutcome::Failed(reason) => bail!(reason),
    }
}
