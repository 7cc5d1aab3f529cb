use clap::{Args, Parser, Subcommand, ValueEnum};
use genwatch_core::{GenerationConfig, JobKind, WebSearchMode};

#[derive(Parser, Debug)]
#[command(author, version, about = "Submit generation jobs and watch them until they finish")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a document and watch its log.
    Document {
        #[arg(long)]
        workspace: String,
        #[command(flatten)]
        form: FormArgs,
        /// Requested page count.
        #[arg(long)]
        pages: Option<u32>,
        #[command(flatten)]
        watch: WatchArgs,
    },
    /// Generate test questions and print them as they stream in.
    Quiz {
        #[arg(long)]
        workspace: String,
        #[command(flatten)]
        form: FormArgs,
        /// Requested number of questions.
        #[arg(long)]
        questions: Option<u32>,
        #[command(flatten)]
        watch: WatchArgs,
    },
    /// Attach to a job submitted earlier.
    Watch {
        job_id: String,
        #[arg(long, value_enum, default_value_t = KindArg::Document)]
        kind: KindArg,
        #[command(flatten)]
        watch: WatchArgs,
    },
    /// Reattach to every job that was still running when the last session ended.
    Resume {
        #[command(flatten)]
        watch: WatchArgs,
    },
    /// Stop watching a running job and ask the backend to cancel it.
    Cancel {
        job_id: String,
        #[arg(long, value_enum, default_value_t = KindArg::Document)]
        kind: KindArg,
    },
    /// Run a finished document again, optionally with a new title and instructions.
    Restart {
        job_id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, requires = "title")]
        instructions: Option<String>,
        #[command(flatten)]
        watch: WatchArgs,
    },
    /// Record an answer for one question of a test.
    Answer {
        test_id: String,
        question_id: String,
        answer: String,
    },
    /// Mark a test as completed.
    Finish { test_id: String },
}

#[derive(Args, Debug, Clone)]
pub struct FormArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub topic: Option<String>,
    #[arg(long)]
    pub style: Option<String>,
    #[arg(long, value_enum, default_value_t = WebSearchArg::Off)]
    pub web_search: WebSearchArg,
    /// Free-form instructions passed to the generator.
    #[arg(long)]
    pub instructions: Option<String>,
}

impl FormArgs {
    pub fn into_config(self) -> GenerationConfig {
        GenerationConfig {
            title: self.title,
            topic: self.topic,
            style: self.style,
            web_search: self.web_search.into(),
            custom_instructions: self.instructions,
            ..GenerationConfig::default()
        }
    }
}

#[derive(Args, Debug, Clone, Copy, Default)]
pub struct WatchArgs {
    /// Stop watching after this many seconds; the job keeps running and can be resumed.
    #[arg(long, value_name = "SECS")]
    pub detach_after: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindArg {
    Document,
    Quiz,
}

impl From<KindArg> for JobKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Document => JobKind::Document,
            KindArg::Quiz => JobKind::TestQuestions,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebSearchArg {
    Off,
    Auto,
    Required,
}

impl From<WebSearchArg> for WebSearchMode {
    fn from(mode: WebSearchArg) -> Self {
        match mode {
            WebSearchArg::Off => WebSearchMode::Off,
            WebSearchArg::Auto => WebSearchMode::Auto,
            WebSearchArg::Required => WebSearchMode::Required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn document_flags_build_a_config() {
        let cli = Cli::try_parse_from([
            "genwatch",
            "document",
            "--workspace",
            "ws-1",
            "--title",
            "Cells",
            "--pages",
            "4",
            "--web-search",
            "auto",
            "--detach-after",
            "30",
        ])
        .unwrap();
        let Command::Document {
            workspace,
            form,
            pages,
            watch,
        } = cli.command
        else {
            panic!("parsed the wrong command");
        };
        assert_eq!(workspace, "ws-1");
        assert_eq!(pages, Some(4));
        assert_eq!(watch.detach_after, Some(30));
        let config = form.into_config();
        assert_eq!(config.title, "Cells");
        assert_eq!(config.web_search, WebSearchMode::Auto);
    }

    #[test]
    fn watch_defaults_to_documents() {
        let cli = Cli::try_parse_from(["genwatch", "watch", "doc-1"]).unwrap();
        let Command::Watch { kind, .. } = cli.command else {
            panic!("parsed the wrong command");
        };
        assert_eq!(JobKind::from(kind), JobKind::Document);
    }
}
