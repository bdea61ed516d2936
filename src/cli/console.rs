use std::{collections::VecDeque, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{wrappers::LinesStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    storage::UsageStorage,
    tracker::{
        config::TrackerConfig,
        events::{SessionInfo, SessionInfoRequest, UiEvent},
        launch,
        lifecycle::{DiscardReason, SessionOutcome},
        shutdown::detect_shutdown,
        state::TrackingState,
        RunningTracker,
    },
    utils::{
        clock::DefaultClock,
        time::{format_duration, format_seconds},
    },
    window_api::{identity::RegistryResolver, GenericWindowManager},
};

use super::open_storage;

const HELP: &str = "Commands: start, pause, resume, stop, status, help, quit";
const CANCEL: &str = "/cancel";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Pause,
    Resume,
    Stop,
    Status,
    Help,
    Quit,
}

/// Parses a line typed while no session prompt is open. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>> {
    let command = match line.trim().to_lowercase().as_str() {
        "" => return Ok(None),
        "start" => ConsoleCommand::Start,
        "pause" => ConsoleCommand::Pause,
        "resume" => ConsoleCommand::Resume,
        "stop" => ConsoleCommand::Stop,
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(anyhow!("Unknown command '{other}'. {HELP}")),
    };
    Ok(Some(command))
}

/// While a prompt is open, plain lines answer it and `/`-prefixed lines are commands.
/// `/cancel` belongs to the prompt.
pub fn escaped_command(line: &str) -> Option<&str> {
    let line = line.trim();
    line.strip_prefix('/').filter(|_| line != CANCEL)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptStep {
    Title,
    Description,
    Tags,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PromptProgress {
    Ask(&'static str),
    Done(SessionInfo),
    Cancelled,
}

/// Collects title, description and tags for a finished session one line at a time.
#[derive(Debug)]
pub struct SessionPrompt {
    step: PromptStep,
    info: SessionInfo,
}

impl Default for SessionPrompt {
    fn default() -> Self {
        Self {
            step: PromptStep::Title,
            info: SessionInfo::default(),
        }
    }
}

impl SessionPrompt {
    pub fn question(&self) -> &'static str {
        match self.step {
            PromptStep::Title => {
                "Session title (leave empty to discard, /cancel to dismiss, /<command> to run a command):"
            }
            PromptStep::Description => "Description (optional):",
            PromptStep::Tags => "Tags, separated by commas (optional):",
        }
    }

    pub fn feed(&mut self, line: &str) -> PromptProgress {
        let line = line.trim();
        if line == CANCEL {
            return PromptProgress::Cancelled;
        }
        match self.step {
            PromptStep::Title => {
                self.info.title = line.to_string();
                if line.is_empty() {
                    return PromptProgress::Done(std::mem::take(&mut self.info));
                }
                self.step = PromptStep::Description;
            }
            PromptStep::Description => {
                self.info.description = Some(line.to_string()).filter(|v| !v.is_empty());
                self.step = PromptStep::Tags;
            }
            PromptStep::Tags => {
                self.info.tags = line
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(String::from)
                    .collect();
                return PromptProgress::Done(std::mem::take(&mut self.info));
            }
        }
        PromptProgress::Ask(self.question())
    }
}

#[derive(PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Runs the tracker in the foreground until `quit` or Ctrl-C.
pub async fn run_tracker(app_dir: PathBuf, user_id: Option<String>) -> Result<()> {
    let config = TrackerConfig::load(&app_dir)?;
    let storage = Arc::new(open_storage(&app_dir)?);
    let resolver = RegistryResolver::new(
        Box::new(GenericWindowManager::new()?),
        config.registry.clone(),
    );
    let activity = GenericWindowManager::new()?;

    let tracker = launch(
        &config,
        storage.clone(),
        Box::new(resolver),
        Box::new(activity),
        Arc::new(DefaultClock),
        CancellationToken::new(),
    );
    tokio::spawn(detect_shutdown(tracker.shutdown_token()));
    info!("Tracker is running from {app_dir:?}");
    println!("Worktally is ready. {HELP}");

    Console {
        tracker,
        storage,
        user_id,
        prompts: VecDeque::new(),
        prompt: SessionPrompt::default(),
        last_tracked: None,
    }
    .run()
    .await
}

struct Console<S> {
    tracker: RunningTracker,
    storage: Arc<S>,
    user_id: Option<String>,
    /// Prompts waiting for an answer. The front one is being asked.
    prompts: VecDeque<SessionInfoRequest>,
    prompt: SessionPrompt,
    last_tracked: Option<(Arc<str>, Arc<str>)>,
}

impl<S: UsageStorage> Console<S> {
    async fn run(mut self) -> Result<()> {
        let shutdown = self.tracker.shutdown_token();
        let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
        let mut stdin_open = true;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(event) = self.tracker.events.recv() => self.on_event(event),
                line = lines.next(), if stdin_open => match line {
                    Some(Ok(line)) => {
                        if self.on_line(&line).await == Flow::Quit {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("Failed to read from stdin {e:?}");
                        stdin_open = false;
                    }
                    None => {
                        println!("Input closed, press Ctrl-C to stop tracking");
                        stdin_open = false;
                    }
                },
            }
        }

        for request in self.prompts.drain(..) {
            request.discard();
        }
        self.tracker.shutdown().await
    }

    async fn on_line(&mut self, line: &str) -> Flow {
        let line = if self.prompts.is_empty() {
            line
        } else {
            match escaped_command(line) {
                Some(command) => command,
                None => {
                    self.answer_prompt(line);
                    return Flow::Continue;
                }
            }
        };

        let command = match parse_command(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Flow::Continue,
            Err(e) => {
                println!("{e}");
                return Flow::Continue;
            }
        };
        let handle = &self.tracker.handle;
        let result = match command {
            ConsoleCommand::Start => handle.start().await,
            ConsoleCommand::Pause => handle.pause().await,
            ConsoleCommand::Resume => handle.resume().await,
            ConsoleCommand::Stop => handle.stop(self.user_id.clone()).await,
            ConsoleCommand::Status => self.print_status().await,
            ConsoleCommand::Help => {
                println!("{HELP}");
                Ok(())
            }
            ConsoleCommand::Quit => return Flow::Quit,
        };
        if let Err(e) = result {
            error!("Command {command:?} failed {e:?}");
            println!("{command:?} failed: {e}");
        }
        Flow::Continue
    }

    fn answer_prompt(&mut self, line: &str) {
        match self.prompt.feed(line) {
            PromptProgress::Ask(question) => {
                println!("{question}");
                return;
            }
            PromptProgress::Done(info) => {
                if let Some(request) = self.prompts.pop_front() {
                    request.respond(info);
                }
            }
            PromptProgress::Cancelled => {
                if let Some(request) = self.prompts.pop_front() {
                    request.discard();
                }
            }
        }
        self.prompt = SessionPrompt::default();
        if let Some(next) = self.prompts.front() {
            ask_about(next, &self.prompt);
        }
    }

    fn on_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::WindowTracked(sample) => {
                let current = (sample.app.clone(), sample.language.clone());
                if self.last_tracked.as_ref() != Some(&current) {
                    println!("Now tracking {} ({})", sample.app, sample.language);
                    self.last_tracked = Some(current);
                }
            }
            UiEvent::StateChanged(state) => {
                if state != TrackingState::Recording {
                    self.last_tracked = None;
                }
                println!("Tracking is {}", state_name(state));
            }
            UiEvent::AutoPaused(cause) => {
                info!("Auto paused because of {cause:?}");
            }
            UiEvent::AutoResumed => println!("Welcome back, tracking resumed"),
            UiEvent::Notify(message) => println!("! {message}"),
            UiEvent::GetSessionInfo(request) => {
                if self.prompts.is_empty() {
                    ask_about(&request, &self.prompt);
                }
                self.prompts.push_back(request);
            }
            UiEvent::SessionFinalized(SessionOutcome::Created(session)) => {
                println!(
                    "Saved session '{}' ({}) as {}",
                    session.title,
                    format_seconds(session.duration_seconds),
                    session.id
                );
            }
            UiEvent::SessionFinalized(SessionOutcome::Discarded(reason)) => {
                println!("Session discarded, {}", discard_message(reason));
            }
        }
    }

    async fn print_status(&self) -> Result<()> {
        let snapshot = self.tracker.handle.snapshot().await?;
        println!("Tracking is {}", state_name(snapshot.state));
        if let Some(start) = snapshot.session_start {
            println!(
                "Session started at {}, active for {}",
                start.with_timezone(&Local).format("%H:%M:%S"),
                format_duration(snapshot.active_duration)
            );
        }
        if let Some(latest) = self
            .storage
            .latest_activity(Local::now().date_naive())
            .await?
        {
            println!(
                "Last recorded {} at {}: {}",
                latest.app,
                latest.observed_at.format("%H:%M:%S"),
                latest.title
            );
        }
        Ok(())
    }
}

fn ask_about(request: &SessionInfoRequest, prompt: &SessionPrompt) {
    println!(
        "Session of {} finished.",
        format_duration(request.active_duration)
    );
    println!("{}", prompt.question());
}

fn state_name(state: TrackingState) -> &'static str {
    match state {
        TrackingState::Idle => "stopped",
        TrackingState::Recording => "recording",
        TrackingState::Paused => "paused",
    }
}

fn discard_message(reason: DiscardReason) -> &'static str {
    match reason {
        DiscardReason::TooShort => "it was too short",
        DiscardReason::Cancelled => "the prompt was dismissed",
        DiscardReason::TimedOut => "nobody answered the prompt",
        DiscardReason::EmptyTitle => "no title was given",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{escaped_command, parse_command, ConsoleCommand, PromptProgress, SessionPrompt};

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command(" Start ").unwrap(), Some(ConsoleCommand::Start));
        assert_eq!(parse_command("exit").unwrap(), Some(ConsoleCommand::Quit));
        assert_eq!(parse_command("").unwrap(), None);
        assert!(parse_command("launch").is_err());
    }

    #[test]
    fn test_prompt_collects_all_fields() {
        let mut prompt = SessionPrompt::default();

        assert!(matches!(prompt.feed("Parser work"), PromptProgress::Ask(_)));
        assert!(matches!(prompt.feed(""), PromptProgress::Ask(_)));
        let PromptProgress::Done(info) = prompt.feed("rust, work,, ") else {
            panic!("Expected the prompt to finish");
        };

        assert_eq!(info.title, "Parser work");
        assert_eq!(info.description, None);
        assert_eq!(
            info.tags,
            BTreeSet::from(["rust".to_string(), "work".to_string()])
        );
    }

    #[test]
    fn test_empty_title_finishes_immediately() {
        let mut prompt = SessionPrompt::default();

        let PromptProgress::Done(info) = prompt.feed("   ") else {
            panic!("Expected the prompt to finish");
        };
        assert!(info.title.is_empty());
    }

    #[test]
    fn test_cancel_at_any_step() {
        let mut prompt = SessionPrompt::default();
        prompt.feed("Title");

        assert_eq!(prompt.feed("/cancel"), PromptProgress::Cancelled);
    }

    #[test]
    fn test_commands_need_a_slash_while_prompting() {
        assert_eq!(escaped_command("quit"), None);
        assert_eq!(escaped_command(" /quit "), Some("quit"));
        assert_eq!(escaped_command("/cancel"), None);

        let mut prompt = SessionPrompt::default();
        assert!(matches!(prompt.feed("quit"), PromptProgress::Ask(_)));
        assert!(matches!(prompt.feed(""), PromptProgress::Ask(_)));
        let PromptProgress::Done(info) = prompt.feed("") else {
            panic!("Expected the prompt to finish");
        };
        assert_eq!(info.title, "quit");
    }
}
