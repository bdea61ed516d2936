//! The tracking engine and everything around it.
//!
//! [launch] wires three tasks together:
//!  - [idle::IdleMonitor] polls system input and raises [events::IdleEvent]s.
//!  - [engine::TrackingEngine] owns the session state machine, runs the sampler timer and
//!    forwards accepted samples.
//!  - [AggregationModule] merges forwarded samples into daily buckets.
//!
//! The front-end talks to the engine through [TrackerHandle] and listens on
//! [RunningTracker::events].

use std::sync::Arc;

use anyhow::{anyhow, Result};
use engine::{TrackerMessage, TrackingEngine, TrackingSnapshot};
use events::{IdleEvent, UiEvent, UserCommand};
use idle::{IdleEvaluator, IdleMonitor};
use lifecycle::SessionLifecycleManager;
use sampler::ActivitySampler;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    aggregation::{bucket_saver::BucketSaver, AggregationModule},
    storage::UsageStorage,
    utils::clock::Clock,
    window_api::{identity::WindowIdentityResolver, SystemActivity},
};

use config::TrackerConfig;

pub mod config;
pub mod engine;
pub mod events;
pub mod idle;
pub mod lifecycle;
pub mod sampler;
pub mod shutdown;
pub mod state;

const COMMAND_BUFFER: usize = 32;
const IDLE_EVENT_BUFFER: usize = 16;

/// Sends commands to a running engine. Cheap to clone.
#[derive(Clone)]
pub struct TrackerHandle {
    sender: mpsc::Sender<TrackerMessage>,
}

impl TrackerHandle {
    async fn send(&self, message: TrackerMessage) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| anyhow!("Tracker is not running"))
    }

    pub async fn command(&self, command: UserCommand) -> Result<()> {
        self.send(TrackerMessage::Command(command)).await
    }

    pub async fn start(&self) -> Result<()> {
        self.command(UserCommand::StartTracking).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.command(UserCommand::PauseTracking).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.command(UserCommand::ResumeTracking).await
    }

    pub async fn stop(&self, user_id: Option<String>) -> Result<()> {
        self.command(UserCommand::StopTracking { user_id }).await
    }

    pub async fn snapshot(&self) -> Result<TrackingSnapshot> {
        let (reply, response) = oneshot::channel();
        self.send(TrackerMessage::Snapshot(reply)).await?;
        response
            .await
            .map_err(|_| anyhow!("Tracker stopped before answering"))
    }
}

pub struct RunningTracker {
    pub handle: TrackerHandle,
    pub events: mpsc::UnboundedReceiver<UiEvent>,
    shutdown: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<Result<()>>)>,
}

impl RunningTracker {
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops every task and waits until pending samples are written.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.cancel();
        for (name, task) in self.tasks {
            match task.await {
                Ok(Ok(())) => info!("{name} stopped"),
                Ok(Err(e)) => error!("{name} stopped with an error {e:?}"),
                Err(e) => error!("{name} panicked {e:?}"),
            }
        }
        Ok(())
    }
}

/// Starts the idle monitor, the engine and aggregation.
pub fn launch<S: UsageStorage>(
    config: &TrackerConfig,
    storage: Arc<S>,
    resolver: Box<dyn WindowIdentityResolver>,
    activity: Box<dyn SystemActivity>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
) -> RunningTracker {
    let (idle_sender, idle_receiver) = mpsc::channel::<IdleEvent>(IDLE_EVENT_BUFFER);
    let monitor = IdleMonitor::new(
        idle_sender,
        activity,
        shutdown.clone(),
        IdleEvaluator::new(config.idle_timeout()),
        config.idle_poll_interval(),
        clock.clone(),
    );

    let mut tracker = spawn_core(config, storage, resolver, idle_receiver, clock, shutdown);
    tracker
        .tasks
        .push(("Idle monitor", tokio::spawn(monitor.run())));
    tracker
}

/// Starts the engine and aggregation, with idle events supplied by the caller.
pub fn spawn_core<S: UsageStorage>(
    config: &TrackerConfig,
    storage: Arc<S>,
    resolver: Box<dyn WindowIdentityResolver>,
    idle_events: mpsc::Receiver<IdleEvent>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
) -> RunningTracker {
    let (message_sender, message_receiver) = mpsc::channel(COMMAND_BUFFER);
    let (sample_sender, sample_receiver) = mpsc::unbounded_channel();
    let (ui_sender, ui_receiver) = mpsc::unbounded_channel();

    let aggregation = AggregationModule::new(
        sample_receiver,
        BucketSaver::new(storage.clone()),
        ui_sender.clone(),
    );
    let lifecycle = Arc::new(SessionLifecycleManager::new(
        storage,
        config.min_session(),
        config.session_prompt_timeout(),
    ));
    let sampler = ActivitySampler::new(resolver, config.tracking_interval(), clock.clone());
    let engine = TrackingEngine::new(
        sampler,
        message_receiver,
        idle_events,
        sample_sender,
        ui_sender,
        lifecycle,
        clock,
        shutdown.clone(),
    );

    RunningTracker {
        handle: TrackerHandle {
            sender: message_sender,
        },
        events: ui_receiver,
        shutdown,
        // Engine first: aggregation only finishes after the engine dropped its sample sender.
        tasks: vec![
            ("Tracking engine", tokio::spawn(engine.run())),
            ("Aggregation", tokio::spawn(aggregation.run())),
        ],
    }
}
