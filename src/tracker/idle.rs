use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{utils::clock::Clock, window_api::SystemActivity};

use super::events::IdleEvent;

pub struct IdleEvaluator {
    threshold: Duration,
}

impl IdleEvaluator {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn is_idle(&self, idle_time: Duration) -> bool {
        idle_time >= self.threshold
    }
}

/// Polls system idle time and lock state for the lifetime of the process. Raises one event per
/// transition, so a long idle excursion produces a single [IdleEvent::ThresholdExceeded].
pub struct IdleMonitor {
    next: mpsc::Sender<IdleEvent>,
    source: Box<dyn SystemActivity>,
    shutdown: CancellationToken,
    evaluator: IdleEvaluator,
    poll_frequency: Duration,
    time_provider: Arc<dyn Clock>,
    idle: bool,
    locked: bool,
}

impl IdleMonitor {
    pub fn new(
        next: mpsc::Sender<IdleEvent>,
        source: Box<dyn SystemActivity>,
        shutdown: CancellationToken,
        evaluator: IdleEvaluator,
        poll_frequency: Duration,
        time_provider: Arc<dyn Clock>,
    ) -> Self {
        Self {
            next,
            source,
            shutdown,
            evaluator,
            poll_frequency,
            time_provider,
            idle: false,
            locked: false,
        }
    }

    /// Reads the system state once and returns the events the change produced.
    fn poll(&mut self) -> Result<Vec<IdleEvent>> {
        let idle_time = self.source.get_idle_time()?;
        let locked = self.source.is_screen_locked()?;
        let idle = self.evaluator.is_idle(idle_time);

        let mut events = vec![];
        if locked && !self.locked {
            events.push(IdleEvent::Locked);
        }
        if idle && !self.idle {
            events.push(IdleEvent::ThresholdExceeded { idle_time });
        }
        let was_away = self.idle || self.locked;
        if was_away && !idle && !locked {
            events.push(IdleEvent::Active);
        }

        self.idle = idle;
        self.locked = locked;
        Ok(events)
    }

    /// Executes the polling loop until shutdown or until the tracker goes away.
    pub async fn run(mut self) -> Result<()> {
        let mut poll_point = self.time_provider.instant();
        loop {
            poll_point += self.poll_frequency;

            match self.poll() {
                Ok(events) => {
                    for event in events {
                        info!("Detected {event:?}");
                        if self.next.send(event).await.is_err() {
                            debug!("Tracker is gone, stopping idle monitor");
                            return Ok(());
                        }
                    }
                }
                Err(e) => {
                    error!("Encountered an error while reading idle state {:?}", e)
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(poll_point) => ()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use anyhow::{anyhow, Result};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        tracker::events::IdleEvent,
        utils::clock::DefaultClock,
        window_api::{MockSystemActivity, SystemActivity},
    };

    use super::{IdleEvaluator, IdleMonitor};

    /// Replays a fixed list of (idle seconds, locked) readings, repeating the last one.
    struct ScriptedActivity {
        readings: Arc<Mutex<VecDeque<(u64, bool)>>>,
        current: (u64, bool),
    }

    impl ScriptedActivity {
        fn new(readings: &[(u64, bool)]) -> Self {
            Self {
                readings: Arc::new(Mutex::new(readings.iter().copied().collect())),
                current: (0, false),
            }
        }

        fn advance(&mut self) {
            if let Some(next) = self.readings.lock().unwrap().pop_front() {
                self.current = next;
            }
        }
    }

    impl SystemActivity for ScriptedActivity {
        fn get_idle_time(&mut self) -> Result<Duration> {
            self.advance();
            Ok(Duration::from_secs(self.current.0))
        }

        fn is_screen_locked(&mut self) -> Result<bool> {
            Ok(self.current.1)
        }
    }

    fn monitor(source: Box<dyn SystemActivity>) -> (IdleMonitor, mpsc::Receiver<IdleEvent>) {
        let (sender, receiver) = mpsc::channel(16);
        let monitor = IdleMonitor::new(
            sender,
            source,
            CancellationToken::new(),
            IdleEvaluator::new(Duration::from_secs(60)),
            Duration::from_secs(2),
            Arc::new(DefaultClock),
        );
        (monitor, receiver)
    }

    fn poll_all(monitor: &mut IdleMonitor, polls: usize) -> Vec<IdleEvent> {
        (0..polls)
            .flat_map(|_| monitor.poll().unwrap())
            .collect()
    }

    #[test]
    fn test_evaluator_threshold_is_inclusive() {
        let evaluator = IdleEvaluator::new(Duration::from_secs(60));
        assert!(!evaluator.is_idle(Duration::from_secs(59)));
        assert!(evaluator.is_idle(Duration::from_secs(60)));
    }

    #[test]
    fn test_one_event_per_idle_excursion() {
        let source = ScriptedActivity::new(&[(10, false), (60, false), (62, false), (64, false)]);
        let (mut monitor, _receiver) = monitor(Box::new(source));

        let events = poll_all(&mut monitor, 4);

        assert_eq!(
            events,
            vec![IdleEvent::ThresholdExceeded {
                idle_time: Duration::from_secs(60)
            }]
        );
    }

    #[test]
    fn test_input_after_idle_reports_active() {
        let source = ScriptedActivity::new(&[(70, false), (72, false), (1, false), (3, false)]);
        let (mut monitor, _receiver) = monitor(Box::new(source));

        let events = poll_all(&mut monitor, 4);

        assert_eq!(events.len(), 2);
        assert_eq!(events[1], IdleEvent::Active);
    }

    #[test]
    fn test_lock_is_raised_regardless_of_idle_time() {
        let source = ScriptedActivity::new(&[(0, false), (0, true), (2, true), (0, false)]);
        let (mut monitor, _receiver) = monitor(Box::new(source));

        let events = poll_all(&mut monitor, 4);

        assert_eq!(events, vec![IdleEvent::Locked, IdleEvent::Active]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_survives_source_errors() {
        let mut source = MockSystemActivity::new();
        let mut calls = 0;
        source.expect_get_idle_time().returning(move || {
            calls += 1;
            if calls == 1 {
                Err(anyhow!("screensaver extension missing"))
            } else {
                Ok(Duration::from_secs(120))
            }
        });
        source.expect_is_screen_locked().returning(|| Ok(false));
        let (monitor, mut receiver) = monitor(Box::new(source));
        let shutdown = monitor.shutdown.clone();

        let handle = tokio::spawn(monitor.run());

        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, IdleEvent::ThresholdExceeded { .. }));

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
