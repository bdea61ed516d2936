use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Local};
use tracing::{debug, trace, warn};

use crate::{
    storage::entities::{ActivityRecordEntity, BucketKey, BucketUpsert},
    utils::clock::Clock,
    window_api::identity::WindowIdentityResolver,
};

pub const UNKNOWN_LANGUAGE: &str = "Unknown";

/// One observation of the foreground window, worth exactly one tick of tracked time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub app: Arc<str>,
    pub title: Arc<str>,
    pub language: Arc<str>,
    pub icon: Vec<u8>,
    pub observed_at: DateTime<Local>,
    pub duration: Duration,
}

impl Sample {
    pub fn bucket_upsert(&self) -> BucketUpsert {
        BucketUpsert {
            key: BucketKey {
                date: self.observed_at.date_naive(),
                app: self.app.clone(),
                language: Some(self.language.clone()),
            },
            icon: self.icon.clone(),
            delta_seconds: self.duration.as_secs(),
        }
    }

    pub fn activity_record(&self) -> ActivityRecordEntity {
        ActivityRecordEntity {
            app: self.app.clone(),
            title: self.title.clone(),
            language: Some(self.language.clone()),
            observed_at: self.observed_at,
            duration_seconds: self.duration.as_secs(),
        }
    }
}

/// Turns a tick into a [Sample] by asking the resolver for the foreground window.
pub struct ActivitySampler {
    resolver: Box<dyn WindowIdentityResolver>,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl ActivitySampler {
    pub fn new(
        resolver: Box<dyn WindowIdentityResolver>,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            resolver,
            interval,
            clock,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `None` for unknown applications and for failed lookups. Neither is an error
    /// for the tracking loop.
    pub fn sample(&mut self) -> Option<Sample> {
        match self.resolver.resolve() {
            Ok(Some(identity)) => {
                let sample = Sample {
                    app: identity.app,
                    title: identity.title,
                    language: identity
                        .language
                        .unwrap_or_else(|| UNKNOWN_LANGUAGE.into()),
                    icon: identity.icon,
                    observed_at: self.clock.local_time(),
                    duration: self.interval,
                };
                debug!("Sampled {} ({})", sample.app, sample.language);
                Some(sample)
            }
            Ok(None) => {
                trace!("Foreground window is not a known application");
                None
            }
            Err(e) => {
                warn!("Failed to resolve the foreground window, skipping tick {e:?}");
                None
            }
        }
    }
}
