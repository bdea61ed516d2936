use std::sync::Arc;

use anyhow::Result;

use crate::{storage::UsageStorage, tracker::sampler::Sample};

use super::module::SampleProcessor;

/// Bridges [AggregationModule](super::AggregationModule) and [UsageStorage]: every sample is
/// merged into its daily bucket and appended to the raw activity log.
pub struct BucketSaver<S> {
    storage: Arc<S>,
}

impl<S: UsageStorage> BucketSaver<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

impl<S: UsageStorage> SampleProcessor for BucketSaver<S> {
    async fn process_next(&mut self, sample: Sample) -> Result<()> {
        self.storage
            .upsert_daily_bucket(sample.bucket_upsert())
            .await?;
        self.storage.append_activity(sample.activity_record()).await?;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}
