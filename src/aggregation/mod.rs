//! Receives samples forwarded by the tracking engine and merges them into daily buckets.
//! [rollup] turns stored buckets back into totals for reports.

use anyhow::Result;
use module::SampleProcessor;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info_span, Instrument};

use crate::tracker::{events::UiEvent, sampler::Sample};

pub mod bucket_saver;
pub mod module;
pub mod rollup;

/// Drains the sample channel into a [SampleProcessor]. A failed write is reported and dropped,
/// the next sample gets a fresh attempt.
pub struct AggregationModule<Processor> {
    receiver: UnboundedReceiver<Sample>,
    processor: Processor,
    notifier: UnboundedSender<UiEvent>,
}

impl<P: SampleProcessor> AggregationModule<P> {
    pub fn new(
        receiver: UnboundedReceiver<Sample>,
        processor: P,
        notifier: UnboundedSender<UiEvent>,
    ) -> Self {
        Self {
            receiver,
            processor,
            notifier,
        }
    }

    /// Runs until every sample sender is dropped.
    pub async fn run(mut self) -> Result<()> {
        while let Some(sample) = self.receiver.recv().await {
            let span = info_span!("Aggregating sample", app = %sample.app);
            let app = sample.app.clone();
            match self.processor.process_next(sample).instrument(span).await {
                Ok(_) => {
                    debug!("Saved sample of {app}")
                }
                Err(e) => {
                    error!("Error saving sample of {app}: {e:?}");
                    let _ = self
                        .notifier
                        .send(UiEvent::Notify(format!("Failed to save activity: {e}")));
                }
            }
        }

        self.receiver.close();
        self.processor.finalize().await
    }
}
