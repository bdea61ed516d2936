use std::future::Future;

use anyhow::Result;

use crate::tracker::sampler::Sample;

/// Consumes accepted samples. The durable bucket saver is one implementation, a remote sink
/// would be another.
pub trait SampleProcessor: Send {
    fn process_next(&mut self, sample: Sample) -> impl Future<Output = Result<()>> + Send;

    fn finalize(&mut self) -> impl Future<Output = Result<()>> + Send;
}
