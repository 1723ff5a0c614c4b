//! Pipeline wiring processors to sinks.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::bulkfhir::ResourceType;

use super::error::ProcessingError;
use super::resource::{JsonCodec, ResourceCodec, ResourceWrapper};
use super::traits::{Output, Processor, Sink};

type SharedProcessor = Arc<Mutex<Box<dyn Processor>>>;
type SharedSink = Arc<Mutex<Box<dyn Sink>>>;

/// Threads FHIR resources through processors and then writes them to sinks.
///
/// Resources are handled one at a time: `process` returns once the resource
/// has gone through every processor that forwarded it and has been written to
/// every sink (or once some stage buffered or dropped it). Processors and
/// sinks must not be shared between pipelines.
pub struct Pipeline {
    codec: Arc<dyn ResourceCodec>,
    processors: Vec<SharedProcessor>,
    sinks: Arc<Vec<SharedSink>>,
    entry: Output,
}

impl Pipeline {
    /// Builds a pipeline. Either list may be empty; with no sinks the
    /// pipeline only runs its processors.
    pub fn new(processors: Vec<Box<dyn Processor>>, sinks: Vec<Box<dyn Sink>>) -> Self {
        let sinks: Arc<Vec<SharedSink>> =
            Arc::new(sinks.into_iter().map(|s| Arc::new(Mutex::new(s))).collect());

        // Wire each processor to the one after it, starting from the sink
        // stage, so processors run in the order given.
        let sink_stage = Arc::clone(&sinks);
        let mut entry: Output = Arc::new(move |resource: ResourceWrapper| {
            write_to_sinks(Arc::clone(&sink_stage), resource).boxed()
        });

        let mut wired = Vec::with_capacity(processors.len());
        for mut processor in processors.into_iter().rev() {
            processor.set_output(Arc::clone(&entry));
            let processor: SharedProcessor = Arc::new(Mutex::new(processor));

            let next = Arc::clone(&processor);
            entry = Arc::new(move |resource: ResourceWrapper| {
                let next = Arc::clone(&next);
                async move { next.lock().await.process(resource).await }.boxed()
            });
            wired.push(processor);
        }
        wired.reverse();

        Self {
            codec: Arc::new(JsonCodec),
            processors: wired,
            sinks,
            entry,
        }
    }

    /// Uses `codec` for resources passed to `process` from now on.
    pub fn with_codec(mut self, codec: Arc<dyn ResourceCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Processes a single resource given as wire bytes.
    pub async fn process(
        &self,
        resource_type: ResourceType,
        source_url: &str,
        json: Vec<u8>,
    ) -> Result<(), ProcessingError> {
        let resource =
            ResourceWrapper::new(Arc::clone(&self.codec), resource_type, source_url, json);
        (self.entry)(resource).await
    }

    /// Finalizes every processor, in order, then every sink, in order.
    ///
    /// Stops at the first error; later stages are not finalized.
    pub async fn finalize(self) -> Result<(), ProcessingError> {
        for processor in &self.processors {
            let mut processor = processor.lock().await;
            debug!(processor = processor.name(), "Finalizing processor");
            processor.finalize().await?;
        }
        for sink in self.sinks.iter() {
            let mut sink = sink.lock().await;
            debug!(sink = sink.name(), "Finalizing sink");
            sink.finalize().await?;
        }
        Ok(())
    }
}

/// Final stage: freezes the resource and writes it to each sink in turn.
async fn write_to_sinks(
    sinks: Arc<Vec<SharedSink>>,
    mut resource: ResourceWrapper,
) -> Result<(), ProcessingError> {
    resource.mark_stabilized();
    for sink in sinks.iter() {
        sink.lock().await.write(&mut resource).await?;
    }
    Ok(())
}
