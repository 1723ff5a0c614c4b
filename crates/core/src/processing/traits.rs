//! Trait definitions for pipeline stages.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::error::ProcessingError;
use super::resource::ResourceWrapper;

/// Where a processor sends resources it is done with. This is either the next
/// processor's `process` or the pipeline's sink-writing stage.
pub type Output =
    Arc<dyn Fn(ResourceWrapper) -> BoxFuture<'static, Result<(), ProcessingError>> + Send + Sync>;

/// A pipeline stage which may mutate, drop, batch or split resources before
/// they are written.
///
/// `process` is never called concurrently. A processor may forward resources
/// immediately or later (e.g. from `finalize`), but if it does work on other
/// tasks, `finalize` must not return until that work is finished and no
/// further output will be produced.
#[async_trait]
pub trait Processor: Send {
    /// Returns the name of this processor, used in logs and errors.
    fn name(&self) -> &str;

    /// Wires the processor to the next stage. Called once, by the pipeline.
    fn set_output(&mut self, output: Output);

    /// Processes one resource.
    async fn process(&mut self, resource: ResourceWrapper) -> Result<(), ProcessingError>;

    /// Flushes buffered resources and releases resources. Called once, after
    /// every resource has been passed to `process`.
    async fn finalize(&mut self) -> Result<(), ProcessingError>;
}

/// A terminal pipeline stage which writes resources somewhere.
///
/// `write` is never called concurrently. Sinks may write in the background,
/// but `finalize` must not return until everything has been written.
#[async_trait]
pub trait Sink: Send {
    /// Returns the name of this sink, used in logs and errors.
    fn name(&self) -> &str;

    /// Writes one resource. Both representations may be read freely.
    async fn write(&mut self, resource: &mut ResourceWrapper) -> Result<(), ProcessingError>;

    /// Flushes and releases resources. Called once, after the last write.
    async fn finalize(&mut self) -> Result<(), ProcessingError>;
}

/// Output wiring shared by processor implementations.
///
/// Embed it as a field and delegate `set_output` and (when there is nothing
/// to flush) `finalize` to it:
///
/// ```ignore
/// struct Uppercase { base: ProcessorBase }
///
/// #[async_trait]
/// impl Processor for Uppercase {
///     fn name(&self) -> &str { "uppercase" }
///     fn set_output(&mut self, output: Output) { self.base.set_output(output) }
///     async fn process(&mut self, resource: ResourceWrapper) -> Result<(), ProcessingError> {
///         self.base.emit(resource).await
///     }
///     async fn finalize(&mut self) -> Result<(), ProcessingError> { self.base.finalize().await }
/// }
/// ```
#[derive(Default)]
pub struct ProcessorBase {
    output: Option<Output>,
}

impl ProcessorBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_output(&mut self, output: Output) {
        self.output = Some(output);
    }

    /// Whether `set_output` has been called.
    pub fn is_wired(&self) -> bool {
        self.output.is_some()
    }

    /// Sends a resource to the next stage.
    pub async fn emit(&self, resource: ResourceWrapper) -> Result<(), ProcessingError> {
        let output = self.output.as_ref().ok_or(ProcessingError::OutputNotSet)?;
        output(resource).await
    }

    /// No-op finalize.
    pub async fn finalize(&self) -> Result<(), ProcessingError> {
        Ok(())
    }
}

impl fmt::Debug for ProcessorBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorBase")
            .field("wired", &self.is_wired())
            .finish()
    }
}
