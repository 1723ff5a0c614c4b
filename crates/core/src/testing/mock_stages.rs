//! Recording processors and sinks for pipeline tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::bulkfhir::ResourceType;
use crate::processing::{Output, ProcessingError, Processor, ProcessorBase, ResourceWrapper, Sink};

/// Ordered log of stage invocations shared by several mocks, e.g.
/// `["p1.process", "s1.write", "p1.finalize"]`.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<RwLock<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, entry: impl Into<String>) {
        self.entries.write().await.push(entry.into());
    }

    pub async fn entries(&self) -> Vec<String> {
        self.entries.read().await.clone()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

/// What a processor does with each resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorMode {
    /// Forward immediately.
    Forward,
    /// Swallow the resource.
    Drop,
    /// Hold resources and forward them all from `finalize`.
    Buffer,
}

/// Mock implementation of the Processor trait.
///
/// Records `<name>.process` and `<name>.finalize` in its call log. Clones
/// share state, so keep a clone to inspect after handing one to a pipeline.
#[derive(Clone)]
pub struct MockProcessor {
    name: String,
    log: CallLog,
    mode: ProcessorMode,
    /// Field set on every resource before forwarding.
    set_field: Option<(String, Value)>,
    base: Arc<RwLock<ProcessorBase>>,
    buffered: Arc<RwLock<Vec<ResourceWrapper>>>,
    process_error: Arc<RwLock<Option<ProcessingError>>>,
    finalize_error: Arc<RwLock<Option<ProcessingError>>>,
}

impl MockProcessor {
    /// Create a forwarding processor.
    pub fn new(name: &str, log: CallLog) -> Self {
        Self {
            name: name.to_string(),
            log,
            mode: ProcessorMode::Forward,
            set_field: None,
            base: Arc::new(RwLock::new(ProcessorBase::new())),
            buffered: Arc::new(RwLock::new(Vec::new())),
            process_error: Arc::new(RwLock::new(None)),
            finalize_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_mode(mut self, mode: ProcessorMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set `key` to `value` on each resource's parsed form.
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.set_field = Some((key.to_string(), value));
        self
    }

    /// Make every process call fail with this error.
    pub async fn set_process_error(&self, error: Option<ProcessingError>) {
        *self.process_error.write().await = error;
    }

    /// Make finalize fail with this error.
    pub async fn set_finalize_error(&self, error: Option<ProcessingError>) {
        *self.finalize_error.write().await = error;
    }

    /// Number of resources currently held in buffer mode.
    pub async fn buffered_count(&self) -> usize {
        self.buffered.read().await.len()
    }
}

#[async_trait]
impl Processor for MockProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_output(&mut self, output: Output) {
        // Only called while building the pipeline, before anything else
        // can hold the lock.
        self.base
            .try_write()
            .expect("processor wired before use")
            .set_output(output);
    }

    async fn process(&mut self, mut resource: ResourceWrapper) -> Result<(), ProcessingError> {
        self.log.record(format!("{}.process", self.name)).await;
        if let Some(err) = self.process_error.read().await.clone() {
            return Err(err);
        }

        if let Some((key, value)) = &self.set_field {
            let parsed = resource.resource()?;
            if let Value::Object(map) = parsed {
                map.insert(key.clone(), value.clone());
            }
        }

        match self.mode {
            ProcessorMode::Forward => self.base.read().await.emit(resource).await,
            ProcessorMode::Drop => Ok(()),
            ProcessorMode::Buffer => {
                self.buffered.write().await.push(resource);
                Ok(())
            }
        }
    }

    async fn finalize(&mut self) -> Result<(), ProcessingError> {
        self.log.record(format!("{}.finalize", self.name)).await;
        if let Some(err) = self.finalize_error.read().await.clone() {
            return Err(err);
        }

        let buffered: Vec<ResourceWrapper> = self.buffered.write().await.drain(..).collect();
        let base = self.base.read().await;
        for resource in buffered {
            base.emit(resource).await?;
        }
        base.finalize().await
    }
}

/// A resource as seen by a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenResource {
    pub resource_type: ResourceType,
    pub source_url: String,
    pub json: Vec<u8>,
    pub stabilized: bool,
}

/// Mock implementation of the Sink trait.
///
/// Records `<name>.write` and `<name>.finalize` in its call log and keeps a
/// copy of everything written.
#[derive(Debug, Clone)]
pub struct MockSink {
    name: String,
    log: CallLog,
    written: Arc<RwLock<Vec<WrittenResource>>>,
    write_error: Arc<RwLock<Option<ProcessingError>>>,
    finalize_error: Arc<RwLock<Option<ProcessingError>>>,
}

impl MockSink {
    /// Create a new mock sink.
    pub fn new(name: &str, log: CallLog) -> Self {
        Self {
            name: name.to_string(),
            log,
            written: Arc::new(RwLock::new(Vec::new())),
            write_error: Arc::new(RwLock::new(None)),
            finalize_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Get everything written so far.
    pub async fn written(&self) -> Vec<WrittenResource> {
        self.written.read().await.clone()
    }

    /// Make every write fail with this error.
    pub async fn set_write_error(&self, error: Option<ProcessingError>) {
        *self.write_error.write().await = error;
    }

    /// Make finalize fail with this error.
    pub async fn set_finalize_error(&self, error: Option<ProcessingError>) {
        *self.finalize_error.write().await = error;
    }
}

#[async_trait]
impl Sink for MockSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, resource: &mut ResourceWrapper) -> Result<(), ProcessingError> {
        self.log.record(format!("{}.write", self.name)).await;
        if let Some(err) = self.write_error.read().await.clone() {
            return Err(err);
        }

        let json = resource.json()?.to_vec();
        self.written.write().await.push(WrittenResource {
            resource_type: resource.resource_type(),
            source_url: resource.source_url().to_string(),
            json,
            stabilized: resource.is_stabilized(),
        });
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), ProcessingError> {
        self.log.record(format!("{}.finalize", self.name)).await;
        match self.finalize_error.read().await.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
