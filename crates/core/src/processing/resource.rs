//! The resource wrapper passed through a pipeline.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::bulkfhir::ResourceType;

use super::error::ProcessingError;

/// Converts between a resource's wire bytes and its parsed form.
pub trait ResourceCodec: Send + Sync {
    /// Parses wire bytes.
    fn decode(&self, json: &[u8]) -> Result<Value, ProcessingError>;

    /// Serializes a parsed resource.
    fn encode(&self, resource: &Value) -> Result<Vec<u8>, ProcessingError>;
}

/// FHIR JSON codec. A resource must be a JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ResourceCodec for JsonCodec {
    fn decode(&self, json: &[u8]) -> Result<Value, ProcessingError> {
        let value: Value =
            serde_json::from_slice(json).map_err(|e| ProcessingError::Decode(e.to_string()))?;
        if !value.is_object() {
            return Err(ProcessingError::Decode(
                "resource is not a JSON object".to_string(),
            ));
        }
        Ok(value)
    }

    fn encode(&self, resource: &Value) -> Result<Vec<u8>, ProcessingError> {
        serde_json::to_vec(resource).map_err(|e| ProcessingError::Encode(e.to_string()))
    }
}

/// A single resource flowing through a pipeline.
///
/// The resource is held as wire bytes, as a parsed [`Value`], or both. Until
/// the wrapper is stabilized, taking the parsed form drops the cached bytes
/// since the caller may mutate it; the bytes are re-encoded on demand.
/// Once stabilized (when the pipeline hands the resource to its sinks) both
/// forms are cached and never invalidated.
pub struct ResourceWrapper {
    codec: Arc<dyn ResourceCodec>,
    resource_type: ResourceType,
    source_url: String,
    json: Option<Vec<u8>>,
    resource: Option<Value>,
    stabilized: bool,
}

impl ResourceWrapper {
    /// Wraps raw wire bytes.
    pub fn new(
        codec: Arc<dyn ResourceCodec>,
        resource_type: ResourceType,
        source_url: impl Into<String>,
        json: Vec<u8>,
    ) -> Self {
        Self {
            codec,
            resource_type,
            source_url: source_url.into(),
            json: Some(json),
            resource: None,
            stabilized: false,
        }
    }

    /// Wraps an already parsed resource, e.g. one split off by a processor.
    pub fn from_resource(
        codec: Arc<dyn ResourceCodec>,
        resource_type: ResourceType,
        source_url: impl Into<String>,
        resource: Value,
    ) -> Self {
        Self {
            codec,
            resource_type,
            source_url: source_url.into(),
            json: None,
            resource: Some(resource),
            stabilized: false,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// URL of the result file this resource was read from.
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// The codec used for this resource, for wrapping derived resources.
    pub fn codec(&self) -> Arc<dyn ResourceCodec> {
        Arc::clone(&self.codec)
    }

    /// Returns the parsed resource, decoding it on first access.
    ///
    /// Unless stabilized, this invalidates the cached wire bytes.
    pub fn resource(&mut self) -> Result<&mut Value, ProcessingError> {
        let resource = match self.resource.take() {
            Some(resource) => resource,
            None => {
                let json = self.json.as_deref().ok_or_else(|| {
                    ProcessingError::Decode("resource has no wire form".to_string())
                })?;
                self.codec.decode(json)?
            }
        };

        if !self.stabilized {
            self.json = None;
        }
        Ok(self.resource.insert(resource))
    }

    /// Returns the wire bytes, encoding the parsed resource if needed.
    pub fn json(&mut self) -> Result<&[u8], ProcessingError> {
        let json = match self.json.take() {
            Some(json) => json,
            None => {
                let resource = self.resource.as_ref().ok_or_else(|| {
                    ProcessingError::Encode("resource has no parsed form".to_string())
                })?;
                self.codec.encode(resource)?
            }
        };
        Ok(self.json.insert(json).as_slice())
    }

    pub fn is_stabilized(&self) -> bool {
        self.stabilized
    }

    /// Freezes the wrapper before it is handed to sinks.
    pub(crate) fn mark_stabilized(&mut self) {
        self.stabilized = true;
    }
}

impl fmt::Debug for ResourceWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceWrapper")
            .field("resource_type", &self.resource_type)
            .field("source_url", &self.source_url)
            .field("has_json", &self.json.is_some())
            .field("has_resource", &self.resource.is_some())
            .field("stabilized", &self.stabilized)
            .finish()
    }
}
