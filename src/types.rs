//! Core data types shared across the pipeline
//!
//! The central type is [`DataPoint`]: one timestamped reading emitted by a
//! producer. A point is immutable once constructed — "retyping" a point
//! builds a new one and fails if the requested tag cannot represent the
//! existing payload, so the type tag and the value can never disagree.
//!
//! Points are shared during fan-out as `Arc<DataPoint>`: the bus hands the
//! same allocation to every subscribed consumer, and the point is freed
//! once the last consumer (buffer, transmitter, analyzer) drops its handle.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The payload of a data point.
///
/// `Record` carries an arbitrary structured value (the original wire format
/// of complex sensors); `List` nests complete data points, used by burst
/// sensors that deliver a whole sample window at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    Record(serde_json::Value),
    List(Vec<DataPoint>),
}

impl DataValue {
    /// The tag natively describing this payload.
    pub fn native_type(&self) -> DataType {
        match self {
            DataValue::Int(_) => DataType::Int,
            DataValue::Float(_) => DataType::Float,
            DataValue::Bool(_) => DataType::Bool,
            DataValue::Text(_) => DataType::Text,
            DataValue::Bytes(_) => DataType::Bytes,
            DataValue::Record(_) => DataType::Record,
            DataValue::List(_) => DataType::List,
        }
    }
}

/// Explicit type tag of a data point.
///
/// `Json` and `File` are refinements of a `Text` payload: the value is
/// still a string, the tag tells downstream consumers how to interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Int,
    Float,
    Bool,
    Text,
    /// A `Text` payload containing serialized JSON.
    Json,
    /// A `Text` payload containing a file path.
    File,
    Bytes,
    Record,
    List,
}

impl DataType {
    /// Whether this tag can describe a payload whose native tag is `native`.
    pub fn can_represent(self, native: DataType) -> bool {
        self == native || (native == DataType::Text && matches!(self, DataType::Json | DataType::File))
    }
}

/// One timestamped sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Name of the producer that emitted this point. Never empty.
    producer_name: String,
    /// Optional human-readable description of the producing sensor.
    description: Option<String>,
    /// Wall-clock timestamp in milliseconds (monotonic-safe, see `clock`).
    timestamp: i64,
    /// Type tag, consistent with `value` by construction.
    data_type: DataType,
    /// The payload.
    value: DataValue,
}

impl DataPoint {
    /// Create a data point with the tag inferred from the value.
    ///
    /// Rejects an empty producer name.
    pub fn new(producer_name: impl Into<String>, timestamp: i64, value: DataValue) -> Result<Self> {
        let producer_name = producer_name.into();
        if producer_name.is_empty() {
            return Err(PipelineError::Config(
                "data point producer name must not be empty".to_string(),
            ));
        }
        let data_type = value.native_type();
        Ok(Self {
            producer_name,
            description: None,
            timestamp,
            data_type,
            value,
        })
    }

    /// Attach a sensor description. Consumes and returns the point.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Build a copy of this point carrying an overriding type tag.
    ///
    /// The override must be representable by the current payload (for
    /// example `Json` or `File` over a `Text` value); anything else is a
    /// type mismatch. The original point is untouched — there is no window
    /// in which tag and payload disagree.
    pub fn with_type(&self, data_type: DataType) -> Result<Self> {
        let native = self.value.native_type();
        if !data_type.can_represent(native) {
            return Err(PipelineError::TypeMismatch {
                requested: data_type,
                actual: native,
            });
        }
        Ok(Self {
            data_type,
            ..self.clone()
        })
    }

    /// Wrap in an `Arc` for fan-out.
    pub fn into_shared(self) -> Arc<DataPoint> {
        Arc::new(self)
    }

    pub fn producer_name(&self) -> &str {
        &self.producer_name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn value(&self) -> &DataValue {
        &self.value
    }
}
