//! Test data builders for creating test objects

use sensepipe_rs::config::{ConfigStore, PipelineConfig};
use sensepipe_rs::types::{DataPoint, DataValue};
use std::sync::Arc;

/// Builder for creating test data points
pub struct PointBuilder {
    producer: String,
    timestamp: i64,
    value: DataValue,
    description: Option<String>,
}

impl PointBuilder {
    pub fn new(producer: &str) -> Self {
        Self {
            producer: producer.to_string(),
            timestamp: 0,
            value: DataValue::Float(0.0),
            description: None,
        }
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn float(mut self, value: f64) -> Self {
        self.value = DataValue::Float(value);
        self
    }

    pub fn text(mut self, value: &str) -> Self {
        self.value = DataValue::Text(value.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn build(self) -> DataPoint {
        let point = DataPoint::new(self.producer, self.timestamp, self.value)
            .expect("builder produced an invalid point");
        match self.description {
            Some(d) => point.with_description(d),
            None => point,
        }
    }

    pub fn build_shared(self) -> Arc<DataPoint> {
        self.build().into_shared()
    }
}

/// Config store with the given rate modes, defaults elsewhere.
pub fn config_store(sample_rate: &str, sync_rate: &str) -> Arc<ConfigStore> {
    ConfigStore::new(PipelineConfig {
        sample_rate: sample_rate.to_string(),
        sync_rate: sync_rate.to_string(),
        ..PipelineConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensepipe_rs::types::DataType;

    #[test]
    fn test_point_builder() {
        let point = PointBuilder::new("light")
            .timestamp(42)
            .float(7.5)
            .description("ambient light")
            .build();

        assert_eq!(point.producer_name(), "light");
        assert_eq!(point.timestamp(), 42);
        assert_eq!(point.data_type(), DataType::Float);
        assert_eq!(point.description(), Some("ambient light"));
    }
}
