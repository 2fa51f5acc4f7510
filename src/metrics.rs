use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Both losses, evaluated at one reporting step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossRecord {
    pub step: u64,
    pub epoch: usize,
    pub critic: f32,
    pub generator: f32,
}

/// The append-only sequence of reported losses.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LossHistory {
    records: Vec<LossRecord>,
}

impl LossHistory {
    #[inline]
    pub fn push(&mut self, record: LossRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[LossRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&LossRecord> {
        self.records.last()
    }
}

/// Counters of the work done by a run.
#[derive(Debug, Default, Clone)]
pub struct TrainingMetrics {
    pub compute_time: Duration,
    pub artifact_time: Duration,
    pub samples: u64,
}

impl TrainingMetrics {
    #[inline]
    pub fn add_samples(&mut self, n: usize) {
        self.samples += n as u64;
    }
}
