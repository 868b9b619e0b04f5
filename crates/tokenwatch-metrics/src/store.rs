//! Snapshot store: the latest value of every published gauge.
//!
//! Each gauge value lives in its own atomic cell, so a reader never sees a
//! half-written value. The map of cells is behind an `RwLock` that is only
//! taken for writing when a label is seen for the first time; overwriting an
//! existing label goes through the read lock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::debug;

/// Static description of a gauge family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaugeDesc {
    /// Fully qualified metric name, e.g. `edumfa_token_count`.
    pub name: String,
    /// Text for the `# HELP` line.
    pub help: String,
    /// Name of the single label dimension, e.g. `model`.
    pub label: String,
}

impl GaugeDesc {
    pub fn new(name: &str, help: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            help: help.to_string(),
            label: label.to_string(),
        }
    }
}

/// Identity of one gauge value: metric name plus label value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricKey {
    pub metric: String,
    pub label: String,
}

impl MetricKey {
    pub fn new(metric: &str, label: &str) -> Self {
        Self {
            metric: metric.to_string(),
            label: label.to_string(),
        }
    }
}

impl std::fmt::Display for MetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{{{:?}}}", self.metric, self.label)
    }
}

/// Errors from publishing a gauge value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PublishError {
    #[error("gauge {0} is not registered")]
    Unregistered(String),

    #[error("invalid value {value} for {key}: gauges hold non-negative counts")]
    InvalidValue { key: MetricKey, value: f64 },
}

/// A gauge value stored as the bit pattern of an `f64`.
#[derive(Debug)]
struct GaugeCell(AtomicU64);

impl GaugeCell {
    fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }
}

/// One (key, value) pair of a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub key: MetricKey,
    pub value: f64,
}

/// A point-in-time read of the store, ready for rendering.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Registered families in registration order.
    pub families: Vec<GaugeDesc>,
    /// All current values, ordered by metric name then label.
    pub samples: Vec<Sample>,
}

impl Snapshot {
    /// Value for a single key, if it has ever been published.
    pub fn get(&self, metric: &str, label: &str) -> Option<f64> {
        self.samples
            .iter()
            .find(|s| s.key.metric == metric && s.key.label == label)
            .map(|s| s.value)
    }

    /// All label values currently published for one metric.
    pub fn values(&self, metric: &str) -> BTreeMap<String, f64> {
        self.samples
            .iter()
            .filter(|s| s.key.metric == metric)
            .map(|s| (s.key.label.clone(), s.value))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// In-memory table of current gauge values keyed by [`MetricKey`].
///
/// Values are never evicted: a label keeps its last published value until
/// it is overwritten or the process exits.
#[derive(Debug)]
pub struct SnapshotStore {
    families: Vec<GaugeDesc>,
    values: RwLock<BTreeMap<MetricKey, GaugeCell>>,
}

impl SnapshotStore {
    /// Create a store accepting values for the given gauge families.
    pub fn new(families: Vec<GaugeDesc>) -> Self {
        Self {
            families,
            values: RwLock::new(BTreeMap::new()),
        }
    }

    /// Get a handle for setting values of one registered family.
    pub fn gauge_vec(self: &Arc<Self>, name: &str) -> Result<GaugeVec, PublishError> {
        let desc = self.family(name)?;
        Ok(GaugeVec {
            store: Arc::clone(self),
            name: desc.name.clone(),
        })
    }

    /// Insert or overwrite the value for `key`.
    pub async fn publish(&self, key: &MetricKey, value: f64) -> Result<(), PublishError> {
        self.family(&key.metric)?;
        if !value.is_finite() || value < 0.0 {
            return Err(PublishError::InvalidValue {
                key: key.clone(),
                value,
            });
        }

        {
            let values = self.values.read().await;
            if let Some(cell) = values.get(key) {
                cell.set(value);
                return Ok(());
            }
        }

        let mut values = self.values.write().await;
        match values.get(key) {
            Some(cell) => cell.set(value),
            None => {
                debug!(%key, value, "new gauge label");
                values.insert(key.clone(), GaugeCell::new(value));
            }
        }
        Ok(())
    }

    /// Read all current values.
    pub async fn snapshot(&self) -> Snapshot {
        let values = self.values.read().await;
        let samples = values
            .iter()
            .map(|(key, cell)| Sample {
                key: key.clone(),
                value: cell.get(),
            })
            .collect();

        Snapshot {
            families: self.families.clone(),
            samples,
        }
    }

    fn family(&self, name: &str) -> Result<&GaugeDesc, PublishError> {
        self.families
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| PublishError::Unregistered(name.to_string()))
    }
}

/// Handle to one labeled gauge family of a [`SnapshotStore`].
#[derive(Debug, Clone)]
pub struct GaugeVec {
    store: Arc<SnapshotStore>,
    name: String,
}

impl GaugeVec {
    /// Set the value for one label.
    pub async fn set(&self, label: &str, value: f64) -> Result<(), PublishError> {
        self.store
            .publish(&MetricKey::new(&self.name, label), value)
            .await
    }
}
