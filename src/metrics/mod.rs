//! Metric instances and sink events
//!
//! This module provides the metric surface that alert rules observe:
//! - `SinkEvent`: one metric observation on the wire
//! - `MetricInstance`: gauge-style instances that emit sink events
//! - `MetricProvider`: lookup of instances by hierarchical id
//!
//! Instances emit nothing by default; rule registration enables event
//! emission for the ids a rule watches, so idle metrics cost no dispatch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::events::EventDispatcher;

/// A single metric observation, delivered to rule subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkEvent {
    /// Hierarchical metric id, e.g. "system" or "system.cpu"
    pub id: String,
    /// Category within the metric, e.g. "load"
    pub category: String,
    /// Observation time (unix epoch milliseconds)
    pub timestamp_ms: i64,
    /// Observed value
    pub value: i64,
}

impl SinkEvent {
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        timestamp_ms: i64,
        value: i64,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            timestamp_ms,
            value,
        }
    }

    /// Observation stamped with the current time.
    pub fn now(id: impl Into<String>, category: impl Into<String>, value: i64) -> Self {
        Self::new(id, category, Utc::now().timestamp_millis(), value)
    }
}

/// A named metric holding per-category gauge values.
///
/// `set_events_enabled` has a no-op default so passive implementations need
/// not care; grouped instances delegate it to their parent.
pub trait MetricInstance: Send + Sync {
    fn id(&self) -> &str;

    /// Add `delta` to the category gauge and emit the new value.
    fn increment(&self, category: &str, delta: i64);

    /// Overwrite the category gauge and emit the new value.
    fn set(&self, category: &str, value: i64);

    /// Record a one-off observation without treating it as the new gauge
    /// baseline for increments.
    fn log(&self, category: &str, value: i64);

    /// Current gauge value for a category.
    fn value(&self, category: &str) -> Option<i64>;

    fn set_events_enabled(&self, _enabled: bool) {}

    fn events_enabled(&self) -> bool {
        false
    }
}

/// Gauge-backed metric instance emitting `SinkEvent`s when enabled.
pub struct GaugeInstance {
    id: String,
    gauges: RwLock<HashMap<String, i64>>,
    events_enabled: AtomicBool,
    dispatcher: Arc<EventDispatcher<SinkEvent>>,
}

impl GaugeInstance {
    pub fn new(id: impl Into<String>, dispatcher: Arc<EventDispatcher<SinkEvent>>) -> Self {
        Self {
            id: id.into(),
            gauges: RwLock::new(HashMap::new()),
            events_enabled: AtomicBool::new(false),
            dispatcher,
        }
    }

    fn emit(&self, id: &str, category: &str, value: i64) {
        if self.events_enabled.load(Ordering::Relaxed) {
            self.dispatcher.fire(&SinkEvent::now(id, category, value));
        }
    }
}

impl MetricInstance for GaugeInstance {
    fn id(&self) -> &str {
        &self.id
    }

    fn increment(&self, category: &str, delta: i64) {
        let value = match self.gauges.write() {
            Ok(mut gauges) => {
                let slot = gauges.entry(category.to_string()).or_insert(0);
                *slot = slot.saturating_add(delta);
                *slot
            }
            Err(_) => return,
        };
        self.emit(&self.id, category, value);
    }

    fn set(&self, category: &str, value: i64) {
        if let Ok(mut gauges) = self.gauges.write() {
            gauges.insert(category.to_string(), value);
        }
        self.emit(&self.id, category, value);
    }

    fn log(&self, category: &str, value: i64) {
        self.emit(&self.id, category, value);
    }

    fn value(&self, category: &str) -> Option<i64> {
        self.gauges.read().ok()?.get(category).copied()
    }

    fn set_events_enabled(&self, enabled: bool) {
        self.events_enabled.store(enabled, Ordering::Relaxed);
    }

    fn events_enabled(&self) -> bool {
        self.events_enabled.load(Ordering::Relaxed)
    }
}

/// Child metric grouped under a parent instance.
///
/// Events carry the child id `<parent>.<group>` so rules scoped to the
/// parent id also match. Event enablement lives on the parent: enabling a
/// child enables the whole family.
pub struct GroupedInstance {
    id: String,
    parent: Arc<dyn MetricInstance>,
    gauges: RwLock<HashMap<String, i64>>,
    dispatcher: Arc<EventDispatcher<SinkEvent>>,
}

impl GroupedInstance {
    pub fn new(
        parent: Arc<dyn MetricInstance>,
        group: &str,
        dispatcher: Arc<EventDispatcher<SinkEvent>>,
    ) -> Self {
        Self {
            id: format!("{}.{}", parent.id(), group),
            parent,
            gauges: RwLock::new(HashMap::new()),
            dispatcher,
        }
    }

    pub fn parent(&self) -> &Arc<dyn MetricInstance> {
        &self.parent
    }

    fn emit(&self, category: &str, value: i64) {
        if self.parent.events_enabled() {
            self.dispatcher
                .fire(&SinkEvent::now(self.id.clone(), category, value));
        }
    }
}

impl MetricInstance for GroupedInstance {
    fn id(&self) -> &str {
        &self.id
    }

    fn increment(&self, category: &str, delta: i64) {
        let value = match self.gauges.write() {
            Ok(mut gauges) => {
                let slot = gauges.entry(category.to_string()).or_insert(0);
                *slot = slot.saturating_add(delta);
                *slot
            }
            Err(_) => return,
        };
        self.emit(category, value);
    }

    fn set(&self, category: &str, value: i64) {
        if let Ok(mut gauges) = self.gauges.write() {
            gauges.insert(category.to_string(), value);
        }
        self.emit(category, value);
    }

    fn log(&self, category: &str, value: i64) {
        self.emit(category, value);
    }

    fn value(&self, category: &str) -> Option<i64> {
        self.gauges.read().ok()?.get(category).copied()
    }

    fn set_events_enabled(&self, enabled: bool) {
        self.parent.set_events_enabled(enabled);
    }

    fn events_enabled(&self) -> bool {
        self.parent.events_enabled()
    }
}

/// Lookup of metric instances by id.
pub trait MetricProvider: Send + Sync {
    fn metric_instance(&self, id: &str) -> Option<Arc<dyn MetricInstance>>;
}

/// In-process provider creating gauge instances on first use.
pub struct SimpleMetricProvider {
    dispatcher: Arc<EventDispatcher<SinkEvent>>,
    instances: RwLock<HashMap<String, Arc<dyn MetricInstance>>>,
}

impl SimpleMetricProvider {
    pub fn new(dispatcher: Arc<EventDispatcher<SinkEvent>>) -> Self {
        Self {
            dispatcher,
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Create (or return) a grouped child of an existing instance.
    pub fn grouped(&self, parent_id: &str, group: &str) -> Option<Arc<dyn MetricInstance>> {
        let parent = self.metric_instance(parent_id)?;
        let child_id = format!("{}.{}", parent_id, group);
        if let Ok(instances) = self.instances.read() {
            if let Some(existing) = instances.get(&child_id) {
                return Some(existing.clone());
            }
        }
        let child: Arc<dyn MetricInstance> = Arc::new(GroupedInstance::new(
            parent,
            group,
            self.dispatcher.clone(),
        ));
        match self.instances.write() {
            Ok(mut instances) => {
                Some(instances.entry(child_id).or_insert_with(|| child).clone())
            }
            Err(_) => None,
        }
    }
}

impl MetricProvider for SimpleMetricProvider {
    fn metric_instance(&self, id: &str) -> Option<Arc<dyn MetricInstance>> {
        if let Ok(instances) = self.instances.read() {
            if let Some(existing) = instances.get(id) {
                return Some(existing.clone());
            }
        }
        let instance: Arc<dyn MetricInstance> =
            Arc::new(GaugeInstance::new(id, self.dispatcher.clone()));
        match self.instances.write() {
            Ok(mut instances) => Some(
                instances
                    .entry(id.to_string())
                    .or_insert_with(|| instance)
                    .clone(),
            ),
            Err(_) => None,
        }
    }
}
