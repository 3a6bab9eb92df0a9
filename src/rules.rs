//! Rule registration over injected dispatchers
//!
//! `MetricRules` translates rule parameters into filtered subscriptions on
//! a metric sink-event dispatcher, and fires `ComplexEvent`s on a separate
//! alert dispatcher. It owns no detection or dispatch logic itself.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use metric_rules::{
//!     AlertEvent, EventDispatcher, EventSeverity, MetricRules,
//!     SimpleMetricProvider, SustainedThresholdRule,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = Arc::new(EventDispatcher::new());
//! let alerts = Arc::new(EventDispatcher::new());
//! let provider = Arc::new(SimpleMetricProvider::new(metrics.clone()));
//! let rules = MetricRules::new(provider, metrics, alerts);
//!
//! // Gauge events arrive every 5s; 50 samples at 5s intervals gives
//! // 4 minutes of data backing a 5-minute sustained verdict.
//! let fire = rules.clone();
//! rules.sustained_threshold(
//!     SustainedThresholdRule::new(75)
//!         .with_id("system")
//!         .with_category("load")
//!         .with_duration_ms(5 * 60_000)
//!         .with_variation(0.15)
//!         .with_minimum(50),
//!     move |sample| {
//!         fire.fire_event(
//!             AlertEvent::new()
//!                 .with_name("load")
//!                 .with_severity(EventSeverity::Error)
//!                 .with_message(format!("sustained load {}", sample.value)),
//!         );
//!         Ok(())
//!     },
//! )?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::cep::{ComplexEvent, EventSeverity};
use crate::error::{Result, RulesError};
use crate::events::{AllFilter, EventDispatcher, EventFilter, SubscriptionId};
use crate::filestore::{self, FilestoreUsage};
use crate::filters::{ScopeFilter, SustainedThresholdFilter, ThresholdFilter, Window};
use crate::metrics::{MetricProvider, SinkEvent};

/// The sample a rule action is invoked with.
#[derive(Debug, Clone)]
pub struct AlertSample {
    /// Id the rule was scoped to (not the event id, which may be a child)
    pub rule_id: Option<String>,
    /// Category the rule was scoped to
    pub rule_category: Option<String>,
    /// Timestamp of the triggering sink event
    pub timestamp_ms: i64,
    /// Value of the triggering sink event
    pub value: i64,
}

/// Parameters for a plain threshold rule.
#[derive(Debug, Clone)]
pub struct ThresholdRule {
    id: Option<String>,
    category: Option<String>,
    threshold: i64,
    above: bool,
    interval_ms: i64,
}

impl ThresholdRule {
    pub fn new(threshold: i64) -> Self {
        Self {
            id: None,
            category: None,
            threshold,
            above: true,
            interval_ms: 0,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Fire on values at or below the threshold instead of at or above.
    pub fn below(mut self) -> Self {
        self.above = false;
        self
    }

    /// Minimum event time between fires (0 disables).
    pub fn with_interval_ms(mut self, interval_ms: i64) -> Self {
        self.interval_ms = interval_ms;
        self
    }
}

/// Parameters for a sustained threshold rule.
///
/// One of `duration_ms` or `amount` is required; `amount` wins when both
/// are set.
#[derive(Debug, Clone)]
pub struct SustainedThresholdRule {
    id: Option<String>,
    category: Option<String>,
    threshold: i64,
    above: bool,
    duration_ms: Option<i64>,
    amount: Option<usize>,
    variation: f64,
    minimum: usize,
    interval_ms: i64,
}

impl SustainedThresholdRule {
    pub fn new(threshold: i64) -> Self {
        Self {
            id: None,
            category: None,
            threshold,
            above: true,
            duration_ms: None,
            amount: None,
            variation: 0.0,
            minimum: 0,
            interval_ms: 0,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn below(mut self) -> Self {
        self.above = false;
        self
    }

    /// Time-bounded sample window.
    pub fn with_duration_ms(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Count-bounded sample window; takes precedence over the duration.
    pub fn with_amount(mut self, amount: usize) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Tolerated fraction of window samples on the calm side (0.0 - 1.0).
    pub fn with_variation(mut self, variation: f64) -> Self {
        self.variation = variation;
        self
    }

    /// Floor on the number of window samples before any verdict.
    pub fn with_minimum(mut self, minimum: usize) -> Self {
        self.minimum = minimum;
        self
    }

    pub fn with_interval_ms(mut self, interval_ms: i64) -> Self {
        self.interval_ms = interval_ms;
        self
    }
}

/// Parameters for a fired alert event.
#[derive(Debug, Clone, Default)]
pub struct AlertEvent {
    id: Option<String>,
    name: Option<String>,
    category: Option<String>,
    severity: Option<EventSeverity>,
    message: Option<String>,
    code: Option<String>,
}

impl AlertEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    fn build(self) -> ComplexEvent {
        let mut event = ComplexEvent::new();
        event.artifact_id = self.id;
        event.event_name = self.name;
        if let Some(category) = self.category {
            event.event_category = category;
        }
        event.severity = self.severity.unwrap_or_default();
        event.message = self.message;
        event.code = self.code;
        event
    }
}

/// Registers alert rules against injected collaborators.
///
/// Cheap to clone; clones share the same dispatchers and provider.
#[derive(Clone)]
pub struct MetricRules {
    provider: Arc<dyn MetricProvider>,
    metrics: Arc<EventDispatcher<SinkEvent>>,
    alerts: Arc<EventDispatcher<ComplexEvent>>,
}

impl MetricRules {
    pub fn new(
        provider: Arc<dyn MetricProvider>,
        metrics: Arc<EventDispatcher<SinkEvent>>,
        alerts: Arc<EventDispatcher<ComplexEvent>>,
    ) -> Self {
        Self {
            provider,
            metrics,
            alerts,
        }
    }

    /// Register a threshold rule.
    ///
    /// The action runs on the dispatching thread for every passing event;
    /// action errors are logged and never propagate into dispatch.
    pub fn threshold<F>(&self, rule: ThresholdRule, action: F) -> SubscriptionId
    where
        F: Fn(&AlertSample) -> Result<()> + Send + Sync + 'static,
    {
        let detector = ThresholdFilter::new(rule.threshold, rule.above, rule.interval_ms);
        self.register(rule.id, rule.category, Box::new(detector), action)
    }

    /// Register a sustained threshold rule.
    ///
    /// Fails with `InvalidRule` when neither a duration nor an amount was
    /// given, or when the variation is outside 0.0 - 1.0.
    pub fn sustained_threshold<F>(
        &self,
        rule: SustainedThresholdRule,
        action: F,
    ) -> Result<SubscriptionId>
    where
        F: Fn(&AlertSample) -> Result<()> + Send + Sync + 'static,
    {
        let window = match (rule.amount, rule.duration_ms) {
            (Some(amount), _) => Window::Amount(amount),
            (None, Some(duration_ms)) => Window::Duration(duration_ms),
            (None, None) => {
                return Err(RulesError::InvalidRule(
                    "sustained threshold needs a duration or an amount".to_string(),
                ))
            }
        };
        if !(0.0..=1.0).contains(&rule.variation) {
            return Err(RulesError::InvalidRule(format!(
                "variation {} outside 0.0..=1.0",
                rule.variation
            )));
        }
        let detector = SustainedThresholdFilter::new(
            rule.threshold,
            rule.above,
            window,
            rule.variation,
            rule.minimum,
            rule.interval_ms,
        );
        Ok(self.register(rule.id, rule.category, Box::new(detector), action))
    }

    fn register<F>(
        &self,
        id: Option<String>,
        category: Option<String>,
        detector: Box<dyn EventFilter<SinkEvent>>,
        action: F,
    ) -> SubscriptionId
    where
        F: Fn(&AlertSample) -> Result<()> + Send + Sync + 'static,
    {
        let rule_id = id.clone();
        let rule_category = category.clone();
        let subscription = self.metrics.subscribe(move |event: &SinkEvent| {
            let sample = AlertSample {
                rule_id: rule_id.clone(),
                rule_category: rule_category.clone(),
                timestamp_ms: event.timestamp_ms,
                value: event.value,
            };
            if let Err(e) = action(&sample) {
                log::warn!(
                    "alert action failed for {}/{}: {}",
                    sample.rule_id.as_deref().unwrap_or("*"),
                    sample.rule_category.as_deref().unwrap_or("*"),
                    e
                );
            }
        });
        let scope = ScopeFilter::new(id.clone(), category);
        self.metrics.filter(
            subscription,
            Box::new(AllFilter::new(vec![Box::new(scope), detector])),
        );
        if let Some(ref id) = id {
            self.enable_metrics_for(id);
        }
        subscription
    }

    /// Turn on sink-event emission for the watched metric, so a rule scoped
    /// to an id starts seeing data without the instrumented code opting in.
    fn enable_metrics_for(&self, id: &str) {
        match self.provider.metric_instance(id) {
            Some(instance) => instance.set_events_enabled(true),
            None => log::debug!("no metric instance for {}, events not enabled", id),
        }
    }

    /// Remove a previously registered rule.
    pub fn unregister(&self, id: SubscriptionId) {
        self.metrics.unsubscribe(id);
    }

    /// Build and fire a structured alert event on the alert dispatcher.
    pub fn fire_event(&self, event: AlertEvent) {
        self.alerts.fire(&event.build());
    }

    /// Filesystem usage, keyed by mount point.
    pub fn filestores(&self) -> Result<HashMap<String, FilestoreUsage>> {
        filestore::filestore_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricInstance, SimpleMetricProvider};
    use std::sync::Mutex;

    fn setup() -> (
        MetricRules,
        Arc<SimpleMetricProvider>,
        Arc<EventDispatcher<SinkEvent>>,
        Arc<EventDispatcher<ComplexEvent>>,
    ) {
        let metrics = Arc::new(EventDispatcher::new());
        let alerts = Arc::new(EventDispatcher::new());
        let provider = Arc::new(SimpleMetricProvider::new(metrics.clone()));
        let rules = MetricRules::new(provider.clone(), metrics.clone(), alerts.clone());
        (rules, provider, metrics, alerts)
    }

    #[test]
    fn test_threshold_rule_invokes_action_with_rule_scope() {
        let (rules, _, metrics, _) = setup();
        let samples = Arc::new(Mutex::new(Vec::new()));
        let samples2 = samples.clone();
        rules.threshold(
            ThresholdRule::new(75).with_id("system").with_category("load"),
            move |sample| {
                samples2.lock().unwrap().push(sample.clone());
                Ok(())
            },
        );

        metrics.fire(&SinkEvent::new("system", "load", 1000, 50));
        metrics.fire(&SinkEvent::new("system", "load", 2000, 80));
        metrics.fire(&SinkEvent::new("system", "memory", 3000, 99));
        metrics.fire(&SinkEvent::new("other", "load", 4000, 99));
        metrics.fire(&SinkEvent::new("system.cpu", "load", 5000, 90));

        let seen = samples.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].value, 80);
        assert_eq!(seen[0].rule_id.as_deref(), Some("system"));
        assert_eq!(seen[0].rule_category.as_deref(), Some("load"));
        // child id matched, action still sees the rule scope
        assert_eq!(seen[1].value, 90);
        assert_eq!(seen[1].rule_id.as_deref(), Some("system"));
    }

    #[test]
    fn test_registration_enables_metric_events() {
        let (rules, provider, _, _) = setup();
        rules.threshold(ThresholdRule::new(10).with_id("db"), |_| Ok(()));
        let instance = provider.metric_instance("db").unwrap();
        assert!(instance.events_enabled());
    }

    #[test]
    fn test_rule_fires_on_metric_mutation_end_to_end() {
        let (rules, provider, _, alerts) = setup();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let fired2 = fired.clone();
        alerts.subscribe(move |event: &ComplexEvent| {
            fired2.lock().unwrap().push(event.clone());
        });

        let fire = rules.clone();
        rules.threshold(
            ThresholdRule::new(90).with_id("system").with_category("load"),
            move |sample| {
                fire.fire_event(
                    AlertEvent::new()
                        .with_id("system")
                        .with_name("load")
                        .with_severity(EventSeverity::Error)
                        .with_message(format!("load at {}", sample.value)),
                );
                Ok(())
            },
        );

        let instance = provider.metric_instance("system").unwrap();
        instance.set("load", 50);
        instance.set("load", 95);

        let events = fired.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].artifact_id.as_deref(), Some("system"));
        assert_eq!(events[0].severity, EventSeverity::Error);
        assert_eq!(events[0].message.as_deref(), Some("load at 95"));
    }

    #[test]
    fn test_sustained_rule_requires_window() {
        let (rules, _, _, _) = setup();
        let result =
            rules.sustained_threshold(SustainedThresholdRule::new(75), |_| Ok(()));
        assert!(matches!(result, Err(RulesError::InvalidRule(_))));
    }

    #[test]
    fn test_sustained_rule_rejects_bad_variation() {
        let (rules, _, _, _) = setup();
        let result = rules.sustained_threshold(
            SustainedThresholdRule::new(75)
                .with_amount(5)
                .with_variation(1.5),
            |_| Ok(()),
        );
        assert!(matches!(result, Err(RulesError::InvalidRule(_))));
    }

    #[test]
    fn test_sustained_rule_amount_window() {
        let (rules, _, metrics, _) = setup();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let hits2 = hits.clone();
        rules
            .sustained_threshold(
                SustainedThresholdRule::new(75)
                    .with_id("system")
                    .with_amount(3),
                move |sample| {
                    hits2.lock().unwrap().push(sample.value);
                    Ok(())
                },
            )
            .unwrap();

        for (ts, value) in [(0, 80), (1000, 85), (2000, 90)] {
            metrics.fire(&SinkEvent::new("system", "load", ts, value));
        }
        assert_eq!(*hits.lock().unwrap(), vec![90]);
    }

    #[test]
    fn test_amount_takes_precedence_over_duration() {
        let (rules, _, metrics, _) = setup();
        let hits = Arc::new(Mutex::new(0usize));
        let hits2 = hits.clone();
        rules
            .sustained_threshold(
                SustainedThresholdRule::new(75)
                    .with_amount(2)
                    .with_duration_ms(60 * 60_000),
                move |_| {
                    *hits2.lock().unwrap() += 1;
                    Ok(())
                },
            )
            .unwrap();

        // two samples suffice; the hour-long duration is ignored
        metrics.fire(&SinkEvent::new("m", "c", 0, 80));
        metrics.fire(&SinkEvent::new("m", "c", 1000, 80));
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_action_error_is_contained() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (rules, _, metrics, _) = setup();
        let after = Arc::new(Mutex::new(0usize));
        let after2 = after.clone();
        rules.threshold(ThresholdRule::new(0), move |_| {
            Err(RulesError::Action("boom".to_string()))
        });
        rules.threshold(ThresholdRule::new(0), move |_| {
            *after2.lock().unwrap() += 1;
            Ok(())
        });
        metrics.fire(&SinkEvent::new("m", "c", 0, 5));
        // the failing action did not disturb dispatch to the second rule
        assert_eq!(*after.lock().unwrap(), 1);
    }

    #[test]
    fn test_unregister_stops_rule() {
        let (rules, _, metrics, _) = setup();
        let hits = Arc::new(Mutex::new(0usize));
        let hits2 = hits.clone();
        let id = rules.threshold(ThresholdRule::new(0), move |_| {
            *hits2.lock().unwrap() += 1;
            Ok(())
        });
        metrics.fire(&SinkEvent::new("m", "c", 0, 5));
        rules.unregister(id);
        metrics.fire(&SinkEvent::new("m", "c", 1, 5));
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_below_threshold_rule() {
        let (rules, _, metrics, _) = setup();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let hits2 = hits.clone();
        rules.threshold(ThresholdRule::new(10).below(), move |sample| {
            hits2.lock().unwrap().push(sample.value);
            Ok(())
        });
        metrics.fire(&SinkEvent::new("m", "c", 0, 50));
        metrics.fire(&SinkEvent::new("m", "c", 1, 5));
        assert_eq!(*hits.lock().unwrap(), vec![5]);
    }

    #[test]
    fn test_fire_event_defaults() {
        let (rules, _, _, alerts) = setup();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let fired2 = fired.clone();
        alerts.subscribe(move |event: &ComplexEvent| {
            fired2.lock().unwrap().push(event.clone());
        });
        rules.fire_event(AlertEvent::new().with_name("load"));
        let events = fired.lock().unwrap();
        assert_eq!(events[0].event_category, "metric-rules");
        assert_eq!(events[0].severity, EventSeverity::Info);
        assert_eq!(events[0].event_name.as_deref(), Some("load"));
    }
}
