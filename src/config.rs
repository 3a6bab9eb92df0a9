//! Declarative rule sets
//!
//! Rule definitions deserializable from TOML or JSON, applied against a
//! `MetricRules`. Each definition pairs a threshold (or sustained
//! threshold) with the alert event to fire when it trips.
//!
//! ```toml
//! [[rules]]
//! kind = "sustained"
//! id = "system"
//! category = "load"
//! threshold = 75
//! duration_ms = 300000
//! variation = 0.15
//! minimum = 50
//!
//! [rules.event]
//! name = "load"
//! severity = "error"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cep::EventSeverity;
use crate::error::{Result, RulesError};
use crate::events::SubscriptionId;
use crate::rules::{
    AlertEvent, MetricRules, SustainedThresholdRule, ThresholdRule,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Threshold,
    Sustained,
}

/// The alert event a rule fires when it trips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEventDef {
    pub name: String,
    pub category: Option<String>,
    pub severity: Option<EventSeverity>,
    pub message: Option<String>,
    pub code: Option<String>,
}

/// One rule definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDef {
    pub kind: RuleKind,
    pub id: Option<String>,
    pub category: Option<String>,
    pub threshold: i64,
    /// Fire on values at or below the threshold instead of at or above
    #[serde(default)]
    pub below: bool,
    pub duration_ms: Option<i64>,
    pub amount: Option<usize>,
    pub variation: Option<f64>,
    pub minimum: Option<usize>,
    pub interval_ms: Option<i64>,
    pub event: AlertEventDef,
}

/// A set of rule definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

impl RuleSet {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|e| RulesError::Parse(e.to_string()))
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| RulesError::Parse(e.to_string()))
    }

    /// Load a rule set from a .toml or .json file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            other => Err(RulesError::Configuration(format!(
                "unsupported rule file extension: {:?}",
                other
            ))),
        }
    }
}

impl MetricRules {
    /// Register every rule in the set; the action of each rule fires the
    /// configured alert event, with a rendered default message when none
    /// was configured.
    ///
    /// Application is all-or-nothing: when a definition is rejected, rules
    /// registered from earlier definitions are unregistered again.
    pub fn apply(&self, set: &RuleSet) -> Result<Vec<SubscriptionId>> {
        let mut registered = Vec::with_capacity(set.rules.len());
        for def in &set.rules {
            let rules = self.clone();
            let event = def.event.clone();
            let rule_id = def.id.clone();
            let action = move |sample: &crate::rules::AlertSample| {
                let message = event.message.clone().unwrap_or_else(|| {
                    format!(
                        "{}/{} value {} at {}",
                        sample.rule_id.as_deref().unwrap_or("*"),
                        sample.rule_category.as_deref().unwrap_or("*"),
                        sample.value,
                        sample.timestamp_ms
                    )
                });
                let mut alert = AlertEvent::new()
                    .with_name(event.name.clone())
                    .with_message(message)
                    .with_severity(event.severity.unwrap_or_default());
                if let Some(ref id) = rule_id {
                    alert = alert.with_id(id.clone());
                }
                if let Some(ref category) = event.category {
                    alert = alert.with_category(category.clone());
                }
                if let Some(ref code) = event.code {
                    alert = alert.with_code(code.clone());
                }
                rules.fire_event(alert);
                Ok(())
            };

            let subscription = match def.kind {
                RuleKind::Threshold => {
                    let mut rule = ThresholdRule::new(def.threshold);
                    if let Some(ref id) = def.id {
                        rule = rule.with_id(id.clone());
                    }
                    if let Some(ref category) = def.category {
                        rule = rule.with_category(category.clone());
                    }
                    if def.below {
                        rule = rule.below();
                    }
                    if let Some(interval) = def.interval_ms {
                        rule = rule.with_interval_ms(interval);
                    }
                    self.threshold(rule, action)
                }
                RuleKind::Sustained => {
                    let mut rule = SustainedThresholdRule::new(def.threshold);
                    if let Some(ref id) = def.id {
                        rule = rule.with_id(id.clone());
                    }
                    if let Some(ref category) = def.category {
                        rule = rule.with_category(category.clone());
                    }
                    if def.below {
                        rule = rule.below();
                    }
                    if let Some(duration) = def.duration_ms {
                        rule = rule.with_duration_ms(duration);
                    }
                    if let Some(amount) = def.amount {
                        rule = rule.with_amount(amount);
                    }
                    if let Some(variation) = def.variation {
                        rule = rule.with_variation(variation);
                    }
                    if let Some(minimum) = def.minimum {
                        rule = rule.with_minimum(minimum);
                    }
                    if let Some(interval) = def.interval_ms {
                        rule = rule.with_interval_ms(interval);
                    }
                    match self.sustained_threshold(rule, action) {
                        Ok(subscription) => subscription,
                        Err(e) => {
                            // a rule set applies atomically: roll back the
                            // rules registered so far
                            for id in registered {
                                self.unregister(id);
                            }
                            return Err(e);
                        }
                    }
                }
            };
            registered.push(subscription);
        }
        Ok(registered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cep::ComplexEvent;
    use crate::events::EventDispatcher;
    use crate::metrics::{SimpleMetricProvider, SinkEvent};
    use std::sync::{Arc, Mutex};

    const TOML_RULES: &str = r#"
        [[rules]]
        kind = "threshold"
        id = "system"
        category = "load"
        threshold = 90
        interval_ms = 60000

        [rules.event]
        name = "load"
        severity = "warning"
        code = "LOAD-HIGH"

        [[rules]]
        kind = "sustained"
        id = "system"
        category = "load"
        threshold = 75
        duration_ms = 300000
        variation = 0.15
        minimum = 50

        [rules.event]
        name = "load"
        severity = "error"
    "#;

    #[test]
    fn test_parse_toml() {
        let set = RuleSet::from_toml_str(TOML_RULES).unwrap();
        assert_eq!(set.rules.len(), 2);
        assert_eq!(set.rules[0].kind, RuleKind::Threshold);
        assert_eq!(set.rules[0].event.severity, Some(EventSeverity::Warning));
        assert_eq!(set.rules[1].kind, RuleKind::Sustained);
        assert_eq!(set.rules[1].variation, Some(0.15));
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "rules": [{
                "kind": "threshold",
                "threshold": 10,
                "event": { "name": "slow" }
            }]
        }"#;
        let set = RuleSet::from_json_str(json).unwrap();
        assert_eq!(set.rules.len(), 1);
        assert!(set.rules[0].id.is_none());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let json = r#"{
            "rules": [{
                "kind": "gradient",
                "threshold": 10,
                "event": { "name": "x" }
            }]
        }"#;
        assert!(matches!(
            RuleSet::from_json_str(json),
            Err(RulesError::Parse(_))
        ));
    }

    #[test]
    fn test_apply_registers_and_fires() {
        let metrics = Arc::new(EventDispatcher::new());
        let alerts = Arc::new(EventDispatcher::<ComplexEvent>::new());
        let provider = Arc::new(SimpleMetricProvider::new(metrics.clone()));
        let rules = MetricRules::new(provider, metrics.clone(), alerts.clone());

        let fired = Arc::new(Mutex::new(Vec::new()));
        let fired2 = fired.clone();
        alerts.subscribe(move |event: &ComplexEvent| {
            fired2.lock().unwrap().push(event.clone());
        });

        let set = RuleSet::from_toml_str(TOML_RULES).unwrap();
        let registered = rules.apply(&set).unwrap();
        assert_eq!(registered.len(), 2);

        metrics.fire(&SinkEvent::new("system", "load", 1000, 95));
        let events = fired.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_name.as_deref(), Some("load"));
        assert_eq!(events[0].severity, EventSeverity::Warning);
        assert_eq!(events[0].code.as_deref(), Some("LOAD-HIGH"));
        assert_eq!(events[0].artifact_id.as_deref(), Some("system"));
        // no configured message: the rendered default names the rule scope
        assert!(events[0]
            .message
            .as_deref()
            .unwrap()
            .contains("system/load value 95"));
    }

    #[test]
    fn test_apply_rejects_windowless_sustained() {
        let metrics = Arc::new(EventDispatcher::new());
        let alerts = Arc::new(EventDispatcher::<ComplexEvent>::new());
        let provider = Arc::new(SimpleMetricProvider::new(metrics.clone()));
        let rules = MetricRules::new(provider, metrics, alerts);

        let json = r#"{
            "rules": [{
                "kind": "sustained",
                "threshold": 10,
                "event": { "name": "x" }
            }]
        }"#;
        let set = RuleSet::from_json_str(json).unwrap();
        assert!(matches!(
            rules.apply(&set),
            Err(RulesError::InvalidRule(_))
        ));
    }

    #[test]
    fn test_apply_rolls_back_on_invalid_rule() {
        let metrics = Arc::new(EventDispatcher::new());
        let alerts = Arc::new(EventDispatcher::<ComplexEvent>::new());
        let provider = Arc::new(SimpleMetricProvider::new(metrics.clone()));
        let rules = MetricRules::new(provider, metrics.clone(), alerts);

        // a valid threshold rule followed by a windowless sustained rule
        let json = r#"{
            "rules": [
                {
                    "kind": "threshold",
                    "id": "system",
                    "threshold": 90,
                    "event": { "name": "load" }
                },
                {
                    "kind": "sustained",
                    "threshold": 10,
                    "event": { "name": "x" }
                }
            ]
        }"#;
        let set = RuleSet::from_json_str(json).unwrap();
        assert!(rules.apply(&set).is_err());
        // the first rule was unregistered again
        assert_eq!(metrics.subscriber_count(), 0);
    }

    #[test]
    fn test_load_dispatches_on_extension() {
        let dir = std::env::temp_dir();
        let path = dir.join("metric_rules_test_load.toml");
        std::fs::write(&path, TOML_RULES).unwrap();
        let set = RuleSet::load(&path).unwrap();
        assert_eq!(set.rules.len(), 2);
        std::fs::remove_file(&path).ok();

        let bad = dir.join("metric_rules_test_load.yaml");
        std::fs::write(&bad, "rules: []").unwrap();
        assert!(matches!(
            RuleSet::load(&bad),
            Err(RulesError::Configuration(_))
        ));
        std::fs::remove_file(&bad).ok();
    }
}
