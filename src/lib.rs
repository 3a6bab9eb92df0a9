//! metric-rules - threshold alerting over metric sink event streams
//!
//! This crate wires alert rules onto a stream of metric observations:
//! - **Metrics**: gauge instances emitting `SinkEvent`s through a typed
//!   dispatcher, looked up by hierarchical id via a `MetricProvider`
//! - **Filters**: threshold and sustained-threshold detection with refire
//!   cooldowns and variation tolerance, scoped per metric id/category
//! - **Rules**: `MetricRules` translates rule parameters into filtered
//!   subscriptions and fires structured `ComplexEvent`s when rules trip
//! - **Config**: declarative rule sets loadable from TOML or JSON
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use metric_rules::{
//!     AlertEvent, EventDispatcher, EventSeverity, MetricProvider,
//!     MetricRules, SimpleMetricProvider, ThresholdRule,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = Arc::new(EventDispatcher::new());
//! let alerts = Arc::new(EventDispatcher::new());
//! let provider = Arc::new(SimpleMetricProvider::new(metrics.clone()));
//! let rules = MetricRules::new(provider.clone(), metrics, alerts);
//!
//! let fire = rules.clone();
//! rules.threshold(
//!     ThresholdRule::new(90).with_id("system").with_category("load"),
//!     move |sample| {
//!         fire.fire_event(
//!             AlertEvent::new()
//!                 .with_id("system")
//!                 .with_name("load")
//!                 .with_severity(EventSeverity::Warning)
//!                 .with_message(format!("load at {}", sample.value)),
//!         );
//!         Ok(())
//!     },
//! );
//!
//! // registration enabled event emission for the watched metric
//! let system = provider.metric_instance("system").unwrap();
//! system.set("load", 95); // trips the rule
//! # Ok(())
//! # }
//! ```

pub mod cep;
pub mod config;
pub mod error;
pub mod events;
pub mod filestore;
pub mod filters;
pub mod metrics;
pub mod rules;

pub use cep::{ComplexEvent, EventSeverity, DEFAULT_EVENT_CATEGORY};
pub use config::{AlertEventDef, RuleDef, RuleKind, RuleSet};
pub use error::{Result, RulesError};
pub use events::{AllFilter, EventDispatcher, EventFilter, FnFilter, SubscriptionId};
pub use filestore::{filestore_usage, FilestoreUsage};
pub use filters::{ScopeFilter, SustainedThresholdFilter, ThresholdFilter, Window};
pub use metrics::{
    GaugeInstance, GroupedInstance, MetricInstance, MetricProvider, SimpleMetricProvider,
    SinkEvent,
};
pub use rules::{
    AlertEvent, AlertSample, MetricRules, SustainedThresholdRule, ThresholdRule,
};
