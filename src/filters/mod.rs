//! Threshold and sustained-threshold detection filters
//!
//! Stateful filters over `SinkEvent` streams:
//! - `ScopeFilter`: restrict a subscription to a metric id/category
//! - `ThresholdFilter`: fire on individual values beyond a threshold
//! - `SustainedThresholdFilter`: fire only when a window of recent samples
//!   stays beyond the threshold, with a tolerated variation fraction
//!
//! All verdicts and cooldowns are keyed on event timestamps, not wall-clock
//! time, so replayed streams behave identically.

use std::collections::VecDeque;

use crate::events::EventFilter;
use crate::metrics::SinkEvent;

/// Restricts a subscription to one metric id and/or category.
///
/// An id matches exactly or as a dot-qualified prefix: a filter on "system"
/// also passes "system.cpu" but not "systemd".
#[derive(Debug, Clone, Default)]
pub struct ScopeFilter {
    id: Option<String>,
    category: Option<String>,
}

impl ScopeFilter {
    pub fn new(id: Option<String>, category: Option<String>) -> Self {
        Self { id, category }
    }

    fn matches(&self, event: &SinkEvent) -> bool {
        if let Some(ref id) = self.id {
            let child = event.id.len() > id.len()
                && event.id.starts_with(id.as_str())
                && event.id.as_bytes()[id.len()] == b'.';
            if event.id != *id && !child {
                return false;
            }
        }
        if let Some(ref category) = self.category {
            if event.category != *category {
                return false;
            }
        }
        true
    }
}

impl EventFilter<SinkEvent> for ScopeFilter {
    fn excludes(&mut self, event: &SinkEvent) -> bool {
        !self.matches(event)
    }
}

/// Timestamp-keyed refire cooldown shared by the detection filters.
#[derive(Debug, Clone, Default)]
struct Cooldown {
    interval_ms: i64,
    last_fired_ms: Option<i64>,
}

impl Cooldown {
    fn new(interval_ms: i64) -> Self {
        Self {
            interval_ms,
            last_fired_ms: None,
        }
    }

    /// Whether a pass at `timestamp_ms` is allowed; records it if so.
    fn admit(&mut self, timestamp_ms: i64) -> bool {
        if self.interval_ms > 0 {
            if let Some(last) = self.last_fired_ms {
                // out-of-order timestamps count as elapsed time zero
                if timestamp_ms.saturating_sub(last).max(0) < self.interval_ms {
                    return false;
                }
            }
        }
        self.last_fired_ms = Some(timestamp_ms);
        true
    }
}

fn beyond(value: i64, threshold: i64, above: bool) -> bool {
    if above {
        value >= threshold
    } else {
        value <= threshold
    }
}

/// Passes individual events whose value is beyond a threshold.
#[derive(Debug, Clone)]
pub struct ThresholdFilter {
    threshold: i64,
    above: bool,
    cooldown: Cooldown,
}

impl ThresholdFilter {
    /// `above` selects the violation direction: true fires on values >=
    /// threshold, false on values <= threshold. `interval_ms` suppresses
    /// refires until that much event time has elapsed (0 disables).
    pub fn new(threshold: i64, above: bool, interval_ms: i64) -> Self {
        Self {
            threshold,
            above,
            cooldown: Cooldown::new(interval_ms),
        }
    }
}

impl EventFilter<SinkEvent> for ThresholdFilter {
    fn excludes(&mut self, event: &SinkEvent) -> bool {
        if !beyond(event.value, self.threshold, self.above) {
            return true;
        }
        !self.cooldown.admit(event.timestamp_ms)
    }
}

/// Window bound for sustained detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Keep samples from the last N event-time milliseconds.
    Duration(i64),
    /// Keep the last N samples.
    Amount(usize),
}

/// Passes an event only when a whole window of recent samples sits beyond
/// the threshold.
///
/// `variation` is the tolerated fraction of window samples on the wrong
/// side of the threshold (0.15 = up to 15% of samples may dip below without
/// resetting the alert). `minimum` is a floor on the sample count before
/// any verdict, guarding against alerting off a near-empty window.
///
/// A duration window is mature once buffered samples span the configured
/// duration, or once older samples have started falling off the front. The
/// window is kept across fires; use the refire interval to pace alerts.
#[derive(Debug, Clone)]
pub struct SustainedThresholdFilter {
    threshold: i64,
    above: bool,
    window: Window,
    variation: f64,
    minimum: usize,
    cooldown: Cooldown,
    samples: VecDeque<(i64, i64)>,
    saturated: bool,
}

impl SustainedThresholdFilter {
    pub fn new(
        threshold: i64,
        above: bool,
        window: Window,
        variation: f64,
        minimum: usize,
        interval_ms: i64,
    ) -> Self {
        Self {
            threshold,
            above,
            window,
            variation: variation.clamp(0.0, 1.0),
            minimum,
            cooldown: Cooldown::new(interval_ms),
            samples: VecDeque::new(),
            saturated: false,
        }
    }

    fn push_and_evict(&mut self, event: &SinkEvent) {
        self.samples.push_back((event.timestamp_ms, event.value));
        match self.window {
            Window::Duration(duration_ms) => {
                let cutoff = event.timestamp_ms.saturating_sub(duration_ms);
                while self
                    .samples
                    .front()
                    .map(|(ts, _)| *ts < cutoff)
                    .unwrap_or(false)
                {
                    self.samples.pop_front();
                    self.saturated = true;
                }
            }
            Window::Amount(amount) => {
                while self.samples.len() > amount.max(1) {
                    self.samples.pop_front();
                    self.saturated = true;
                }
            }
        }
    }

    fn mature(&self) -> bool {
        if self.samples.len() < self.minimum.max(1) {
            return false;
        }
        match self.window {
            Window::Duration(duration_ms) => {
                if self.saturated {
                    return true;
                }
                let span = match (self.samples.front(), self.samples.back()) {
                    (Some((first, _)), Some((last, _))) => last.saturating_sub(*first),
                    _ => 0,
                };
                span >= duration_ms
            }
            Window::Amount(amount) => self.samples.len() >= amount.max(1),
        }
    }

    fn sustained(&self) -> bool {
        if self.samples.is_empty() {
            return false;
        }
        let calm = self
            .samples
            .iter()
            .filter(|(_, value)| !beyond(*value, self.threshold, self.above))
            .count();
        calm as f64 / self.samples.len() as f64 <= self.variation
    }
}

impl EventFilter<SinkEvent> for SustainedThresholdFilter {
    fn excludes(&mut self, event: &SinkEvent) -> bool {
        self.push_and_evict(event);
        if !self.mature() || !self.sustained() {
            return true;
        }
        !self.cooldown.admit(event.timestamp_ms)
    }
}
