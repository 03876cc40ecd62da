use super::ChannelValue;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Shape of the smoothing applied to a live channel before it is exposed:
/// round, then suppress jitter, then distinct-until-changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterSpec {
    /// Decimal places to keep on numeric values.
    pub precision: Option<u32>,
    /// Minimum time between two emitted values.
    pub stability: Option<Duration>,
}

impl FilterSpec {
    pub const NONE: FilterSpec = FilterSpec {
        precision: None,
        stability: None,
    };

    pub const fn round(precision: u32) -> Self {
        Self {
            precision: Some(precision),
            stability: None,
        }
    }

    /// Rounded and sampled; for noisy instruments (rpm, temperature,
    /// pressure, current, voltage).
    pub const fn instrument(precision: u32) -> Self {
        Self {
            precision: Some(precision),
            stability: Some(Duration::from_millis(500)),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ChannelFilter {
    spec: FilterSpec,
    last_emitted: Option<ChannelValue>,
    last_emit_at: Option<DateTime<Utc>>,
    // held back by the stability window, emitted by `flush`
    pending: Option<ChannelValue>,
}

impl ChannelFilter {
    pub fn new(spec: FilterSpec) -> Self {
        Self {
            spec,
            last_emitted: None,
            last_emit_at: None,
            pending: None,
        }
    }

    pub fn spec(&self) -> FilterSpec {
        self.spec
    }

    /// Feeds one raw sample through the filter. Returns the value to emit,
    /// or `None` if the sample is suppressed. A changed value suppressed by
    /// the stability window is kept and comes out of a later [`flush`].
    ///
    /// [`flush`]: Self::flush
    pub fn apply(&mut self, value: &ChannelValue, at: DateTime<Utc>) -> Option<ChannelValue> {
        let value = match self.spec.precision {
            Some(precision) => value.rounded(precision),
            None => value.clone(),
        };

        if self.last_emitted.as_ref() == Some(&value) {
            self.pending = None;
            return None;
        }

        if !self.window_elapsed(at) {
            self.pending = Some(value);
            return None;
        }

        Some(self.emit(value, at))
    }

    /// Emits the held-back value once its window has passed.
    pub fn flush(&mut self, at: DateTime<Utc>) -> Option<ChannelValue> {
        if self.pending.is_none() || !self.window_elapsed(at) {
            return None;
        }
        let value = self.pending.take()?;
        Some(self.emit(value, at))
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn window_elapsed(&self, at: DateTime<Utc>) -> bool {
        match (self.spec.stability, self.last_emit_at) {
            (Some(window), Some(last_at)) => (at - last_at)
                .to_std()
                .map(|elapsed| elapsed >= window)
                .unwrap_or(false),
            _ => true,
        }
    }

    fn emit(&mut self, value: ChannelValue, at: DateTime<Utc>) -> ChannelValue {
        self.pending = None;
        self.last_emitted = Some(value.clone());
        self.last_emit_at = Some(at);
        value
    }
}
