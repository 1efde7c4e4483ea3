//! Rolling least-squares flow-rate estimator.
//!
//! Samples live in a fixed ring buffer; the flow rate is the OLS slope of
//! weight against seconds since the oldest retained sample.

use std::cmp::Ordering;

/// Default ring capacity.
pub const DEFAULT_WINDOW: usize = 20;
/// Upper clamp for the computed slope, in g/s.
pub const MAX_PLAUSIBLE_FLOW_GPS: f32 = 10.0;
/// Below this many samples the estimate is 0.
pub const MIN_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlowSample {
    pub time_s: f32,
    pub weight_g: f32,
}

#[derive(Debug, Clone)]
pub struct FlowEstimator {
    buf: Vec<FlowSample>,
    head: usize,
    count: usize,
    max_flow_gps: f32,
}

impl Default for FlowEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, MAX_PLAUSIBLE_FLOW_GPS)
    }
}

impl FlowEstimator {
    /// `window` is clamped to at least 1; `max_flow_gps` to at least 0.
    pub fn new(window: usize, max_flow_gps: f32) -> Self {
        Self {
            buf: vec![FlowSample::default(); window.max(1)],
            head: 0,
            count: 0,
            max_flow_gps: max_flow_gps.max(0.0),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append a sample, overwriting the oldest one when full.
    pub fn push(&mut self, sample: FlowSample) {
        let cap = self.capacity();
        self.buf[self.head] = sample;
        self.head = (self.head + 1) % cap;
        self.count = (self.count + 1).min(cap);
    }

    pub fn reset(&mut self) {
        self.head = 0;
        self.count = 0;
    }

    /// Retained samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = FlowSample> + '_ {
        let cap = self.capacity();
        let start = if self.count < cap { 0 } else { self.head };
        (0..self.count).map(move |i| self.buf[(start + i) % cap])
    }

    pub fn newest(&self) -> Option<FlowSample> {
        if self.count == 0 {
            return None;
        }
        let cap = self.capacity();
        Some(self.buf[(self.head + cap - 1) % cap])
    }

    fn oldest(&self) -> Option<FlowSample> {
        self.samples().next()
    }

    /// Smoothed flow in g/s, clamped to `[0, max_flow_gps]`.
    ///
    /// Returns 0 with fewer than [`MIN_SAMPLES`] samples, a degenerate time
    /// axis, or a window whose newest timestamp precedes its oldest.
    pub fn current_flow_rate(&self) -> f32 {
        if self.count < MIN_SAMPLES {
            return 0.0;
        }
        let (Some(oldest), Some(newest)) = (self.oldest(), self.newest()) else {
            return 0.0;
        };
        if newest.time_s.partial_cmp(&oldest.time_s).is_none_or(|o| o == Ordering::Less) {
            return 0.0;
        }

        let t0 = f64::from(oldest.time_s);
        let (mut sx, mut sy, mut sxx, mut sxy) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
        for s in self.samples() {
            let x = f64::from(s.time_s) - t0;
            let y = f64::from(s.weight_g);
            sx += x;
            sy += y;
            sxx += x * x;
            sxy += x * y;
        }
        let n = self.count as f64;
        let den = n * sxx - sx * sx;
        if den.abs() <= f64::EPSILON {
            return 0.0;
        }
        let slope = ((n * sxy - sx * sy) / den) as f32;
        if !slope.is_finite() {
            return 0.0;
        }
        slope.clamp(0.0, self.max_flow_gps)
    }
}
