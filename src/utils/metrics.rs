//! Utility metrics and helpers.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Simple profiler for timing labelled sections.
#[derive(Debug, Default)]
pub struct Profiler {
    start_times: HashMap<String, Instant>,
    durations: HashMap<String, Duration>,
    counts: HashMap<String, usize>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, label: &str) {
        self.start_times.insert(label.to_string(), Instant::now());
    }

    pub fn end(&mut self, label: &str) {
        if let Some(start) = self.start_times.remove(label) {
            *self.durations.entry(label.to_string()).or_default() += start.elapsed();
            *self.counts.entry(label.to_string()).or_default() += 1;
        }
    }

    /// Time `f` under `label`.
    pub fn time<T>(&mut self, label: &str, f: impl FnOnce() -> T) -> T {
        self.start(label);
        let out = f();
        self.end(label);
        out
    }

    pub fn total_ms(&self, label: &str) -> f64 {
        self.durations
            .get(label)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }

    /// Mean milliseconds per completed section.
    pub fn mean_ms(&self, label: &str) -> f64 {
        match self.counts.get(label) {
            Some(&n) if n > 0 => self.total_ms(label) / n as f64,
            _ => 0.0,
        }
    }

    pub fn report(&self) -> HashMap<String, Duration> {
        self.durations.clone()
    }
}

/// Argmax over a slice of f32.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}
