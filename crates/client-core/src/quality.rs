//! Network quality warnings
//!
//! The engine produces a [`QualitySample`] roughly once per second while a
//! call has media. [`QualityWarningAggregator`] keeps a sliding window per
//! metric and raises or clears five independent [`QualityWarning`]s.
//!
//! Raise and clear thresholds differ so a metric hovering around a single
//! limit does not flap:
//!
//! | Warning | Window | Raised when | Cleared when |
//! |---|---|---|---|
//! | `HighRtt` | 5 | 3 or more samples > 400 ms | all samples < 400 ms |
//! | `HighJitter` | 5 | 3 or more samples > 30 ms | all samples < 30 ms |
//! | `LowMos` | 5 | 3 or more samples < 3.5 | all samples ≥ 3.5 |
//! | `HighPacketsLostFraction` | 7 | mean > 3 % | mean ≤ 1 % |
//! | `ConstantAudioInputLevel` | 10 | std. deviation ≤ 327.67 | std. deviation > 983.01 |
//!
//! A window is only evaluated once it is full. Audio input levels are not
//! recorded while the call is muted.
//!
//! # Usage Examples
//!
//! ```rust
//! use voxlink_client_core::quality::{QualitySample, QualityWarning, QualityWarningAggregator};
//!
//! let mut aggregator = QualityWarningAggregator::new();
//! let mut last = None;
//! for rtt in [410.0, 420.0, 430.0, 100.0, 100.0] {
//!     last = Some(aggregator.evaluate(&QualitySample::new().with_rtt(rtt), false));
//! }
//! let update = last.unwrap();
//! assert!(update.current.contains(&QualityWarning::HighRtt));
//! assert!(update.previous.is_empty());
//! ```

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Largest value an audio input level sample can take.
pub const MAX_AUDIO_LEVEL: f64 = 32767.0;

pub const RTT_WINDOW: usize = 5;
pub const RTT_THRESHOLD_MS: f64 = 400.0;
pub const JITTER_WINDOW: usize = 5;
pub const JITTER_THRESHOLD_MS: f64 = 30.0;
pub const MOS_WINDOW: usize = 5;
pub const MOS_THRESHOLD: f64 = 3.5;
/// Samples beyond the threshold needed to raise the RTT, jitter and MOS warnings.
pub const RAISE_COUNT: usize = 3;
pub const PACKET_LOSS_WINDOW: usize = 7;
pub const PACKET_LOSS_RAISE_PERCENT: f64 = 3.0;
pub const PACKET_LOSS_CLEAR_PERCENT: f64 = 1.0;
pub const AUDIO_LEVEL_WINDOW: usize = 10;
pub const AUDIO_LEVEL_RAISE_STDDEV: f64 = MAX_AUDIO_LEVEL * 0.01;
pub const AUDIO_LEVEL_CLEAR_STDDEV: f64 = MAX_AUDIO_LEVEL * 0.03;

/// Network quality warning kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityWarning {
    HighRtt,
    HighJitter,
    HighPacketsLostFraction,
    LowMos,
    /// The microphone appears to be delivering a flat signal
    ConstantAudioInputLevel,
}

impl fmt::Display for QualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QualityWarning::HighRtt => "high-rtt",
            QualityWarning::HighJitter => "high-jitter",
            QualityWarning::HighPacketsLostFraction => "high-packet-loss",
            QualityWarning::LowMos => "low-mos",
            QualityWarning::ConstantAudioInputLevel => "constant-audio-input-level",
        };
        f.write_str(name)
    }
}

/// Ordered set of active warnings
pub type WarningSet = BTreeSet<QualityWarning>;

/// One periodic measurement. Missing metrics leave their window untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualitySample {
    pub rtt_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub mos: Option<f64>,
    /// Packets lost in the interval, in percent (0-100)
    pub packets_lost_percent: Option<f64>,
    /// Microphone level, 0 to [`MAX_AUDIO_LEVEL`]
    pub audio_input_level: Option<f64>,
}

impl QualitySample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rtt(mut self, rtt_ms: f64) -> Self {
        self.rtt_ms = Some(rtt_ms);
        self
    }

    pub fn with_jitter(mut self, jitter_ms: f64) -> Self {
        self.jitter_ms = Some(jitter_ms);
        self
    }

    pub fn with_mos(mut self, mos: f64) -> Self {
        self.mos = Some(mos);
        self
    }

    pub fn with_packets_lost_percent(mut self, percent: f64) -> Self {
        self.packets_lost_percent = Some(percent);
        self
    }

    pub fn with_audio_input_level(mut self, level: f64) -> Self {
        self.audio_input_level = Some(level);
        self
    }
}

/// Warning sets before and after one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WarningUpdate {
    pub current: WarningSet,
    pub previous: WarningSet,
}

impl WarningUpdate {
    pub fn changed(&self) -> bool {
        self.current != self.previous
    }

    /// Warnings present now that were not present before
    pub fn raised(&self) -> WarningSet {
        self.current.difference(&self.previous).copied().collect()
    }

    /// Warnings that went away
    pub fn cleared(&self) -> WarningSet {
        self.previous.difference(&self.current).copied().collect()
    }
}

#[derive(Debug, Clone)]
struct Window {
    values: VecDeque<f64>,
    capacity: usize,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    fn clear(&mut self) {
        self.values.clear();
    }

    fn count(&self, predicate: impl Fn(f64) -> bool) -> usize {
        self.values.iter().filter(|v| predicate(**v)).count()
    }

    fn all(&self, predicate: impl Fn(f64) -> bool) -> bool {
        self.values.iter().all(|v| predicate(*v))
    }

    fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population standard deviation
    fn std_dev(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .values
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / self.values.len() as f64;
        variance.sqrt()
    }
}

#[derive(Debug, Clone, Copy)]
enum Rule {
    /// Raise on `count` samples above, clear when all are below
    CountAbove { threshold: f64, count: usize },
    /// Raise on `count` samples below, clear when none are below
    CountBelow { threshold: f64, count: usize },
    MeanAbove { raise: f64, clear: f64 },
    StdDevAtMost { raise: f64, clear: f64 },
}

impl Rule {
    fn should_raise(&self, window: &Window) -> bool {
        match *self {
            Rule::CountAbove { threshold, count } => window.count(|v| v > threshold) >= count,
            Rule::CountBelow { threshold, count } => window.count(|v| v < threshold) >= count,
            Rule::MeanAbove { raise, .. } => window.mean() > raise,
            Rule::StdDevAtMost { raise, .. } => window.std_dev() <= raise,
        }
    }

    fn should_clear(&self, window: &Window) -> bool {
        match *self {
            Rule::CountAbove { threshold, .. } => window.all(|v| v < threshold),
            Rule::CountBelow { threshold, .. } => window.all(|v| v >= threshold),
            Rule::MeanAbove { clear, .. } => window.mean() <= clear,
            Rule::StdDevAtMost { clear, .. } => window.std_dev() > clear,
        }
    }
}

#[derive(Debug, Clone)]
struct Detector {
    warning: QualityWarning,
    window: Window,
    rule: Rule,
}

impl Detector {
    fn new(warning: QualityWarning, capacity: usize, rule: Rule) -> Self {
        Self {
            warning,
            window: Window::new(capacity),
            rule,
        }
    }

    fn record(&mut self, value: Option<f64>) {
        if let Some(value) = value.filter(|v| v.is_finite()) {
            self.window.push(value);
        }
    }

    /// New active flag, or `None` when the window is not yet full
    fn evaluate(&self, active: bool) -> Option<bool> {
        if !self.window.is_full() {
            return None;
        }
        if active {
            Some(!self.rule.should_clear(&self.window))
        } else {
            Some(self.rule.should_raise(&self.window))
        }
    }
}

/// Sliding window evaluator with hysteresis for the five quality warnings
#[derive(Debug, Clone)]
pub struct QualityWarningAggregator {
    rtt: Detector,
    jitter: Detector,
    mos: Detector,
    packet_loss: Detector,
    audio_level: Detector,
    active: WarningSet,
}

impl Default for QualityWarningAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityWarningAggregator {
    pub fn new() -> Self {
        Self {
            rtt: Detector::new(
                QualityWarning::HighRtt,
                RTT_WINDOW,
                Rule::CountAbove { threshold: RTT_THRESHOLD_MS, count: RAISE_COUNT },
            ),
            jitter: Detector::new(
                QualityWarning::HighJitter,
                JITTER_WINDOW,
                Rule::CountAbove { threshold: JITTER_THRESHOLD_MS, count: RAISE_COUNT },
            ),
            mos: Detector::new(
                QualityWarning::LowMos,
                MOS_WINDOW,
                Rule::CountBelow { threshold: MOS_THRESHOLD, count: RAISE_COUNT },
            ),
            packet_loss: Detector::new(
                QualityWarning::HighPacketsLostFraction,
                PACKET_LOSS_WINDOW,
                Rule::MeanAbove {
                    raise: PACKET_LOSS_RAISE_PERCENT,
                    clear: PACKET_LOSS_CLEAR_PERCENT,
                },
            ),
            audio_level: Detector::new(
                QualityWarning::ConstantAudioInputLevel,
                AUDIO_LEVEL_WINDOW,
                Rule::StdDevAtMost {
                    raise: AUDIO_LEVEL_RAISE_STDDEV,
                    clear: AUDIO_LEVEL_CLEAR_STDDEV,
                },
            ),
            active: WarningSet::new(),
        }
    }

    /// Currently active warnings
    pub fn current(&self) -> &WarningSet {
        &self.active
    }

    /// Feed one sample and re-evaluate every warning
    pub fn evaluate(&mut self, sample: &QualitySample, muted: bool) -> WarningUpdate {
        let previous = self.active.clone();

        self.rtt.record(sample.rtt_ms);
        self.jitter.record(sample.jitter_ms);
        self.mos.record(sample.mos);
        self.packet_loss.record(sample.packets_lost_percent);
        if !muted {
            self.audio_level.record(sample.audio_input_level);
        }

        let detectors = [
            &self.rtt,
            &self.jitter,
            &self.mos,
            &self.packet_loss,
            &self.audio_level,
        ];
        let mut current = previous.clone();
        for detector in detectors {
            if detector.warning == QualityWarning::ConstantAudioInputLevel && muted {
                continue;
            }
            let active = previous.contains(&detector.warning);
            match detector.evaluate(active) {
                Some(true) => {
                    current.insert(detector.warning);
                }
                Some(false) => {
                    current.remove(&detector.warning);
                }
                None => {}
            }
        }

        self.active = current.clone();
        WarningUpdate { current, previous }
    }

    /// Drop audio level history and its warning when the microphone is muted
    pub fn on_muted(&mut self) -> WarningUpdate {
        let previous = self.active.clone();
        self.audio_level.window.clear();
        self.active.remove(&QualityWarning::ConstantAudioInputLevel);
        WarningUpdate {
            current: self.active.clone(),
            previous,
        }
    }

    /// Forget all history and warnings
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
