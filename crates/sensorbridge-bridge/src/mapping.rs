//! Opto sensor mapping: smoothing, adaptive normalization, a Schmitt trigger
//! per sensor, and the valve-style pitch derived from the first four
//! triggers.

use sensorbridge_osc::OscMessage;
use tracing::trace;

/// Number of opto sensor slots.
pub const OPTO_SLOTS: usize = 6;

/// Opto readings arrive offset by this much.
pub const OPTO_VALUE_OFFSET: i32 = 1 << 15;

/// Slots whose triggers combine into `/pitch`.
pub const PITCH_SLOTS: usize = 4;

/// Four-bit trigger combination to ordered step.
pub const GRAY_CODE: [u8; 16] = [0, 1, 3, 2, 7, 6, 4, 5, 15, 14, 12, 13, 8, 9, 11, 10];

/// Semitone offsets within one octave.
pub const PITCHES: [i32; 5] = [0, 3, 5, 7, 10];

/// Full-scale normalized level.
const LEVEL_SCALE: f64 = 1000.0;

/// Pitch for a four-bit combination of trigger states (bit `i` set when
/// slot `i` is on).
pub fn pitch_for(combination: u8) -> i32 {
    let step = i32::from(GRAY_CODE[usize::from(combination & 0x0F)]);
    let len = PITCHES.len() as i32;
    PITCHES[(step % len) as usize] + (step / len) * 12
}

/// Output of a Schmitt trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerState {
    /// No reading has crossed a threshold yet.
    #[default]
    Unknown,
    Off,
    On,
}

impl TriggerState {
    /// Wire value: -1, 0, or 1.
    pub fn as_i32(self) -> i32 {
        match self {
            TriggerState::Unknown => -1,
            TriggerState::Off => 0,
            TriggerState::On => 1,
        }
    }
}

/// Hysteresis with independent falling and rising thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchmittTrigger {
    pub low: f64,
    pub high: f64,
}

impl SchmittTrigger {
    /// Next state for `level`; between the thresholds the previous state holds.
    pub fn next(&self, level: f64, previous: TriggerState) -> TriggerState {
        if level < self.low {
            TriggerState::Off
        } else if level > self.high {
            TriggerState::On
        } else {
            previous
        }
    }
}

impl Default for SchmittTrigger {
    fn default() -> Self {
        Self {
            low: 300.0,
            high: 500.0,
        }
    }
}

/// Tuning for the opto mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct OptoConfig {
    /// Weight of a new reading in the running mean.
    pub smoothing: f64,
    /// Max shrinks by this factor while the level sits below the midpoint.
    pub max_decay: f64,
    /// Min grows by this factor while the level sits at or above the midpoint.
    pub min_growth: f64,
    pub trigger: SchmittTrigger,
    pub initial: OptoState,
}

impl Default for OptoConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.1,
            max_decay: 0.999,
            min_growth: 1.001,
            trigger: SchmittTrigger::default(),
            initial: OptoState::default(),
        }
    }
}

/// Per-sensor running state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptoState {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub trigger: TriggerState,
}

impl Default for OptoState {
    fn default() -> Self {
        Self {
            mean: 500.0,
            min: 300.0,
            max: 1.0,
            trigger: TriggerState::Unknown,
        }
    }
}

/// Result of feeding one reading through the mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptoReading {
    pub slot: u8,
    /// Normalized level, nominally 0..=1000.
    pub level: f64,
    pub state: TriggerState,
    /// True when the trigger moved to a new known state.
    pub changed: bool,
    /// New pitch, when a change in slots 0..=3 alters the combination.
    pub pitch: Option<i32>,
}

impl OptoReading {
    /// Messages to publish for this reading, in order: `/button` and
    /// `/pitch` on a trigger change, then `/opto`.
    pub fn messages(&self) -> Vec<OscMessage> {
        let mut out = Vec::with_capacity(3);
        if self.changed {
            out.push(
                OscMessage::new("/button")
                    .arg(i32::from(self.slot))
                    .arg(self.state.as_i32()),
            );
        }
        if let Some(pitch) = self.pitch {
            out.push(OscMessage::new("/pitch").arg(pitch));
        }
        out.push(
            OscMessage::new("/opto")
                .arg(i32::from(self.slot))
                .arg((self.level / LEVEL_SCALE) as f32)
                .arg(self.state.as_i32()),
        );
        out
    }
}

/// Running state for every opto slot.
#[derive(Debug, Clone)]
pub struct OptoContext {
    config: OptoConfig,
    slots: [OptoState; OPTO_SLOTS],
}

impl Default for OptoContext {
    fn default() -> Self {
        Self::new(OptoConfig::default())
    }
}

impl OptoContext {
    pub fn new(config: OptoConfig) -> Self {
        Self {
            slots: [config.initial; OPTO_SLOTS],
            config,
        }
    }

    /// Feed a raw 16-bit reading (still offset by 32768) for `slot`.
    ///
    /// Returns `None` for a slot outside `0..OPTO_SLOTS`.
    pub fn process_raw(&mut self, slot: u8, raw: u16) -> Option<OptoReading> {
        self.process(slot, i32::from(raw) - OPTO_VALUE_OFFSET)
    }

    /// Feed a re-centred reading for `slot`.
    pub fn process(&mut self, slot: u8, value: i32) -> Option<OptoReading> {
        let cfg = &self.config;
        let state = self.slots.get_mut(usize::from(slot))?;
        let value = f64::from(value);

        state.mean = state.mean * (1.0 - cfg.smoothing) + value * cfg.smoothing;
        if state.mean > state.max {
            state.max = state.mean;
        } else if state.mean < state.min {
            state.min = state.mean;
        }

        let range = state.max - state.min;
        let level = if range > 0.0 {
            (value - state.min) / range * LEVEL_SCALE
        } else {
            0.0
        };

        if level < LEVEL_SCALE / 2.0 {
            state.max *= cfg.max_decay;
        } else {
            state.min *= cfg.min_growth;
        }

        let next = cfg.trigger.next(level, state.trigger);
        let changed = next != state.trigger && next != TriggerState::Unknown;
        state.trigger = next;
        trace!(slot, level, state = next.as_i32(), "opto reading");

        let pitch = (changed && usize::from(slot) < PITCH_SLOTS).then(|| self.pitch());
        Some(OptoReading {
            slot,
            level,
            state: next,
            changed,
            pitch,
        })
    }

    /// Pitch for the current trigger states of slots 0..=3.
    pub fn pitch(&self) -> i32 {
        let combination = self.slots[..PITCH_SLOTS]
            .iter()
            .enumerate()
            .filter(|(_, s)| s.trigger == TriggerState::On)
            .fold(0u8, |acc, (i, _)| acc | (1 << i));
        pitch_for(combination)
    }

    pub fn state(&self, slot: u8) -> Option<&OptoState> {
        self.slots.get(usize::from(slot))
    }

    pub fn config(&self) -> &OptoConfig {
        &self.config
    }
}
