//! Progress weighting and de-duplication
//!
//! A conversion has two phases. Each phase reports a fraction in `[0, 1]`;
//! the converter maps it into its slice of the overall bar and forwards whole
//! percentages only when they move.

/// Share of the overall bar given to each phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseWeights {
    pub decoder: f64,
    pub encoder: f64,
}

impl Default for PhaseWeights {
    fn default() -> Self {
        Self {
            decoder: 0.5,
            encoder: 0.5,
        }
    }
}

impl PhaseWeights {
    /// Weights scaled to sum to 1. Non-positive or non-finite input falls
    /// back to an even split.
    pub fn new(decoder: f64, encoder: f64) -> Self {
        let valid = |w: f64| w.is_finite() && w >= 0.0;
        let sum = decoder + encoder;
        if !valid(decoder) || !valid(encoder) || sum <= 0.0 {
            return Self::default();
        }
        Self {
            decoder: decoder / sum,
            encoder: encoder / sum,
        }
    }

    /// Collapse a silent phase to zero so the bar does not stall at its
    /// boundary.
    pub fn negotiate(self, decoder_emits: bool, encoder_emits: bool) -> Self {
        match (decoder_emits, encoder_emits) {
            (false, true) => Self {
                decoder: 0.0,
                encoder: 1.0,
            },
            (true, false) => Self {
                decoder: 1.0,
                encoder: 0.0,
            },
            _ => self,
        }
    }

    pub fn decoder_progress(&self, fraction: f64) -> f64 {
        fraction * self.decoder
    }

    pub fn encoder_progress(&self, fraction: f64) -> f64 {
        self.decoder + fraction * self.encoder
    }
}

/// Forwards integer percentages, once each, never going backwards.
pub struct ProgressTracker<'a> {
    last: Option<u32>,
    callback: &'a mut dyn FnMut(u32),
}

impl<'a> ProgressTracker<'a> {
    pub fn new(callback: &'a mut dyn FnMut(u32)) -> Self {
        Self {
            last: None,
            callback,
        }
    }

    pub fn emit(&mut self, progress: f64) {
        let progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) };
        let percent = (progress * 100.0).round() as u32;
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        (self.callback)(percent);
    }

    pub fn last(&self) -> Option<u32> {
        self.last
    }
}
