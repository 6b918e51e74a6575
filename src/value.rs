//! Truth and importance metadata attached to every stored atom.
//!
//! A [`Truth`] is accumulated evidence: a strength in `[0, 1]` and a non-negative
//! evidence count. Revision is Bayesian (evidence-weighted mean of strengths, summed
//! counts) and confidence is the asymptotic curve `count / (count + k)`.
//!
//! An [`Importance`] is a pair of attention weights. Short-term importance decays fast,
//! long-term importance absorbs a small share of that decay and fades slowly. Every
//! operation here clamps both components to `[0, 1]`.

use serde::{Deserialize, Serialize};

fn unit(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

// ------------- Truth -------------
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Truth {
    strength: f64,
    count: f64,
}

impl Truth {
    pub fn new(strength: f64, count: f64) -> Self {
        Self {
            strength: unit(strength),
            count: if count.is_nan() { 0.0 } else { count.max(0.0) },
        }
    }
    pub fn strength(&self) -> f64 {
        self.strength
    }
    pub fn count(&self) -> f64 {
        self.count
    }
    pub fn confidence(&self, sensitivity: f64) -> f64 {
        self.count / (self.count + sensitivity)
    }
    /// Evidence-weighted revision. The merged count is the sum of both counts.
    pub fn merge(&self, other: &Truth) -> Truth {
        let count = self.count + other.count;
        if count <= 0.0 {
            return Truth::new((self.strength + other.strength) / 2.0, 0.0);
        }
        Truth::new((self.strength * self.count + other.strength * other.count) / count, count)
    }
}

// ------------- Importance -------------
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Importance {
    sti: f64,
    lti: f64,
}

impl Importance {
    pub fn new(sti: f64, lti: f64) -> Self {
        Self { sti: unit(sti), lti: unit(lti) }
    }
    pub fn sti(&self) -> f64 {
        self.sti
    }
    pub fn lti(&self) -> f64 {
        self.lti
    }
    /// Additive boost whose effect shrinks as short-term importance nears the ceiling.
    pub fn boost(&self, amount: f64) -> Importance {
        let amount = unit(amount);
        Importance::new(self.sti + amount * (1.0 - self.sti), self.lti)
    }
    /// One maintenance tick of decay.
    pub fn decay(&self, sti_rate: f64, lti_rate: f64, absorption: f64) -> Importance {
        let sti = self.sti * (1.0 - unit(sti_rate));
        let lost = self.sti - sti;
        let lti = self.lti * (1.0 - unit(lti_rate)) + unit(absorption) * lost;
        Importance::new(sti, lti)
    }
}

// ------------- Value -------------
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub truth: Truth,
    pub importance: Importance,
    /// Logical time of the last access.
    pub time: u64,
}

/// Parameters of the time-weighted retention score.
#[derive(Clone, Copy, Debug)]
pub struct Retention {
    pub sensitivity: f64,
    pub half_life: f64,
}

impl Value {
    pub fn new(truth: Truth, importance: Importance, time: u64) -> Self {
        Self { truth, importance, time }
    }
    /// Exponential recency factor: one at the time of access, halving every `half_life` ticks.
    pub fn recency(&self, now: u64, half_life: f64) -> f64 {
        let age = now.saturating_sub(self.time) as f64;
        0.5f64.powf(age / half_life)
    }
    /// Combined importance that decides eviction: recency weighted short-term importance
    /// plus flat long-term importance, both scaled by truth confidence.
    pub fn retention(&self, now: u64, params: Retention) -> f64 {
        let confidence = self.truth.confidence(params.sensitivity);
        (self.importance.sti() * self.recency(now, params.half_life) + self.importance.lti()) * confidence
    }
}
