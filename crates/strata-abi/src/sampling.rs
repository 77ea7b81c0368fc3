use serde::{Deserialize, Serialize};

/// How the engine turns one logits vector into the next token.
///
/// Serialized with an internal `mode` tag, e.g.
/// `{"mode":"top_k_top_p","top_k":40,"top_p":0.95,"temperature":0.8}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Argmax; ties go to the lowest token id.
    Greedy,
    /// Temperature, then top-k truncation, then nucleus (top-p) filtering.
    TopKTopP {
        top_k: usize,     // >= 1 keeps the K most likely candidates
        top_p: f32,       // (0, 1] nucleus threshold
        temperature: f32, // > 0.0
    },
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        SamplingStrategy::Greedy
    }
}

impl SamplingStrategy {
    /// Stochastic defaults: k = 40, p = 0.95, temperature = 0.8.
    pub fn stochastic() -> Self {
        SamplingStrategy::TopKTopP {
            top_k: 40,
            top_p: 0.95,
            temperature: 0.8,
        }
    }

    /// Returns a clamped version of this strategy.
    ///
    /// - temperature <= 0 (or non-finite) → greedy
    /// - top_k < 1 → 1
    /// - top_p ∉ (0, 1] → 1.0 (nucleus disabled)
    pub fn normalized(&self) -> Self {
        match *self {
            SamplingStrategy::Greedy => SamplingStrategy::Greedy,
            SamplingStrategy::TopKTopP {
                top_k,
                top_p,
                temperature,
            } => {
                if !temperature.is_finite() || temperature <= 0.0 {
                    return SamplingStrategy::Greedy;
                }
                let top_p = if top_p > 0.0 && top_p <= 1.0 {
                    top_p
                } else {
                    1.0
                };
                SamplingStrategy::TopKTopP {
                    top_k: top_k.max(1),
                    top_p,
                    temperature,
                }
            }
        }
    }

    #[inline]
    pub fn is_greedy(&self) -> bool {
        matches!(self, SamplingStrategy::Greedy)
    }
}
