//! Next-token selection from one logits vector.
//!
//! Two strategies: greedy argmax (ties → lowest id) and temperature + top-k +
//! top-p, drawn from a caller-supplied RNG. Logits are borrowed read-only; they
//! belong to the backend and die at the next decode.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata_abi::{SamplingStrategy, Token};
use tracing::trace;

use crate::error::{GenerateError, Result};

/// One vocabulary entry under consideration for a single sampling decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenCandidate {
    pub token: Token,
    pub logit: f32,
    pub p: f32,
}

/// Sample one token with a throwaway candidate buffer.
pub fn sample<R: Rng + ?Sized>(
    logits: &[f32],
    strategy: &SamplingStrategy,
    rng: &mut R,
) -> Result<Token> {
    let mut scratch = Vec::new();
    sample_with(&mut scratch, logits, strategy, rng)
}

fn sample_with<R: Rng + ?Sized>(
    scratch: &mut Vec<TokenCandidate>,
    logits: &[f32],
    strategy: &SamplingStrategy,
    rng: &mut R,
) -> Result<Token> {
    if logits.is_empty() {
        return Err(GenerateError::EmptyVocabulary);
    }
    match strategy.normalized() {
        SamplingStrategy::Greedy => Ok(argmax(logits)),
        SamplingStrategy::TopKTopP {
            top_k,
            top_p,
            temperature,
        } => {
            if !retain_candidates(scratch, logits, top_k, top_p, temperature) {
                // Non-finite logits: no usable distribution, take the max.
                return Ok(argmax(logits));
            }
            Ok(draw(scratch, rng))
        }
    }
}

/// Highest logit; the first (lowest id) wins ties. NaN never wins.
pub fn argmax(logits: &[f32]) -> Token {
    let mut best_idx = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &v) in logits.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = i;
        }
    }
    Token(best_idx as i32)
}

/// Descending probability, then ascending token id: a total order, so
/// truncation is reproducible across runs.
fn by_probability(a: &TokenCandidate, b: &TokenCandidate) -> Ordering {
    b.p.total_cmp(&a.p).then_with(|| a.token.cmp(&b.token))
}

/// Fill `out` with the renormalized candidates that survive temperature,
/// top-k and top-p. Returns false if the scaled logits have no finite maximum.
fn retain_candidates(
    out: &mut Vec<TokenCandidate>,
    logits: &[f32],
    top_k: usize,
    top_p: f32,
    temperature: f32,
) -> bool {
    out.clear();

    // 1) temperature
    let inv_t = 1.0 / temperature;
    let max = logits
        .iter()
        .map(|&l| l * inv_t)
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return false;
    }

    // 2) stable softmax over the whole vocabulary
    let mut sum = 0.0f64;
    out.extend(logits.iter().enumerate().map(|(i, &logit)| {
        let scaled = logit * inv_t;
        let e = if scaled.is_nan() {
            0.0
        } else {
            (scaled - max).exp()
        };
        sum += e as f64;
        TokenCandidate {
            token: Token(i as i32),
            logit,
            p: e,
        }
    }));
    for c in out.iter_mut() {
        c.p = (c.p as f64 / sum) as f32;
    }

    // 3) + 4) sort descending and keep the top k
    let k = top_k.clamp(1, out.len());
    if k < out.len() {
        out.select_nth_unstable_by(k - 1, by_probability);
        out.truncate(k);
    }
    out.sort_unstable_by(by_probability);

    // 5) smallest prefix reaching top_p, never empty
    let mut cum = 0.0f64;
    let mut keep = out.len();
    for (i, c) in out.iter().enumerate() {
        cum += c.p as f64;
        if cum >= top_p as f64 {
            keep = i + 1;
            break;
        }
    }
    out.truncate(keep.max(1));

    // 6) renormalize what is left
    let total: f64 = out.iter().map(|c| c.p as f64).sum();
    if total > 0.0 {
        for c in out.iter_mut() {
            c.p = (c.p as f64 / total) as f32;
        }
    } else {
        let uniform = 1.0 / out.len() as f32;
        for c in out.iter_mut() {
            c.p = uniform;
        }
    }

    trace!(
        "🎲 [sample] {} candidates kept (k={top_k}, p={top_p}, t={temperature})",
        out.len()
    );
    true
}

/// Inverse-CDF draw over `candidates` (non-empty, sums to ~1).
fn draw<R: Rng + ?Sized>(candidates: &[TokenCandidate], rng: &mut R) -> Token {
    let u: f64 = rng.gen_range(0.0..1.0);
    let mut cum = 0.0f64;
    for c in candidates {
        cum += c.p as f64;
        if u < cum {
            return c.token;
        }
    }
    // Rounding left `cum` just under 1.0.
    candidates[candidates.len() - 1].token
}

/// Sampler for one request. The candidate buffer is reused across steps.
pub struct Sampler {
    strategy: SamplingStrategy,
    rng: StdRng,
    candidates: Vec<TokenCandidate>,
}

impl Sampler {
    pub fn new(strategy: SamplingStrategy, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            strategy: strategy.normalized(),
            rng,
            candidates: Vec::new(),
        }
    }

    #[inline]
    pub fn strategy(&self) -> &SamplingStrategy {
        &self.strategy
    }

    pub fn sample(&mut self, logits: &[f32]) -> Result<Token> {
        sample_with(&mut self.candidates, logits, &self.strategy, &mut self.rng)
    }
}
