use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_abi::SamplingStrategy;
use tracing::warn;

use crate::error::{GenerateError, Result};

/// Per-request generation knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateConfig {
    /// Cap on emitted tokens. `None` runs until EOS or until the context window is full.
    pub max_new_tokens: Option<usize>,
    pub sampling: SamplingStrategy,
    /// Max entries per decode call (must be <= the backend's n_batch).
    pub batch_capacity: usize,
    /// Let the tokenizer add BOS/special tokens to the prompt.
    pub add_special_tokens: bool,
    /// RNG seed for stochastic sampling. `None` seeds from OS entropy.
    pub seed: Option<u64>,
    /// Wall-clock budget checked between steps.
    pub time_limit_ms: Option<u64>,
    /// Render the prompt tokens in front of the generated text.
    pub echo_prompt: bool,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: Some(256),
            sampling: SamplingStrategy::Greedy,
            batch_capacity: 512,
            add_special_tokens: true,
            seed: None,
            time_limit_ms: None,
            echo_prompt: false,
        }
    }
}

impl GenerateConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| GenerateError::InvalidConfig(e.to_string()))
    }

    /// Apply environment overrides on top of `self`.
    ///
    /// - `STRATA_MAX_DECODE_TOKENS` (usize; `0` means unlimited)
    /// - `STRATA_N_BATCH` (usize)
    /// - `STRATA_SEED` (u64)
    /// - `STRATA_TIME_LIMIT_MS` (u64)
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var::<usize, _>(&lookup, "STRATA_MAX_DECODE_TOKENS") {
            self.max_new_tokens = if v == 0 { None } else { Some(v) };
        }
        if let Some(v) = parse_var(&lookup, "STRATA_N_BATCH") {
            self.batch_capacity = v;
        }
        if let Some(v) = parse_var(&lookup, "STRATA_SEED") {
            self.seed = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "STRATA_TIME_LIMIT_MS") {
            self.time_limit_ms = Some(v);
        }
        self
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_capacity == 0 {
            return Err(GenerateError::InvalidConfig(
                "batch_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_ms.map(Duration::from_millis)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("⚠️ [config] ignoring {key}={raw:?}: not a valid number");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let cfg = GenerateConfig::from_json(
            r#"{"max_new_tokens": 3, "sampling": {"mode": "top_k_top_p", "top_k": 5, "top_p": 0.9, "temperature": 0.7}, "seed": 11}"#,
        )
        .unwrap();
        assert_eq!(cfg.max_new_tokens, Some(3));
        assert_eq!(
            cfg.sampling,
            SamplingStrategy::TopKTopP {
                top_k: 5,
                top_p: 0.9,
                temperature: 0.7
            }
        );
        assert_eq!(cfg.seed, Some(11));
        assert_eq!(cfg.batch_capacity, 512);
        assert!(cfg.add_special_tokens);
    }

    #[test]
    fn bad_json_is_invalid_config() {
        assert!(matches!(
            GenerateConfig::from_json("{\"batch_capacity\": \"lots\"}"),
            Err(GenerateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn env_overrides_apply_and_bad_values_are_ignored() {
        let cfg = GenerateConfig::default().with_overrides(env(&[
            ("STRATA_MAX_DECODE_TOKENS", "0"),
            ("STRATA_N_BATCH", "64"),
            ("STRATA_SEED", "not-a-seed"),
            ("STRATA_TIME_LIMIT_MS", " 1500 "),
        ]));
        assert_eq!(cfg.max_new_tokens, None);
        assert_eq!(cfg.batch_capacity, 64);
        assert_eq!(cfg.seed, None);
        assert_eq!(cfg.time_limit(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn zero_batch_capacity_is_rejected() {
        let cfg = GenerateConfig {
            batch_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(GenerateError::InvalidConfig(_))));
        assert!(GenerateConfig::default().validate().is_ok());
    }
}
