//! Strata generation engine: drives a model backend from prompt to text.
//!
//! The backend is reached only through [`strata_abi::ModelHandle`] and
//! [`strata_abi::ContextHandle`]; handles are borrowed, never freed here.

pub mod config;
mod debug;
pub mod detok;
pub mod engine;
pub mod error;
pub mod guard;
pub mod sampling;

#[cfg(test)]
mod testing;

pub use config::GenerateConfig;
pub use detok::Detokenizer;
pub use engine::{
    Generation, GenerationStats, Generator, Phase, StopReason, TokenBuffer, generate,
};
pub use error::{GenerateError, Result};
pub use guard::ContextWindow;
pub use sampling::{Sampler, TokenCandidate, sample};

pub use strata_abi;
