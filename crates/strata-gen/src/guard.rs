//! Context window bookkeeping: refuse any decode that would run past n_ctx.

use crate::error::{GenerateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow {
    n_ctx: usize,
}

impl ContextWindow {
    /// `n_ctx` as reported by the context handle, read once per request.
    pub fn new(n_ctx: usize) -> Result<Self> {
        if n_ctx == 0 {
            return Err(GenerateError::BackendUnavailable(
                "context reports n_ctx = 0".into(),
            ));
        }
        Ok(Self { n_ctx })
    }

    #[inline]
    pub fn n_ctx(&self) -> usize {
        self.n_ctx
    }

    /// Up-front check: the prompt must fit, and so must prompt + everything
    /// we may still generate. `None` means "until the window is full".
    pub fn admit_prompt(&self, prompt_tokens: usize, max_new_tokens: Option<usize>) -> Result<()> {
        if prompt_tokens > self.n_ctx {
            return Err(GenerateError::PromptTooLong {
                prompt_tokens,
                n_ctx: self.n_ctx,
            });
        }
        self.require(prompt_tokens, max_new_tokens.unwrap_or(0))
    }

    /// `current + remaining <= n_ctx`, else `ContextOverflow` at `current`.
    pub fn require(&self, current: usize, remaining: usize) -> Result<()> {
        let required = current.saturating_add(remaining);
        if required > self.n_ctx {
            return Err(GenerateError::ContextOverflow {
                position: current,
                required,
                n_ctx: self.n_ctx,
            });
        }
        Ok(())
    }

    /// Positions still free after `current` tokens.
    #[inline]
    pub fn remaining(&self, current: usize) -> usize {
        self.n_ctx.saturating_sub(current)
    }
}
