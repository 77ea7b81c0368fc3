use strata_abi::{ContextHandle, ModelHandle, SeqId};
use tracing::{info, trace};

use super::{Run, StopReason};
use crate::error::{GenerateError, Result};

impl<C, M, F> Run<'_, C, M, F>
where
    C: ContextHandle + ?Sized,
    M: ModelHandle + ?Sized,
    F: FnMut(&str),
{
    /// Sample, render, record, decode; one decode per emitted token except the last.
    pub(super) fn step_loop(&mut self, mut logits_index: usize) -> Result<StopReason> {
        let max = self.config.max_new_tokens;
        if max == Some(0) {
            return Ok(StopReason::LengthLimit);
        }
        let eos = self.model.eos_token();

        loop {
            if let Some(reason) = self.checkpoint.check() {
                info!("⏹️ [step] {reason:?} after {} tokens", self.state.produced);
                return Ok(reason);
            }

            let position = self.state.buffer.len();
            let logits = self
                .ctx
                .logits_ith(logits_index)
                .map_err(|source| GenerateError::LogitsUnavailable { position, source })?;
            let token = self.sampler.sample(logits)?;
            trace!("🎯 [step] Sampled {token:?} for position {position}");

            // EOS wins over every other stop rule and is never decoded.
            if token == eos {
                self.state.sampled.push(token);
                info!("🏁 [step] Reached EOS after {} tokens", self.state.produced);
                return Ok(StopReason::EndOfSequence);
            }

            let remaining = max.map_or(1, |m| m.saturating_sub(self.state.produced));
            if let Err(e) = self.window.require(position, remaining) {
                if max.is_none() {
                    info!("🧱 [step] Context window full at {position}");
                    return Ok(StopReason::ContextOverflow);
                }
                return Err(e);
            }

            let fragment = self.detok.render(self.model, token, position)?;
            self.sink.emit(&fragment);
            let pos = self.state.emit(token);

            if max.is_some_and(|m| self.state.produced >= m) {
                info!("📏 [step] Length limit reached ({} tokens)", self.state.produced);
                return Ok(StopReason::LengthLimit);
            }
            if self.window.remaining(self.state.buffer.len()) == 0 {
                info!("🧱 [step] Context window full at {}", self.state.buffer.len());
                return Ok(StopReason::ContextOverflow);
            }

            self.batch.clear();
            logits_index = self.batch.add(token, pos, &[SeqId::MAIN], true)?;
            self.submit()?;
        }
    }
}
