use strata_abi::{BatchError, ContextHandle, ModelHandle, SeqId, Token};
use tracing::{debug, info};

use super::{Run, StopReason};
use crate::error::{GenerateError, Result};

pub(super) enum Prefilled {
    /// Prompt is in the KV cache; logits sit at this index of the last batch.
    Ready { logits_index: usize },
    Interrupted(StopReason),
}

impl<C, M, F> Run<'_, C, M, F>
where
    C: ContextHandle + ?Sized,
    M: ModelHandle + ?Sized,
    F: FnMut(&str),
{
    /// Pack the prompt into batches of at most `batch_capacity` entries.
    /// A full batch is flushed through decode and packing resumes; only the
    /// last entry of the final batch asks for logits.
    pub(super) fn prefill(&mut self, prompt: &[Token]) -> Result<Prefilled> {
        self.batch.clear();
        let mut flushed = 0usize;

        for &token in prompt {
            let pos = self.state.buffer.next_position();
            match self.batch.add(token, pos, &[SeqId::MAIN], false) {
                Ok(_) => {}
                Err(BatchError::CapacityExceeded { .. }) => {
                    debug!(
                        "⚙️ [prefill] Flushing chunk {flushed} (len {}), n_past = {}",
                        self.batch.len(),
                        pos.0
                    );
                    self.submit()?;
                    self.batch.clear();
                    flushed += 1;

                    if let Some(reason) = self.checkpoint.check() {
                        info!("⏹️ [prefill] {reason:?} during prefill");
                        return Ok(Prefilled::Interrupted(reason));
                    }
                    self.batch.add(token, pos, &[SeqId::MAIN], false)?;
                }
                Err(e) => return Err(e.into()),
            }
            self.state.buffer.push(token);
        }

        let logits_index = self
            .batch
            .mark_last_for_logits()
            .ok_or(GenerateError::EmptyPrompt)?;
        self.submit()?;
        debug!(
            "✅ [prefill] Done ({} tokens, {} decode calls)",
            self.state.buffer.len(),
            flushed + 1
        );
        Ok(Prefilled::Ready { logits_index })
    }
}
