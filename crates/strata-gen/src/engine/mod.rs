//! Generation loop: tokenize, prefill, then sample → render → decode one token
//! at a time until a stop condition.

use std::any::Any;
use std::panic;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use serde::Serialize;
use strata_abi::{Batch, ContextHandle, ModelHandle, Token};
use tracing::{debug, info, warn};

use crate::config::GenerateConfig;
use crate::debug::dump_str;
use crate::detok::Detokenizer;
use crate::error::{GenerateError, Result};
use crate::guard::ContextWindow;
use crate::sampling::Sampler;

// Child modules add `impl Run` blocks; they see the private fields here.
mod decode;
mod prefill;
mod state;

use prefill::Prefilled;
use state::GenerationState;
pub use state::{Phase, StopReason, TokenBuffer};

/// Outcome of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generation {
    pub text: String,
    pub stop_reason: StopReason,
    /// Every sampled token, including a terminating EOS.
    pub tokens: Vec<Token>,
    pub stats: GenerationStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct GenerationStats {
    pub prompt_tokens: usize,
    /// Tokens appended to the sequence (EOS excluded).
    pub generated_tokens: usize,
    pub decode_calls: usize,
    pub elapsed: Duration,
}

/// Runs generation requests with one config, one at a time. Use one
/// `Generator` (and one context handle) per concurrent request.
pub struct Generator {
    config: GenerateConfig,
    stop_flag: Arc<AtomicBool>,
}

impl Generator {
    pub fn new(config: GenerateConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stop_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    #[inline]
    pub fn config(&self) -> &GenerateConfig {
        &self.config
    }

    /// Handle you can keep and flip to cancel the running request (`store(true)`).
    /// Belongs to this generator only; cleared when its next request starts.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    #[inline]
    fn clear_stop(&self) {
        self.stop_flag.store(false, Ordering::Relaxed);
    }

    // ─────────────────────────────────────────────
    // Public generation APIs
    // ─────────────────────────────────────────────

    pub fn generate<C, M>(&mut self, ctx: &mut C, model: &M, prompt: &str) -> Result<Generation>
    where
        C: ContextHandle + ?Sized,
        M: ModelHandle + ?Sized,
    {
        self.generate_stream(ctx, model, prompt, |_| {})
    }

    /// Like [`generate`](Self::generate), calling `on_delta` with each UTF-8
    /// fragment as soon as it is complete.
    pub fn generate_stream<C, M, F>(
        &mut self,
        ctx: &mut C,
        model: &M,
        prompt: &str,
        on_delta: F,
    ) -> Result<Generation>
    where
        C: ContextHandle + ?Sized,
        M: ModelHandle + ?Sized,
        F: FnMut(&str),
    {
        self.clear_stop();

        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            self.run(ctx, model, prompt, on_delta)
        }))
        .map_err(|payload| GenerateError::Panicked(panic_message(payload.as_ref())))
        .and_then(|r| r);

        if let Err(e) = &result {
            warn!("❌ [generate] {e}");
        }
        result
    }

    // ─────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────

    fn run<C, M, F>(&self, ctx: &mut C, model: &M, prompt: &str, on_delta: F) -> Result<Generation>
    where
        C: ContextHandle + ?Sized,
        M: ModelHandle + ?Sized,
        F: FnMut(&str),
    {
        let started = Instant::now();
        let cfg = &self.config;
        info!("🧠 [generate] Starting generation");

        let window = ContextWindow::new(ctx.n_ctx())?;
        if model.vocab_size() == 0 {
            return Err(GenerateError::EmptyVocabulary);
        }

        let prompt_tokens = model
            .tokenize(prompt, cfg.add_special_tokens)
            .map_err(GenerateError::Tokenization)?;
        if prompt_tokens.is_empty() {
            return Err(GenerateError::EmptyPrompt);
        }
        debug!(
            "🔤 [generate] Tokenized prompt ({} tokens, n_ctx = {}, max_new = {:?})",
            prompt_tokens.len(),
            window.n_ctx(),
            cfg.max_new_tokens
        );
        window.admit_prompt(prompt_tokens.len(), cfg.max_new_tokens)?;

        let mut run = Run {
            ctx,
            model,
            config: cfg,
            window,
            checkpoint: Checkpoint {
                stop: &self.stop_flag,
                deadline: cfg.time_limit().map(|d| started + d),
            },
            state: GenerationState::new(prompt_tokens.len(), cfg.max_new_tokens),
            batch: Batch::new(cfg.batch_capacity),
            sampler: Sampler::new(cfg.sampling, cfg.seed),
            detok: Detokenizer::new(),
            sink: Sink {
                text: String::new(),
                on_delta,
            },
            decode_calls: 0,
        };

        if cfg.echo_prompt {
            run.echo(&prompt_tokens)?;
        }
        let reason = run.drive(&prompt_tokens)?;
        Ok(run.finish(reason, started))
    }
}

/// One-shot convenience over [`Generator`].
pub fn generate<C, M>(
    ctx: &mut C,
    model: &M,
    prompt: &str,
    config: &GenerateConfig,
) -> Result<Generation>
where
    C: ContextHandle + ?Sized,
    M: ModelHandle + ?Sized,
{
    let mut generator = Generator::new(config.clone())?;
    generator.generate(ctx, model, prompt)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".into()
    }
}

/// Cooperative stop points: the stop flag first, then the deadline.
struct Checkpoint<'r> {
    stop: &'r AtomicBool,
    deadline: Option<Instant>,
}

impl Checkpoint<'_> {
    fn check(&self) -> Option<StopReason> {
        if self.stop.load(Ordering::Relaxed) {
            return Some(StopReason::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(StopReason::DeadlineExceeded),
            _ => None,
        }
    }
}

/// Accumulates output and forwards each non-empty fragment.
struct Sink<F> {
    text: String,
    on_delta: F,
}

impl<F: FnMut(&str)> Sink<F> {
    fn emit(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        dump_str("emit", fragment);
        (self.on_delta)(fragment);
        self.text.push_str(fragment);
    }
}

/// Everything one request owns. Dropped when the request stops, which
/// releases the batch and piece buffers.
struct Run<'r, C: ?Sized, M: ?Sized, F> {
    ctx: &'r mut C,
    model: &'r M,
    config: &'r GenerateConfig,
    window: ContextWindow,
    checkpoint: Checkpoint<'r>,
    state: GenerationState,
    batch: Batch,
    sampler: Sampler,
    detok: Detokenizer,
    sink: Sink<F>,
    decode_calls: usize,
}

impl<C, M, F> Run<'_, C, M, F>
where
    C: ContextHandle + ?Sized,
    M: ModelHandle + ?Sized,
    F: FnMut(&str),
{
    fn echo(&mut self, prompt: &[Token]) -> Result<()> {
        for (i, &token) in prompt.iter().enumerate() {
            let fragment = self.detok.render(self.model, token, i)?;
            self.sink.emit(&fragment);
        }
        Ok(())
    }

    fn drive(&mut self, prompt: &[Token]) -> Result<StopReason> {
        self.state.enter(Phase::Prefilling);
        let logits_index = match self.prefill(prompt)? {
            Prefilled::Ready { logits_index } => logits_index,
            Prefilled::Interrupted(reason) => return Ok(reason),
        };
        self.state.enter(Phase::Stepping);
        self.step_loop(logits_index)
    }

    /// Submit the current batch. A failed decode ends the request.
    fn submit(&mut self) -> Result<()> {
        let position = self.batch.entries().first().map_or(0, |e| e.pos.as_usize());
        self.decode_calls += 1;
        self.ctx
            .decode(&self.batch)
            .map_err(|source| GenerateError::DecodeFailed { position, source })
    }

    fn finish(mut self, reason: StopReason, started: Instant) -> Generation {
        debug_assert!(!matches!(self.state.phase(), Phase::Stopped(_)));
        let tail = self.detok.finish();
        self.sink.emit(&tail);
        self.state.enter(Phase::Stopped(reason));

        let stats = GenerationStats {
            prompt_tokens: self.state.prompt_len,
            generated_tokens: self.state.produced,
            decode_calls: self.decode_calls,
            elapsed: started.elapsed(),
        };
        info!(
            "✅ [generate] Stopped ({reason:?}): {} new tokens, {} decode calls, {} bytes",
            stats.generated_tokens,
            stats.decode_calls,
            self.sink.text.len()
        );
        Generation {
            text: self.sink.text,
            stop_reason: reason,
            tokens: self.state.sampled,
            stats,
        }
    }
}
