use serde::{Deserialize, Serialize};
use strata_abi::{Position, Token};
use tracing::debug;

/// Why a request ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndOfSequence,
    LengthLimit,
    /// Window filled while generating without a token cap.
    ContextOverflow,
    Cancelled,
    DeadlineExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialized,
    Prefilling,
    Stepping,
    Stopped(StopReason),
}

/// Every token of the sequence so far with the position it was decoded at.
#[derive(Debug, Clone, Default)]
pub struct TokenBuffer {
    tokens: Vec<Token>,
    positions: Vec<Position>,
}

impl TokenBuffer {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(cap),
            positions: Vec::with_capacity(cap),
        }
    }

    /// Append at the next position and return that position.
    pub fn push(&mut self, token: Token) -> Position {
        let pos = self.next_position();
        self.tokens.push(token);
        self.positions.push(pos);
        pos
    }

    /// Position the next token will take.
    #[inline]
    pub fn next_position(&self) -> Position {
        Position(self.tokens.len() as u32)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn last(&self) -> Option<(Token, Position)> {
        Some((*self.tokens.last()?, *self.positions.last()?))
    }
}

/// Per-request state, owned by the loop and dropped with the request.
#[derive(Debug)]
pub(crate) struct GenerationState {
    pub buffer: TokenBuffer,
    /// Sampled tokens, including a terminating EOS.
    pub sampled: Vec<Token>,
    pub produced: usize,
    pub prompt_len: usize,
    phase: Phase,
}

impl GenerationState {
    pub fn new(prompt_len: usize, max_new_tokens: Option<usize>) -> Self {
        let expected = max_new_tokens.unwrap_or(64);
        Self {
            buffer: TokenBuffer::with_capacity(prompt_len + expected),
            sampled: Vec::with_capacity(expected.min(4096)),
            produced: 0,
            prompt_len,
            phase: Phase::Initialized,
        }
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn enter(&mut self, phase: Phase) {
        debug!("🔀 [state] {:?} → {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Record a token that made it into the sequence.
    pub fn emit(&mut self, token: Token) -> Position {
        self.sampled.push(token);
        self.produced += 1;
        self.buffer.push(token)
    }
}
