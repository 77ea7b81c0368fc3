#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use strata_gen::strata_abi::{BackendError, Batch, BatchEntry, ContextHandle, ModelHandle, Token};

pub const EOS: Token = Token(42);
pub const VOCAB: usize = 128;

/// Model with a canned tokenization and a piece table.
pub struct MockModel {
    pub prompt: Vec<Token>,
    pub eos: Token,
    pub vocab: usize,
    pub fail_tokenize: bool,
    pieces: HashMap<Token, Vec<u8>>,
    piece_calls: Cell<usize>,
}

impl MockModel {
    pub fn new(prompt: &[i32]) -> Self {
        Self {
            prompt: prompt.iter().copied().map(Token).collect(),
            eos: EOS,
            vocab: VOCAB,
            fail_tokenize: false,
            pieces: HashMap::new(),
            piece_calls: Cell::new(0),
        }
    }

    pub fn piece(mut self, token: i32, bytes: &[u8]) -> Self {
        self.pieces.insert(Token(token), bytes.to_vec());
        self
    }

    pub fn piece_calls(&self) -> usize {
        self.piece_calls.get()
    }
}

impl ModelHandle for MockModel {
    fn tokenize(&self, _text: &str, _add_special: bool) -> Result<Vec<Token>, BackendError> {
        if self.fail_tokenize {
            return Err(BackendError::Tokenize("unknown byte".into()));
        }
        Ok(self.prompt.clone())
    }

    fn token_to_piece(&self, token: Token, buf: &mut [u8]) -> i32 {
        self.piece_calls.set(self.piece_calls.get() + 1);
        let bytes = self
            .pieces
            .get(&token)
            .cloned()
            .unwrap_or_else(|| format!("<{}>", token.0).into_bytes());
        if buf.len() < bytes.len() {
            return -(bytes.len() as i32);
        }
        buf[..bytes.len()].copy_from_slice(&bytes);
        bytes.len() as i32
    }

    fn eos_token(&self) -> Token {
        self.eos
    }

    fn vocab_size(&self) -> usize {
        self.vocab
    }
}

enum Logits {
    /// `favor[k]` wins after the k-th logits-bearing batch; the last repeats.
    Scripted(Vec<Token>),
    Fixed(Vec<f32>),
}

/// Context that records every decoded batch.
pub struct MockContext {
    pub n_ctx: usize,
    pub batches: Vec<Vec<BatchEntry>>,
    pub decode_calls: usize,
    pub fail_on_call: Option<usize>,
    trip: Option<(usize, Arc<AtomicBool>)>,
    logits: Logits,
    row: Vec<f32>,
    row_index: Option<usize>,
    logit_batches: usize,
}

impl MockContext {
    pub fn scripted(n_ctx: usize, favor: &[i32]) -> Self {
        Self::with_logits(n_ctx, Logits::Scripted(favor.iter().copied().map(Token).collect()))
    }

    pub fn fixed(n_ctx: usize, row: Vec<f32>) -> Self {
        Self::with_logits(n_ctx, Logits::Fixed(row))
    }

    fn with_logits(n_ctx: usize, logits: Logits) -> Self {
        Self {
            n_ctx,
            batches: Vec::new(),
            decode_calls: 0,
            fail_on_call: None,
            trip: None,
            logits,
            row: Vec::new(),
            row_index: None,
            logit_batches: 0,
        }
    }

    /// Raise `flag` once the `call`-th decode (1-based) has finished.
    pub fn trip_after(mut self, call: usize, flag: Arc<AtomicBool>) -> Self {
        self.trip = Some((call, flag));
        self
    }

    /// Decoded tokens in submission order.
    pub fn decoded_tokens(&self) -> Vec<Token> {
        self.batches.iter().flatten().map(|e| e.token).collect()
    }
}

impl ContextHandle for MockContext {
    fn decode(&mut self, batch: &Batch) -> Result<(), BackendError> {
        self.decode_calls += 1;
        if self.fail_on_call == Some(self.decode_calls) {
            return Err(BackendError::Decode { code: 1 });
        }
        assert!(
            batch.len() <= batch.capacity(),
            "batch over capacity reached the backend"
        );
        self.batches.push(batch.entries().to_vec());
        if let Some((call, flag)) = &self.trip {
            if *call == self.decode_calls {
                flag.store(true, Ordering::Relaxed);
            }
        }

        self.row_index = batch.logits_index();
        if self.row_index.is_none() {
            return Ok(());
        }
        self.logit_batches += 1;
        self.row = match &self.logits {
            Logits::Fixed(row) => row.clone(),
            Logits::Scripted(favor) => {
                let pick = favor
                    .get(self.logit_batches - 1)
                    .or(favor.last())
                    .copied()
                    .unwrap_or(Token(0));
                let mut row = vec![-1.0; VOCAB];
                row[pick.0 as usize] = 5.0;
                row
            }
        };
        Ok(())
    }

    fn logits_ith(&self, index: usize) -> Result<&[f32], BackendError> {
        match self.row_index {
            Some(i) if i == index => Ok(&self.row),
            _ => Err(BackendError::LogitsUnavailable { index }),
        }
    }

    fn n_ctx(&self) -> usize {
        self.n_ctx
    }
}
