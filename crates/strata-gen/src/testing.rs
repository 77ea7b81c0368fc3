//! In-memory backend for unit tests: a fixed prompt, a piece table and a
//! context whose logits follow a script.

use std::cell::Cell;
use std::collections::HashMap;

use strata_abi::{BackendError, Batch, BatchEntry, ContextHandle, ModelHandle, Token};

pub struct ScriptedModel {
    prompt: Vec<Token>,
    eos: Token,
    vocab: usize,
    pieces: HashMap<Token, Vec<u8>>,
    piece_calls: Cell<usize>,
}

impl ScriptedModel {
    pub fn new(prompt: Vec<Token>, eos: Token, vocab: usize) -> Self {
        Self {
            prompt,
            eos,
            vocab,
            pieces: HashMap::new(),
            piece_calls: Cell::new(0),
        }
    }

    pub fn with_piece(self, token: Token, text: &str) -> Self {
        self.with_piece_bytes(token, text.as_bytes())
    }

    pub fn with_piece_bytes(mut self, token: Token, bytes: &[u8]) -> Self {
        self.pieces.insert(token, bytes.to_vec());
        self
    }

    pub fn piece_calls(&self) -> usize {
        self.piece_calls.get()
    }
}

impl ModelHandle for ScriptedModel {
    fn tokenize(&self, _text: &str, _add_special: bool) -> Result<Vec<Token>, BackendError> {
        Ok(self.prompt.clone())
    }

    fn token_to_piece(&self, token: Token, buf: &mut [u8]) -> i32 {
        self.piece_calls.set(self.piece_calls.get() + 1);
        // Unlisted tokens render as their id.
        let bytes = match self.pieces.get(&token) {
            Some(b) => b.clone(),
            None => token.0.to_string().into_bytes(),
        };
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

/// `script[k]` is the token favored by the logits of the k-th decode call
/// (0 = the final prefill batch); the last entry repeats.
pub struct ScriptedContext {
    n_ctx: usize,
    vocab: usize,
    script: Vec<Token>,
    fail_on_call: Option<usize>,
    logits: Vec<f32>,
    logits_index: Option<usize>,
    pub decode_calls: usize,
    pub batches: Vec<Vec<BatchEntry>>,
}

impl ScriptedContext {
    pub fn new(n_ctx: usize, vocab: usize, script: Vec<Token>) -> Self {
        Self {
            n_ctx,
            vocab,
            script,
            fail_on_call: None,
            logits: Vec::new(),
            logits_index: None,
            decode_calls: 0,
            batches: Vec::new(),
        }
    }

    /// Make the `call`-th decode (1-based) fail.
    pub fn fail_on_decode(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }
}

impl ContextHandle for ScriptedContext {
    fn decode(&mut self, batch: &Batch) -> Result<(), BackendError> {
        self.decode_calls += 1;
        if self.fail_on_call == Some(self.decode_calls) {
            return Err(BackendError::Decode { code: -1 });
        }
        self.batches.push(batch.entries().to_vec());

        let favored = self
            .script
            .get(self.decode_calls - 1)
            .or(self.script.last())
            .copied()
            .unwrap_or(Token(0));
        self.logits.clear();
        self.logits.resize(self.vocab, 0.0);
        if let Some(l) = self.logits.get_mut(favored.0 as usize) {
            *l = 10.0;
        }
        self.logits_index = batch.logits_index();
        Ok(())
    }

    fn logits_ith(&self, index: usize) -> Result<&[f32], BackendError> {
        if self.logits_index == Some(index) {
            Ok(&self.logits)
        } else {
            Err(BackendError::LogitsUnavailable { index })
        }
    }

    fn n_ctx(&self) -> usize {
        self.n_ctx
    }
}
