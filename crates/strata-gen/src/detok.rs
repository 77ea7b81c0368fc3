//! Token → text, one piece at a time.
//!
//! The backend renders a piece into a caller buffer and returns the byte count,
//! or `-needed` if the buffer is too small. We start from a small buffer, grow it
//! to the reported size and retry exactly once. Piece bytes are UTF-8 but token
//! boundaries are not character boundaries, so incomplete trailing bytes are
//! held back until a later piece completes them.

use strata_abi::{ModelHandle, Token};
use tracing::trace;

use crate::debug::{dump_bytes, dump_str};
use crate::error::{GenerateError, Result};

/// First-call buffer size. A hint only; most multi-byte pieces need more.
pub const INITIAL_PIECE_BUF: usize = 8;

#[derive(Debug)]
pub struct Detokenizer {
    piece_buf: Vec<u8>,
    pending: Vec<u8>,
}

impl Default for Detokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Detokenizer {
    pub fn new() -> Self {
        Self {
            piece_buf: vec![0; INITIAL_PIECE_BUF],
            pending: Vec::with_capacity(8),
        }
    }

    /// Current piece buffer size (grows, never shrinks).
    #[inline]
    pub fn piece_capacity(&self) -> usize {
        self.piece_buf.len()
    }

    /// Bytes held back waiting for the rest of a code point.
    #[inline]
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Raw piece bytes for `token`. `position` is only used for error reporting.
    pub fn piece_bytes<M: ModelHandle + ?Sized>(
        &mut self,
        model: &M,
        token: Token,
        position: usize,
    ) -> Result<&[u8]> {
        let n = self.fill_piece(model, token, position)?;
        Ok(&self.piece_buf[..n])
    }

    /// Render `token` and return the text that is now complete. May be empty
    /// when the piece ends inside a code point.
    pub fn render<M: ModelHandle + ?Sized>(
        &mut self,
        model: &M,
        token: Token,
        position: usize,
    ) -> Result<String> {
        let n = self.fill_piece(model, token, position)?;
        dump_bytes("detok", &self.piece_buf[..n]);
        let text = assemble(&mut self.pending, &self.piece_buf[..n]);
        dump_str("detok", &text);
        Ok(text)
    }

    /// Feed raw bytes through the UTF-8 assembler.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> String {
        assemble(&mut self.pending, bytes)
    }

    /// Flush whatever is still pending, replacing the incomplete tail with U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        trace!(
            "🧩 [detok] flushing {} dangling byte(s) at end of stream",
            self.pending.len()
        );
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }

    fn fill_piece<M: ModelHandle + ?Sized>(
        &mut self,
        model: &M,
        token: Token,
        position: usize,
    ) -> Result<usize> {
        let mut n = model.token_to_piece(token, &mut self.piece_buf);
        let mut limit = self.piece_buf.len();
        if n < 0 {
            let needed = n.unsigned_abs() as usize;
            if needed > self.piece_buf.len() {
                self.piece_buf.resize(needed, 0);
            }
            trace!("📏 [detok] piece for {token:?} needs {needed} bytes, retrying");
            n = model.token_to_piece(token, &mut self.piece_buf[..needed]);
            limit = needed;
        }
        if n < 0 || n as usize > limit {
            return Err(GenerateError::DetokenizeFailed {
                token,
                position,
                code: n,
            });
        }
        Ok(n as usize)
    }
}

/// Append `bytes` to `pending` and drain every complete character.
/// Invalid sequences become U+FFFD; an incomplete tail stays in `pending`.
fn assemble(pending: &mut Vec<u8>, bytes: &[u8]) -> String {
    pending.extend_from_slice(bytes);
    let mut out = String::new();
    loop {
        match std::str::from_utf8(pending) {
            Ok(s) => {
                out.push_str(s);
                pending.clear();
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[..valid]));
                match e.error_len() {
                    Some(bad) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid + bad);
                    }
                    None => {
                        pending.drain(..valid);
                        return out;
                    }
                }
            }
        }
    }
}
