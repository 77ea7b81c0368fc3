use crate::batch::Batch;
use crate::error::BackendError;
use crate::token::Token;

/// Read-only view of a loaded model: vocabulary and text rendering.
///
/// The engine only borrows model handles; loading and freeing belong to the caller.
pub trait ModelHandle {
    /// Convert text to model tokens. `add_special` prepends BOS etc. where the
    /// model is configured to.
    fn tokenize(&self, text: &str, add_special: bool) -> Result<Vec<Token>, BackendError>;

    /// Render a token's text piece into `buf`.
    ///
    /// Returns the number of bytes written, or `-needed` when `buf` is smaller
    /// than the piece. A second call with a buffer of exactly `needed` bytes
    /// must succeed.
    fn token_to_piece(&self, token: Token, buf: &mut [u8]) -> i32;

    /// Model’s EOS token.
    fn eos_token(&self) -> Token;

    /// Number of entries in every logits vector.
    fn vocab_size(&self) -> usize;
}

/// Mutable inference context (KV cache) created from a model.
///
/// Not safe to share between concurrent requests; one context per request stream.
pub trait ContextHandle {
    /// Run one forward pass over `batch`, extending the KV cache.
    fn decode(&mut self, batch: &Batch) -> Result<(), BackendError>;

    /// Logits produced for entry `index` of the last decoded batch.
    /// Valid only until the next `decode`.
    fn logits_ith(&self, index: usize) -> Result<&[f32], BackendError>;

    /// Active context window (n_ctx).
    fn n_ctx(&self) -> usize;
}

impl<T: ModelHandle + ?Sized> ModelHandle for &T {
    fn tokenize(&self, text: &str, add_special: bool) -> Result<Vec<Token>, BackendError> {
        (**self).tokenize(text, add_special)
    }
    fn token_to_piece(&self, token: Token, buf: &mut [u8]) -> i32 {
        (**self).token_to_piece(token, buf)
    }
    fn eos_token(&self) -> Token {
        (**self).eos_token()
    }
    fn vocab_size(&self) -> usize {
        (**self).vocab_size()
    }
}

impl<T: ContextHandle + ?Sized> ContextHandle for &mut T {
    fn decode(&mut self, batch: &Batch) -> Result<(), BackendError> {
        (**self).decode(batch)
    }
    fn logits_ith(&self, index: usize) -> Result<&[f32], BackendError> {
        (**self).logits_ith(index)
    }
    fn n_ctx(&self) -> usize {
        (**self).n_ctx()
    }
}
