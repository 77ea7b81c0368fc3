// Safe adapters over a `BackendApi` call table.
// - Handles are borrowed: nothing here frees a model or context.
// - Null handles are rejected at wrap time instead of compared against zero later.
// - All raw pointer reads/writes live in this file.

use core::ffi::{c_char, c_void};
use std::ptr::NonNull;
use std::slice;

use crate::backend::{ContextHandle, ModelHandle};
use crate::batch::Batch;
use crate::error::BackendError;
use crate::ffi::{BackendApi, DECODE_OK, RawBatch, STRATA_BACKEND_ABI_VERSION};
use crate::token::Token;

fn check_abi(api: &BackendApi) -> Result<(), BackendError> {
    if api.abi_version != STRATA_BACKEND_ABI_VERSION {
        return Err(BackendError::Unavailable(format!(
            "backend ABI version {} (expected {})",
            api.abi_version, STRATA_BACKEND_ABI_VERSION
        )));
    }
    Ok(())
}

/// Borrowed native model handle.
pub struct NativeModel<'api> {
    api: &'api BackendApi,
    raw: NonNull<c_void>,
}

impl<'api> NativeModel<'api> {
    /// Wrap a raw model pointer. Fails on null or on an ABI version mismatch.
    pub fn from_raw(api: &'api BackendApi, raw: *mut c_void) -> Result<Self, BackendError> {
        check_abi(api)?;
        NonNull::new(raw)
            .map(|raw| Self { api, raw })
            .ok_or_else(|| BackendError::Unavailable("model handle is null".into()))
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut c_void {
        self.raw.as_ptr()
    }

    fn tokenize_into(&self, text: &str, buf: &mut [i32], add_special: bool) -> Result<i32, BackendError> {
        let text_len = i32::try_from(text.len())
            .map_err(|_| BackendError::Tokenize("prompt longer than i32::MAX bytes".into()))?;
        let cap = i32::try_from(buf.len()).unwrap_or(i32::MAX);
        Ok(unsafe {
            (self.api.tokenize)(
                self.raw.as_ptr(),
                text.as_ptr() as *const c_char,
                text_len,
                buf.as_mut_ptr(),
                cap,
                add_special,
            )
        })
    }
}

impl ModelHandle for NativeModel<'_> {
    /// Two-pass tokenize: guess one token per byte (+ specials); if the backend
    /// reports `-needed`, resize exactly and retry once.
    fn tokenize(&self, text: &str, add_special: bool) -> Result<Vec<Token>, BackendError> {
        let mut buf = vec![0i32; text.len() + 2];
        let mut n = self.tokenize_into(text, &mut buf, add_special)?;

        if n < 0 {
            buf.resize(n.unsigned_abs() as usize, 0);
            n = self.tokenize_into(text, &mut buf, add_special)?;
            if n < 0 {
                return Err(BackendError::Tokenize(format!(
                    "tokenize failed after retry: {n}"
                )));
            }
        }

        buf.truncate(n as usize);
        Ok(buf.into_iter().map(Token).collect())
    }

    fn token_to_piece(&self, token: Token, buf: &mut [u8]) -> i32 {
        let len = i32::try_from(buf.len()).unwrap_or(i32::MAX);
        unsafe {
            (self.api.token_to_piece)(
                self.raw.as_ptr(),
                token.0,
                buf.as_mut_ptr() as *mut c_char,
                len,
            )
        }
    }

    fn eos_token(&self) -> Token {
        Token(unsafe { (self.api.token_eos)(self.raw.as_ptr()) })
    }

    fn vocab_size(&self) -> usize {
        let n = unsafe { (self.api.n_vocab)(self.raw.as_ptr()) };
        n.max(0) as usize
    }
}

/// Struct-of-arrays storage backing a `RawBatch`. Reused across decode calls.
#[derive(Default)]
struct RawBatchScratch {
    token: Vec<i32>,
    pos: Vec<i32>,
    n_seq_id: Vec<i32>,
    seq_id_flat: Vec<i32>,
    seq_id_ptrs: Vec<*const i32>,
    logits: Vec<i8>,
}

impl RawBatchScratch {
    /// Refill from `batch` and return a view valid until the next `fill`.
    fn fill(&mut self, batch: &Batch) -> RawBatch {
        self.token.clear();
        self.pos.clear();
        self.n_seq_id.clear();
        self.seq_id_flat.clear();
        self.seq_id_ptrs.clear();
        self.logits.clear();

        for e in batch.entries() {
            self.token.push(e.token.0);
            self.pos.push(e.pos.0 as i32);
            self.n_seq_id.push(e.seq_ids.len() as i32);
            self.seq_id_flat.extend(e.seq_ids.iter().map(|s| s.0));
            self.logits.push(e.logits as i8);
        }

        // Pointers are taken only after `seq_id_flat` stops growing.
        let base = self.seq_id_flat.as_ptr();
        let mut offset = 0usize;
        for &n in &self.n_seq_id {
            self.seq_id_ptrs.push(base.wrapping_add(offset));
            offset += n as usize;
        }

        RawBatch {
            n_tokens: self.token.len() as i32,
            token: self.token.as_ptr(),
            pos: self.pos.as_ptr(),
            n_seq_id: self.n_seq_id.as_ptr(),
            seq_id: self.seq_id_ptrs.as_ptr(),
            logits: self.logits.as_ptr(),
        }
    }
}

/// Borrowed native context handle. Stays !Send/!Sync like the raw context.
pub struct NativeContext<'api> {
    api: &'api BackendApi,
    raw: NonNull<c_void>,
    n_vocab: usize,
    scratch: RawBatchScratch,
}

impl<'api> NativeContext<'api> {
    /// Wrap a raw context pointer created from `model`.
    pub fn from_raw(
        api: &'api BackendApi,
        raw: *mut c_void,
        model: &NativeModel<'_>,
    ) -> Result<Self, BackendError> {
        check_abi(api)?;
        let raw = NonNull::new(raw)
            .ok_or_else(|| BackendError::Unavailable("context handle is null".into()))?;
        Ok(Self {
            api,
            raw,
            n_vocab: model.vocab_size(),
            scratch: RawBatchScratch::default(),
        })
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut c_void {
        self.raw.as_ptr()
    }
}

impl ContextHandle for NativeContext<'_> {
    fn decode(&mut self, batch: &Batch) -> Result<(), BackendError> {
        let raw = self.scratch.fill(batch);
        let rc = unsafe { (self.api.decode)(self.raw.as_ptr(), raw) };
        if rc != DECODE_OK {
            Err(BackendError::Decode { code: rc })
        } else {
            Ok(())
        }
    }

    fn logits_ith(&self, index: usize) -> Result<&[f32], BackendError> {
        let i = i32::try_from(index).map_err(|_| BackendError::LogitsUnavailable { index })?;
        let ptr = unsafe { (self.api.get_logits_ith)(self.raw.as_ptr(), i) };
        if ptr.is_null() {
            return Err(BackendError::LogitsUnavailable { index });
        }
        // SAFETY: the backend guarantees `n_vocab` floats until the next decode,
        // and `&self` keeps `decode` (which takes `&mut self`) from running meanwhile.
        Ok(unsafe { slice::from_raw_parts(ptr, self.n_vocab) })
    }

    fn n_ctx(&self) -> usize {
        unsafe { (self.api.n_ctx)(self.raw.as_ptr()) as usize }
    }
}
