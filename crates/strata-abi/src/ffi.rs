use core::ffi::{c_char, c_void};

/// Bump this when you break the ABI. Adapters check it at wrap time.
pub const STRATA_BACKEND_ABI_VERSION: u32 = 1;

/// Decode status meaning success. Anything else is a failure code.
pub const DECODE_OK: i32 = 0;

/// `#[repr(C)]` struct-of-arrays view of a `Batch`, as a decode call receives it.
/// All arrays hold `n_tokens` elements; `seq_id[i]` points at `n_seq_id[i]` ids.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawBatch {
    pub n_tokens: i32,
    pub token: *const i32,
    pub pos: *const i32,
    pub n_seq_id: *const i32,
    pub seq_id: *const *const i32,
    pub logits: *const i8,
}

// ---------- Function pointer types (C ABI) ----------

/// Writes up to `n_tokens_max` ids. Returns the count, or `-needed` if the
/// output buffer is too small.
pub type TokenizeFn = unsafe extern "C" fn(
    model: *mut c_void,
    text: *const c_char,
    text_len: i32,
    tokens: *mut i32,
    n_tokens_max: i32,
    add_special: bool,
) -> i32;

/// Returns `DECODE_OK` on success.
pub type DecodeFn = unsafe extern "C" fn(ctx: *mut c_void, batch: RawBatch) -> i32;

/// Logits row for batch entry `i`, `n_vocab` floats long, or null.
pub type GetLogitsIthFn = unsafe extern "C" fn(ctx: *mut c_void, i: i32) -> *const f32;

/// Returns bytes written, or `-needed` if `length` is too small.
pub type TokenToPieceFn =
    unsafe extern "C" fn(model: *mut c_void, token: i32, buf: *mut c_char, length: i32) -> i32;

pub type TokenEosFn = unsafe extern "C" fn(model: *mut c_void) -> i32;
pub type NCtxFn = unsafe extern "C" fn(ctx: *mut c_void) -> u32;
pub type NVocabFn = unsafe extern "C" fn(model: *mut c_void) -> i32;

// ---------- VTable ----------

/// Call table a native backend exposes. The host fills it in after loading
/// the library; this crate never loads or frees anything itself.
#[repr(C)]
pub struct BackendApi {
    pub abi_version: u32,

    // model-side
    pub tokenize: TokenizeFn,
    pub token_to_piece: TokenToPieceFn,
    pub token_eos: TokenEosFn,
    pub n_vocab: NVocabFn,

    // context-side
    pub decode: DecodeFn,
    pub get_logits_ith: GetLogitsIthFn,
    pub n_ctx: NCtxFn,
}
