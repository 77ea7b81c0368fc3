use serde::{Deserialize, Serialize};

/// Wrapper for a model token (ID). Using a newtype avoids accidental
/// mixing with unrelated `i32`s and keeps conversions explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(pub i32);

// Using i32 matches llama.cpp's `llama_token`. If a backend uses u32, convert
// at the glue layer and keep this type consistent in core.

impl From<i32> for Token {
    #[inline]
    fn from(value: i32) -> Self {
        Token(value)
    }
}

impl From<Token> for i32 {
    #[inline]
    fn from(token: Token) -> i32 {
        token.0
    }
}

/// Absolute index of a token in its sequence. Starts at 0, strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(pub u32);

impl Position {
    #[inline]
    pub fn next(self) -> Self {
        Position(self.0 + 1)
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for Position {
    #[inline]
    fn from(value: u32) -> Self {
        Position(value)
    }
}

/// Logical generation stream a batch entry belongs to.
/// The engine only ever drives `SeqId::MAIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeqId(pub i32);

impl SeqId {
    pub const MAIN: SeqId = SeqId(0);
}

impl Default for SeqId {
    fn default() -> Self {
        Self::MAIN
    }
}
