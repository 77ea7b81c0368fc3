//! Strata ABI crate: contracts shared by the generation engine and model backends.

pub mod backend;
pub mod batch;
pub mod error;
pub mod ffi;
pub mod native;
pub mod sampling;
pub mod token;

pub use backend::*;
pub use batch::*;
pub use error::*;
pub use sampling::*;
pub use token::*;
