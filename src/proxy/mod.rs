//! Batch proxy for one-shot provider calls.
//!
//! Used by the chat completion, model listing, file transcription and voice
//! transcription routes.
//!
//! ```text
//! Router ──> validate ──> BatchProxy ──(one call, no retry)──> Provider
//!                │                                               │
//!                └── BadInput (no upstream call)                 └── Upstream error → 502
//! ```

mod batch;
pub mod validate;

pub use batch::{BatchProxy, TranscriptSummary};
