//! Speech detection and per-speaker chunking for the translation relay
//!
//! This crate provides:
//! - RMS-based speech/silence classification (`speech_detector`)
//! - Per-speaker pause-based segmentation (`chunker::Chunker`)
//! - The per-(call, target_lang) translation context ring buffer (`context::ContextStore`)

pub mod chunker;
pub mod context;
pub mod speech_detector;

pub use chunker::{Chunker, ChunkerOutput};
pub use context::ContextStore;
pub use speech_detector::{is_voiced, rms};
