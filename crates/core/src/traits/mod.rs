//! Core traits for pluggable external speech backends
//!
//! ```text
//!   - SpeechToText: PCM -> recognized text
//!   - Translator: text -> translated text, with context
//!   - TextToSpeech: text -> synthesized PCM
//! ```

mod speech;

pub use speech::{SpeechToText, TextToSpeech, Translator, Recognition};
