//! Call script synthesis.

pub mod synthesizer;

pub use synthesizer::{ScriptRequest, ScriptSynthesizer, SynthesizerConfig};
