//! The interview runtime: dialogue control, proctoring, recording,
//! coding evaluation, and terminal assembly.

pub mod classify;
pub mod coding;
pub mod dialogue;
pub mod evaluation;
pub mod proctor;
pub mod questions;
pub mod recording;
pub mod snapshot;
pub mod tts_cache;
