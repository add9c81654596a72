// Audio playback engine
// Symphonia decoding on background threads feeding a cpal output stream

pub mod analyser;
pub mod decoder;
pub mod engine;
