pub mod channel;
pub mod error;
pub mod manager;
pub mod resample;
pub mod sink;
pub mod vad;

pub use channel::VoiceChannelProvisioner;
pub use error::{Result, VoiceError};
pub use manager::{VadFactory, VoiceManager, VoiceState, DEFAULT_ALONE_TIMEOUT};
pub use sink::{AudioSink, DEFAULT_SILENCE_DURATION_MS};
pub use vad::{EnergyVad, Vad};
