pub mod ambient;
#[cfg(not(target_arch = "wasm32"))]
pub mod audio_io;
pub mod clock;
pub mod composite;
pub mod config;
pub mod context;
pub mod dsp;
pub mod error;
pub mod graph;
pub mod models;
pub mod scheduler;
pub mod session;
pub mod tone;
pub mod voices;

pub use ambient::{AmbientBedEngine, AmbientSound};
pub use clock::{AudioClock, ClockState, OfflineClock};
pub use composite::{CompositeSignalConfig, CompositeSignalGenerator};
pub use context::{AudioContext, Destination};
pub use error::{EngineError, NodeError};
pub use models::{AmbientSoundSpec, FrequencyCategory, FrequencySpec};
pub use session::{SessionData, SessionPlayer};
pub use tone::{ToneEngine, ToneStrategy};
