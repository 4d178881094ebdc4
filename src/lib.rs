mod analyser;
mod callbacks;
mod capture;
mod client;
mod config;
mod decoder;
mod devices;
mod error;
mod output;
mod playback;
mod session;
mod transcript;

pub use voice_session_types as types;
pub use voice_session_utils as utils;

pub use analyser::{AnalyserNode, ANALYSER_SIZE};
pub use callbacks::{NoopCallbacks, SessionCallbacks};
pub use capture::{CapturePipeline, FrameAssembler, FRAME_SIZE};
pub use client::{connect, demultiplex, AudioSender, ChannelEvent, Client, Config, ConfigBuilder, Stats};
pub use config::{SessionConfig, SessionConfigBuilder, Settings, VisualContext};
pub use error::{ChannelError, ConfigError, Error, ErrorCategory, ErrorReport};
pub use playback::{AudioOutput, BufferId, LevelMeter, PlaybackScheduler, Scheduled};
pub use session::{ConnectionStatus, Phase, SessionState, VoiceSession};
pub use transcript::{Role, TranscriptEntry, TranscriptHistory, TurnPhase, TurnTracker};
