//! Client-side pieces of chatdeck.
//!
//! - [`playback`]: the audio session coordinator, one active session at a time.
//! - [`speech`]: text-to-speech and transcription requests with retry and
//!   abort handling, feeding the coordinator.
//! - [`chat`]: streaming chat with an ephemeral per-chatbot session history.

pub mod chat;
pub mod error;
pub mod playback;
pub mod speech;

pub use chat::{ChatClient, ChatEvent, ChatStream, SessionHistory};
pub use error::ClientError;
pub use playback::{
    AudioCoordinator, PlayOutcome, PlaybackObserver, PlaybackSink, PlaybackState, ResourceHandle,
    SessionEvents, SessionId,
};
pub use speech::{SpeakOutcome, SpeechClient, SpeechClientConfig};
