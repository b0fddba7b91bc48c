//! Live transcription streaming.
//!
//! A client opens a WebSocket on the listen path; the gateway dials the
//! upstream streaming speech-to-text provider and relays frames both ways:
//!
//! ```text
//! Client                    Gateway                      STT provider
//!   |== upgrade /v1/listen ==>|                              |
//!   |                         |======= dial (Token key) ====>|
//!   |--- binary audio ------->|------- binary audio -------->|
//!   |<-- transcript JSON -----|<------ transcript JSON ------|
//!   |--- close -------------->|------- close --------------->|
//! ```
//!
//! - [`StreamingBridge`]: session lifecycle and relay
//! - [`SessionParams`]: languages, sample rate, model, diarization, formatting
//! - [`SessionRegistry`]: live sessions and their [`BridgeState`]

mod bridge;
mod params;
mod registry;

pub use bridge::{error_frame, StreamingBridge};
pub use params::SessionParams;
pub use registry::{BridgeState, SessionGuard, SessionInfo, SessionRegistry};
