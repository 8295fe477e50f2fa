//! Bluetooth Module
//!
//! BlueZ side of the HID relay.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  ConnectRequest / closed() / adapter removed
//! │    BlueZ     │──────────────────────────────┐
//! └──────┬───────┘                              ▼
//!        │ RegisterProfile           ┌───────────────────┐
//!        │                           │ ProfileRegistrar  │
//! ┌──────┴───────┐                   │ (forwarding tasks)│
//! │ ProfileConfig│                   └─────────┬─────────┘
//! │ + SDP record │                             │ ProfileEvent
//! └──────────────┘                             ▼
//!                                      RelayApp::dispatch
//! ```
//!
//! ## Modules
//!
//! - [`profile`] - Profile options and registration
//! - [`channel`] - Non-blocking report writes on the HID socket
//! - [`sdp`] - Bundled SDP record

pub mod channel;
pub mod profile;
pub mod sdp;

pub use channel::L2capChannel;
pub use profile::{ChannelEvent, ProfileConfig, ProfileRegistrar};
