//! Native AR bridge: correlated request/response plus a streaming watch channel

mod client;
mod messages;

pub use client::{BridgeClient, BridgeTransport, PendingReply};
pub use messages::{
    AddedAnchor, BridgeAnchor, BridgeHit, BridgeRequest, CameraUpdate, DeviceInfo,
    IncomingMessage, InitializeOptions, OutgoingMessage, WatchOptions, WatchUpdate,
};

#[cfg(test)]
pub(crate) use client::tests::{wait_for_sent, RecordingTransport};
