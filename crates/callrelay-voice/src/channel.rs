//! Socket-agnostic duplex channel used by the call bridge.
//!
//! Each WebSocket (telephony and agent) is adapted into a `WsChannel` by a
//! pair of forwarding tasks. Dropping the `tx` half closes the outbound side
//! of the socket; the `rx` half yields `None` once the peer disconnects.

use tokio::sync::mpsc;

/// Default queue depth for each direction of a channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// A single WebSocket data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug)]
pub struct WsChannel {
    pub tx: mpsc::Sender<Frame>,
    pub rx: mpsc::Receiver<Frame>,
}

impl WsChannel {
    pub fn new(tx: mpsc::Sender<Frame>, rx: mpsc::Receiver<Frame>) -> Self {
        Self { tx, rx }
    }

    /// Creates two channels wired back to back: frames sent on one are
    /// received on the other.
    pub fn pair(capacity: usize) -> (WsChannel, WsChannel) {
        let (a_tx, a_rx) = mpsc::channel(capacity);
        let (b_tx, b_rx) = mpsc::channel(capacity);
        (WsChannel::new(a_tx, b_rx), WsChannel::new(b_tx, a_rx))
    }
}
