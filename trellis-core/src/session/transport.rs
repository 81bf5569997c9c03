//! Outbound side of a live connection.

use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::protocol::Frame;

/// Something a session can push frames to.
///
/// Implementations must not block: the connection loop owns the socket and
/// drains frames on its own task.
pub trait Transport: Send + Sync {
    fn send(&self, frame: Frame) -> Result<(), TransportError>;
}

/// Transport backed by an unbounded channel to a writer task.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Frame>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<Frame>) -> Self {
        Self { tx }
    }

    /// Create a transport together with the receiving end.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_fails_after_receiver_drops() {
        let (transport, mut rx) = ChannelTransport::pair();
        transport.send(Frame::Text("a".into())).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Frame::Text("a".into()));

        drop(rx);
        assert!(matches!(
            transport.send(Frame::Text("b".into())),
            Err(TransportError::Closed)
        ));
    }
}
