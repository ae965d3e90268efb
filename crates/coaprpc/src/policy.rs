//! # Protocol Policy
//!
//! Conventions layered on top of plain CoAP: where the service address ends,
//! and whether acknowledgements and error replies go on the wire at all.
//!
//! Both switches default to off. Constrained links can then drop silently
//! instead of spending a datagram on every ack or error.

use coapwire::Message;
use coapwire::PacketType;
use coapwire::ResponseCode;
use tracing::warn;

/// Terminates a URN address inside a request payload.
pub const SERVICE_TERMINATOR: u8 = b'?';

/// Deployment-wide emission switches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Policy {
    pub send_acks: bool,
    pub send_errors: bool,
}

impl Policy {
    pub fn new(send_acks: bool, send_errors: bool) -> Self {
        Self { send_acks, send_errors }
    }

    /// A standalone ACK for `msg`, if acks are enabled and `msg` is confirmable.
    pub fn create_ack(&self, msg: &Message) -> Option<Message> {
        if self.send_acks && msg.is_confirmable() {
            Some(Message::empty(PacketType::Ack, msg.message_id))
        } else {
            None
        }
    }

    /// A NON error response to `msg`, if errors are enabled.
    pub fn create_error(&self, msg: &Message, code: ResponseCode) -> Option<Message> {
        if self.send_errors {
            Some(Message::response(PacketType::Non, code, msg.message_id).with_token(msg.token.clone()))
        } else {
            None
        }
    }
}

/// Serializes an outbound reply; a reply that cannot be encoded is dropped.
pub(crate) fn encode_reply(msg: &Message) -> Option<Vec<u8>> {
    match msg.serialize() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(message_id = msg.message_id, error = %e, "dropping reply that cannot be encoded");
            None
        }
    }
}
