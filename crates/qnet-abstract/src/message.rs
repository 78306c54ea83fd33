use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::protocol::ProtocolRef;

/// Receiver tag addressing a node's resource manager.
pub const RESOURCE_MANAGER: &str = "resource_manager";

/// Condition a REQUEST receiver runs over its waiting protocols; returns the
/// chosen counterpart, if any.
pub type ReqConditionFn = Rc<dyn Fn(&[ProtocolRef]) -> Option<ProtocolRef>>;

/// Wire payload of the two-phase pairing handshake between resource managers.
#[derive(Clone)]
pub enum ResourceManagerMessage {
    Request {
        protocol: ProtocolRef,
        req_condition: ReqConditionFn,
    },
    Response {
        protocol: ProtocolRef,
        is_approved: bool,
        paired_protocol: Option<ProtocolRef>,
    },
}

#[derive(Clone)]
pub enum MessageBody {
    ResourceManager(ResourceManagerMessage),
    /// Opaque protocol-to-protocol payload; concrete protocols downcast it.
    Protocol(Rc<dyn Any>),
}

/// Classical-channel message envelope.
#[derive(Clone)]
pub struct Message {
    /// `None` addresses every protocol whose kind matches `protocol_kind`.
    pub receiver: Option<String>,
    pub protocol_kind: Option<String>,
    pub body: MessageBody,
}

impl Message {
    pub fn request(protocol: ProtocolRef, req_condition: ReqConditionFn) -> Self {
        Self {
            receiver: Some(RESOURCE_MANAGER.to_string()),
            protocol_kind: None,
            body: MessageBody::ResourceManager(ResourceManagerMessage::Request {
                protocol,
                req_condition,
            }),
        }
    }

    pub fn response(
        protocol: ProtocolRef,
        is_approved: bool,
        paired_protocol: Option<ProtocolRef>,
    ) -> Self {
        Self {
            receiver: Some(RESOURCE_MANAGER.to_string()),
            protocol_kind: None,
            body: MessageBody::ResourceManager(ResourceManagerMessage::Response {
                protocol,
                is_approved,
                paired_protocol,
            }),
        }
    }

    /// Message for one protocol instance, addressed by name.
    pub fn to_protocol(receiver: impl Into<String>, payload: Rc<dyn Any>) -> Self {
        Self {
            receiver: Some(receiver.into()),
            protocol_kind: None,
            body: MessageBody::Protocol(payload),
        }
    }

    /// Message for every protocol of the given kind on the destination node.
    pub fn broadcast(kind: impl Into<String>, payload: Rc<dyn Any>) -> Self {
        Self {
            receiver: None,
            protocol_kind: Some(kind.into()),
            body: MessageBody::Protocol(payload),
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match &self.body {
            MessageBody::ResourceManager(ResourceManagerMessage::Request { .. }) => "REQUEST",
            MessageBody::ResourceManager(ResourceManagerMessage::Response {
                is_approved, ..
            }) => {
                if *is_approved {
                    "RESPONSE(approved)"
                } else {
                    "RESPONSE(rejected)"
                }
            }
            MessageBody::Protocol(_) => "PROTOCOL",
        };
        f.debug_struct("Message")
            .field("receiver", &self.receiver)
            .field("protocol_kind", &self.protocol_kind)
            .field("body", &body)
            .finish()
    }
}
