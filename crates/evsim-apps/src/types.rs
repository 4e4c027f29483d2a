use evsim_core::{identifier, Bytes, Context, Time};

identifier!(NodeId, u32);

impl NodeId {
    /// Reserved: its context would be [`Context::NONE`]. Scenarios using it are rejected.
    pub const RESERVED: NodeId = NodeId::new(u32::MAX);

    /// The scheduler context for events executing on this node.
    pub fn context(self) -> Context {
        Context::new(self.0)
    }
}

identifier!(FlowId, usize);

/// A packet in flight. Only the fields the statistics need are modeled; there is no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Packet {
    /// The flow this packet belongs to.
    pub flow: FlowId,
    /// Sequence number within the flow, starting at zero.
    pub seq: u64,
    /// Sending node.
    pub src: NodeId,
    /// Receiving node.
    pub dst: NodeId,
    /// Size on the wire.
    pub size: Bytes,
    /// Time the sender handed the packet to its channel.
    pub sent_at: Time,
}
