use std::fmt;
use std::fmt::Debug;

use crate::utils::types::{Address, HashPos};

/// Pure value reference to a ring member. It never embeds node state; a peer
/// is always reached through its address over the transport.
///
/// The default value (id 0, empty address) is the distinguished
/// "unknown/none" reference.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct NodeRef {
    pub id: HashPos,
    pub address: Address,
}

impl Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("")
            .field("id", &self.id)
            .field("address", &self.address)
            .finish()
    }
}

impl NodeRef {
    pub fn new(id: HashPos, address: impl Into<Address>) -> Self {
        NodeRef {
            id,
            address: address.into(),
        }
    }

    /// The distinguished "unknown" reference.
    pub fn empty() -> Self {
        NodeRef::default()
    }

    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
    }
}
