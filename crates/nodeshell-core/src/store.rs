// ABOUTME: Boundary to the application's external action store.
// ABOUTME: Defines the dispatch trait and the actions issued when the daemon comes online.

use serde_json::{json, Value};

/// The application's action store. Reducers live on the other side.
pub trait Store: Send + Sync {
    fn dispatch(&self, action: Value);
}

/// Reads issued once per transition to Online, in no particular order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadyQuery {
    PeerId,
    GatewayAddress,
    ApiAddress,
    DatastorePath,
    Log,
    Online,
}

impl ReadyQuery {
    pub const ALL: [ReadyQuery; 6] = [
        ReadyQuery::PeerId,
        ReadyQuery::GatewayAddress,
        ReadyQuery::ApiAddress,
        ReadyQuery::DatastorePath,
        ReadyQuery::Log,
        ReadyQuery::Online,
    ];

    /// Action type the result is dispatched under.
    pub fn action_type(self) -> &'static str {
        match self {
            ReadyQuery::PeerId => "IPFS_PEER_ID",
            ReadyQuery::GatewayAddress => "IPFS_GATEWAY_ADDRESS",
            ReadyQuery::ApiAddress => "IPFS_API_ADDRESS",
            ReadyQuery::DatastorePath => "IPFS_DATASTORE_PATH",
            ReadyQuery::Log => "IPFS_LOG",
            ReadyQuery::Online => "IPFS_ONLINE",
        }
    }

    pub fn action(self, payload: Value) -> Value {
        json!({ "type": self.action_type(), "payload": payload })
    }

    pub fn failed(self, reason: &str) -> Value {
        json!({ "type": self.action_type(), "error": true, "payload": reason })
    }
}
