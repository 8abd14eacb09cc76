//! Descriptions of the servers that cursors are opened against.

use crate::options::ServerAddress;

/// The minimum wire version (MongoDB 3.2) at which cursors are driven through the `getMore` and
/// `killCursors` commands rather than the legacy OP_GET_MORE and OP_KILL_CURSORS messages.
pub(crate) const MIN_COMMAND_CURSOR_WIRE_VERSION: i32 = 4;

/// The possible types for a server.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
#[non_exhaustive]
pub enum ServerType {
    /// A single, non-replica set mongod.
    Standalone,

    /// A router used in sharded deployments.
    Mongos,

    /// The primary node in a replica set.
    RsPrimary,

    /// A secondary node in a replica set.
    RsSecondary,

    /// A load balancer fronting one or more mongos. Cursors opened through a load balancer must
    /// run every subsequent operation on the connection that created them.
    LoadBalancer,

    /// A server whose type has not been determined.
    #[default]
    Unknown,
}

impl ServerType {
    pub(crate) fn is_load_balanced(self) -> bool {
        matches!(self, ServerType::LoadBalancer)
    }
}

/// A description of the server that a connection source yields connections to.
#[derive(Debug, Default, Clone, PartialEq)]
#[non_exhaustive]
pub struct ServerDescription {
    /// The address of the server.
    pub address: ServerAddress,

    /// The type of the server.
    pub server_type: ServerType,

    /// The maximum wire version that the server understands.
    pub max_wire_version: Option<i32>,
}

impl ServerDescription {
    /// Construct a description for the server at `address`.
    pub fn new(
        address: ServerAddress,
        server_type: ServerType,
        max_wire_version: impl Into<Option<i32>>,
    ) -> Self {
        Self {
            address,
            server_type,
            max_wire_version: max_wire_version.into(),
        }
    }
}
