use bson::Document;

use crate::{
    error::Result,
    options::ServerAddress,
    ref_count::ReferenceCounted,
    reply::QueryReply,
    sdam::ServerType,
    BoxFuture,
    Namespace,
};

/// A reference-counted handle to a checked-out connection.
pub type ConnectionHandle = ReferenceCounted<Box<dyn Connection>>;

/// Contains information about a connection in a format digestible by a cursor.
#[derive(Debug, Default, Clone, PartialEq)]
#[non_exhaustive]
pub struct ConnectionDescription {
    /// The driver-generated ID of the connection.
    pub connection_id: u32,

    /// The address of the server.
    pub server_address: ServerAddress,

    /// The type of the server when the handshake occurred.
    pub server_type: ServerType,

    /// The maximum wire version that the server understands.
    pub max_wire_version: Option<i32>,
}

impl ConnectionDescription {
    /// Construct a description for a connection to the server at `server_address`.
    pub fn new(
        connection_id: u32,
        server_address: ServerAddress,
        server_type: ServerType,
        max_wire_version: impl Into<Option<i32>>,
    ) -> Self {
        Self {
            connection_id,
            server_address,
            server_type,
            max_wire_version: max_wire_version.into(),
        }
    }
}

/// A connection to a single server, as needed by a cursor.
///
/// Implementations own the transport: framing, compression, authentication and the decoding of
/// legacy OP_REPLY messages all happen behind this trait.
pub trait Connection: Send + Sync {
    /// The description negotiated during the connection handshake.
    fn description(&self) -> &ConnectionDescription;

    /// Run `command` against database `db`, returning the server's reply document whether or not
    /// the command succeeded. Transport failures are returned as errors.
    fn command<'a>(&'a self, db: &'a str, command: Document) -> BoxFuture<'a, Result<Document>>;

    /// Send an OP_GET_MORE for `cursor_id` and decode the OP_REPLY that answers it.
    fn legacy_get_more<'a>(
        &'a self,
        ns: &'a Namespace,
        cursor_id: i64,
        number_to_return: i32,
    ) -> BoxFuture<'a, Result<QueryReply>>;

    /// Send an OP_KILL_CURSORS for `cursor_ids`. The server does not reply to this message.
    fn legacy_kill_cursors<'a>(
        &'a self,
        ns: &'a Namespace,
        cursor_ids: &'a [i64],
    ) -> BoxFuture<'a, Result<()>>;
}
