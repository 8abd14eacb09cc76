use crate::{
    cmap::ConnectionHandle,
    error::Result,
    ref_count::ReferenceCounted,
    sdam::ServerDescription,
    BoxFuture,
};

/// A reference-counted handle to a connection source.
pub type ConnectionSourceHandle = ReferenceCounted<Box<dyn ConnectionSource>>;

/// A source of connections to a single server.
pub trait ConnectionSource: Send + Sync {
    /// The current description of the server this source connects to.
    fn server_description(&self) -> &ServerDescription;

    /// Check out a connection to the server. The returned handle is already retained on behalf
    /// of the caller, who must release it.
    fn get_connection(&self) -> BoxFuture<'_, Result<ConnectionHandle>>;
}
