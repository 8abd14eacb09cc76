//! The connection-side collaborators a cursor is driven through.

pub(crate) mod conn;
pub(crate) mod source;

pub use self::{
    conn::{Connection, ConnectionDescription, ConnectionHandle},
    source::{ConnectionSource, ConnectionSourceHandle},
};
