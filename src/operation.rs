//! The cursor maintenance operations: getMore and killCursors, over either the command protocol
//! or the legacy wire messages.

mod get_more;
mod kill_cursors;
mod protocol;
#[cfg(test)]
mod test;

pub(crate) use self::{
    get_more::{number_to_return, GetMore},
    kill_cursors::KillCursors,
    protocol::{protocol_for, CursorProtocol},
};
