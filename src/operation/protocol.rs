use std::sync::Arc;

use futures_util::FutureExt;

use super::{GetMore, KillCursors};
use crate::{
    cmap::Connection,
    error::Result,
    options::ServerAddress,
    reply::{check_command_response, QueryReply},
    sdam::MIN_COMMAND_CURSOR_WIRE_VERSION,
    BoxFuture,
};

/// How a cursor talks to the server about its server-side cursor. Chosen once per cursor from
/// the negotiated wire version.
pub(crate) trait CursorProtocol: Send + Sync {
    /// Fetch the next batch.
    fn get_more<'a>(
        &'a self,
        conn: &'a dyn Connection,
        get_more: GetMore<'a>,
    ) -> BoxFuture<'a, Result<QueryReply>>;

    /// Tell the server to discard the cursor.
    fn kill_cursors<'a>(
        &'a self,
        conn: &'a dyn Connection,
        kill_cursors: KillCursors<'a>,
    ) -> BoxFuture<'a, Result<()>>;

    /// A short name for logging.
    fn name(&self) -> &'static str;
}

/// Select the protocol for a server with the given maximum wire version. An unknown version is
/// treated as a modern server.
pub(crate) fn protocol_for(max_wire_version: Option<i32>) -> Arc<dyn CursorProtocol> {
    match max_wire_version {
        Some(version) if version < MIN_COMMAND_CURSOR_WIRE_VERSION => Arc::new(LegacyProtocol),
        _ => Arc::new(CommandProtocol),
    }
}

/// Drives cursors with the getMore and killCursors commands.
#[derive(Debug)]
pub(crate) struct CommandProtocol;

impl CursorProtocol for CommandProtocol {
    fn get_more<'a>(
        &'a self,
        conn: &'a dyn Connection,
        get_more: GetMore<'a>,
    ) -> BoxFuture<'a, Result<QueryReply>> {
        async move {
            let address: ServerAddress = conn.description().server_address.clone();
            let response = conn.command(get_more.target_db(), get_more.build()).await?;
            QueryReply::from_command_response(response, address)
        }
        .boxed()
    }

    fn kill_cursors<'a>(
        &'a self,
        conn: &'a dyn Connection,
        kill_cursors: KillCursors<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let response = conn
                .command(kill_cursors.target_db(), kill_cursors.build())
                .await?;
            check_command_response(&response)
        }
        .boxed()
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

/// Drives cursors with the OP_GET_MORE and OP_KILL_CURSORS wire messages used by servers older
/// than 3.2.
#[derive(Debug)]
pub(crate) struct LegacyProtocol;

impl CursorProtocol for LegacyProtocol {
    fn get_more<'a>(
        &'a self,
        conn: &'a dyn Connection,
        get_more: GetMore<'a>,
    ) -> BoxFuture<'a, Result<QueryReply>> {
        conn.legacy_get_more(
            get_more.ns(),
            get_more.cursor_id(),
            get_more.number_to_return(),
        )
    }

    fn kill_cursors<'a>(
        &'a self,
        conn: &'a dyn Connection,
        kill_cursors: KillCursors<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let cursor_ids = [kill_cursors.cursor_id()];
            conn.legacy_kill_cursors(kill_cursors.ns(), &cursor_ids)
                .await
        }
        .boxed()
    }

    fn name(&self) -> &'static str {
        "legacy"
    }
}
