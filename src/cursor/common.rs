use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use bson::{Bson, Document};

use crate::{
    cmap::{Connection, ConnectionHandle, ConnectionSourceHandle},
    error::{Error, Result},
    operation::{number_to_return, CursorProtocol, GetMore, KillCursors},
    options::{CursorOptions, ServerAddress},
    ref_count::release_quietly,
    runtime,
    trace::{TracingRepresentation, CURSOR_TRACING_EVENT_TARGET},
    Namespace,
};

/// Static information about a cursor.
#[derive(Clone, Debug)]
pub(crate) struct CursorInformation {
    pub(crate) ns: Namespace,
    pub(crate) address: ServerAddress,
    /// The limit with its sign removed; zero means unlimited.
    pub(crate) limit: i64,
    pub(crate) batch_size: i32,
    pub(crate) max_await_time: Option<Duration>,
    pub(crate) comment: Option<Bson>,
}

impl CursorInformation {
    pub(crate) fn new(ns: Namespace, address: ServerAddress, options: CursorOptions) -> Self {
        Self {
            ns,
            address,
            limit: options.effective_limit(),
            batch_size: options.batch_size,
            max_await_time: options.max_await_time,
            comment: options.comment,
        }
    }

    fn limit_reached(&self, received: i64) -> bool {
        self.limit != 0 && received >= self.limit
    }
}

/// The connection a cursor is bound to, if any.
#[derive(Debug)]
pub(crate) enum PinnedConnection {
    Valid(ConnectionHandle),
    /// A network error occurred on the connection; it must not be used to kill the cursor.
    Invalid(ConnectionHandle),
    Unpinned,
}

impl PinnedConnection {
    fn handle(&self) -> Option<&ConnectionHandle> {
        match self {
            Self::Valid(h) | Self::Invalid(h) => Some(h),
            Self::Unpinned => None,
        }
    }

    fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }

    fn invalidate(&mut self) {
        *self = match std::mem::replace(self, Self::Unpinned) {
            Self::Valid(h) => Self::Invalid(h),
            other => other,
        };
    }

    fn take(&mut self) -> Self {
        std::mem::replace(self, Self::Unpinned)
    }

    fn into_handle(self) -> Option<ConnectionHandle> {
        match self {
            Self::Valid(h) | Self::Invalid(h) => Some(h),
            Self::Unpinned => None,
        }
    }
}

/// The mutable part of a cursor, guarded by one lock together with the handles it owns.
#[derive(Debug)]
pub(crate) struct CursorState {
    /// The server cursor id; zero once exhausted or killed.
    pub(crate) id: i64,
    pub(crate) buffer: VecDeque<Document>,
    /// Documents received from the server so far, after discarding any past the limit.
    pub(crate) received: i64,
    pub(crate) closed: bool,
    pub(crate) get_more_in_flight: bool,
    pub(crate) source: Option<ConnectionSourceHandle>,
    pub(crate) pinned: PinnedConnection,
}

impl CursorState {
    /// Append a batch from the server, discarding anything past the limit.
    fn push_batch(&mut self, mut docs: VecDeque<Document>, info: &CursorInformation) {
        if info.limit != 0 {
            let remaining = (info.limit - self.received).max(0);
            docs.truncate(remaining.try_into().unwrap_or(usize::MAX));
        }
        self.received += i64::try_from(docs.len()).unwrap_or(i64::MAX);
        self.buffer.extend(docs);
    }

    /// Detach the server cursor and every handle from this state, leaving the cursor with
    /// nothing to fetch and nothing to release.
    fn abandon(&mut self) -> Abandoned {
        Abandoned {
            cursor_id: std::mem::take(&mut self.id),
            source: self.source.take(),
            pinned: self.pinned.take(),
            connection: None,
        }
    }
}

/// A server cursor and the handles detached from a cursor state, to be killed outside of the
/// state lock. Every handle is released when this is dropped.
#[derive(Debug)]
#[must_use]
pub(crate) struct Abandoned {
    cursor_id: i64,
    source: Option<ConnectionSourceHandle>,
    pinned: PinnedConnection,
    /// A connection already checked out for the kill.
    connection: Option<ConnectionHandle>,
}

impl Drop for Abandoned {
    fn drop(&mut self) {
        release_quietly(self.connection.take());
        release_quietly(self.pinned.take().into_handle());
        release_quietly(self.source.take());
    }
}

/// What `next_batch` decided to do while holding the state lock.
enum Step {
    Deliver {
        batch: VecDeque<Document>,
        abandoned: Option<Abandoned>,
    },
    EndOfData(Abandoned),
    Fetch(FetchContext),
}

/// The retained handles and request parameters for one getMore round trip.
struct FetchContext {
    cursor_id: i64,
    number_to_return: i32,
    source: Option<ConnectionSourceHandle>,
    pinned: Option<ConnectionHandle>,
}

/// The state machine shared by the async and sync cursors.
pub(crate) struct CursorInner {
    pub(crate) info: CursorInformation,
    protocol: Arc<dyn CursorProtocol>,
    state: Mutex<CursorState>,
}

impl fmt::Debug for CursorInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorInner")
            .field("info", &self.info)
            .field("protocol", &self.protocol.name())
            .field("state", &self.state)
            .finish()
    }
}

impl CursorInner {
    pub(crate) fn new(
        info: CursorInformation,
        protocol: Arc<dyn CursorProtocol>,
        state: CursorState,
    ) -> Self {
        Self {
            info,
            protocol,
            state: Mutex::new(state),
        }
    }

    /// Build the state for a freshly opened cursor, taking ownership of both handles. The
    /// connection is only kept when `pin` is set and the server cursor is open, in which case
    /// the source is released instead.
    pub(crate) fn initial_state(
        info: &CursorInformation,
        cursor_id: i64,
        first_batch: VecDeque<Document>,
        source: ConnectionSourceHandle,
        connection: Option<ConnectionHandle>,
        pin: bool,
    ) -> CursorState {
        let mut state = CursorState {
            id: cursor_id,
            buffer: VecDeque::new(),
            received: 0,
            closed: false,
            get_more_in_flight: false,
            source: Some(source),
            pinned: PinnedConnection::Unpinned,
        };
        state.push_batch(first_batch, info);

        match connection {
            Some(connection) if pin && cursor_id != 0 => {
                // Every later round trip and the final kill go through the pinned connection.
                state.pinned = PinnedConnection::Valid(connection);
                release_quietly(state.source.take());
            }
            other => release_quietly(other),
        }

        if cursor_id == 0 {
            drop(state.abandon());
        }
        state
    }

    fn lock(&self) -> MutexGuard<'_, CursorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub(crate) fn id(&self) -> i64 {
        self.lock().id
    }

    /// Produce the next non-empty batch, or `None` at the end of the data.
    ///
    /// When `wait` is false at most one getMore is issued, and `None` is also returned if it
    /// brought back nothing while the server cursor stays open.
    pub(crate) async fn next_batch(&self, wait: bool) -> Result<Option<VecDeque<Document>>> {
        let mut fetched = false;
        loop {
            let step = {
                let mut state = self.lock();
                if state.closed {
                    return Err(Error::illegal_state("the cursor has been closed"));
                }
                if state.get_more_in_flight {
                    return Err(Error::illegal_state(
                        "a getMore is already in progress on this cursor",
                    ));
                }

                if !state.buffer.is_empty() {
                    let batch = std::mem::take(&mut state.buffer);
                    let abandoned = if self.info.limit_reached(state.received) {
                        Some(state.abandon())
                    } else {
                        None
                    };
                    Step::Deliver { batch, abandoned }
                } else if state.id == 0 {
                    state.closed = true;
                    Step::EndOfData(state.abandon())
                } else if fetched && !wait {
                    return Ok(None);
                } else if state.pinned.is_invalid() {
                    return Err(Error::illegal_state(
                        "the cursor's connection failed and it can no longer be iterated",
                    ));
                } else {
                    let source = state.source.as_ref().map(|s| s.retain()).transpose()?;
                    let pinned = match state.pinned.handle().map(|c| c.retain()).transpose() {
                        Ok(pinned) => pinned,
                        Err(error) => {
                            release_quietly(source);
                            return Err(error);
                        }
                    };
                    state.get_more_in_flight = true;
                    Step::Fetch(FetchContext {
                        cursor_id: state.id,
                        number_to_return: number_to_return(
                            self.info.limit,
                            self.info.batch_size,
                            state.received,
                        ),
                        source,
                        pinned,
                    })
                }
            };

            match step {
                Step::Deliver { batch, abandoned } => {
                    if let Some(abandoned) = abandoned {
                        tracing::debug!(
                            target: CURSOR_TRACING_EVENT_TARGET,
                            cursor_id = abandoned.cursor_id,
                            namespace = self.info.ns.tracing_representation(),
                            limit = self.info.limit,
                            "cursor limit reached"
                        );
                        kill_and_release(self.protocol.as_ref(), &self.info.ns, abandoned).await;
                    }
                    return Ok(Some(batch));
                }
                Step::EndOfData(abandoned) => {
                    drop(abandoned);
                    tracing::debug!(
                        target: CURSOR_TRACING_EVENT_TARGET,
                        namespace = self.info.ns.tracing_representation(),
                        "cursor reached the end of its results"
                    );
                    return Ok(None);
                }
                Step::Fetch(context) => {
                    self.get_more(context).await?;
                    fetched = true;
                }
            }
        }
    }

    /// Run one getMore round trip and fold its result into the state.
    async fn get_more(&self, context: FetchContext) -> Result<()> {
        let FetchContext {
            cursor_id,
            number_to_return,
            source,
            pinned,
        } = context;
        let mut in_flight = InFlight {
            cursor: self,
            source,
            connection: pinned,
            done: false,
        };

        if in_flight.connection.is_none() {
            let checkout = match in_flight.source.as_ref() {
                Some(source) => source.get_connection().await,
                None => Err(no_connection()),
            };
            match checkout {
                Ok(connection) => in_flight.connection = Some(connection),
                Err(error) => {
                    let (_, source) = in_flight.finish();
                    release_quietly(source);
                    let abandoned = {
                        let mut state = self.lock();
                        state.get_more_in_flight = false;
                        if state.closed {
                            Some(state.abandon())
                        } else {
                            None
                        }
                    };
                    // The getMore was never sent, so the server cursor is still open.
                    if let Some(abandoned) = abandoned {
                        kill_and_release(self.protocol.as_ref(), &self.info.ns, abandoned).await;
                    }
                    return Err(error);
                }
            }
        }

        tracing::debug!(
            target: CURSOR_TRACING_EVENT_TARGET,
            cursor_id,
            namespace = self.info.ns.tracing_representation(),
            protocol = self.protocol.name(),
            number_to_return,
            "sending getMore"
        );
        let get_more = GetMore::new(
            &self.info.ns,
            cursor_id,
            number_to_return,
            self.info.max_await_time,
            self.info.comment.as_ref(),
        );
        let result = match in_flight.connection.as_ref() {
            Some(connection) => self.protocol.get_more(connection.as_ref(), get_more).await,
            None => Err(no_connection()),
        };
        let (mut connection, source) = in_flight.finish();

        let (outcome, abandoned) = {
            let mut state = self.lock();
            state.get_more_in_flight = false;
            if state.closed {
                // close() ran while this getMore was in flight and left the teardown here. Only
                // a successful reply tells us whether the server cursor is still open.
                let mut abandoned = state.abandon();
                abandoned.cursor_id = match result {
                    Ok(ref reply) => reply.cursor_id(),
                    Err(_) => 0,
                };
                abandoned.connection = connection.take();
                let outcome = match result {
                    Ok(_) => Err(Error::illegal_state(
                        "The cursor was closed before getMore completed",
                    )),
                    Err(error) => Err(error),
                };
                (outcome, Some(abandoned))
            } else {
                match result {
                    Ok(reply) => {
                        let (_, docs, id, _) = reply.into_parts();
                        tracing::debug!(
                            target: CURSOR_TRACING_EVENT_TARGET,
                            cursor_id = id,
                            namespace = self.info.ns.tracing_representation(),
                            returned = docs.len(),
                            "getMore succeeded"
                        );
                        state.id = id;
                        state.push_batch(docs, &self.info);
                        let abandoned = (id == 0).then(|| state.abandon());
                        (Ok(()), abandoned)
                    }
                    Err(error) => {
                        tracing::debug!(
                            target: CURSOR_TRACING_EVENT_TARGET,
                            cursor_id,
                            namespace = self.info.ns.tracing_representation(),
                            error = error.tracing_representation(),
                            "getMore failed"
                        );
                        if error.is_cursor_not_found() {
                            state.id = 0;
                        } else if error.is_network_error() {
                            state.pinned.invalidate();
                        }
                        (Err(error), None)
                    }
                }
            }
        };

        release_quietly(connection);
        release_quietly(source);
        if let Some(abandoned) = abandoned {
            kill_and_release(self.protocol.as_ref(), &self.info.ns, abandoned).await;
        }
        outcome
    }

    /// Undo the bookkeeping of a getMore whose future was dropped before the reply arrived.
    fn cancel_get_more(
        &self,
        connection: Option<ConnectionHandle>,
        source: Option<ConnectionSourceHandle>,
    ) {
        // The connection may be left halfway through a reply, so it is never used again.
        release_quietly(connection);
        release_quietly(source);
        let abandoned = {
            let mut state = self.lock();
            state.get_more_in_flight = false;
            state.pinned.invalidate();
            if state.closed {
                Some(state.abandon())
            } else {
                None
            }
        };
        tracing::debug!(
            target: CURSOR_TRACING_EVENT_TARGET,
            namespace = self.info.ns.tracing_representation(),
            "getMore cancelled before it completed"
        );

        let Some(abandoned) = abandoned else {
            return;
        };
        let cursor_id = abandoned.cursor_id;
        if cursor_id == 0 {
            return;
        }
        let protocol = self.protocol.clone();
        let ns = self.info.ns.clone();
        let kill = async move { kill_and_release(protocol.as_ref(), &ns, abandoned).await };
        if runtime::spawn(kill).is_none() {
            tracing::warn!(
                target: CURSOR_TRACING_EVENT_TARGET,
                cursor_id,
                namespace = self.info.ns.tracing_representation(),
                "getMore cancelled outside of a tokio runtime; the server cursor was not killed"
            );
        }
    }

    /// Close the cursor, killing the server cursor if it is still open. Idempotent.
    pub(crate) async fn close(&self) {
        let abandoned = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.buffer.clear();
            if state.get_more_in_flight {
                tracing::debug!(
                    target: CURSOR_TRACING_EVENT_TARGET,
                    cursor_id = state.id,
                    namespace = self.info.ns.tracing_representation(),
                    "cursor closed during getMore; cleanup deferred to its completion"
                );
                return;
            }
            state.abandon()
        };
        kill_and_release(self.protocol.as_ref(), &self.info.ns, abandoned).await;
        tracing::debug!(
            target: CURSOR_TRACING_EVENT_TARGET,
            namespace = self.info.ns.tracing_representation(),
            "cursor closed"
        );
    }

    /// Close the cursor without any network round trip. Returns the id of a server cursor that
    /// could not be killed, if any.
    pub(crate) fn close_without_kill(&self) -> Option<i64> {
        let abandoned = {
            let mut state = self.lock();
            if state.closed {
                return None;
            }
            state.closed = true;
            state.buffer.clear();
            state.abandon()
        };
        let cursor_id = abandoned.cursor_id;
        drop(abandoned);
        (cursor_id != 0).then_some(cursor_id)
    }

    /// Whether closing this cursor would require talking to the server.
    pub(crate) fn needs_kill(&self) -> bool {
        let state = self.lock();
        !state.closed && state.id != 0
    }
}

/// The handles held by a getMore round trip while it runs.
struct InFlight<'a> {
    cursor: &'a CursorInner,
    source: Option<ConnectionSourceHandle>,
    connection: Option<ConnectionHandle>,
    done: bool,
}

impl InFlight<'_> {
    fn finish(mut self) -> (Option<ConnectionHandle>, Option<ConnectionSourceHandle>) {
        self.done = true;
        (self.connection.take(), self.source.take())
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.cursor.cancel_get_more(self.connection.take(), self.source.take());
        }
    }
}

fn no_connection() -> Error {
    Error::internal("cursor has neither a pinned connection nor a connection source")
}

/// Kill the abandoned server cursor if it is open. Failures are logged and swallowed, and the
/// handles are released either way.
async fn kill_and_release(
    protocol: &dyn CursorProtocol,
    ns: &Namespace,
    mut abandoned: Abandoned,
) {
    if abandoned.cursor_id == 0 {
        return;
    }
    if abandoned.pinned.is_invalid() {
        tracing::debug!(
            target: CURSOR_TRACING_EVENT_TARGET,
            cursor_id = abandoned.cursor_id,
            "skipping killCursors on a failed pinned connection"
        );
        return;
    }
    if abandoned.pinned.handle().is_none() && abandoned.connection.is_none() {
        let Some(source) = abandoned.source.as_ref() else {
            return;
        };
        match source.get_connection().await {
            Ok(connection) => abandoned.connection = Some(connection),
            Err(error) => {
                tracing::debug!(
                    target: CURSOR_TRACING_EVENT_TARGET,
                    cursor_id = abandoned.cursor_id,
                    error = error.tracing_representation(),
                    "could not check out a connection to kill the cursor"
                );
                return;
            }
        }
    }

    let connection = match (abandoned.pinned.handle(), abandoned.connection.as_ref()) {
        (Some(connection), _) | (None, Some(connection)) => connection,
        (None, None) => return,
    };
    kill_on(protocol, ns, connection.as_ref(), abandoned.cursor_id).await;
}

/// Best-effort killCursors on `connection`.
async fn kill_on(
    protocol: &dyn CursorProtocol,
    ns: &Namespace,
    connection: &dyn Connection,
    cursor_id: i64,
) {
    let kill_cursors = KillCursors::new(ns, cursor_id);
    match protocol.kill_cursors(connection, kill_cursors).await {
        Ok(()) => tracing::debug!(
            target: CURSOR_TRACING_EVENT_TARGET,
            cursor_id,
            namespace = ns.tracing_representation(),
            "killed server cursor"
        ),
        Err(error) => tracing::debug!(
            target: CURSOR_TRACING_EVENT_TARGET,
            cursor_id,
            namespace = ns.tracing_representation(),
            error = error.tracing_representation(),
            "killCursors failed"
        ),
    }
}
