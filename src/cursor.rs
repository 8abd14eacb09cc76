mod common;

use std::{collections::VecDeque, marker::PhantomData, sync::Arc};

use bson::Document;
use derive_where::derive_where;
use futures_core::stream::BoxStream;
use futures_util::{stream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;

use crate::{
    cmap::{ConnectionHandle, ConnectionSourceHandle},
    error::{Error, Result},
    operation::protocol_for,
    options::{CursorOptions, ServerAddress},
    reply::QueryReply,
    runtime,
    trace::{TracingRepresentation, CURSOR_TRACING_EVENT_TARGET},
    Namespace,
};

use common::{CursorInformation, CursorInner};

/// An `AsyncBatchCursor` iterates the results of a query one server batch at a time.
///
/// The cursor is created from the reply to the command that opened it (a `find` or `aggregate`)
/// along with a handle to the [`ConnectionSource`](crate::ConnectionSource) that produced that
/// reply. Once the first batch has been handed out, each call to
/// [`next_batch`](AsyncBatchCursor::next_batch) sends a getMore to the same server until the
/// server reports that its cursor is exhausted.
///
/// The `limit` and `batch_size` fields of [`CursorOptions`] shape how many documents are
/// requested per round trip and in total. Once the limit has been handed out the server cursor is
/// killed, and any further documents the server sent are discarded.
///
/// ```rust
/// # use mongodb_batch_cursor::{error::Result, AsyncBatchCursor};
/// # use bson::Document;
/// #
/// # async fn do_stuff(cursor: AsyncBatchCursor<Document>) -> Result<()> {
/// while let Some(batch) = cursor.next_batch().await? {
///     for doc in batch {
///         println!("{}", doc);
///     }
/// }
/// # Ok(())
/// # }
/// ```
///
/// Dropping a cursor that still has an open server cursor spawns a task on the current tokio
/// runtime that kills it. Call [`close`](AsyncBatchCursor::close) to do so deterministically.
#[derive_where(Debug)]
pub struct AsyncBatchCursor<T> {
    inner: Arc<CursorInner>,
    #[derive_where(skip)]
    _phantom: PhantomData<fn() -> T>,
}

impl<T> AsyncBatchCursor<T> {
    /// Create a cursor from the first reply to a cursor-producing command.
    ///
    /// The cursor takes ownership of one reference to `source`, and of `connection` if one is
    /// provided; the caller must not release either afterwards. The connection is kept for the
    /// life of the cursor only when the server is a load balancer and the server cursor is open.
    /// Otherwise it is released immediately.
    pub fn new(
        initial: QueryReply,
        options: CursorOptions,
        source: ConnectionSourceHandle,
        connection: Option<ConnectionHandle>,
    ) -> Self {
        let (ns, first_batch, cursor_id, address) = initial.into_parts();
        let info = CursorInformation::new(ns, address, options);

        let server = source.server_description();
        let (max_wire_version, server_type) = match connection {
            Some(ref connection) => {
                let description = connection.description();
                (
                    description.max_wire_version.or(server.max_wire_version),
                    description.server_type,
                )
            }
            None => (server.max_wire_version, server.server_type),
        };
        let protocol = protocol_for(max_wire_version);

        tracing::debug!(
            target: CURSOR_TRACING_EVENT_TARGET,
            cursor_id,
            namespace = info.ns.tracing_representation(),
            protocol = protocol.name(),
            first_batch = first_batch.len(),
            "cursor created"
        );

        let state = CursorInner::initial_state(
            &info,
            cursor_id,
            first_batch,
            source,
            connection,
            server_type.is_load_balanced(),
        );
        Self {
            inner: Arc::new(CursorInner::new(info, protocol, state)),
            _phantom: PhantomData,
        }
    }

    /// The server-side cursor id. Zero once the server has no more results or the cursor was
    /// killed.
    pub fn id(&self) -> i64 {
        self.inner.id()
    }

    /// Whether the server-side cursor has been exhausted or killed. Documents may still be
    /// buffered locally.
    pub fn is_exhausted(&self) -> bool {
        self.id() == 0
    }

    /// Whether this cursor has been closed, either explicitly or by reaching the end of its
    /// results.
    ///
    /// Once a batch reaching the `limit` has been handed out the server cursor is already killed
    /// and [`is_exhausted`](AsyncBatchCursor::is_exhausted) returns `true`, but the cursor only
    /// reports itself closed after the following call to
    /// [`next_batch`](AsyncBatchCursor::next_batch) returns `None`.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// The namespace being iterated.
    pub fn namespace(&self) -> &Namespace {
        &self.inner.info.ns
    }

    /// The address of the server the cursor lives on.
    pub fn address(&self) -> &ServerAddress {
        &self.inner.info.address
    }

    /// Close the cursor, killing the server cursor if it is still open and releasing every
    /// connection resource held. Calling this more than once has no further effect.
    ///
    /// If a getMore is in progress, the cleanup is carried out when it completes or is cancelled.
    pub async fn close(&self) {
        self.inner.close().await
    }

    /// Use the provided type for the documents returned by this cursor.
    pub fn with_type<D>(self) -> AsyncBatchCursor<D> {
        AsyncBatchCursor {
            inner: self.inner.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T> AsyncBatchCursor<T>
where
    T: DeserializeOwned,
{
    /// Produce the next non-empty batch, sending as many getMores as needed. Returns `None` once
    /// the results are exhausted, after which the cursor is closed.
    ///
    /// Fails with an illegal-state error if the cursor has been closed, or if another call is
    /// already fetching a batch.
    ///
    /// Dropping the returned future while a getMore is outstanding gives back the connection it
    /// was using. Any batch that getMore would have returned is lost, and a cursor pinned to a
    /// connection can no longer be iterated.
    pub async fn next_batch(&self) -> Result<Option<Vec<T>>> {
        let batch = self.inner.next_batch(true).await?;
        batch.map(deserialize_batch).transpose()
    }

    /// Like [`next_batch`](AsyncBatchCursor::next_batch), but sends at most one getMore. Returns
    /// `None` if that getMore came back empty while the server cursor stays open, as a tailable
    /// cursor with no new data does.
    pub async fn try_next_batch(&self) -> Result<Option<Vec<T>>> {
        let batch = self.inner.next_batch(false).await?;
        batch.map(deserialize_batch).transpose()
    }

    /// Flatten this cursor into a stream of individual documents.
    pub fn into_stream(self) -> BoxStream<'static, Result<T>>
    where
        T: Send + 'static,
    {
        stream::try_unfold(self, |cursor| async move {
            Ok::<_, Error>(cursor
                .next_batch()
                .await?
                .map(|batch| (stream::iter(batch.into_iter().map(Ok::<T, Error>)), cursor)))
        })
        .try_flatten()
        .boxed()
    }
}

fn deserialize_batch<T: DeserializeOwned>(batch: VecDeque<Document>) -> Result<Vec<T>> {
    batch
        .into_iter()
        .map(|doc| bson::from_document(doc).map_err(Error::from))
        .collect()
}

impl<T> Drop for AsyncBatchCursor<T> {
    fn drop(&mut self) {
        // Other handles share the state only through `with_type`, which consumes this one.
        if Arc::strong_count(&self.inner) > 1 {
            return;
        }
        if !self.inner.needs_kill() {
            self.inner.close_without_kill();
            return;
        }

        let inner = self.inner.clone();
        if runtime::spawn(async move { inner.close().await }).is_none() {
            if let Some(cursor_id) = self.inner.close_without_kill() {
                tracing::warn!(
                    target: CURSOR_TRACING_EVENT_TARGET,
                    cursor_id,
                    namespace = self.inner.info.ns.tracing_representation(),
                    "cursor dropped outside of a tokio runtime; the server cursor was not killed"
                );
            }
        }
    }
}
