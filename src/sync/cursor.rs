use serde::de::DeserializeOwned;

use crate::{
    cmap::{ConnectionHandle, ConnectionSourceHandle},
    error::Result,
    options::{CursorOptions, ServerAddress},
    reply::QueryReply,
    runtime,
    AsyncBatchCursor,
    Namespace,
};

/// A blocking `BatchCursor` iterates the results of a query one server batch at a time, running
/// each getMore on an internal tokio runtime.
///
/// A `BatchCursor` can be used as an [`Iterator`] over batches. Iteration stops once the results
/// are exhausted, and after the first error, at which point the cursor is closed:
///
/// ```rust
/// # use mongodb_batch_cursor::{error::Result, sync::BatchCursor};
/// # use bson::Document;
/// #
/// # fn do_stuff(cursor: BatchCursor<Document>) -> Result<()> {
/// for batch in cursor {
///     for doc in batch? {
///         println!("{}", doc);
///     }
/// }
/// # Ok(())
/// # }
/// ```
///
/// Dropping a `BatchCursor` that has not been closed kills its server cursor before returning.
#[derive(Debug)]
pub struct BatchCursor<T> {
    async_cursor: AsyncBatchCursor<T>,
    done: bool,
}

impl<T> BatchCursor<T> {
    /// Create a cursor from the first reply to a cursor-producing command. See
    /// [`AsyncBatchCursor::new`] for the ownership of `source` and `connection`.
    pub fn new(
        initial: QueryReply,
        options: CursorOptions,
        source: ConnectionSourceHandle,
        connection: Option<ConnectionHandle>,
    ) -> Self {
        AsyncBatchCursor::new(initial, options, source, connection).into()
    }

    /// The server-side cursor id. Zero once the server has no more results or the cursor was
    /// killed.
    pub fn id(&self) -> i64 {
        self.async_cursor.id()
    }

    /// Whether this cursor has been closed. A cursor whose `limit` was reached only reports
    /// itself closed once the following batch request has returned `None`.
    pub fn is_closed(&self) -> bool {
        self.async_cursor.is_closed()
    }

    /// The namespace being iterated.
    pub fn namespace(&self) -> &Namespace {
        self.async_cursor.namespace()
    }

    /// The address of the server the cursor lives on.
    pub fn address(&self) -> &ServerAddress {
        self.async_cursor.address()
    }

    /// Close the cursor, killing the server cursor if it is still open. Calling this more than
    /// once has no further effect.
    pub fn close(&self) {
        runtime::block_on(self.async_cursor.close())
    }
}

impl<T> BatchCursor<T>
where
    T: DeserializeOwned,
{
    /// Block until the next non-empty batch is available, or return `None` once the results are
    /// exhausted.
    pub fn next_batch(&self) -> Result<Option<Vec<T>>> {
        runtime::block_on(self.async_cursor.next_batch())
    }

    /// Like [`next_batch`](BatchCursor::next_batch), but sends at most one getMore.
    pub fn try_next_batch(&self) -> Result<Option<Vec<T>>> {
        runtime::block_on(self.async_cursor.try_next_batch())
    }
}

impl<T> From<AsyncBatchCursor<T>> for BatchCursor<T> {
    fn from(async_cursor: AsyncBatchCursor<T>) -> Self {
        Self {
            async_cursor,
            done: false,
        }
    }
}

impl<T> Iterator for BatchCursor<T>
where
    T: DeserializeOwned,
{
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                self.close();
                Some(Err(error))
            }
        }
    }
}

impl<T> Drop for BatchCursor<T> {
    fn drop(&mut self) {
        // Inside a runtime the async cursor's own drop spawns the cleanup instead.
        if !self.async_cursor.is_closed() && !runtime::in_runtime() {
            self.close();
        }
    }
}
