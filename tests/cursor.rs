//! Drives cursors through connection types implemented outside of the crate.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
    Mutex,
};

use bson::{doc, Document};
use futures::{FutureExt, TryStreamExt};
use mongodb_batch_cursor::{
    error::Result,
    options::{CursorOptions, ServerAddress},
    AsyncBatchCursor,
    BoxFuture,
    Connection,
    ConnectionDescription,
    ConnectionHandle,
    ConnectionSource,
    ConnectionSourceHandle,
    Namespace,
    QueryReply,
    ReferenceCounted,
    ServerDescription,
    ServerType,
};

const CURSOR_ID: i64 = 7;

/// A single collection served from memory, paged out by getMore.
struct Collection {
    docs: Vec<Document>,
    position: Mutex<usize>,
    killed: Mutex<Vec<i64>>,
    in_use: AtomicUsize,
    description: ServerDescription,
}

impl Collection {
    fn new(len: i32) -> Arc<Self> {
        Arc::new(Self {
            docs: (0..len).map(|i| doc! { "_id": i }).collect(),
            position: Mutex::new(0),
            killed: Mutex::new(Vec::new()),
            in_use: AtomicUsize::new(0),
            description: ServerDescription::new(
                ServerAddress::tcp("db.example.com", None),
                ServerType::RsPrimary,
                21,
            ),
        })
    }

    /// The reply to a `find` that returned the first `batch_size` documents.
    fn find(&self, batch_size: usize) -> QueryReply {
        let batch = self.take(batch_size);
        let id = if *self.position.lock().unwrap() < self.docs.len() {
            CURSOR_ID
        } else {
            0
        };
        QueryReply::new(
            Namespace::new("app", "items"),
            batch,
            id,
            self.description.address.clone(),
        )
    }

    fn take(&self, batch_size: usize) -> Vec<Document> {
        let mut position = self.position.lock().unwrap();
        let end = if batch_size == 0 {
            self.docs.len()
        } else {
            (*position + batch_size).min(self.docs.len())
        };
        let batch = self.docs[*position..end].to_vec();
        *position = end;
        batch
    }

    fn source(self: &Arc<Self>) -> ConnectionSourceHandle {
        ReferenceCounted::new(Box::new(Pool(self.clone())) as Box<dyn ConnectionSource>)
    }
}

struct Pool(Arc<Collection>);

impl ConnectionSource for Pool {
    fn server_description(&self) -> &ServerDescription {
        &self.0.description
    }

    fn get_connection(&self) -> BoxFuture<'_, Result<ConnectionHandle>> {
        let collection = self.0.clone();
        async move {
            collection.in_use.fetch_add(1, Ordering::SeqCst);
            let description = ConnectionDescription::new(
                1,
                collection.description.address.clone(),
                collection.description.server_type,
                collection.description.max_wire_version,
            );
            let checked_in = collection.clone();
            Ok(ReferenceCounted::with_release(
                Box::new(Conn {
                    collection,
                    description,
                }) as Box<dyn Connection>,
                move |_| {
                    checked_in.in_use.fetch_sub(1, Ordering::SeqCst);
                },
            ))
        }
        .boxed()
    }
}

struct Conn {
    collection: Arc<Collection>,
    description: ConnectionDescription,
}

impl Connection for Conn {
    fn description(&self) -> &ConnectionDescription {
        &self.description
    }

    fn command<'a>(&'a self, db: &'a str, command: Document) -> BoxFuture<'a, Result<Document>> {
        async move {
            assert_eq!(db, "app");
            if let Ok(cursors) = command.get_array("cursors") {
                let ids: Vec<i64> = cursors.iter().filter_map(|id| id.as_i64()).collect();
                self.collection.killed.lock().unwrap().extend(ids);
                return Ok(doc! { "ok": 1 });
            }

            assert_eq!(command.get_i64("getMore").unwrap(), CURSOR_ID);
            let batch_size = command.get_i32("batchSize").unwrap_or(0) as usize;
            let batch = self.collection.take(batch_size);
            let exhausted =
                *self.collection.position.lock().unwrap() == self.collection.docs.len();
            let id = if exhausted { 0 } else { CURSOR_ID };
            Ok(doc! {
                "cursor": {
                    "id": id,
                    "ns": "app.items",
                    "nextBatch": batch,
                },
                "ok": 1,
            })
        }
        .boxed()
    }

    fn legacy_get_more<'a>(
        &'a self,
        _ns: &'a Namespace,
        _cursor_id: i64,
        _number_to_return: i32,
    ) -> BoxFuture<'a, Result<QueryReply>> {
        unreachable!("modern servers are driven by commands")
    }

    fn legacy_kill_cursors<'a>(
        &'a self,
        _ns: &'a Namespace,
        _cursor_ids: &'a [i64],
    ) -> BoxFuture<'a, Result<()>> {
        unreachable!("modern servers are driven by commands")
    }
}

#[tokio::test]
async fn pages_through_collection() {
    let collection = Collection::new(10);
    let options = CursorOptions::builder().batch_size(3).build();
    let cursor: AsyncBatchCursor<Document> =
        AsyncBatchCursor::new(collection.find(3), options, collection.source(), None);

    let mut sizes = Vec::new();
    while let Some(batch) = cursor.next_batch().await.unwrap() {
        sizes.push(batch.len());
    }
    assert_eq!(sizes, vec![3, 3, 3, 1]);
    assert!(cursor.is_closed());
    assert!(collection.killed.lock().unwrap().is_empty());
    assert_eq!(collection.in_use.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn limit_kills_server_cursor() {
    let collection = Collection::new(10);
    let options = CursorOptions::builder().batch_size(4).limit(6).build();
    let cursor: AsyncBatchCursor<Document> =
        AsyncBatchCursor::new(collection.find(4), options, collection.source(), None);

    let docs: Vec<Document> = cursor.into_stream().try_collect().await.unwrap();
    assert_eq!(docs.len(), 6);
    assert_eq!(docs.last(), Some(&doc! { "_id": 5 }));
    assert_eq!(*collection.killed.lock().unwrap(), vec![CURSOR_ID]);
    assert_eq!(collection.in_use.load(Ordering::SeqCst), 0);
}

#[cfg(feature = "sync")]
#[test]
fn blocking_iteration() {
    use mongodb_batch_cursor::sync::BatchCursor;

    let collection = Collection::new(5);
    let options = CursorOptions::builder().batch_size(2).build();
    let cursor: BatchCursor<Document> =
        BatchCursor::new(collection.find(2), options, collection.source(), None);

    let total: usize = cursor.map(|batch| batch.unwrap().len()).sum();
    assert_eq!(total, 5);
    assert_eq!(collection.in_use.load(Ordering::SeqCst), 0);
}
