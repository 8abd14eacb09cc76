use std::time::Duration;

use bson::{doc, Bson, Document};

use crate::{serde_util, Namespace};

/// The getMore command for one round trip of a cursor.
#[derive(Debug)]
pub(crate) struct GetMore<'a> {
    ns: &'a Namespace,
    cursor_id: i64,
    number_to_return: i32,
    max_await_time: Option<Duration>,
    comment: Option<&'a Bson>,
}

impl<'a> GetMore<'a> {
    pub(crate) const NAME: &'static str = "getMore";

    pub(crate) fn new(
        ns: &'a Namespace,
        cursor_id: i64,
        number_to_return: i32,
        max_await_time: Option<Duration>,
        comment: Option<&'a Bson>,
    ) -> Self {
        Self {
            ns,
            cursor_id,
            number_to_return,
            max_await_time,
            comment,
        }
    }

    /// The database the command is run against.
    pub(crate) fn target_db(&self) -> &str {
        self.ns.db.as_str()
    }

    pub(crate) fn ns(&self) -> &'a Namespace {
        self.ns
    }

    pub(crate) fn cursor_id(&self) -> i64 {
        self.cursor_id
    }

    pub(crate) fn number_to_return(&self) -> i32 {
        self.number_to_return
    }

    pub(crate) fn build(&self) -> Document {
        let mut body = doc! {
            Self::NAME: self.cursor_id,
            "collection": self.ns.coll.clone(),
        };

        // The sign of the number to return only matters to the legacy wire message.
        let batch_size = self.number_to_return.saturating_abs();
        if batch_size != 0 {
            body.insert("batchSize", batch_size);
        }

        if let Some(max_await_time) = self.max_await_time {
            body.insert(
                "maxTimeMS",
                serde_util::duration_as_max_time_ms(max_await_time),
            );
        }

        if let Some(comment) = self.comment {
            body.insert("comment", comment.clone());
        }

        body
    }
}

/// The number of documents to ask for in the next round trip, given the cursor's limit, its
/// configured batch size and the number of documents received so far.
///
/// With a limit set, this is the remaining allowance capped by the batch size; the batch size's
/// own sign is kept when it is the cap. Without a limit this is just the batch size.
pub(crate) fn number_to_return(limit: i64, batch_size: i32, received: i64) -> i32 {
    let limit = limit.abs();
    if limit == 0 {
        return batch_size;
    }

    let remaining = (limit - received).max(0);
    let cap = i64::from(batch_size).abs();
    if batch_size != 0 && remaining > cap {
        batch_size
    } else {
        remaining.try_into().unwrap_or(i32::MAX)
    }
}
