//! The normalized shape of a server reply that seeds or extends a cursor.

use std::collections::VecDeque;

use bson::{Bson, Document};
use serde::Deserialize;

use crate::{
    error::{CommandError, Error, ErrorKind, Result},
    options::ServerAddress,
    Namespace,
};

/// One server response to a cursor-producing command or a getMore: a batch of documents plus the
/// id of the server-side cursor, which is zero once the server has no more results.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryReply {
    namespace: Namespace,
    documents: VecDeque<Document>,
    cursor_id: i64,
    address: ServerAddress,
}

impl QueryReply {
    /// Construct a reply from its parts.
    pub fn new(
        namespace: Namespace,
        documents: impl IntoIterator<Item = Document>,
        cursor_id: i64,
        address: ServerAddress,
    ) -> Self {
        Self {
            namespace,
            documents: documents.into_iter().collect(),
            cursor_id,
            address,
        }
    }

    /// Translate the reply to a `find`, `aggregate` or `getMore` command,
    /// `{ ok: 1, cursor: { id, ns, firstBatch | nextBatch } }`, into a `QueryReply`.
    ///
    /// A reply with a falsy `ok` field is returned as a command error.
    pub fn from_command_response(response: Document, address: ServerAddress) -> Result<Self> {
        check_command_response(&response)?;
        let body: CursorResponseBody = bson::from_document(response)
            .map_err(|e| Error::invalid_response(format!("invalid cursor reply: {e}")))?;
        Ok(Self {
            namespace: body.cursor.ns,
            documents: body.cursor.batch,
            cursor_id: body.cursor.id,
            address,
        })
    }

    /// The namespace the cursor iterates.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The documents in this batch, in server order.
    pub fn documents(&self) -> &VecDeque<Document> {
        &self.documents
    }

    /// The id of the server-side cursor; zero means the server has already discarded it.
    pub fn cursor_id(&self) -> i64 {
        self.cursor_id
    }

    /// The address of the server that produced this reply.
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Whether the server has no further results for this cursor.
    pub fn is_exhausted(&self) -> bool {
        self.cursor_id == 0
    }

    pub(crate) fn into_parts(self) -> (Namespace, VecDeque<Document>, i64, ServerAddress) {
        (self.namespace, self.documents, self.cursor_id, self.address)
    }
}

/// Returns the command error carried by `response` if its `ok` field is not 1.
pub(crate) fn check_command_response(response: &Document) -> Result<()> {
    let ok = match response.get("ok") {
        Some(Bson::Double(ok)) => *ok == 1.0,
        Some(Bson::Int32(ok)) => *ok == 1,
        Some(Bson::Int64(ok)) => *ok == 1,
        Some(Bson::Boolean(ok)) => *ok,
        Some(_) | None => {
            return Err(Error::invalid_response(
                "command reply is missing a numeric \"ok\" field",
            ))
        }
    };
    if ok {
        return Ok(());
    }

    match bson::from_document::<CommandError>(response.clone()) {
        Ok(command_error) => Err(ErrorKind::Command(command_error).into()),
        Err(_) => Err(Error::invalid_response(format!(
            "command failed without an error code: {response}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct CursorResponseBody {
    cursor: CursorBody,
}

#[derive(Debug, Deserialize)]
struct CursorBody {
    id: i64,
    ns: Namespace,
    #[serde(rename = "nextBatch", alias = "firstBatch")]
    batch: VecDeque<Document>,
}
