use bson::{doc, Document};

use crate::Namespace;

/// The killCursors command telling the server to discard a cursor early.
#[derive(Debug)]
pub(crate) struct KillCursors<'a> {
    ns: &'a Namespace,
    cursor_id: i64,
}

impl<'a> KillCursors<'a> {
    pub(crate) const NAME: &'static str = "killCursors";

    pub(crate) fn new(ns: &'a Namespace, cursor_id: i64) -> Self {
        Self { ns, cursor_id }
    }

    pub(crate) fn target_db(&self) -> &str {
        self.ns.db.as_str()
    }

    pub(crate) fn ns(&self) -> &'a Namespace {
        self.ns
    }

    pub(crate) fn cursor_id(&self) -> i64 {
        self.cursor_id
    }

    pub(crate) fn build(&self) -> Document {
        doc! {
            Self::NAME: self.ns.coll.clone(),
            "cursors": [self.cursor_id],
        }
    }
}
