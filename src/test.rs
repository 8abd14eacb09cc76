
pub(crate) use self::mock::{docs, MockServer, ScriptedReply};
