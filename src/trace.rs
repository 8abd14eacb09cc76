use crate::{error::Error, Namespace};

pub(crate) const CURSOR_TRACING_EVENT_TARGET: &str = "mongodb_batch_cursor::cursor";
pub(crate) const REFERENCE_TRACING_EVENT_TARGET: &str = "mongodb_batch_cursor::reference";

pub(crate) trait TracingRepresentation {
    type Representation;

    fn tracing_representation(&self) -> Self::Representation;
}

impl TracingRepresentation for Error {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        self.to_string()
    }
}

impl TracingRepresentation for Namespace {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        self.to_string()
    }
}
