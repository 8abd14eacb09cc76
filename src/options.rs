//! Contains the options and address types used to configure cursors.

use std::{fmt, time::Duration};

use bson::Bson;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

use crate::serde_util;

pub(crate) const DEFAULT_PORT: u16 = 27017;

/// An enum representing the address of a MongoDB server.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[non_exhaustive]
pub enum ServerAddress {
    /// A TCP/IP host and port combination.
    Tcp {
        /// The hostname or IP address where the MongoDB server can be found.
        host: String,

        /// The TCP port that the MongoDB server is listening on.
        ///
        /// The default is 27017.
        port: Option<u16>,
    },
}

impl ServerAddress {
    /// Construct a TCP address for the given host and port.
    pub fn tcp(host: impl Into<String>, port: impl Into<Option<u16>>) -> Self {
        Self::Tcp {
            host: host.into(),
            port: port.into(),
        }
    }

    /// The hostname portion of this address.
    pub fn host(&self) -> &str {
        match self {
            Self::Tcp { host, .. } => host.as_str(),
        }
    }

    /// The port portion of this address, defaulting to 27017.
    pub fn port(&self) -> u16 {
        match self {
            Self::Tcp { port, .. } => port.unwrap_or(DEFAULT_PORT),
        }
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::Tcp {
            host: "localhost".into(),
            port: None,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.host(), self.port())
    }
}

/// Specifies how a batch cursor requests and limits the documents it returns.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, TypedBuilder, Serialize, PartialEq)]
#[builder(field_defaults(default))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CursorOptions {
    /// The maximum number of documents the cursor will return in total. Zero means no limit.
    ///
    /// A negative value is treated as its absolute value for limiting; the sign only asks the
    /// server to return the results in a single batch and close its cursor.
    #[serde(default)]
    pub limit: i32,

    /// The number of documents to request per getMore. Zero lets the server decide.
    ///
    /// A negative value asks for the remaining results in one round trip; the absolute value is
    /// sent in the getMore command, while legacy wire messages carry the sign through.
    #[serde(default)]
    pub batch_size: i32,

    /// The maximum amount of time for the server to wait on new documents to satisfy a tailable
    /// await cursor. Sent as `maxTimeMS` on every getMore.
    #[builder(setter(strip_option))]
    #[serde(
        rename = "maxAwaitTimeMS",
        default,
        serialize_with = "serde_util::serialize_duration_option_as_int_millis",
        deserialize_with = "serde_util::deserialize_duration_option_from_u64_millis"
    )]
    pub max_await_time: Option<Duration>,

    /// Tags getMore commands with an arbitrary value to help trace them through the database
    /// profiler, currentOp and logs.
    #[builder(setter(strip_option, into))]
    pub comment: Option<Bson>,
}

impl CursorOptions {
    /// The limit with the single-batch sign removed.
    pub(crate) fn effective_limit(&self) -> i64 {
        i64::from(self.limit).abs()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::{CursorOptions, ServerAddress};

    #[test]
    fn address_display_defaults_port() {
        assert_eq!(ServerAddress::tcp("example.com", None).to_string(), "example.com:27017");
        assert_eq!(ServerAddress::tcp("example.com", 1234).to_string(), "example.com:1234");
    }

    #[test]
    fn options_from_json() {
        let options: CursorOptions = serde_json::from_str(
            r#"{ "limit": -20, "batchSize": 5, "maxAwaitTimeMS": 250, "comment": "tail" }"#,
        )
        .unwrap();
        assert_eq!(
            options,
            CursorOptions::builder()
                .limit(-20)
                .batch_size(5)
                .max_await_time(Duration::from_millis(250))
                .comment("tail")
                .build()
        );
        assert_eq!(options.effective_limit(), 20);
    }

    #[test]
    fn options_defaults() {
        let options: CursorOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, CursorOptions::default());
        assert_eq!(options.limit, 0);
        assert_eq!(options.batch_size, 0);
        assert!(options.max_await_time.is_none());
    }
}
