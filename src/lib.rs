#![doc = include_str!("../README.md")]
#![warn(
    missing_docs,
    rustdoc::missing_crate_level_docs,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]
#![allow(
    clippy::unreadable_literal,
    clippy::cognitive_complexity,
    clippy::float_cmp,
    clippy::match_like_matches_macro,
    clippy::derive_partial_eq_without_eq
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod options;

mod cmap;
mod cursor;
pub mod error;
mod namespace;
mod operation;
mod ref_count;
mod reply;
pub(crate) mod runtime;
mod sdam;
mod serde_util;
#[cfg(feature = "sync")]
pub mod sync;
#[cfg(test)]
mod test;
mod trace;

pub use bson;
pub use futures_core::future::BoxFuture;

pub use crate::{
    cmap::{
        Connection,
        ConnectionDescription,
        ConnectionHandle,
        ConnectionSource,
        ConnectionSourceHandle,
    },
    cursor::AsyncBatchCursor,
    namespace::Namespace,
    ref_count::ReferenceCounted,
    reply::QueryReply,
    sdam::{ServerDescription, ServerType},
};
