//! Contains the sync API. This is only available when the `sync` feature is enabled.

mod cursor;


pub use cursor::BatchCursor;

pub(crate) static TOKIO_RUNTIME: std::sync::LazyLock<tokio::runtime::Runtime> =
    std::sync::LazyLock::new(|| match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => panic!(
            "Error occurred when starting the underlying async runtime: {}",
            err
        ),
    });
