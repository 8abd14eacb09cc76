use std::time::Duration;

use bson::{doc, Bson};
use pretty_assertions::assert_eq;

use super::{number_to_return, protocol_for, GetMore, KillCursors};
use crate::Namespace;

fn ns() -> Namespace {
    Namespace::new("db", "coll")
}

#[test]
fn get_more_command() {
    let ns = ns();
    let get_more = GetMore::new(&ns, 42, 10, Some(Duration::from_millis(1500)), None);
    assert_eq!(get_more.target_db(), "db");
    assert_eq!(
        get_more.build(),
        doc! {
            "getMore": 42_i64,
            "collection": "coll",
            "batchSize": 10,
            "maxTimeMS": 1500,
        }
    );
}

#[test]
fn get_more_batch_size_sign_and_zero() {
    let ns = ns();
    let negative = GetMore::new(&ns, 42, -5, None, None).build();
    assert_eq!(negative.get_i32("batchSize").unwrap(), 5);

    let zero = GetMore::new(&ns, 42, 0, None, None).build();
    assert!(!zero.contains_key("batchSize"));
    assert!(!zero.contains_key("maxTimeMS"));
}

#[test]
fn get_more_comment() {
    let ns = ns();
    let comment = Bson::String("tailing".to_string());
    let body = GetMore::new(&ns, 7, 0, None, Some(&comment)).build();
    assert_eq!(body.get("comment"), Some(&comment));
}

#[test]
fn number_to_return_table() {
    // (limit, batch size, received, expected)
    let cases: &[(i64, i32, i64, i32)] = &[
        (0, 0, 0, 0),
        (0, 10, 100, 10),
        (0, -10, 0, -10),
        (25, 10, 0, 10),
        (25, 10, 20, 5),
        (25, -10, 0, -10),
        (25, -10, 20, 5),
        (25, 0, 20, 5),
        (-25, 10, 20, 5),
        (25, 10, 25, 0),
        (25, 10, 30, 0),
    ];
    for &(limit, batch_size, received, expected) in cases {
        assert_eq!(
            number_to_return(limit, batch_size, received),
            expected,
            "limit {limit}, batch size {batch_size}, received {received}"
        );
    }
}

#[test]
fn kill_cursors_command() {
    let ns = ns();
    let kill_cursors = KillCursors::new(&ns, 42);
    assert_eq!(kill_cursors.target_db(), "db");
    assert_eq!(
        kill_cursors.build(),
        doc! { "killCursors": "coll", "cursors": [42_i64] }
    );
}

#[test]
fn protocol_selection() {
    assert_eq!(protocol_for(None).name(), "command");
    assert_eq!(protocol_for(Some(4)).name(), "command");
    assert_eq!(protocol_for(Some(21)).name(), "command");
    assert_eq!(protocol_for(Some(3)).name(), "legacy");
    assert_eq!(protocol_for(Some(0)).name(), "legacy");
}
