//! Normalization properties over the built-in catalog.

use porter::mapping::{apply_chain, RowPlan};
use porter::{PlatformRegistry, Row, SqlValue};

fn webwiz_author() -> Row {
    Row::from_pairs([
        ("Gender2", SqlValue::from("m")),
        ("Photo2", SqlValue::from("webwiz/avatars/a&amp;b.png")),
        ("HashMethod", SqlValue::from("webwiz")),
        ("Author_ID", SqlValue::I64(7)),
        ("Group_ID", SqlValue::I64(2)),
        ("Username", SqlValue::from("Tom &amp;amp; Jerry")),
        ("Real_name", SqlValue::from("Tom")),
        ("Password", SqlValue::from("abc123")),
        ("Salt", SqlValue::from("NaCl")),
        ("Author_email", SqlValue::from("tom@example.com")),
        ("Login_IP", SqlValue::from("10.0.0.1")),
        ("Banned", SqlValue::from("False")),
        ("Join_date", SqlValue::from("2004-05-06 07:08:09")),
        ("Last_visit", SqlValue::Null),
        ("Location", SqlValue::from("  Leeds &lt;UK&gt; ")),
        ("DOB", SqlValue::Null),
        ("Show_email", SqlValue::I64(1)),
    ])
}

#[test]
fn test_reapplying_filters_to_normalized_row_is_noop() {
    let registry = PlatformRegistry::builtin();
    let ops = registry.source("webwiz").unwrap().operations().unwrap();
    let plan = RowPlan::resolve(&ops[0]).unwrap();
    let row = webwiz_author();

    let bound = plan.bind(row.columns()).unwrap();
    let normalized = bound.normalize(&row);

    for (column, value) in plan.column_names().iter().zip(&normalized) {
        let again = apply_chain(plan.filters(column), value.clone(), &row);
        assert_eq!(&again, value, "{} changed on second pass", column);
    }

    let names = plan.column_names();
    let get = |name: &str| &normalized[names.iter().position(|n| n == name).unwrap()];
    assert_eq!(get("Name"), &SqlValue::from("Tom & Jerry"));
    assert_eq!(get("Password"), &SqlValue::from("NaCl$abc123"));
    assert_eq!(get("Banned"), &SqlValue::I64(0));
}

#[test]
fn test_every_builtin_operation_resolves() {
    let registry = PlatformRegistry::builtin();
    for side in [porter::Side::Source, porter::Side::Target] {
        for platform in registry.list(side) {
            for op in platform.operations().unwrap() {
                let plan = RowPlan::resolve(&op).unwrap();
                assert!(!plan.column_names().is_empty(), "{}: {}", platform.id(), op.entity);
            }
        }
    }
}
