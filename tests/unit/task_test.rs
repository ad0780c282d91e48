//! Tests for task options and identifiers

use std::time::Duration;

use prometheus_gatekeeper::core::{Priority, SubmitOptions, TaskId};

#[test]
fn test_submit_options_builders() {
    let opts = SubmitOptions::with_priority(Priority::High)
        .timeout(Duration::from_secs(2))
        .max_attempts(7);
    assert_eq!(opts.priority, Priority::High);
    assert_eq!(opts.timeout, Some(Duration::from_secs(2)));
    assert_eq!(opts.max_attempts, Some(7));

    let json = serde_json::to_value(&opts).unwrap();
    assert_eq!(json["priority"], "high");
    assert_eq!(json["timeout"], 2000);
}

#[test]
fn test_priority_sorting() {
    let mut priorities = vec![Priority::Normal, Priority::High, Priority::Low];
    priorities.sort_by(|a, b| b.cmp(a));
    assert_eq!(priorities, [Priority::High, Priority::Normal, Priority::Low]);
}

#[test]
fn test_task_id_display_round_trip() {
    let id = TaskId::new();
    let parsed: uuid::Uuid = id.to_string().parse().unwrap();
    assert_eq!(&parsed, id.as_uuid());
}
