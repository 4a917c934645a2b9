//! Merge behavior of the local store against pulled batches.

use proptest::prelude::*;
use rentsync_core::{Replica, ReplicaConfig};
use rentsync_protocol::{Payload, PullResponse, Record, RecordId};
use serde_json::json;

fn replica() -> Replica {
    Replica::open_in_memory(ReplicaConfig::default()).unwrap()
}

fn car(revision: u64) -> Record {
    let mut payload = Payload::new();
    payload.insert("name".into(), json!(format!("rev {revision}")));
    payload.insert("price".into(), json!(revision * 10));
    Record::new("car1", "cars", payload).with_revision(revision)
}

#[test]
fn stale_pull_is_rejected_and_newer_pull_wins() {
    let replica = replica();
    let store = replica.store();
    let id = RecordId::from("car1");

    store.apply_remote(vec![car(5)]).unwrap();

    let report = store.apply_remote(vec![car(3)]).unwrap();
    assert_eq!(report.stale, vec![id.clone()]);
    assert_eq!(store.require(&id).unwrap(), car(5));

    let report = store.apply_remote(vec![car(7)]).unwrap();
    assert_eq!(report.overwritten, 1);
    assert_eq!(store.require(&id).unwrap(), car(7));
}

#[test]
fn reapplying_a_pull_is_idempotent() {
    let replica = replica();
    let store = replica.store();
    let batch = vec![car(4)];

    store.apply_remote(batch.clone()).unwrap();
    let before = store.list(|_| true);
    store.apply_remote(batch).unwrap();
    assert_eq!(store.list(|_| true), before);
}

#[test]
fn server_answer_merges_through_records() {
    let replica = replica();
    let store = replica.store();
    store.apply_remote(vec![car(2)]).unwrap();

    let response: PullResponse = serde_json::from_value(json!({
        "changes": {
            "cars": {
                "created": [{ "id": "car2", "name": "RS5", "price": 340 }],
                "updated": [],
                "deleted": ["car1"]
            }
        },
        "latestVersion": 6
    }))
    .unwrap();

    let report = store.apply_remote(response.records()).unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.overwritten, 1);
    assert!(store.require(&RecordId::from("car1")).unwrap().deleted);
    assert_eq!(store.list_collection("cars").len(), 1);
}

proptest! {
    #[test]
    fn out_of_order_pulls_converge_to_highest_revision(
        revisions in prop::collection::btree_set(1u64..1000, 1..12)
            .prop_map(|set| set.into_iter().collect::<Vec<_>>())
            .prop_shuffle(),
        tombstone_at in prop::option::of(0usize..12),
    ) {
        let replica = replica();
        let store = replica.store();

        let batches: Vec<Record> = revisions
            .iter()
            .enumerate()
            .map(|(i, rev)| {
                if Some(i) == tombstone_at {
                    Record::tombstone("car1", "cars", *rev)
                } else {
                    car(*rev)
                }
            })
            .collect();

        let max = batches.iter().max_by_key(|r| r.revision).cloned().unwrap();
        for record in batches {
            store.apply_remote(vec![record]).unwrap();
        }

        prop_assert_eq!(store.require(&RecordId::from("car1")).unwrap(), max);
    }
}
