//! Property tests for convergence and echo suppression.

use caes_model::Projection;
use caes_primary::PrimaryConfig;
use caes_sync_engine::SyncEngine;
use caes_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn one_pass_converges_to_the_newest_value(
        id in record_id_strategy(),
        primary_ts in timestamp_strategy(),
        secondary_ts in timestamp_strategy(),
        primary_payload in payload_strategy(),
        secondary_payload in payload_strategy(),
    ) {
        let stores = TestStores::new();
        stores.write_primary(id, primary_ts, primary_payload.clone());
        stores.write_secondary(id, secondary_ts, secondary_payload.clone()).unwrap();

        let (primary, secondary) = stores.adapters();
        let mut engine = SyncEngine::new(primary, secondary);
        engine.sync(primary_ts.min(secondary_ts)).unwrap();

        let (winner_ts, winner) = if secondary_ts >= primary_ts {
            (secondary_ts, secondary_payload)
        } else {
            (primary_ts, primary_payload)
        };

        let (stored_ts, doc) = stores.secondary_doc(id).unwrap();
        prop_assert_eq!(stored_ts, winner_ts);
        prop_assert_eq!(&doc, &winner);

        // Row upserts keep columns the winning value does not set.
        let row = stores.primary_row(id).unwrap();
        for (field, value) in &winner {
            prop_assert_eq!(row.get(field), Some(value));
        }
    }

    #[test]
    fn repeated_pass_is_quiet(
        primary_ids in prop::collection::hash_set(record_id_strategy(), 0..8),
        secondary_ids in prop::collection::hash_set(record_id_strategy(), 0..8),
        ts in timestamp_strategy(),
    ) {
        let stores = TestStores::new();
        for id in &primary_ids {
            stores.write_primary(*id, ts, sample_payload());
        }
        for id in &secondary_ids {
            stores.write_secondary(*id, ts, sample_payload()).unwrap();
        }

        let (primary, secondary) = stores.adapters();
        let mut engine = SyncEngine::new(primary, secondary);
        engine.sync(ts).unwrap();
        let second = engine.sync(ts).unwrap();

        prop_assert!(second.is_quiet());
    }

    #[test]
    fn excluded_fields_never_reach_the_secondary(
        id in record_id_strategy(),
        ts in timestamp_strategy(),
        payload in payload_strategy(),
        excluded in field_name_strategy(),
    ) {
        let stores = TestStores::new().with_primary_config(
            PrimaryConfig::new("data").with_projection(Projection::exclude([excluded.clone()])),
        );
        stores.write_primary(id, ts, payload);

        let (primary, secondary) = stores.adapters();
        SyncEngine::new(primary, secondary).sync(ts).unwrap();

        if let Some((_, doc)) = stores.secondary_doc(id) {
            prop_assert!(!doc.contains_key(&excluded));
        }
    }
}
