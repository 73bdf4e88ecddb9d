//! Property-Based Tests — Domain Layer Invariants
//!
//! Uses `proptest` to verify the orderbook snapshot's sort/derived-field
//! invariants across randomly generated, well-formed inputs.

use lob_listener::domain::{OrderLevel, OrderbookSnapshot, Platform};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Strategy for a set of distinct prices in `cents` with positive sizes,
/// already sorted in the direction a valid book side requires.
fn sorted_levels_in(cents: std::ops::Range<u32>, descending: bool, max_len: usize) -> impl Strategy<Value = Vec<OrderLevel>> {
    proptest::collection::btree_set(cents, 1..=max_len).prop_map(move |cents| {
            let mut prices: Vec<u32> = cents.into_iter().collect();
            if descending {
                prices.reverse();
            }
            prices
                .into_iter()
                .enumerate()
                .map(|(i, cents)| OrderLevel {
                    price: Decimal::new(cents as i64, 3),
                    size: Decimal::new(i as i64 + 1, 0),
                })
                    .collect()
        })
}

proptest! {
    #[test]
    fn valid_sorted_levels_always_build_a_snapshot(
        bids in sorted_levels_in(1..500, true, 8),
        asks in sorted_levels_in(500..999, false, 8),
    ) {
        let snapshot = OrderbookSnapshot::new(
            Uuid::new_v4(),
            Platform::Polymarket,
            "T1".into(),
            Uuid::new_v4(),
            1_700_000_000_000,
            bids.clone(),
            asks.clone(),
            None,
            false,
            None,
        );
        prop_assert!(snapshot.is_ok());
        let snapshot = snapshot.unwrap();

        for window in snapshot.bids.windows(2) {
            prop_assert!(window[0].price >= window[1].price);
        }
        for window in snapshot.asks.windows(2) {
            prop_assert!(window[0].price <= window[1].price);
        }

        if let (Some(best_bid), Some(best_ask)) = (snapshot.best_bid, snapshot.best_ask) {
            prop_assert!(best_bid <= best_ask);
            prop_assert_eq!(snapshot.spread, Some(best_ask - best_bid));
            prop_assert_eq!(snapshot.mid_price, Some((best_bid + best_ask) / Decimal::TWO));
        }
    }

    #[test]
    fn forward_fill_preserves_content_hash(
        bids in sorted_levels_in(1..500, true, 5),
        asks in sorted_levels_in(500..999, false, 5),
        fill_ts in 1_700_000_000_001i64..1_800_000_000_000,
    ) {
        let snapshot = OrderbookSnapshot::new(
            Uuid::new_v4(),
            Platform::Kalshi,
            "T1".into(),
            Uuid::new_v4(),
            1_700_000_000_000,
            bids,
            asks,
            None,
            false,
            None,
        ).unwrap();

        let filled = snapshot.as_forward_fill(fill_ts, Some(1_700_000_000_000));
        prop_assert_eq!(&filled.hash, &snapshot.hash);
        prop_assert!(filled.is_forward_filled);
        prop_assert_eq!(filled.timestamp_ms, fill_ts);
        prop_assert!(filled.source_timestamp_ms.unwrap() <= filled.timestamp_ms);
    }

    #[test]
    fn empty_bids_never_produce_derived_fields(asks in sorted_levels_in(1..999, false, 5)) {
        let snapshot = OrderbookSnapshot::new(
            Uuid::new_v4(),
            Platform::Polymarket,
            "T1".into(),
            Uuid::new_v4(),
            0,
            vec![],
            asks,
            None,
            false,
            None,
        ).unwrap();
        prop_assert_eq!(snapshot.spread, None);
        prop_assert_eq!(snapshot.mid_price, None);
    }

    #[test]
    fn empty_asks_never_produce_derived_fields(bids in sorted_levels_in(1..999, true, 5)) {
        let snapshot = OrderbookSnapshot::new(
            Uuid::new_v4(),
            Platform::Polymarket,
            "T1".into(),
            Uuid::new_v4(),
            0,
            bids,
            vec![],
            None,
            false,
            None,
        ).unwrap();
        prop_assert_eq!(snapshot.spread, None);
        prop_assert_eq!(snapshot.mid_price, None);
    }
}
