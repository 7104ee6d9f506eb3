// Property: dispatch order is the ordered intersection of order and enabled
//
// For any enabled list and order list, the resolved order contains each
// backend at most once, only backends that are both enabled and ordered,
// and keeps the sequence of the order list. Names match case-insensitively.

use multipurge::models::BackendId;
use multipurge::normalizer::normalize;
use multipurge::registry::resolve_order;
use proptest::prelude::*;

fn service_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("cloudflare".to_string()),
        Just("Cloudflare".to_string()),
        Just("api-backend".to_string()),
        Just("varnish".to_string()),
        Just("VARNISH".to_string()),
        Just("cache-server".to_string()),
        Just("akamai".to_string()),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_resolve_order_is_ordered_intersection(
        enabled in prop::collection::vec(service_name(), 0..6),
        order in prop::collection::vec(service_name(), 0..6),
    ) {
        let resolved = resolve_order(&enabled, &order);

        let enabled_ids: Vec<BackendId> = enabled.iter().map(|n| BackendId::normalize(n)).collect();
        let order_ids: Vec<BackendId> = order.iter().map(|n| BackendId::normalize(n)).collect();

        for (i, id) in resolved.iter().enumerate() {
            prop_assert!(enabled_ids.contains(id));
            prop_assert!(order_ids.contains(id));
            prop_assert!(!resolved[..i].contains(id));
        }

        // Every backend in both lists appears
        for id in &order_ids {
            if enabled_ids.contains(id) {
                prop_assert!(resolved.contains(id));
            }
        }

        // Relative order follows the order list
        let positions: Vec<usize> = resolved
            .iter()
            .map(|id| order_ids.iter().position(|o| o == id).unwrap())
            .collect();
        prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));

        if enabled.is_empty() {
            prop_assert!(resolved.is_empty());
        }
    }

    #[test]
    fn prop_normalize_is_idempotent(
        urls in prop::collection::vec(prop_oneof![
            Just(String::new()),
            Just("  ".to_string()),
            "https://x/[a-c]{1,2}",
            " https://x/[a-c]{1,2} ",
        ], 0..30),
    ) {
        let once = normalize(&urls);
        let twice = normalize(&once);
        prop_assert_eq!(&once, &twice);

        let mut sorted = once.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(sorted.len(), once.len());
        prop_assert!(once.iter().all(|u| !u.is_empty() && u.trim() == u));
    }
}

#[test]
fn test_resolve_order_examples() {
    assert_eq!(
        resolve_order(&["cloudflare", "varnish"], &["varnish", "cloudflare"]),
        vec![BackendId::Varnish, BackendId::Cloudflare]
    );
    assert!(resolve_order(&["cloudflare"], &["varnish"]).is_empty());
}
