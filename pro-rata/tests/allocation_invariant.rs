use chrono::{Duration, TimeZone, Utc};
use pro_rata::{EntitlementStatus, ProRataEntitlement};
use proptest::prelude::*;
use rust_decimal::Decimal;

proptest! {
    #[test]
    fn used_plus_remaining_is_constant(
        amount_cents in 1i64..10_000_000,
        requests in proptest::collection::vec(0i64..2_000_000, 1..32),
    ) {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let amount = Decimal::new(amount_cents, 2);
        let mut entitlement = ProRataEntitlement::new(
            "fund-a".into(),
            1,
            "series-b".into(),
            amount,
            now + Duration::days(30),
        );
        for cents in requests {
            let before = entitlement.allocation_remaining();
            let outcome = entitlement.exercise(Decimal::new(cents, 2), now);
            prop_assert_eq!(
                entitlement.allocation_used() + entitlement.allocation_remaining(),
                amount
            );
            prop_assert!(entitlement.allocation_remaining() >= Decimal::ZERO);
            if outcome.is_err() {
                prop_assert_eq!(entitlement.allocation_remaining(), before);
            }
        }
        if entitlement.allocation_remaining().is_zero() {
            prop_assert_eq!(entitlement.status(), EntitlementStatus::Exercised);
        }
    }
}
