use proptest::prelude::*;
use rust_decimal::Decimal;

use wallcraft_api::services::pricing::{self, MIN_BILLABLE_AREA};
use wallcraft_api::signature;

proptest! {
    // A signature produced over a payload always verifies against it.
    #[test]
    fn signing_then_verifying_round_trips(
        payload in proptest::collection::vec(any::<u8>(), 0..512)
    ) {
        let sig = signature::sign("property_secret", &payload);
        prop_assert!(signature::verify("property_secret", &payload, &sig));
    }

    // Flipping any bit of the payload invalidates the signature, always.
    #[test]
    fn any_payload_mutation_invalidates_signature(
        payload in proptest::collection::vec(any::<u8>(), 1..512),
        idx in 0usize..512,
        flip in 1u8..
    ) {
        let sig = signature::sign("property_secret", &payload);
        let mut tampered = payload.clone();
        let i = idx % tampered.len();
        tampered[i] ^= flip;
        prop_assert!(!signature::verify("property_secret", &tampered, &sig));
    }

    // A signature never verifies under a different secret.
    #[test]
    fn signature_is_bound_to_the_secret(
        payload in proptest::collection::vec(any::<u8>(), 0..256)
    ) {
        let sig = signature::sign("property_secret", &payload);
        prop_assert!(!signature::verify("other_secret", &payload, &sig));
    }

    // The area floor guarantees a line never bills below price x quantity.
    #[test]
    fn line_total_never_undercuts_price_times_quantity(
        price_minor in 1u32..10_000_000u32,
        quantity in 1i32..100,
        area_milli in proptest::option::of(0u32..100_000u32)
    ) {
        let unit_price = Decimal::from(price_minor) / Decimal::from(100);
        let area = area_milli.map(|m| Decimal::from(m) / Decimal::from(1000));

        let total = pricing::line_total(unit_price, quantity, area);
        prop_assert!(total >= unit_price * Decimal::from(quantity));
    }

    // Billable area is the identity above the floor and the floor below it.
    #[test]
    fn billable_area_is_floored_identity(area_milli in 0u32..100_000u32) {
        let area = Decimal::from(area_milli) / Decimal::from(1000);
        let billable = pricing::billable_area(Some(area));

        if area > MIN_BILLABLE_AREA {
            prop_assert_eq!(billable, area);
        } else {
            prop_assert_eq!(billable, MIN_BILLABLE_AREA);
        }
    }
}
