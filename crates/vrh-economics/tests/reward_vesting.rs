//! Reward vesting through repeated mints
//!
//! ```text
//!                             1 vest period                   2 vest period
//!                                 |                               |
//! |_______|_______|_______|_______|_______|_______|_______|_______|_______|
//!   1     2       3       4       5       6       7       8       9      10
//! 1. create guild
//! 2. guild weight takes effect
//! 3. first mint
//! 5. first vesting period starts
//! 6. second mint
//! 9. second vesting period starts
//! 10. third mint
//! |_______| one week
//! ```

mod common;

use common::*;
use proptest::prelude::*;
use vrh_core::prelude::*;
use vrh_economics::{Event, Operation};

/// Guild for alice, then the clock at point 3 (one full week of weight)
fn start() -> Harness {
    let h = Harness::standard();
    let guild = h.create_guild(alice());
    h.call(alice(), Operation::UserCheckpoint { guild, user: alice() });
    h.sleep_to_boundary(WEEK);
    h.sleep(WEEK);
    h
}

fn f64_of(value: Amount) -> f64 {
    value as f64
}

#[test]
fn test_vesting() {
    let h = start();
    h.mint(alice());
    let time_3 = h.now();

    let first = h.vesting_entry(alice(), 1);
    let expected = f64_of(h.rate()) * WEEK as f64 * 0.7;
    assert!(approx(first.amount, expected as u128, TOL));
    assert_eq!(first.start_time, period_floor(time_3, MONTH) + MONTH);
    // nothing released before the period starts
    assert_eq!(h.claimable(alice()), 0);

    // point 6
    h.sleep_to_boundary(MONTH);
    h.sleep(WEEK);
    let slope_1 = h.vesting_entry(alice(), 1).slope;
    assert!(approx(slope_1 * u128::from(WEEK), h.claimable(alice()), TOL));

    let response = h.submit(alice(), Operation::Mint);
    let receipt = match response.outcome {
        Ok(vrh_economics::Outcome::Minted(receipt)) => receipt,
        other => panic!("unexpected outcome {other:?}"),
    };
    let time_6 = h.now();
    assert!(response
        .events
        .iter()
        .any(|e| matches!(e, Event::Minted { recipient, .. } if *recipient == alice())));

    let second = h.vesting_entry(alice(), 2);
    let earned = f64_of(h.rate()) * (time_6 - time_3) as f64;
    assert!(approx(second.amount, (earned * 0.7) as u128, TOL));

    let expected_minted = f64_of(slope_1) * WEEK as f64 + earned * 0.3;
    assert!(approx(receipt.minted, expected_minted as u128, TOL));
    h.sleep(1);

    // point 10
    h.sleep_to_boundary(MONTH);
    h.sleep(WEEK);
    let slope_2 = second.slope;
    let expected = slope_1 * u128::from(MONTH) + slope_2 * u128::from(WEEK);
    assert!(approx(h.claimable(alice()), expected, TOL));
    h.mint(alice());

    // one mint a period until both entries have fully vested
    for _ in 0..6 {
        h.sleep_to_boundary(MONTH);
        h.sleep(WEEK);
        h.mint(alice());
    }
    assert_eq!(h.vesting_entry(alice(), 1).amount, 0);
    assert_eq!(h.vesting_entry(alice(), 2).amount, 0);
}

#[test]
fn test_fully_vested_entry_is_paid_and_purged() {
    let h = start();
    let receipt = h.mint(alice());
    assert_eq!(h.vesting_entry(alice(), 1).amount, receipt.vesting_locked);

    h.sleep(7 * MONTH);
    assert_eq!(h.claimable(alice()), receipt.vesting_locked);

    let release = h.mint(alice());
    assert!(release.minted >= receipt.vesting_locked);
    assert_eq!(h.vesting_entry(alice(), 1).amount, 0);
    assert_eq!(h.claimable(alice()), 0);
}

#[test]
fn test_skip_one_epoch_vesting() {
    let h = start();
    h.mint(alice());
    let time_3 = h.now();

    h.sleep_to_boundary(MONTH);
    h.sleep(4 * WEEK);
    h.sleep(WEEK);
    h.mint(alice());

    let elapsed = h.now() - time_3;
    let expected = f64_of(h.rate()) * elapsed as f64 * 0.7;
    // the skipped period does not use an index
    let entry = h.vesting_entry(alice(), 2);
    assert!(approx(entry.amount, expected as u128, TOL));
    assert_eq!(h.vesting_entry(alice(), 3).amount, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(5))]

    #[test]
    fn test_mint_twice_in_period(duration in WEEK..3 * WEEK) {
        let h = start();
        h.mint(alice());

        h.sleep_to_boundary(MONTH);
        h.sleep(WEEK);
        h.mint(alice());
        let at_first = h.vesting_entry(alice(), 2).amount;

        h.sleep(duration);
        h.mint(alice());
        let at_second = h.vesting_entry(alice(), 2).amount;

        let expected = f64_of(h.rate()) * duration as f64 * 0.7;
        prop_assert!(approx(at_second - at_first, expected as u128, TOL));
        prop_assert_eq!(h.vesting_entry(alice(), 3).amount, 0);
    }
}
