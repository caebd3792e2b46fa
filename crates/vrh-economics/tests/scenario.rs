//! Multi-member accounting: conservation of emissions and reward split

mod common;

use common::*;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vrh_core::prelude::*;
use vrh_economics::Operation;

/// Sum of every member's credit in `guild` after checkpointing them all
fn total_credit(h: &Harness, guild: Address, users: &[Address]) -> Amount {
    for &user in users {
        h.call(user, Operation::UserCheckpoint { guild, user });
    }
    users.iter().map(|&u| h.integrate_fraction(guild, u)).sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn test_emission_is_conserved(
        whole_tokens in proptest::collection::vec(1_000u128..500_000, 2..5),
        join_delays in proptest::collection::vec(0u64..2 * WEEK, 4),
        commission in 0u8..=20,
        tail in WEEK..6 * WEEK,
    ) {
        let locks: Vec<_> = whole_tokens
            .iter()
            .enumerate()
            .map(|(i, &t)| (account(i), t * ONE))
            .collect();
        let h = Harness::with_locks(&locks);
        h.add_type(h.gas_token, ONE);
        let owner = account(0);
        let guild = h.new_guild(owner, 0, commission);
        let first_week = next_week(h.now());

        let members: Vec<Address> = locks.iter().map(|&(u, _)| u).collect();
        for (user, delay) in members.iter().skip(1).zip(&join_delays) {
            h.sleep(*delay);
            h.call(*user, Operation::JoinGuild { guild });
        }
        h.sleep(tail);

        let credited = total_credit(&h, guild, &members);
        let emitted = h
            .view(|dao| dao.token().mintable_in_timeframe(first_week.min(h.now()), h.now()))
            .unwrap();
        prop_assert!(credited <= emitted);
        prop_assert!(approx(credited, emitted, 1e-12), "credited {} emitted {}", credited, emitted);
    }
}

#[test]
fn test_reward_split_follows_working_balance() {
    let h = Harness::standard();
    let guild = h.create_guild(alice());
    h.call(bob(), Operation::JoinGuild { guild });
    // both start from the same point
    h.sleep_to_boundary(WEEK);
    let start = h.now();
    total_credit(&h, guild, &[alice(), bob()]);
    let before_alice = h.integrate_fraction(guild, alice());
    let before_bob = h.integrate_fraction(guild, bob());
    let bonus_before = h.view(|dao| dao.controller().guild(guild).unwrap().total_owner_bonus());

    let (wb_alice, wb_bob, supply) = h.view(|dao| {
        let g = dao.controller().guild(guild).unwrap();
        (g.working_balance(alice()), g.working_balance(bob()), g.working_supply())
    });
    h.sleep(WEEK);
    total_credit(&h, guild, &[alice(), bob()]);

    let emitted = h.view(|dao| dao.token().mintable_in_timeframe(start, h.now())).unwrap() as f64;
    let bob_earned = (h.integrate_fraction(guild, bob()) - before_bob) as f64;
    let expected_bob = emitted * 0.8 * wb_bob as f64 / supply as f64;
    assert!((bob_earned - expected_bob).abs() / expected_bob < 1e-9);

    let bonus = h.view(|dao| dao.controller().guild(guild).unwrap().total_owner_bonus()) - bonus_before;
    assert!((bonus as f64 - emitted * 0.2).abs() / (emitted * 0.2) < 1e-9);

    let alice_earned = (h.integrate_fraction(guild, alice()) - before_alice) as f64;
    let expected_alice = emitted * 0.8 * wb_alice as f64 / supply as f64 + emitted * 0.2;
    assert!((alice_earned - expected_alice).abs() / expected_alice < 1e-9);
}

#[test]
fn test_end_to_end() {
    let h = Harness::standard();
    let guild = h.create_guild(alice());
    h.call(bob(), Operation::JoinGuild { guild });
    h.sleep(3 * WEEK);

    let a = h.mint(alice());
    let b = h.mint(bob());
    let total = a.minted + a.vesting_locked + b.minted + b.vesting_locked;

    let first_week = h.view(|dao| next_week(dao.controller().guild(guild).unwrap().created_at()));
    let emitted = h.view(|dao| dao.token().mintable_in_timeframe(first_week, h.now())).unwrap();
    assert!(approx(total, emitted, TOL));

    let balances = h.view(|dao| {
        let ledger = dao.token().ledger();
        (ledger.balance_of(bob()), dao.vesting().user_vesting_history(bob(), 1).amount)
    });
    assert_eq!(balances.0, b.minted);
    assert_eq!(balances.1, b.vesting_locked);
}

#[test]
fn test_random_activity_keeps_books_balanced() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let users: Vec<Address> = (0..6).map(account).collect();
    let locks: Vec<_> = users
        .iter()
        .map(|&u| (u, rng.gen_range(1_000u128..200_000) * ONE))
        .collect();
    let h = Harness::with_locks(&locks);
    for &user in &users {
        h.fund(user, 100_000 * ONE);
    }
    h.add_type(h.gas_token, ONE);
    let guild = h.new_guild(users[0], 0, 10);
    let first_week = next_week(h.now());
    let mut members = vec![users[0]];

    for _ in 0..60 {
        h.sleep(rng.gen_range(HOUR..2 * DAY));
        let user = users[rng.gen_range(0..users.len())];
        match rng.gen_range(0..3) {
            0 if !members.contains(&user) => {
                h.call(user, Operation::JoinGuild { guild });
                members.push(user);
            }
            1 => {
                h.call(user, Operation::IncreaseAmount { amount: rng.gen_range(1..1_000) * ONE });
                if members.contains(&user) {
                    h.call(user, Operation::UpdateWorkingBalance { guild, user });
                }
            }
            _ if members.contains(&user) => {
                h.call(user, Operation::UserCheckpoint { guild, user });
            }
            _ => {}
        }

        let (sum, supply) = h.view(|dao| {
            let g = dao.controller().guild(guild).unwrap();
            let sum: Amount = members.iter().map(|&m| g.working_balance(m)).sum();
            (sum, g.working_supply())
        });
        assert_eq!(sum, supply);
    }

    let credited = total_credit(&h, guild, &members);
    let emitted = h
        .view(|dao| dao.token().mintable_in_timeframe(first_week, h.now()))
        .unwrap();
    assert!(credited <= emitted);
    assert!(approx(credited, emitted, 1e-12), "credited {credited} emitted {emitted}");
}
