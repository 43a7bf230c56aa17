// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests for deterministic challenge generation.

use proptest::prelude::*;
use wa_challenge::generate;
use wa_contracts::Tier;

fn arb_tier() -> impl Strategy<Value = Tier> {
    prop_oneof![Just(Tier::One), Just(Tier::Two), Just(Tier::Three)]
}

proptest! {
    #[test]
    fn generation_is_deterministic(seed in any::<u64>(), tier in arb_tier()) {
        let a = generate(seed, tier);
        let b = generate(seed, tier);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn generated_challenge_carries_its_inputs(seed in any::<u64>(), tier in arb_tier()) {
        let c = generate(seed, tier);
        prop_assert_eq!(c.seed, seed);
        prop_assert_eq!(c.tier, tier);
        prop_assert!(!c.biome.is_empty());
        prop_assert!(!c.inhabitants.is_empty());
        prop_assert!(!c.twist.is_empty());
    }
}
