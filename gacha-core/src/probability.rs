//! Instantaneous tier probabilities derived from pity counters.
use crate::rng::RollSource;
use crate::rules::PoolRules;

/// Probability that the draw at `pity_counter` is top-tier.
///
/// `pity_counter` already includes the draw being evaluated.
#[must_use]
pub fn top_tier_probability(pity_counter: u32, rules: &PoolRules) -> f64 {
    if pity_counter >= rules.top_tier_pity_ceiling {
        return 1.0;
    }
    if !rules.has_soft_pity || pity_counter < rules.soft_pity_start {
        return rules.base_top_tier_probability;
    }
    let ramp_steps = f64::from(pity_counter - rules.soft_pity_start + 1);
    (rules.base_top_tier_probability + ramp_steps * rules.soft_pity_increase_per_draw).min(1.0)
}

/// Probability that the draw at `pity_counter` is second-tier. No ramp.
#[must_use]
pub fn second_tier_probability(pity_counter: u32, rules: &PoolRules) -> f64 {
    if pity_counter >= rules.second_tier_pity_ceiling {
        1.0
    } else {
        rules.base_second_tier_probability
    }
}

/// Decide whether a top-tier result is the featured item.
///
/// A carried guarantee short-circuits without consuming a roll.
pub fn resolve_featured<R>(
    carried_guarantee: bool,
    featured_win_probability: f64,
    rolls: &mut R,
) -> bool
where
    R: RollSource + ?Sized,
{
    if carried_guarantee {
        return true;
    }
    rolls.roll() < featured_win_probability
}

/// Expected number of draws per top-tier result from a fresh counter.
#[must_use]
pub fn expected_draws_per_top_tier(rules: &PoolRules) -> f64 {
    let mut survival = 1.0;
    let mut expected = 0.0;
    for draw in 1..=rules.top_tier_pity_ceiling {
        let p = top_tier_probability(draw, rules);
        expected += f64::from(draw) * survival * p;
        survival *= 1.0 - p;
        if p >= 1.0 {
            break;
        }
    }
    expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bonus::BonusTable;
    use crate::rng::ScriptedRolls;

    fn ramp_rules() -> PoolRules {
        PoolRules {
            base_top_tier_probability: 0.02,
            base_second_tier_probability: 0.1,
            has_soft_pity: true,
            soft_pity_start: 66,
            soft_pity_increase_per_draw: 0.10,
            top_tier_pity_ceiling: 90,
            second_tier_pity_ceiling: 10,
            featured_win_probability: 0.5,
            carries_guarantee: true,
            hard_guarantee_ceiling: Some(120),
            bonuses: BonusTable::default(),
        }
    }

    #[test]
    fn ramp_starts_one_step_past_threshold_and_caps() {
        let rules = ramp_rules();
        assert!((top_tier_probability(1, &rules) - 0.02).abs() < 1e-12);
        assert!((top_tier_probability(65, &rules) - 0.02).abs() < 1e-12);
        assert!((top_tier_probability(66, &rules) - 0.12).abs() < 1e-12);
        assert!((top_tier_probability(67, &rules) - 0.22).abs() < 1e-12);
        assert!((top_tier_probability(80, &rules) - 1.0).abs() < f64::EPSILON);
        assert!((top_tier_probability(90, &rules) - 1.0).abs() < f64::EPSILON);
        assert!((top_tier_probability(150, &rules) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ramp_from_zero_covers_the_first_draw() {
        let rules = PoolRules {
            soft_pity_start: 0,
            soft_pity_increase_per_draw: 0.05,
            ..ramp_rules()
        };
        assert_eq!(rules.validate(), Ok(()));
        assert!((top_tier_probability(1, &rules) - 0.12).abs() < 1e-12);
        assert!((top_tier_probability(2, &rules) - 0.17).abs() < 1e-12);
    }

    #[test]
    fn flat_rules_ignore_ramp_until_ceiling() {
        let rules = PoolRules {
            has_soft_pity: false,
            top_tier_pity_ceiling: 40,
            ..ramp_rules()
        };
        assert!((top_tier_probability(39, &rules) - 0.02).abs() < 1e-12);
        assert!((top_tier_probability(40, &rules) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn second_tier_is_flat_with_hard_floor() {
        let rules = ramp_rules();
        assert!((second_tier_probability(9, &rules) - 0.1).abs() < 1e-12);
        assert!((second_tier_probability(10, &rules) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn carried_guarantee_skips_the_roll() {
        let mut rolls = ScriptedRolls::new(vec![0.99], 0.99);
        assert!(resolve_featured(true, 0.0, &mut rolls));
        assert_eq!(rolls.consumed(), 0);
        assert!(!resolve_featured(false, 0.5, &mut rolls));
        assert_eq!(rolls.consumed(), 1);
    }

    #[test]
    fn expected_draws_stay_below_ceiling() {
        let rules = ramp_rules();
        let expected = expected_draws_per_top_tier(&rules);
        assert!(expected > 30.0 && expected < 70.0, "got {expected}");

        let certain = PoolRules {
            base_top_tier_probability: 1.0,
            ..ramp_rules()
        };
        assert!((expected_draws_per_top_tier(&certain) - 1.0).abs() < 1e-12);
    }
}
