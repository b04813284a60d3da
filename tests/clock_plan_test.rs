//! Property checks for clock plan derivation over a grid of rig parameters.

use sca_daq::capture::{ClockPlan, ClockPlanParams, SAMPLING_RATE_MAX};
use sca_daq::ScaError;

const PLL_FREQUENCIES: [f64; 6] = [10e6, 24e6, 48e6, 66.6e6, 100e6, 200e6];
const MULTIPLIERS: [f64; 4] = [0.5, 1.0, 2.0, 3.0];
const DIVISORS: [u32; 4] = [1, 2, 3, 7];
const MAX_RATES: [f64; 3] = [SAMPLING_RATE_MAX, 125e6, 50e6];

// The slowest grid point samples 1/3 per cycle, so windows start at 2 cycles.

#[test]
fn sample_count_is_a_multiple_of_the_divisor() {
    for max_rate in MAX_RATES {
        for pll in PLL_FREQUENCIES {
            if pll > max_rate {
                continue;
            }
            for mult in MULTIPLIERS {
                for divisor in DIVISORS {
                    for cycles in [2, 13, 100, 1000] {
                        let params = ClockPlanParams::new(pll, mult, cycles)
                            .with_max_sampling_rate(max_rate)
                            .with_segment_divisor(divisor);
                        let plan = ClockPlan::derive(params).unwrap();
                        let ctx = format!("max={max_rate} pll={pll} mult={mult} div={divisor}");

                        assert_eq!(plan.sample_count() % divisor, 0, "{ctx}");
                        assert!(u64::from(plan.sample_count()) >= plan.raw_sample_count(), "{ctx}");
                        assert!(
                            u64::from(plan.sample_count()) < plan.raw_sample_count() + u64::from(divisor),
                            "{ctx}"
                        );
                        assert!(plan.sampling_rate() <= max_rate, "{ctx}");
                        assert!(plan.sampling_rate() + pll > max_rate, "{ctx}");
                        assert!(plan.adc_multiplier() >= 1, "{ctx}");
                    }
                }
            }
        }
    }
}

#[test]
fn pll_above_a_lowered_limit_is_rejected() {
    for max_rate in MAX_RATES {
        for pll in PLL_FREQUENCIES.into_iter().filter(|pll| *pll > max_rate) {
            let params = ClockPlanParams::new(pll, 1.0, 100).with_max_sampling_rate(max_rate);
            assert!(
                matches!(ClockPlan::derive(params), Err(ScaError::Configuration(_))),
                "max={max_rate} pll={pll}"
            );
        }
    }
}

#[test]
fn raw_sample_count_is_monotonic_in_cycles() {
    for pll in PLL_FREQUENCIES {
        for mult in MULTIPLIERS {
            let mut previous = 0;
            for cycles in 2..=300 {
                let plan = ClockPlan::derive(ClockPlanParams::new(pll, mult, cycles)).unwrap();
                assert!(plan.raw_sample_count() >= previous, "pll={pll} mult={mult} cycles={cycles}");
                previous = plan.raw_sample_count();
            }
        }
    }
}

#[test]
fn reference_rig_matches_hand_computed_values() {
    let plan = ClockPlan::derive(ClockPlanParams::new(48e6, 2.0, 100).with_segment_divisor(3)).unwrap();
    assert_eq!(plan.adc_multiplier(), 4);
    assert_eq!(plan.sampling_rate(), 192e6);
    assert_eq!(plan.target_frequency(), 96e6);
    assert_eq!(plan.samples_per_cycle(), 2.0);
    assert_eq!(plan.raw_sample_count(), 200);
    assert_eq!(plan.sample_count(), 201);
}

#[test]
fn pll_above_adc_limit_is_a_configuration_error() {
    let params = ClockPlanParams::new(48e6, 1.0, 100).with_max_sampling_rate(40e6);
    assert!(matches!(ClockPlan::derive(params), Err(ScaError::Configuration(_))));
}

#[test]
fn window_too_large_for_the_scope_is_a_configuration_error() {
    let params = ClockPlanParams::new(48e6, 1e-300, 100).with_segment_divisor(2);
    assert!(matches!(ClockPlan::derive(params), Err(ScaError::Configuration(_))));

    let params = ClockPlanParams::new(48e6, 2.0, 100).with_offset_cycles(i64::MIN);
    assert!(matches!(ClockPlan::derive(params), Err(ScaError::Configuration(_))));
}
