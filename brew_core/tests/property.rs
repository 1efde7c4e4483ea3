mod common;

use brew_core::compensation::{BiasModel, CompensationBank, FactorModel};
use brew_core::{Bounds, DecodeError, FlowEstimator, FlowSample, Profile, Shot, decode};
use common::packet;
use proptest::prelude::*;

prop_compose! {
    fn shot_strategy()(
        id in 1u32..1_000,
        target in 10.0f32..80.0,
        stop in 0.0f32..90.0,
        drip in -5.0f32..15.0,
        flow in -1.0f32..8.0,
    ) -> Shot {
        Shot {
            id,
            target_weight_g: target,
            final_weight_g: stop + drip,
            last_flow_gps: flow,
            stop_weight_g: stop,
        }
    }
}

proptest! {
    #[test]
    fn short_packets_are_rejected(bytes in proptest::collection::vec(any::<u8>(), 0..20)) {
        prop_assert_eq!(decode(&bytes), Err(DecodeError::TooShort { len: bytes.len() }));
    }

    #[test]
    fn wrong_header_is_rejected(
        mut bytes in proptest::collection::vec(any::<u8>(), 20..40),
        b0 in any::<u8>(),
        b1 in any::<u8>(),
    ) {
        prop_assume!((b0, b1) != (0x03, 0x0B));
        bytes[0] = b0;
        bytes[1] = b1;
        prop_assert!(decode(&bytes).is_err());
    }

    #[test]
    fn decoded_values_stay_in_wire_range(tail in proptest::collection::vec(any::<u8>(), 18..30)) {
        let mut bytes = vec![0x03, 0x0B];
        bytes.extend(tail);
        let r = decode(&bytes).unwrap();
        prop_assert!(r.timestamp_ms < 1 << 24);
        prop_assert!(r.weight_g.abs() <= 167_772.16);
        prop_assert!(r.flow_gps.abs() <= 655.36);
    }

    #[test]
    fn encoded_weight_decodes_to_centigram(
        ms in 0u32..(1 << 24),
        weight in -500.0f32..2_000.0,
        flow in -20.0f32..20.0,
    ) {
        let r = decode(&packet(ms, weight, flow, 80)).unwrap();
        prop_assert_eq!(r.timestamp_ms, ms);
        prop_assert!((r.weight_g - weight).abs() <= 0.006);
        prop_assert!((r.flow_gps - flow).abs() <= 0.006);
        prop_assert_eq!(r.battery_pct, 80);
    }

    #[test]
    fn flow_is_clamped(points in proptest::collection::vec((0.0f32..0.5, -50.0f32..50.0), 0..60)) {
        let mut est = FlowEstimator::default();
        let mut t = 0.0f32;
        for (dt, w) in points {
            t += dt;
            est.push(FlowSample { time_s: t, weight_g: w });
            let f = est.current_flow_rate();
            prop_assert!(f.is_finite());
            prop_assert!((0.0..=10.0).contains(&f), "flow {}", f);
        }
    }

    #[test]
    fn steady_weight_has_no_flow(w in -10.0f32..500.0, n in 3usize..40) {
        let mut est = FlowEstimator::default();
        for i in 0..n {
            est.push(FlowSample { time_s: i as f32 * 0.1, weight_g: w });
        }
        prop_assert!(est.current_flow_rate().abs() < 1e-3);
    }

    #[test]
    fn linear_pour_recovers_rate(rate in 0.0f32..9.5, start in 0.0f32..50.0, n in 3usize..40) {
        let mut est = FlowEstimator::default();
        for i in 0..n {
            let t = 5.0 + i as f32 * 0.1;
            est.push(FlowSample { time_s: t, weight_g: start + rate * (t - 5.0) });
        }
        let f = est.current_flow_rate();
        prop_assert!((f - rate).abs() < 0.01, "rate {} estimated {}", rate, f);
    }

    #[test]
    fn factor_state_stays_in_bounds(
        shots in proptest::collection::vec(shot_strategy(), 1..30),
        alpha in 0.1f32..1.0,
    ) {
        let mut bank = CompensationBank::new(Box::new(FactorModel::default()));
        for s in &shots {
            let learned = bank.record(Profile::Full, *s, alpha, 0.5);
            prop_assert!(learned.state >= Bounds::FACTOR.min && learned.state <= Bounds::FACTOR.max);
        }
        let v = bank.recompute(Profile::Full, 12, 0.5);
        prop_assert!((Bounds::FACTOR.min..=Bounds::FACTOR.max).contains(&v));
        prop_assert_eq!(bank.state(Profile::Split), Bounds::FACTOR.default);
    }

    #[test]
    fn bias_state_stays_in_bounds(
        shots in proptest::collection::vec(shot_strategy(), 1..30),
        alpha in 0.1f32..1.0,
        lag in 0.0f32..2.0,
    ) {
        let mut bank = CompensationBank::new(Box::new(BiasModel::default()));
        for s in &shots {
            bank.record(Profile::Split, *s, alpha, lag);
            let st = bank.state(Profile::Split);
            prop_assert!((Bounds::BIAS.min..=Bounds::BIAS.max).contains(&st));
        }
        let v = bank.recompute(Profile::Split, 12, lag);
        prop_assert!((Bounds::BIAS.min..=Bounds::BIAS.max).contains(&v));
    }

    #[test]
    fn history_never_exceeds_capacity(shots in proptest::collection::vec(shot_strategy(), 0..40)) {
        let mut bank = CompensationBank::new(Box::new(FactorModel::default()));
        for s in &shots {
            bank.record(Profile::Full, *s, 0.2, 0.5);
        }
        prop_assert!(bank.history(Profile::Full).len() <= 12);
        prop_assert_eq!(bank.history(Profile::Full).len(), shots.len().min(12));
    }
}
