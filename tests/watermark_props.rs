//! Property tests for the timing watermark.

use enose_control::motion::TimingWatermark;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Commit(f64),
    Cutover(f64),
    Observe(f64),
    Request(f64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0.0..100.0f64).prop_map(Op::Commit),
        (-50.0..150.0f64).prop_map(Op::Cutover),
        (0.0..100.0f64).prop_map(Op::Observe),
        (0.0..100.0f64).prop_map(Op::Request),
    ]
}

proptest! {
    #[test]
    fn gates_never_drop_below_committed(ops in prop::collection::vec(op(), 1..64)) {
        let mut watermark = TimingWatermark::new(0.1);
        let mut committed = 0.0f64;
        for op in ops {
            match op {
                Op::Commit(t) => watermark.advance_committed(t),
                Op::Cutover(t) => {
                    let applied = watermark.apply(t);
                    prop_assert!(applied >= watermark.last_committed_time());
                }
                Op::Observe(t) => {
                    let cutover = watermark.compute_safe_cutover(t);
                    prop_assert!(cutover >= watermark.last_committed_time() + 0.1 - 1e-12);
                    watermark.apply(cutover);
                }
                Op::Request(t) => watermark.request_generation(t),
            }
            // committed history is never rewound
            prop_assert!(watermark.last_committed_time() >= committed);
            committed = watermark.last_committed_time();
            prop_assert!(watermark.next_generation_time() >= committed);
            prop_assert!(watermark.next_flush_time() >= committed);
        }
    }

    #[test]
    fn cutover_uses_the_later_of_estimate_and_committed(
        observed in 0.0..100.0f64,
        committed in 0.0..100.0f64,
    ) {
        let mut watermark = TimingWatermark::new(0.1);
        watermark.advance_committed(committed);
        let cutover = watermark.compute_safe_cutover(observed);
        prop_assert!((cutover - (observed.max(committed) + 0.1)).abs() < 1e-12);
    }
}
