use tetl::{
    edge_key, edge_observation, split_edge_key, FeatureVector, KeyedAccumulator, ProvisionalTracker, SchemaError,
    ThresholdGate,
};

fn fv(v: &[i64]) -> FeatureVector {
    FeatureVector::new(v.to_vec())
}

/// Zero vector is the identity, merge is associative and commutative.
#[test]
fn feature_vectors_form_a_monoid() {
    let a = fv(&[1, 0, 3]);
    let b = fv(&[0, 2, 5]);
    let c = fv(&[4, 4, 0]);
    let zero = FeatureVector::zeros(3);

    assert_eq!(a.clone().merged(&zero).unwrap(), a);
    assert_eq!(zero.clone().merged(&a).unwrap(), a);
    assert_eq!(a.clone().merged(&b).unwrap(), b.clone().merged(&a).unwrap());
    let left = a.clone().merged(&b).unwrap().merged(&c).unwrap();
    let right = a.clone().merged(&b.clone().merged(&c).unwrap()).unwrap();
    assert_eq!(left, right);
    assert_eq!(left.as_slice(), &[5, 6, 8]);
}

/// Mismatched widths are rejected rather than truncated or padded.
#[test]
fn width_mismatch_is_schema_error() {
    let mut a = fv(&[1, 2]);
    assert_eq!(a.merge(&fv(&[1, 2, 3])), Err(SchemaError::LengthMismatch { left: 2, right: 3 }));
    assert_eq!(a.as_slice(), &[1, 2]);

    let mut acc = KeyedAccumulator::new();
    acc.accumulate("u", fv(&[1, 0])).unwrap();
    let err = acc.accumulate("u", fv(&[1])).unwrap_err();
    assert_eq!(err, SchemaError::KeyLengthMismatch { key: "u".into(), left: 2, right: 1 });
}

/// Any grouping of the same observations yields the same totals.
#[test]
fn keyed_totals_ignore_grouping() {
    let obs = [("a", [1, 0]), ("b", [0, 1]), ("a", [0, 1]), ("a", [1, 0]), ("b", [0, 1]), ("a", [0, 1])];

    let mut one = KeyedAccumulator::new();
    for (k, v) in obs {
        one.accumulate(k, fv(&v)).unwrap();
    }

    // Two partial accumulators, merged afterwards.
    let mut p1 = KeyedAccumulator::new();
    let mut p2 = KeyedAccumulator::new();
    for (i, (k, v)) in obs.iter().enumerate() {
        let target = if i % 2 == 0 { &mut p1 } else { &mut p2 };
        target.accumulate(k, fv(v)).unwrap();
    }
    p2.merge_from(p1).unwrap();

    assert_eq!(one.clone().into_sorted(), p2.into_sorted());
    assert_eq!(one.get("a").unwrap().as_slice(), &[2, 2]);
    assert_eq!(one.get("b").unwrap().as_slice(), &[0, 2]);
}

/// A failed accumulator merge leaves the target exactly as it was.
#[test]
fn failed_merge_from_leaves_target_untouched() {
    let mut target = KeyedAccumulator::new();
    let mut other = KeyedAccumulator::new();
    for i in 0..20 {
        let k = format!("user{i}");
        target.accumulate(&k, fv(&[1, 1])).unwrap();
        other.accumulate(&k, fv(&[1, 1])).unwrap();
    }
    target.accumulate("odd", fv(&[5, 5])).unwrap();
    other.accumulate("odd", fv(&[5])).unwrap();
    let before = target.clone().into_sorted();

    let err = target.merge_from(other).unwrap_err();
    assert_eq!(err, SchemaError::KeyLengthMismatch { key: "odd".into(), left: 2, right: 1 });
    assert_eq!(target.into_sorted(), before);
}

/// `(1,0)`, `(0,1)` and `(1,1)` for `a@b` total `(2,2)` under any merge grouping,
/// and that total passes the edge gate.
#[test]
fn edge_total_is_grouping_independent() {
    let gate = ThresholdGate::bidirectional(2);
    let (x, y, z) = (fv(&[1, 0]), fv(&[0, 1]), fv(&[1, 1]));

    let mut sequential = KeyedAccumulator::new();
    for v in [&x, &y, &z] {
        sequential.accumulate("a@b", v.clone()).unwrap();
    }
    let grouped = x.clone().merged(&y).unwrap().merged(&z).unwrap();
    let reversed = z.clone().merged(&y.clone().merged(&x).unwrap()).unwrap();

    let total = sequential.get("a@b").unwrap();
    assert_eq!(total, &grouped);
    assert_eq!(total, &reversed);
    assert!(gate.passes(total));
    assert_eq!(format!("a@b,{}", total.to_csv()), "a@b,2,2");
}

#[test]
fn csv_payload_parses_back() {
    let v = fv(&[3, 0, -2]);
    assert_eq!(v.to_csv(), "3,0,-2");
    assert_eq!(FeatureVector::<i64>::parse_csv("3,0,-2"), Some(v));
    assert_eq!(FeatureVector::<i64>::parse_csv("3,x"), None);
}

/// Gate: every watched component must reach the minimum.
#[test]
fn threshold_gate_checks_all_components() {
    let g = ThresholdGate::bidirectional(2);
    assert!(g.passes(&fv(&[2, 2])));
    assert!(g.passes(&fv(&[5, 3])));
    assert!(!g.passes(&fv(&[2, 1])));
    assert!(!g.passes(&fv(&[9])));
}

/// Once a partial passes, further non-negative merges cannot make it fail,
/// and the tracker signals each key only once per buffer.
#[test]
fn provisional_signal_never_flaps() {
    let g = ThresholdGate::bidirectional(2);
    let mut tracker = ProvisionalTracker::new(&g);
    let mut acc = KeyedAccumulator::new();
    let mut signals = 0;
    for v in [[1, 0], [0, 1], [1, 0], [0, 1], [3, 0], [0, 7]] {
        let total = acc.accumulate("alice@bob", fv(&v)).unwrap();
        let was_passing = g.passes(total);
        if tracker.observe("alice@bob", total) {
            signals += 1;
        }
        assert!(!(signals > 0 && !was_passing), "gate failed after a provisional pass");
    }
    assert_eq!(signals, 1);

    tracker.reset();
    assert!(tracker.observe("alice@bob", acc.get("alice@bob").unwrap()));
}

/// Both directions of a pair share one key; direction survives in the weight.
#[test]
fn edge_keys_are_canonical() {
    assert_eq!(edge_key("bob", "alice"), "alice@bob");
    assert_eq!(edge_key("alice", "bob"), "alice@bob");

    let (k1, w1) = edge_observation("alice", "bob").unwrap();
    let (k2, w2) = edge_observation("bob", "alice").unwrap();
    assert_eq!(k1, k2);
    assert_eq!(w1.as_slice(), &[1, 0]);
    assert_eq!(w2.as_slice(), &[0, 1]);
    assert!(edge_observation("carol", "carol").is_none());
    assert_eq!(split_edge_key("alice@bob"), Some(("alice", "bob")));
}
