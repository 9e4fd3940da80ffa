use super::*;

#[test]
fn truthiness_matches_coercion_rules() {
    assert!(!Value::None.is_truthy());
    assert!(!Value::Bool(false).is_truthy());
    assert!(Value::Bool(true).is_truthy());
    assert!(!Value::Int(0).is_truthy());
    assert!(Value::Int(-1).is_truthy());
    assert!(Value::Double(0.0).is_truthy());
    assert!(Value::new_str(String::new()).is_truthy());
}

#[test]
fn value_ref_and_deref_track_heap_refcount() {
    let v = Value::new_str("hi".to_string());
    let obj = match &v {
        Value::Str(r) => r.clone(),
        _ => unreachable!(),
    };
    assert_eq!(obj.rc(), 1);
    v.value_ref();
    assert_eq!(obj.rc(), 2);
    assert!(!v.value_deref());
    assert_eq!(obj.rc(), 1);
    assert!(v.value_deref());
    assert_eq!(obj.rc(), 0);
}

#[test]
fn value_ref_is_a_no_op_for_inline_variants() {
    let v = Value::Int(5);
    v.value_ref();
    assert!(!v.value_deref());
}

#[test]
fn type_name_labels_every_variant() {
    assert_eq!(Value::None.type_name(), "none");
    assert_eq!(Value::Bool(true).type_name(), "bool");
    assert_eq!(Value::Int(1).type_name(), "int");
    assert_eq!(Value::Double(1.0).type_name(), "double");
    assert_eq!(Value::new_str("x".to_string()).type_name(), "str");
    assert_eq!(Value::Error.type_name(), "error");
}

#[test]
fn display_string_renders_scalars_and_strings() {
    assert_eq!(Value::Int(42).display_string(), "42");
    assert_eq!(Value::Bool(false).display_string(), "false");
    assert_eq!(Value::new_str("hi".to_string()).display_string(), "hi");
}

#[test]
fn int_arithmetic_wraps_and_stays_int() {
    assert!(matches!(Value::Int(3).add(&Value::Int(4)), Value::Int(7)));
    assert!(matches!(Value::Int(i32::MAX).add(&Value::Int(1)), Value::Int(i32::MIN)));
    assert!(matches!(Value::Int(6).sub(&Value::Int(2)), Value::Int(4)));
    assert!(matches!(Value::Int(3).mul(&Value::Int(3)), Value::Int(9)));
}

#[test]
fn int_division_truncates_to_double() {
    match Value::Int(7).div(&Value::Int(2)) {
        Value::Double(d) => assert!((d - 3.5).abs() < f64::EPSILON),
        other => panic!("expected Double, got {other:?}"),
    }
}

#[test]
fn division_by_zero_is_error() {
    assert!(matches!(Value::Int(1).div(&Value::Int(0)), Value::Error));
    assert!(matches!(Value::Double(1.0).div(&Value::Int(0)), Value::Error));
}

#[test]
fn mod_only_accepts_int_int() {
    assert!(matches!(Value::Int(7).rem(&Value::Int(2)), Value::Int(1)));
    assert!(matches!(Value::Int(7).rem(&Value::Int(0)), Value::Error));
    assert!(matches!(Value::Int(7).rem(&Value::Double(2.0)), Value::Error));
    assert!(matches!(Value::Double(7.0).rem(&Value::Double(2.0)), Value::Error));
}

#[test]
fn string_concatenation_via_add() {
    let result = Value::new_str("foo".to_string()).add(&Value::new_str("bar".to_string()));
    assert_eq!(result.display_string(), "foobar");
}

#[test]
fn incompatible_operands_return_error() {
    assert!(matches!(Value::Bool(true).add(&Value::Int(1)), Value::Error));
    assert!(matches!(Value::new_str("a".to_string()).sub(&Value::Int(1)), Value::Error));
}

#[test]
fn numeric_comparisons_coerce_int_double_pairs() {
    assert!(matches!(Value::Int(1).lt_value(&Value::Double(1.5)), Value::Bool(true)));
    assert!(matches!(Value::Double(2.0).gt_value(&Value::Int(1)), Value::Bool(true)));
    assert!(matches!(Value::Int(2).leq_value(&Value::Int(2)), Value::Bool(true)));
    assert!(matches!(Value::Int(3).geq_value(&Value::Int(4)), Value::Bool(false)));
}

#[test]
fn comparisons_on_incomparable_types_are_error() {
    assert!(matches!(Value::Bool(true).lt_value(&Value::Int(1)), Value::Error));
}

#[test]
fn eq_value_handles_each_comparable_pair_and_neq_inverts() {
    assert!(matches!(Value::Int(1).eq_value(&Value::Double(1.0)), Value::Bool(true)));
    assert!(matches!(Value::None.eq_value(&Value::None), Value::Bool(true)));
    assert!(matches!(
        Value::new_str("a".to_string()).eq_value(&Value::new_str("a".to_string())),
        Value::Bool(true)
    ));
    assert!(matches!(Value::Int(1).neq_value(&Value::Int(2)), Value::Bool(true)));
    assert!(matches!(Value::Bool(true).neq_value(&Value::Int(1)), Value::Error));
}
