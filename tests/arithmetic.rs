mod common;

use common::run;

#[test]
fn integer_arithmetic_over_locals() {
    let src = r#"
        let a = 6;
        let b = 3;
        print a + b;
        print a - b;
        print a * b;
        print a % b;
    "#;
    let (_, out) = run(src).unwrap();
    assert_eq!(out, "9\n3\n18\n0\n");
}

#[test]
fn division_always_yields_a_double() {
    let (_, out) = run("print 6 / 3;").unwrap();
    assert_eq!(out, "2\n");

    let (_, out) = run("print 7 / 2;").unwrap();
    assert_eq!(out, "3.5\n");
}

#[test]
fn compound_assignment_updates_a_local_in_place() {
    let src = r#"
        let x = 5;
        x += 3;
        x *= 2;
        print x;
    "#;
    let (_, out) = run(src).unwrap();
    assert_eq!(out, "16\n");
}

#[test]
fn string_concatenation_and_comparison() {
    let (_, out) = run(r#"print "foo" + "bar";"#).unwrap();
    assert_eq!(out, "foobar\n");

    let (_, out) = run("print 4 > 3;").unwrap();
    assert_eq!(out, "true\n");

    let (_, out) = run("print !false;").unwrap();
    assert_eq!(out, "true\n");
}

#[test]
fn comma_separated_print_joins_values_with_a_space() {
    let (_, out) = run("print 42, 10;").unwrap();
    assert_eq!(out, "42 10\n");
}

#[test]
fn division_by_zero_raises_a_runtime_error() {
    let err = run("let z = 1 / 0; print z;").unwrap_err();
    assert!(matches!(err, ember_core::RuntimeError::IncompatBinOp { .. }));
}
