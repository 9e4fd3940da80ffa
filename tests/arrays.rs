mod common;

use common::run;

#[test]
fn array_literal_supports_indexed_read_and_write() {
    let src = r#"
        let xs = [1, 2, 3];
        print xs[0];
        print xs[1];
        print xs[2];
        xs[1] = 9;
        print xs[1];
    "#;
    let (_, out) = run(src).unwrap();
    assert_eq!(out, "1\n2\n3\n9\n");
}

#[test]
fn tuple_literal_supports_indexed_read() {
    let src = r#"
        let t = #[10, 20, 30];
        print t[0];
        print t[2];
    "#;
    let (_, out) = run(src).unwrap();
    assert_eq!(out, "10\n30\n");
}

#[test]
fn array_elements_may_hold_expressions_and_strings() {
    let src = r#"
        let a = 2;
        let b = 3;
        let xs = [a + b, "mixed", a * b];
        print xs[0];
        print xs[1];
        print xs[2];
    "#;
    let (_, out) = run(src).unwrap();
    assert_eq!(out, "5\nmixed\n6\n");
}
