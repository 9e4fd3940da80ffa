mod common;

use common::run;

#[test]
fn recursive_function_computes_a_factorial() {
    let src = r#"
        func fact(n) {
            if (n <= 1) {
                return 1;
            }
            return n * fact(n - 1);
        }
        print fact(5);
    "#;
    let (_, out) = run(src).unwrap();
    assert_eq!(out, "120\n");
}

#[test]
fn a_call_site_may_precede_the_function_it_names() {
    let src = r#"
        print greet();

        func greet() {
            return "hello";
        }
    "#;
    let (_, out) = run(src).unwrap();
    assert_eq!(out, "hello\n");
}

#[test]
fn mutual_recursion_between_two_forward_declared_functions() {
    let src = r#"
        func is_even(n) {
            if (n == 0) {
                return true;
            }
            return is_odd(n - 1);
        }
        func is_odd(n) {
            if (n == 0) {
                return false;
            }
            return is_even(n - 1);
        }
        print is_even(10);
        print is_odd(10);
    "#;
    let (_, out) = run(src).unwrap();
    assert_eq!(out, "true\nfalse\n");
}
