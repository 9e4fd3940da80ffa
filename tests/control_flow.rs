mod common;

use common::run;

#[test]
fn while_loop_accumulates_a_running_total() {
    let src = r#"
        let i = 1;
        let total = 0;
        while (i <= 5) {
            total += i;
            i += 1;
        }
        print total;
    "#;
    let (_, out) = run(src).unwrap();
    assert_eq!(out, "15\n");
}

#[test]
fn if_else_picks_the_taken_branch() {
    let src = r#"
        let x = 10;
        if (x > 5) {
            print "big";
        } else {
            print "small";
        }
    "#;
    let (_, out) = run(src).unwrap();
    assert_eq!(out, "big\n");
}

#[test]
fn else_if_chain_falls_through_to_the_matching_arm() {
    let src = r#"
        let n = 2;
        if (n == 1) {
            print "one";
        } else if (n == 2) {
            print "two";
        } else {
            print "other";
        }
    "#;
    let (_, out) = run(src).unwrap();
    assert_eq!(out, "two\n");
}

#[test]
fn nested_while_loops_multiply_their_iteration_counts() {
    let src = r#"
        let i = 0;
        let count = 0;
        while (i < 3) {
            let j = 0;
            while (j < 4) {
                count += 1;
                j += 1;
            }
            i += 1;
        }
        print count;
    "#;
    let (_, out) = run(src).unwrap();
    assert_eq!(out, "12\n");
}
