use super::parse;

fn parse_ok(src: &str) -> crate::program::Program {
    parse(src, "test.lang".to_string(), ".".to_string()).expect("parse should succeed")
}

#[test]
fn empty_program_halts_cleanly() {
    let program = parse_ok("");
    assert!(!program.main.bc.is_empty(), "main always ends with RET_NULL");
}

#[test]
fn arithmetic_expression_compiles() {
    let program = parse_ok("let x = 1 + 2 * 3;");
    assert_eq!(program.main.num_locals, 1);
}

#[test]
fn function_declaration_is_resolved() {
    let program = parse_ok(
        r#"
        func add(a, b) {
            return a + b;
        }
        let r = add(1, 2);
        "#,
    );
    assert_eq!(program.data.fns.len(), 1);
    assert!(!program.data.fns[0].is_placeholder());
    assert_eq!(program.data.fns[0].num_args(), 2);
}

#[test]
fn forward_reference_resolves_by_end_of_parse() {
    let program = parse_ok(
        r#"
        func caller() {
            return callee();
        }
        func callee() {
            return 1;
        }
        "#,
    );
    for f in &program.data.fns {
        assert!(!f.is_placeholder());
    }
}

#[test]
fn unresolved_forward_reference_is_unknown_function() {
    let err = parse("let x = never_defined();".to_string().as_str(), "t".into(), ".".into())
        .unwrap_err();
    assert!(matches!(err, crate::error::ParseError::UnknownFunction(_)));
}

#[test]
fn class_declaration_registers_fields() {
    let program = parse_ok("struct Point { x, y }");
    assert_eq!(program.data.classes.len(), 1);
    let iface = program.data.classes[0].as_ref().unwrap();
    assert_eq!(iface.field_index("x"), Some(0));
    assert_eq!(iface.field_index("y"), Some(1));
}

#[test]
fn duplicate_class_is_an_error() {
    let err = parse(
        "struct Point { x, y }\nstruct Point { x }",
        "t".into(),
        ".".into(),
    )
    .unwrap_err();
    assert!(matches!(err, crate::error::ParseError::DuplicateClass(_)));
}

#[test]
fn multi_dispatch_merges_same_named_functions() {
    let program = parse_ok(
        r#"
        struct Cat;
        struct Dog;
        func (self: Cat) speak() { return 1; }
        func (self: Dog) speak() { return 2; }
        "#,
    );
    let disp = program
        .data
        .fns
        .iter()
        .find(|f| matches!(f, crate::function::Function::Dispatch { .. }))
        .expect("expected a merged dispatch entry");
    if let crate::function::Function::Dispatch { instances, .. } = disp {
        assert_eq!(instances.len(), 2);
    }
}

#[test]
fn array_and_index_assignment_compile() {
    let program = parse_ok("let a = [1, 2, 3]; a[0] = 9;");
    assert_eq!(program.main.num_locals, 1);
}

#[test]
fn if_else_and_while_compile_without_panicking() {
    parse_ok(
        r#"
        let i = 0;
        while (i < 10) {
            if (i == 5) {
                print i;
            } else {
                i = i + 1;
            }
        }
        "#,
    );
}
