mod common;

use common::run;

#[test]
fn multi_dispatch_resolves_by_the_first_argument_class() {
    let src = r#"
        struct Cat;
        struct Dog;

        func (self: Cat) speak() {
            return "meow";
        }

        func (self: Dog) speak() {
            return "woof";
        }

        let c = new Cat;
        let d = new Dog;
        print speak(c);
        print speak(d);
    "#;
    let (_, out) = run(src).unwrap();
    assert_eq!(out, "meow\nwoof\n");
}

#[test]
fn class_fields_are_only_reachable_through_the_owning_class_methods() {
    let src = r#"
        struct Counter { n }

        func (self: Counter) init() {
            @n = 0;
        }

        func (self: Counter) inc() {
            @n = @n + 1;
        }

        func (self: Counter) get() {
            return @n;
        }

        let counter = new Counter;
        init(counter);
        inc(counter);
        inc(counter);
        inc(counter);
        print get(counter);
    "#;
    let (_, out) = run(src).unwrap();
    assert_eq!(out, "3\n");
}

#[test]
fn dispatch_falls_back_to_the_non_class_overload_for_unhandled_classes() {
    let src = r#"
        struct Widget;
        struct Other;

        func (self: Widget) describe() {
            return "widget";
        }

        func describe(x) {
            return "fallback";
        }

        let w = new Widget;
        let o = new Other;
        print describe(w);
        print describe(o);
    "#;
    let (_, out) = run(src).unwrap();
    assert_eq!(out, "widget\nfallback\n");
}
