//! Exercises cross-module linking: `main.ember` imports `lib.ember` under an
//! alias and calls two of its exported functions, resolved against the real
//! filesystem through `FsResolver` rather than an in-memory stand-in.

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use ember_core::heap::VmConfig;
use ember_core::resolver::FsResolver;
use ember_core::value::Value;
use ember_core::{exec_main, parse, ThreadLocal};

#[test]
fn calling_exported_functions_across_an_aliased_import() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/imports");
    let main_path = dir.join("main.ember");
    let source = fs::read_to_string(&main_path).expect("fixture script must exist");

    let program = parse(
        &source,
        main_path.to_string_lossy().into_owned(),
        dir.to_string_lossy().into_owned(),
    )
    .unwrap_or_else(|e| panic!("parse error: {e}"));

    let buf = Rc::new(RefCell::new(String::new()));
    let sink = buf.clone();
    let print_fn = Box::new(move |v: &Value| sink.borrow_mut().push_str(&v.display_string()));
    let raw_sink = buf.clone();
    let print_raw_fn = Box::new(move |s: &str| raw_sink.borrow_mut().push_str(s));
    let mut tl =
        ThreadLocal::with_raw_sink(VmConfig::default(), Box::new(FsResolver), print_fn, print_raw_fn);

    exec_main(&mut tl, program).unwrap_or_else(|e| panic!("runtime error: {e}"));

    assert_eq!(buf.borrow().as_str(), "36\nhi bob\n");
}
