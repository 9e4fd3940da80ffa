//! Shared harness for the end-to-end tests: parse a script, run it to
//! completion on a fresh `ThreadLocal`, and return both its final value and
//! everything written through the print sink.

use std::cell::RefCell;
use std::rc::Rc;

use ember_core::heap::VmConfig;
use ember_core::resolver::{FsResolver, ModuleResolver};
use ember_core::value::Value;
use ember_core::{exec_main, parse, RuntimeError, ThreadLocal};

#[allow(dead_code)]
pub fn run(src: &str) -> Result<(Value, String), RuntimeError> {
    run_in(src, ".".to_string(), Box::new(FsResolver))
}

#[allow(dead_code)]
pub fn run_in(
    src: &str,
    cwd: String,
    resolver: Box<dyn ModuleResolver>,
) -> Result<(Value, String), RuntimeError> {
    let program = parse(src, "test.ember".to_string(), cwd)
        .unwrap_or_else(|e| panic!("parse error: {e}"));

    let buf = Rc::new(RefCell::new(String::new()));
    let sink = buf.clone();
    let print_fn = Box::new(move |v: &Value| sink.borrow_mut().push_str(&v.display_string()));
    let raw_sink = buf.clone();
    let print_raw_fn = Box::new(move |s: &str| raw_sink.borrow_mut().push_str(s));
    let mut tl = ThreadLocal::with_raw_sink(VmConfig::default(), resolver, print_fn, print_raw_fn);

    let result = exec_main(&mut tl, program)?;
    let out = buf.borrow().clone();
    Ok((result, out))
}
