//! Runtime entry point.
//!
//! Usage: `ember <script>`. Reads the source file, parses it, and runs it
//! to completion on a freshly-constructed [`ThreadLocal`] using the
//! filesystem-backed [`FsResolver`] for `import` and a stdout print sink.

use std::env;
use std::fs;
use std::process;

use ember_core::heap::VmConfig;
use ember_core::resolver::FsResolver;
use ember_core::value::Value;
use ember_core::{exec_main, parse, ThreadLocal};

fn usage() -> String {
    "Usage: ember <script>".to_string()
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("{}", usage());
        process::exit(1);
    }
    let path = &args[1];

    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to read '{path}': {e}");
            process::exit(1);
        }
    };

    let abspath = fs::canonicalize(path).unwrap_or_else(|_| path.into());
    let cwd = abspath
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string());

    let program = match parse(&source, abspath.to_string_lossy().into_owned(), cwd) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("parse error: {e}");
            process::exit(1);
        }
    };

    let print_fn = Box::new(|v: &Value| print!("{}", v.display_string()));
    let mut tl = ThreadLocal::new(VmConfig::default(), Box::new(FsResolver), print_fn);

    if let Err(e) = exec_main(&mut tl, program) {
        eprintln!("runtime error: {e}");
        process::exit(1);
    }
}
