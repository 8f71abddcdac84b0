use std::env;
use std::fs;
use std::process;

use junco::error::Diagnostics;
use junco::interpreter::Interpreter;
use junco::parser::Parser;
use junco::repl;
use junco::resolver::Resolver;
use junco::scanner;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    match args.len() {
        1 => repl::run(),
        2 => run_file(&args[1]),
        _ => {
            eprintln!("Usage: junco [script]");
            process::exit(64);
        }
    }
}

fn run_file(path: &str) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Could not read {}: {}", path, err);
            process::exit(66);
        }
    };

    let mut interpreter: Interpreter = Default::default();
    let mut sink = Diagnostics::new();

    let tokens = scanner::scan_tokens(&source, &mut sink);
    let mut parser = Parser::new(tokens, false, &mut sink);
    let statements = parser.parse();
    Resolver::new(&mut interpreter, &mut sink).resolve(&statements);

    // Scan, parse and resolve diagnostics all veto execution.
    if !sink.had_error {
        if let Err(err) = interpreter.interpret(&statements) {
            sink.runtime_error(&err);
        }
    }

    if sink.had_runtime_error {
        process::exit(70);
    }
    if sink.had_error {
        process::exit(65);
    }
}
