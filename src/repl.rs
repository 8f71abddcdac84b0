use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::Editor;

use std::sync::atomic::Ordering;

use crate::error::Diagnostics;
use crate::expr::Stmt;
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner;

static HISTORY_FILE: &str = ".junco-history.txt";

pub fn run() {
    let mut interpreter: Interpreter = Default::default();
    let mut sink = Diagnostics::new();
    let mut rl = Editor::<()>::new();
    rl.load_history(HISTORY_FILE).ok();
    println!("{}", "junco interactive prompt. Ctrl-D exits.".bold());

    {
        let interrupt_clone = interpreter.interrupted.clone();
        ctrlc::set_handler(move || {
            interrupt_clone.store(true, Ordering::Release);
        })
        .expect("Error setting Ctrl-C handler");
    }

    let mut next_expr_id = 0;
    loop {
        match rl.readline(">> ") {
            Ok(line) => {
                rl.add_history_entry(line.as_str());
                sink.reset();

                let tokens = scanner::scan_tokens(&line, &mut sink);
                let mut parser = Parser::new(tokens, true, &mut sink).starting_at(next_expr_id);
                let mut statements = parser.parse();
                next_expr_id = parser.next_expr_id();

                // A bare trailing expression gets echoed back.
                if parser.parsed_single_expression() {
                    if let Some(Stmt::Expr(expression)) = statements.pop() {
                        statements.push(Stmt::Print(expression));
                    }
                }

                Resolver::new(&mut interpreter, &mut sink).resolve(&statements);
                if sink.had_error {
                    continue;
                }

                if let Err(err) = interpreter.interpret(&statements) {
                    sink.runtime_error(&err);
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("REPL Error: {:?}", err);
                break;
            }
        }
    }

    rl.save_history(HISTORY_FILE).ok();
}
