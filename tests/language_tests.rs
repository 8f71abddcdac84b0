use junco::error::Diagnostics;
use junco::interpreter::Interpreter;
use junco::parser::Parser;
use junco::resolver::Resolver;
use junco::scanner;

// Run a program through the full pipeline with a fresh interpreter and
// return the lines it printed.
fn run(code: &str) -> Result<Vec<String>, String> {
    let mut sink = Diagnostics::new();
    let tokens = scanner::scan_tokens(code, &mut sink);
    let mut parser = Parser::new(tokens, false, &mut sink);
    let statements = parser.parse();
    let mut interpreter = Interpreter::default();
    Resolver::new(&mut interpreter, &mut sink).resolve(&statements);
    if sink.had_error {
        return Err(sink.messages().join("\n"));
    }
    match interpreter.interpret(&statements) {
        Ok(()) => Ok(interpreter.output),
        Err(err) => Err(err.to_string()),
    }
}

fn expect_output(code: &str, expected: &[&str]) {
    match run(code) {
        Ok(output) => assert_eq!(output, expected),
        Err(err) => panic!("{}", err),
    }
}

#[test]
fn arithmetic_and_precedence() {
    expect_output("print 1 + 2 * 3;", &["7"]);
}

#[test]
fn lexical_resolution_is_fixed_at_declaration() {
    expect_output(
        "var a = \"global\";\n\
         {\n\
           fun show() { print a; }\n\
           show();\n\
           var a = \"block\";\n\
           show();\n\
           print a;\n\
         }",
        &["global", "global", "block"],
    );
}

#[test]
fn inheritance_and_super() {
    expect_output(
        "class A { hi() { print \"A\"; } }\n\
         class B < A { hi() { super.hi(); print \"B\"; } }\n\
         B().hi();",
        &["A", "B"],
    );
}

#[test]
fn for_continue_preserves_increment() {
    expect_output(
        "for (var i = 0; i < 3; i = i + 1) { if (i == 1) continue; print i; }",
        &["0", "2"],
    );
}

#[test]
fn initializer_returns_instance_despite_naked_return() {
    expect_output(
        "class P { init(x) { this.x = x; return; } }\n\
         print P(7).x;",
        &["7"],
    );
}

#[test]
fn runtime_error_stops_execution() {
    let mut sink = Diagnostics::new();
    let source = "print \"ok\"; print 1 / 0; print \"unreached\";";
    let tokens = scanner::scan_tokens(source, &mut sink);
    let mut parser = Parser::new(tokens, false, &mut sink);
    let statements = parser.parse();
    let mut interpreter = Interpreter::default();
    Resolver::new(&mut interpreter, &mut sink).resolve(&statements);
    assert!(!sink.had_error);

    let err = interpreter.interpret(&statements).unwrap_err();
    sink.runtime_error(&err);

    assert_eq!(interpreter.output, vec!["ok"]);
    assert!(sink.had_runtime_error);
    assert!(sink.messages().last().unwrap().contains("Division by zero"));
}

#[test]
fn closures_outlive_their_scope() {
    expect_output(
        "var counter = nil;\n\
         {\n\
           var i = 10;\n\
           counter = fun () { i = i + 1; return i; };\n\
         }\n\
         print counter();\n\
         print counter();",
        &["11", "12"],
    );
}

#[test]
fn break_exits_only_the_innermost_loop() {
    expect_output(
        "var total = 0;\n\
         for (var i = 1; i <= 3; i = i + 1) {\n\
           while (true) { total = total + i; break; }\n\
         }\n\
         print total;",
        &["6"],
    );
}

#[test]
fn ternary_and_comma() {
    expect_output(
        "var grade = 91 >= 90 ? \"A\" : \"B\";\n\
         print grade;\n\
         print (1, 2, 3);",
        &["A", "3"],
    );
}

#[test]
fn methods_bind_this_across_handles() {
    expect_output(
        "class Counter {\n\
           init() { this.count = 0; }\n\
           bump() { this.count = this.count + 1; return this.count; }\n\
         }\n\
         var c = Counter();\n\
         var bump = c.bump;\n\
         bump();\n\
         bump();\n\
         print c.count;",
        &["2"],
    );
}

#[test]
fn inherited_initializer_runs_for_subclass() {
    expect_output(
        "class Base { init(x) { this.x = x; } }\n\
         class Derived < Base {}\n\
         print Derived(5).x;",
        &["5"],
    );
}

#[test]
fn stringify_builtin_matches_print_forms() {
    expect_output(
        "class Foo {}\n\
         print stringify(Foo) + \"/\" + stringify(Foo()) + \"/\" + stringify(2.5);",
        &["Foo/Foo instance/2.5"],
    );
}

#[test]
fn static_errors_veto_execution() {
    let err = run("return 1;").unwrap_err();
    assert!(err.contains("Can't return from top-level code."));
}

#[test]
fn lexical_error_still_parses_rest() {
    let err = run("print 1; @").unwrap_err();
    assert!(err.contains("Unexpected character."));
}
