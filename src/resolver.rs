use std::collections::HashMap;

use log::debug;

use crate::error::Diagnostics;
use crate::expr::{ClassDecl, Expr, ExprId, FunDecl, LambdaDecl, Stmt, Symbol};
use crate::interpreter::Interpreter;

/// Static pass between the parser and the evaluator. Walks the AST with a
/// stack of lexical scopes, records the depth of every local variable
/// reference in the interpreter's side-table, and diagnoses scope misuses.
/// Globals live outside the stack and never get a depth entry. The AST is
/// never mutated.
pub struct Resolver<'a> {
    interpreter: &'a mut Interpreter,
    sink: &'a mut Diagnostics,
    scopes: Vec<HashMap<String, Binding>>,
    current_function: FunctionType,
    current_class: ClassType,
}

struct Binding {
    name: Symbol,
    kind: BindingKind,
    state: BindingState,
}

/// What a scope entry names. Only plain values participate in the
/// unused-variable warning.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
enum BindingKind {
    Value,
    Function,
    Class,
    Method,
    /// `this` and `super`, pre-seeded into class scopes.
    Reserved,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
enum BindingState {
    Declared,
    Defined,
    Used,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
enum FunctionType {
    None,
    Function,
    Method,
    Initializer,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
enum ClassType {
    None,
    Class,
}

impl<'a> Resolver<'a> {
    pub fn new(interpreter: &'a mut Interpreter, sink: &'a mut Diagnostics) -> Resolver<'a> {
        Resolver {
            interpreter,
            sink,
            scopes: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
        }
    }

    pub fn resolve(&mut self, statements: &[Stmt]) {
        for statement in statements {
            self.resolve_stmt(statement);
        }
    }

    fn resolve_stmt(&mut self, statement: &Stmt) {
        match statement {
            Stmt::Expr(expression) => self.resolve_expr(expression),
            Stmt::Print(expression) => self.resolve_expr(expression),
            Stmt::VarDecl(name, initializer) => {
                self.declare(name, BindingKind::Value);
                if let Some(initializer) = initializer {
                    self.resolve_expr(initializer);
                }
                self.define(name);
            }
            Stmt::Block(statements) => {
                self.begin_scope();
                self.resolve(statements);
                self.end_scope();
            }
            Stmt::If(condition, then_branch, else_branch) => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch);
                }
            }
            Stmt::While(condition, body) => {
                self.resolve_expr(condition);
                self.resolve_stmt(body);
            }
            Stmt::Break(_) => {}
            Stmt::Continue(_, _) => {}
            Stmt::FunDecl(declaration) => {
                self.declare(&declaration.name, BindingKind::Function);
                self.define(&declaration.name);
                self.resolve_function(declaration, FunctionType::Function);
            }
            Stmt::Return(location, value) => {
                if self.current_function == FunctionType::None {
                    self.sink
                        .error_at(location.line, "return", "Can't return from top-level code.");
                }
                if let Some(value) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.sink.error_at(
                            location.line,
                            "return",
                            "Can't return a value from an initializer.",
                        );
                    }
                    self.resolve_expr(value);
                }
            }
            Stmt::ClassDecl(declaration) => self.resolve_class(declaration),
        }
    }

    fn resolve_class(&mut self, declaration: &ClassDecl) {
        self.declare(&declaration.name, BindingKind::Class);
        self.define(&declaration.name);

        let enclosing_class = self.current_class;
        self.current_class = ClassType::Class;

        if let Some((id, superclass)) = &declaration.superclass {
            if superclass.name == declaration.name.name {
                self.error(superclass, "A class can't inherit from itself.");
            }
            self.resolve_local(*id, &superclass.name);
        }

        if declaration.superclass.is_some() {
            self.begin_scope();
            self.insert_reserved("super", declaration.name.line);
        }

        self.begin_scope();
        self.insert_reserved("this", declaration.name.line);

        for method in &declaration.methods {
            self.declare(&method.name, BindingKind::Method);
            self.define(&method.name);
            let ty = if method.name.name == "init" {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };
            self.resolve_function(method, ty);
        }

        self.end_scope();
        if declaration.superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
    }

    fn resolve_function(&mut self, declaration: &FunDecl, ty: FunctionType) {
        let enclosing_function = self.current_function;
        self.current_function = ty;
        self.resolve_lambda(&declaration.lambda);
        self.current_function = enclosing_function;
    }

    fn resolve_lambda(&mut self, lambda: &LambdaDecl) {
        self.begin_scope();
        for param in &lambda.params {
            self.declare(param, BindingKind::Value);
            self.define(param);
        }
        self.resolve(&lambda.body);
        self.end_scope();
    }

    fn resolve_expr(&mut self, expression: &Expr) {
        match expression {
            Expr::Literal(_) => {}
            Expr::Unary(_, right) => self.resolve_expr(right),
            Expr::Binary(left, _, right) => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Logical(left, _, right) => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Ternary(condition, then_branch, else_branch) => {
                self.resolve_expr(condition);
                self.resolve_expr(then_branch);
                self.resolve_expr(else_branch);
            }
            Expr::Grouping(inner) => self.resolve_expr(inner),
            Expr::Variable(id, name) => {
                let in_own_initializer = self
                    .scopes
                    .last()
                    .and_then(|scope| scope.get(&name.name))
                    .map_or(false, |binding| binding.state == BindingState::Declared);
                if in_own_initializer {
                    self.error(name, "Can't read local variable in its own initializer.");
                }
                self.resolve_local(*id, &name.name);
            }
            Expr::Assign(id, name, value) => {
                self.resolve_expr(value);
                self.resolve_local(*id, &name.name);
            }
            Expr::Call(callee, _, arguments) => {
                self.resolve_expr(callee);
                for argument in arguments {
                    self.resolve_expr(argument);
                }
            }
            Expr::Get(object, _) => self.resolve_expr(object),
            Expr::Set(object, _, value) => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }
            Expr::This(id, location) => {
                if self.current_class == ClassType::None {
                    self.sink.error_at(
                        location.line,
                        "this",
                        "Can't use 'this' outside of a class.",
                    );
                }
                self.resolve_local(*id, "this");
            }
            Expr::Super(id, location, _) => {
                if self.current_class == ClassType::None {
                    self.sink.error_at(
                        location.line,
                        "super",
                        "Can't use 'super' outside of a class.",
                    );
                }
                self.resolve_local(*id, "super");
            }
            Expr::Lambda(lambda) => {
                let enclosing_function = self.current_function;
                self.current_function = FunctionType::Function;
                self.resolve_lambda(lambda);
                self.current_function = enclosing_function;
            }
        }
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Anything still unused at scope close, if it is a plain value, earns a
    /// warning. Warnings never set the sink's error flag.
    fn end_scope(&mut self) {
        let scope = self
            .scopes
            .pop()
            .expect("internal resolver error: popped an empty scope stack");
        for binding in scope.values() {
            if binding.state != BindingState::Used && binding.kind == BindingKind::Value {
                self.sink
                    .warn_at(binding.name.line, &binding.name.name, "Unused variable.");
            }
        }
    }

    fn declare(&mut self, name: &Symbol, kind: BindingKind) {
        if self.scopes.is_empty() {
            return;
        }
        let duplicate = self
            .scopes
            .last()
            .map_or(false, |scope| scope.contains_key(&name.name));
        if duplicate {
            self.error(name, "Already a variable with this name in this scope.");
            return;
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                name.name.clone(),
                Binding {
                    name: name.clone(),
                    kind,
                    state: BindingState::Declared,
                },
            );
        }
    }

    fn define(&mut self, name: &Symbol) {
        if let Some(scope) = self.scopes.last_mut() {
            if let Some(binding) = scope.get_mut(&name.name) {
                binding.state = BindingState::Defined;
            }
        }
    }

    fn insert_reserved(&mut self, name: &str, line: usize) {
        let scope = self
            .scopes
            .last_mut()
            .expect("internal resolver error: no scope for reserved name");
        scope.insert(
            name.to_string(),
            Binding {
                name: Symbol {
                    name: name.to_string(),
                    line,
                },
                kind: BindingKind::Reserved,
                state: BindingState::Defined,
            },
        );
    }

    /// Walks the scope stack innermost-out; the first scope that binds the
    /// name fixes the reference's depth. No match means the reference is a
    /// global and gets no side-table entry.
    fn resolve_local(&mut self, id: ExprId, name: &str) {
        let innermost = self.scopes.len();
        for (i, scope) in self.scopes.iter_mut().enumerate().rev() {
            if let Some(binding) = scope.get_mut(name) {
                binding.state = BindingState::Used;
                let depth = innermost - 1 - i;
                debug!("resolved '{}' at depth {}", name, depth);
                self.interpreter.resolve(id, depth);
                return;
            }
        }
    }

    fn error(&mut self, name: &Symbol, message: &str) {
        self.sink.error_at(name.line, &name.name, message);
    }
}

#[cfg(test)]
mod tests {
    use super::Resolver;
    use crate::error::Diagnostics;
    use crate::interpreter::Interpreter;
    use crate::parser::Parser;
    use crate::scanner;

    fn resolve(source: &str) -> Diagnostics {
        let mut sink = Diagnostics::new();
        let tokens = scanner::scan_tokens(source, &mut sink);
        let mut parser = Parser::new(tokens, false, &mut sink);
        let statements = parser.parse();
        assert!(!sink.had_error, "unexpected parse error: {:?}", sink.messages());
        let mut interpreter = Interpreter::default();
        Resolver::new(&mut interpreter, &mut sink).resolve(&statements);
        sink
    }

    fn expect_error(source: &str, expected: &str) {
        let sink = resolve(source);
        assert!(sink.had_error);
        assert!(
            sink.messages().iter().any(|m| m.contains(expected)),
            "expected {:?} in {:?}",
            expected,
            sink.messages()
        );
    }

    #[test]
    fn variable_referenced_in_own_initializer() {
        expect_error(
            "{ var a = 1; { var a = a; } }",
            "Can't read local variable in its own initializer.",
        );
    }

    #[test]
    fn duplicate_declaration_in_scope() {
        expect_error(
            "fun f() { var a = 1; var a = 2; print a; }",
            "Already a variable with this name in this scope.",
        );
    }

    #[test]
    fn top_level_return() {
        expect_error("return 1;", "Can't return from top-level code.");
    }

    #[test]
    fn return_value_from_initializer() {
        expect_error(
            "class Foo { init() { return 1; } }",
            "Can't return a value from an initializer.",
        );
    }

    #[test]
    fn naked_return_from_initializer_is_fine() {
        let sink = resolve("class Foo { init() { return; } }");
        assert!(!sink.had_error);
    }

    #[test]
    fn this_outside_class() {
        expect_error("print this;", "Can't use 'this' outside of a class.");
    }

    #[test]
    fn super_outside_class() {
        expect_error(
            "fun f() { return super.g(); }",
            "Can't use 'super' outside of a class.",
        );
    }

    #[test]
    fn class_inheriting_from_itself() {
        expect_error("class Oops < Oops {}", "A class can't inherit from itself.");
    }

    #[test]
    fn unused_variable_warns_without_error() {
        let sink = resolve("{ var unused = 1; }");
        assert!(!sink.had_error);
        assert!(sink
            .messages()
            .iter()
            .any(|m| m.contains("WARNING") && m.contains("Unused variable.")));
    }

    #[test]
    fn used_variable_does_not_warn() {
        let sink = resolve("{ var a = 1; print a; }");
        assert!(!sink.had_error);
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn unused_function_name_does_not_warn() {
        let sink = resolve("{ fun helper() { return 1; } }");
        assert!(!sink.had_error);
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn globals_are_not_warned() {
        let sink = resolve("var a = 1;");
        assert!(!sink.had_error);
        assert!(sink.messages().is_empty());
    }
}
