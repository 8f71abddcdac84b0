use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::expr::{
    BinaryOp, BinaryOpTy, Expr, ExprId, Literal, LogicalOp, LoopKind, SourceLocation, Stmt,
    Symbol, UnaryOpTy,
};

static INIT: &str = "init";

pub trait Callable {
    fn arity(&self) -> usize;
    fn call(&self, interpreter: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError>;
}

#[derive(Clone)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub callable: fn(&mut Interpreter, &[Value]) -> Result<Value, RuntimeError>,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

impl Callable for NativeFunction {
    fn arity(&self) -> usize {
        self.arity
    }
    fn call(&self, interpreter: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
        (self.callable)(interpreter, &args)
    }
}

pub struct Function {
    pub name: String,
    pub params: Vec<Symbol>,
    pub body: Rc<Vec<Stmt>>,
    pub closure: Environment,
    pub is_initializer: bool,
}

// Closures routinely form reference cycles (a method's closure binds the
// class that owns the method), so Debug stays shallow.
impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Function({})", self.name)
    }
}

impl Function {
    /// A bound method: the same function with a one-frame environment
    /// extension mapping `this` to the instance.
    fn bind(&self, instance: Value) -> Rc<Function> {
        let closure = self.closure.new_child();
        closure.define("this", instance);
        Rc::new(Function {
            name: self.name.clone(),
            params: self.params.clone(),
            body: Rc::clone(&self.body),
            closure,
            is_initializer: self.is_initializer,
        })
    }
}

impl Callable for Rc<Function> {
    fn arity(&self) -> usize {
        self.params.len()
    }

    fn call(&self, interpreter: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let environment = self.closure.new_child();
        for (param, arg) in self.params.iter().zip(args.into_iter()) {
            environment.define(&param.name, arg);
        }

        let flow = interpreter.execute_block(&self.body, environment)?;

        // An initializer hands back its bound `this` whether the body ran to
        // completion or hit a naked `return`.
        if self.is_initializer {
            return Ok(self.closure.get_at(0, "this"));
        }

        match flow {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Nil),
        }
    }
}

pub struct Class {
    pub name: String,
    pub superclass: Option<Rc<Class>>,
    pub methods: HashMap<String, Rc<Function>>,
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Class({})", self.name)
    }
}

impl Class {
    pub fn find_method(&self, name: &str) -> Option<Rc<Function>> {
        if let Some(method) = self.methods.get(name) {
            return Some(Rc::clone(method));
        }
        match &self.superclass {
            Some(superclass) => superclass.find_method(name),
            None => None,
        }
    }
}

impl Callable for Rc<Class> {
    fn arity(&self) -> usize {
        match self.find_method(INIT) {
            Some(initializer) => initializer.params.len(),
            None => 0,
        }
    }

    fn call(&self, interpreter: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let instance = Value::Instance(Rc::new(RefCell::new(Instance {
            class: Rc::clone(self),
            fields: HashMap::new(),
        })));

        if let Some(initializer) = self.find_method(INIT) {
            initializer.bind(instance.clone()).call(interpreter, args)?;
        }

        Ok(instance)
    }
}

pub struct Instance {
    pub class: Rc<Class>,
    pub fields: HashMap<String, Value>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Instance({})", self.class.name)
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Str(String),
    NativeFunction(NativeFunction),
    Function(Rc<Function>),
    Class(Rc<Class>),
    Instance(Rc<RefCell<Instance>>),
}

// nil equals only nil; same-typed values compare structurally; callables,
// classes and instances compare by identity; mixed types are never equal.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::NativeFunction(a), Value::NativeFunction(b)) => a.name == b.name,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (_, _) => false,
        }
    }
}

fn as_callable(value: &Value) -> Option<Box<dyn Callable>> {
    match value {
        Value::NativeFunction(native) => Some(Box::new(native.clone())),
        Value::Function(function) => Some(Box::new(Rc::clone(function))),
        Value::Class(class) => Some(Box::new(Rc::clone(class))),
        _ => None,
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Nil => false,
        Value::Bool(b) => *b,
        _ => true,
    }
}

pub fn stringify(value: &Value) -> String {
    match value {
        Value::Nil => String::from("nil"),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            let text = n.to_string();
            match text.strip_suffix(".0") {
                Some(stripped) => stripped.to_string(),
                None => text,
            }
        }
        Value::Str(s) => s.clone(),
        Value::NativeFunction(_) => String::from("<native fn>"),
        Value::Function(function) => format!("<fn {}>", function.name),
        Value::Class(class) => class.name.clone(),
        Value::Instance(instance) => format!("{} instance", instance.borrow().class.name),
    }
}

/// Non-local control flow, threaded through `execute` instead of the error
/// channel. `Return` is caught by the calling frame, `Break` and `Continue`
/// by the nearest enclosing `while`.
#[derive(Debug)]
pub enum Flow {
    Normal,
    Break,
    Continue(LoopKind),
    Return(Value),
}

pub struct Interpreter {
    pub globals: Environment,
    env: Environment,
    locals: HashMap<ExprId, usize>,
    /// Printed lines, mirrored here so tests can assert on program output.
    pub output: Vec<String>,
    /// Set by the prompt's Ctrl-C handler; polled at loop heads.
    pub interrupted: Arc<AtomicBool>,
}

impl Default for Interpreter {
    fn default() -> Interpreter {
        let globals = Environment::global();

        globals.define(
            "clock",
            Value::NativeFunction(NativeFunction {
                name: "clock",
                arity: 0,
                callable: |_, _| {
                    let start = SystemTime::now();
                    let since_the_epoch = start.duration_since(UNIX_EPOCH).unwrap();
                    Ok(Value::Number(since_the_epoch.as_millis() as f64))
                },
            }),
        );

        globals.define(
            "stringify",
            Value::NativeFunction(NativeFunction {
                name: "stringify",
                arity: 1,
                callable: |_, args| Ok(Value::Str(stringify(&args[0]))),
            }),
        );

        Interpreter {
            env: globals.clone(),
            globals,
            locals: HashMap::new(),
            output: Vec::new(),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Interpreter {
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<(), RuntimeError> {
        self.interrupted.store(false, Ordering::Release);
        for statement in statements {
            self.execute(statement)?;
        }
        Ok(())
    }

    /// Called by the resolver: the reference with this id lives `depth`
    /// environments out from wherever it is evaluated.
    pub fn resolve(&mut self, id: ExprId, depth: usize) {
        self.locals.insert(id, depth);
    }

    fn execute(&mut self, statement: &Stmt) -> Result<Flow, RuntimeError> {
        match statement {
            Stmt::Expr(expression) => {
                self.evaluate(expression)?;
                Ok(Flow::Normal)
            }
            Stmt::Print(expression) => {
                let value = self.evaluate(expression)?;
                let text = stringify(&value);
                println!("{}", text);
                self.output.push(text);
                Ok(Flow::Normal)
            }
            Stmt::VarDecl(name, initializer) => {
                let value = match initializer {
                    Some(expression) => self.evaluate(expression)?,
                    None => Value::Nil,
                };
                self.env.define(&name.name, value);
                Ok(Flow::Normal)
            }
            Stmt::Block(statements) => {
                let environment = self.env.new_child();
                self.execute_block(statements, environment)
            }
            Stmt::If(condition, then_branch, else_branch) => {
                if is_truthy(&self.evaluate(condition)?) {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While(condition, body) => {
                while is_truthy(&self.evaluate(condition)?) {
                    if self.interrupted.load(Ordering::Acquire) {
                        break;
                    }
                    match self.execute(body)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        Flow::Continue(kind) => self.run_for_increment(kind, body)?,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break(_) => Ok(Flow::Break),
            Stmt::Continue(_, kind) => Ok(Flow::Continue(*kind)),
            Stmt::FunDecl(declaration) => {
                let function = Function {
                    name: declaration.name.name.clone(),
                    params: declaration.lambda.params.clone(),
                    body: Rc::new(declaration.lambda.body.clone()),
                    closure: self.env.clone(),
                    is_initializer: false,
                };
                self.env
                    .define(&declaration.name.name, Value::Function(Rc::new(function)));
                Ok(Flow::Normal)
            }
            Stmt::Return(_, value) => {
                let value = match value {
                    Some(expression) => self.evaluate(expression)?,
                    None => Value::Nil,
                };
                Ok(Flow::Return(value))
            }
            Stmt::ClassDecl(declaration) => {
                let superclass = match &declaration.superclass {
                    Some((id, name)) => {
                        let value = self.lookup_variable(*id, name)?;
                        match value {
                            Value::Class(class) => Some(class),
                            _ => {
                                return Err(RuntimeError::new(
                                    name.line,
                                    "Superclass must be a class.",
                                ))
                            }
                        }
                    }
                    None => None,
                };

                self.env.define(&declaration.name.name, Value::Nil);

                // Methods close over an extra frame binding `super` when a
                // superclass exists; `this` goes one frame further in at
                // bind time, which is the depth layout the resolver assumed.
                let enclosing = self.env.clone();
                if let Some(superclass) = &superclass {
                    self.env = self.env.new_child();
                    self.env
                        .define("super", Value::Class(Rc::clone(superclass)));
                }

                let mut methods = HashMap::new();
                for method in &declaration.methods {
                    let function = Function {
                        name: method.name.name.clone(),
                        params: method.lambda.params.clone(),
                        body: Rc::new(method.lambda.body.clone()),
                        closure: self.env.clone(),
                        is_initializer: method.name.name == INIT,
                    };
                    methods.insert(method.name.name.clone(), Rc::new(function));
                }

                let class = Class {
                    name: declaration.name.name.clone(),
                    superclass,
                    methods,
                };

                self.env = enclosing;
                self.env
                    .assign(&declaration.name, Value::Class(Rc::new(class)))?;
                Ok(Flow::Normal)
            }
        }
    }

    /// `continue` in a loop desugared from `for` still owes the increment.
    /// The increment is the last statement of the desugared body block; it
    /// re-runs inside a one-statement block so its variable references
    /// resolve at the same depth as in normal flow.
    fn run_for_increment(&mut self, kind: LoopKind, body: &Stmt) -> Result<(), RuntimeError> {
        if kind != LoopKind::For {
            return Ok(());
        }
        if let Stmt::Block(statements) = body {
            if let Some(increment) = statements.last() {
                self.execute(&Stmt::Block(vec![increment.clone()]))?;
            }
        }
        Ok(())
    }

    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Environment,
    ) -> Result<Flow, RuntimeError> {
        let previous = std::mem::replace(&mut self.env, environment);

        let mut flow = Flow::Normal;
        for statement in statements {
            match self.execute(statement) {
                Ok(Flow::Normal) => {}
                Ok(other) => {
                    flow = other;
                    break;
                }
                Err(error) => {
                    self.env = previous;
                    return Err(error);
                }
            }
        }

        self.env = previous;
        Ok(flow)
    }

    fn evaluate(&mut self, expression: &Expr) -> Result<Value, RuntimeError> {
        match expression {
            Expr::Literal(literal) => Ok(Interpreter::literal_value(literal)),
            Expr::Grouping(inner) => self.evaluate(inner),
            Expr::Unary(op, right) => {
                let value = self.evaluate(right)?;
                match op.ty {
                    UnaryOpTy::Minus => match value {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        _ => Err(RuntimeError::new(op.line, "Operand must be a number.")),
                    },
                    UnaryOpTy::Bang => Ok(Value::Bool(!is_truthy(&value))),
                }
            }
            Expr::Binary(left, op, right) => self.evaluate_binary(left, *op, right),
            Expr::Logical(left, LogicalOp::Or, right) => {
                let left = self.evaluate(left)?;
                if is_truthy(&left) {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }
            Expr::Logical(left, LogicalOp::And, right) => {
                let left = self.evaluate(left)?;
                if !is_truthy(&left) {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }
            Expr::Ternary(condition, then_branch, else_branch) => {
                if is_truthy(&self.evaluate(condition)?) {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }
            Expr::Variable(id, name) => self.lookup_variable(*id, name),
            Expr::Assign(id, name, value) => {
                let value = self.evaluate(value)?;
                match self.locals.get(id) {
                    Some(depth) => self.env.assign_at(*depth, name, value.clone()),
                    None => self.globals.assign(name, value.clone())?,
                }
                Ok(value)
            }
            Expr::Call(callee, paren, arguments) => self.evaluate_call(callee, paren, arguments),
            Expr::Get(object, name) => {
                let value = self.evaluate(object)?;
                match value {
                    Value::Instance(instance) => Interpreter::get_property(&instance, name),
                    _ => Err(RuntimeError::new(
                        name.line,
                        "Only class instances have properties.",
                    )),
                }
            }
            Expr::Set(object, name, value) => {
                let object = self.evaluate(object)?;
                match object {
                    Value::Instance(instance) => {
                        let value = self.evaluate(value)?;
                        instance
                            .borrow_mut()
                            .fields
                            .insert(name.name.clone(), value.clone());
                        Ok(value)
                    }
                    _ => Err(RuntimeError::new(
                        name.line,
                        "Only class instances have fields.",
                    )),
                }
            }
            Expr::This(id, location) => {
                self.lookup_variable(*id, &Interpreter::this_symbol(location.line))
            }
            Expr::Super(id, location, method) => self.evaluate_super(*id, location, method),
            Expr::Lambda(declaration) => {
                let function = Function {
                    name: String::from("lambda"),
                    params: declaration.params.clone(),
                    body: Rc::new(declaration.body.clone()),
                    closure: self.env.clone(),
                    is_initializer: false,
                };
                Ok(Value::Function(Rc::new(function)))
            }
        }
    }

    fn lookup_variable(&self, id: ExprId, name: &Symbol) -> Result<Value, RuntimeError> {
        match self.locals.get(&id) {
            Some(depth) => Ok(self.env.get_at(*depth, &name.name)),
            None => self.globals.get(name),
        }
    }

    fn this_symbol(line: usize) -> Symbol {
        Symbol {
            name: String::from("this"),
            line,
        }
    }

    fn get_property(
        instance: &Rc<RefCell<Instance>>,
        name: &Symbol,
    ) -> Result<Value, RuntimeError> {
        if let Some(field) = instance.borrow().fields.get(&name.name) {
            return Ok(field.clone());
        }

        let class = Rc::clone(&instance.borrow().class);
        if let Some(method) = class.find_method(&name.name) {
            return Ok(Value::Function(
                method.bind(Value::Instance(Rc::clone(instance))),
            ));
        }

        Err(RuntimeError::new(
            name.line,
            format!("Undefined property '{}'.", name.name),
        ))
    }

    /// `super` sits at the depth the resolver recorded; `this` lives one
    /// frame further in, in the bound-method frame.
    fn evaluate_super(
        &mut self,
        id: ExprId,
        location: &SourceLocation,
        method: &Symbol,
    ) -> Result<Value, RuntimeError> {
        let depth = match self.locals.get(&id) {
            Some(depth) => *depth,
            None => {
                return Err(RuntimeError::new(
                    location.line,
                    "Can't use 'super' outside of a class.",
                ))
            }
        };

        let superclass = match self.env.get_at(depth, "super") {
            Value::Class(class) => class,
            other => panic!(
                "internal interpreter error: 'super' resolved to {:?}",
                other
            ),
        };
        let object = self.env.get_at(depth - 1, "this");

        match superclass.find_method(&method.name) {
            Some(found) => Ok(Value::Function(found.bind(object))),
            None => Err(RuntimeError::new(
                method.line,
                format!("Undefined property '{}'.", method.name),
            )),
        }
    }

    fn evaluate_call(
        &mut self,
        callee_expr: &Expr,
        paren: &SourceLocation,
        argument_exprs: &[Expr],
    ) -> Result<Value, RuntimeError> {
        let callee = self.evaluate(callee_expr)?;

        let mut arguments = Vec::with_capacity(argument_exprs.len());
        for argument in argument_exprs {
            arguments.push(self.evaluate(argument)?);
        }

        match as_callable(&callee) {
            Some(callable) => {
                if arguments.len() != callable.arity() {
                    return Err(RuntimeError::new(
                        paren.line,
                        format!(
                            "Expected {} arguments but got {}.",
                            callable.arity(),
                            arguments.len()
                        ),
                    ));
                }
                callable.call(self, arguments)
            }
            None => Err(RuntimeError::new(
                paren.line,
                "Can only call functions and class methods.",
            )),
        }
    }

    fn evaluate_binary(
        &mut self,
        left_expr: &Expr,
        op: BinaryOp,
        right_expr: &Expr,
    ) -> Result<Value, RuntimeError> {
        let left = self.evaluate(left_expr)?;

        // The comma operator evaluates and discards its left operand.
        if op.ty == BinaryOpTy::Comma {
            return self.evaluate(right_expr);
        }

        let right = self.evaluate(right_expr)?;

        match op.ty {
            BinaryOpTy::Minus | BinaryOpTy::Star | BinaryOpTy::Slash => {
                match (&left, &right) {
                    (Value::Number(a), Value::Number(b)) => match op.ty {
                        BinaryOpTy::Minus => Ok(Value::Number(a - b)),
                        BinaryOpTy::Star => Ok(Value::Number(a * b)),
                        _ => {
                            if *b == 0.0 {
                                Err(RuntimeError::new(op.line, "Division by zero"))
                            } else {
                                Ok(Value::Number(a / b))
                            }
                        }
                    },
                    _ => Err(RuntimeError::new(
                        op.line,
                        "Operands must both be a number.",
                    )),
                }
            }
            BinaryOpTy::Plus => match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
                _ => Err(RuntimeError::new(
                    op.line,
                    "Operands must be two numbers or two strings.",
                )),
            },
            BinaryOpTy::EqualEqual => Ok(Value::Bool(left == right)),
            BinaryOpTy::NotEqual => Ok(Value::Bool(left != right)),
            BinaryOpTy::Less
            | BinaryOpTy::LessEqual
            | BinaryOpTy::Greater
            | BinaryOpTy::GreaterEqual => Interpreter::compare(op, &left, &right),
            BinaryOpTy::Comma => unreachable!("comma handled before right operand evaluation"),
        }
    }

    /// Ordering comparisons accept two numbers, two strings, or `nil`
    /// against either; `nil` orders strictly below everything comparable.
    fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
        use std::cmp::Ordering;

        let ordering = match (left, right) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Nil, Value::Number(_)) | (Value::Nil, Value::Str(_)) => Some(Ordering::Less),
            (Value::Number(_), Value::Nil) | (Value::Str(_), Value::Nil) => {
                Some(Ordering::Greater)
            }
            _ => {
                return Err(RuntimeError::new(
                    op.line,
                    "Operands must both be a number or a string.",
                ))
            }
        };

        let result = match ordering {
            Some(ordering) => match op.ty {
                BinaryOpTy::Less => ordering == Ordering::Less,
                BinaryOpTy::LessEqual => ordering != Ordering::Greater,
                BinaryOpTy::Greater => ordering == Ordering::Greater,
                BinaryOpTy::GreaterEqual => ordering != Ordering::Less,
                _ => unreachable!("compare called with non-comparison operator"),
            },
            // NaN compares false against everything.
            None => false,
        };

        Ok(Value::Bool(result))
    }

    fn literal_value(literal: &Literal) -> Value {
        match literal {
            Literal::Number(n) => Value::Number(*n),
            Literal::String(s) => Value::Str(s.clone()),
            Literal::True => Value::Bool(true),
            Literal::False => Value::Bool(false),
            Literal::Nil => Value::Nil,
        }
    }
}
