use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::expr::Symbol;
use crate::interpreter::Value;

/// Chained name→value scopes. Cloning an `Environment` clones the handle,
/// not the frame: closures that capture an environment observe later
/// mutations of it, and a frame outlives its syntactic scope for as long as
/// any closure holds it.
#[derive(Debug, Clone)]
pub struct Environment {
    scope: Rc<RefCell<Scope>>,
}

#[derive(Debug)]
struct Scope {
    enclosing: Option<Environment>,
    values: HashMap<String, Value>,
}

impl Environment {
    pub fn global() -> Environment {
        Environment {
            scope: Rc::new(RefCell::new(Scope {
                enclosing: None,
                values: HashMap::new(),
            })),
        }
    }

    pub fn new_child(&self) -> Environment {
        Environment {
            scope: Rc::new(RefCell::new(Scope {
                enclosing: Some(self.clone()),
                values: HashMap::new(),
            })),
        }
    }

    /// Inserts or overwrites in the current frame. Never fails.
    pub fn define(&self, name: &str, value: Value) {
        self.scope.borrow_mut().values.insert(name.to_string(), value);
    }

    /// Walks outward until the name is found.
    pub fn get(&self, name: &Symbol) -> Result<Value, RuntimeError> {
        let mut current = self.clone();
        loop {
            if let Some(value) = current.scope.borrow().values.get(&name.name) {
                return Ok(value.clone());
            }
            let enclosing = current.scope.borrow().enclosing.clone();
            match enclosing {
                Some(enclosing) => current = enclosing,
                None => {
                    return Err(RuntimeError::new(
                        name.line,
                        format!("Undefined variable '{}'.", name.name),
                    ))
                }
            }
        }
    }

    /// Walks outward and overwrites the first binding of the name; fails if
    /// the name is bound nowhere.
    pub fn assign(&self, name: &Symbol, value: Value) -> Result<(), RuntimeError> {
        let mut current = self.clone();
        loop {
            if current.scope.borrow().values.contains_key(&name.name) {
                current
                    .scope
                    .borrow_mut()
                    .values
                    .insert(name.name.clone(), value);
                return Ok(());
            }
            let enclosing = current.scope.borrow().enclosing.clone();
            match enclosing {
                Some(enclosing) => current = enclosing,
                None => {
                    return Err(RuntimeError::new(
                        name.line,
                        format!("Undefined variable '{}'.", name.name),
                    ))
                }
            }
        }
    }

    /// Reads directly from the frame `depth` links out. The resolver proved
    /// the binding exists; a miss here is an interpreter bug.
    pub fn get_at(&self, depth: usize, name: &str) -> Value {
        let frame = self.ancestor(depth);
        let scope = frame.scope.borrow();
        match scope.values.get(name) {
            Some(value) => value.clone(),
            None => panic!(
                "internal interpreter error: resolved variable '{}' missing at depth {}",
                name, depth
            ),
        }
    }

    /// Writes directly into the frame `depth` links out.
    pub fn assign_at(&self, depth: usize, name: &Symbol, value: Value) {
        let frame = self.ancestor(depth);
        frame
            .scope
            .borrow_mut()
            .values
            .insert(name.name.clone(), value);
    }

    fn ancestor(&self, depth: usize) -> Environment {
        let mut current = self.clone();
        for _ in 0..depth {
            let enclosing = current.scope.borrow().enclosing.clone();
            match enclosing {
                Some(enclosing) => current = enclosing,
                None => panic!(
                    "internal interpreter error: environment chain shorter than resolved depth {}",
                    depth
                ),
            }
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::Environment;
    use crate::expr::Symbol;
    use crate::interpreter::Value;

    fn symbol(name: &str) -> Symbol {
        Symbol {
            name: name.to_string(),
            line: 1,
        }
    }

    #[test]
    fn define_then_get() {
        let env = Environment::global();
        env.define("a", Value::Number(1.0));
        assert_eq!(env.get(&symbol("a")).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn get_walks_to_enclosing() {
        let globals = Environment::global();
        globals.define("a", Value::Number(1.0));
        let child = globals.new_child();
        assert_eq!(child.get(&symbol("a")).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn assign_fails_when_unbound() {
        let env = Environment::global();
        assert!(env.assign(&symbol("missing"), Value::Nil).is_err());
    }

    #[test]
    fn get_at_skips_shadowing_frames() {
        let globals = Environment::global();
        globals.define("a", Value::Number(1.0));
        let child = globals.new_child();
        child.define("a", Value::Number(2.0));
        assert_eq!(child.get_at(0, "a"), Value::Number(2.0));
        assert_eq!(child.get_at(1, "a"), Value::Number(1.0));
    }

    #[test]
    fn assign_at_targets_exact_frame() {
        let globals = Environment::global();
        globals.define("a", Value::Number(1.0));
        let child = globals.new_child();
        child.define("a", Value::Number(2.0));
        child.assign_at(1, &symbol("a"), Value::Number(3.0));
        assert_eq!(globals.get(&symbol("a")).unwrap(), Value::Number(3.0));
        assert_eq!(child.get_at(0, "a"), Value::Number(2.0));
    }

    #[test]
    fn mutation_is_visible_through_shared_handles() {
        let env = Environment::global();
        let alias = env.clone();
        env.define("a", Value::Number(1.0));
        alias.define("a", Value::Number(2.0));
        assert_eq!(env.get(&symbol("a")).unwrap(), Value::Number(2.0));
    }
}
