//! Tree-walking interpreter for cell scripts

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

use crate::context::{is_reserved, Bindings, OutputSink};
use crate::engine::builtins;
use crate::engine::error::{ErrorKind, ScriptError};
use crate::engine::methods::{self, normalize_index};
use crate::engine::value::Value;
use crate::parser::{
    Assignment, BinaryOp, Expr, ForLoop, FunctionDef, IfStatement, Literal, Program,
    Stmt, UnaryOp, WhileLoop,
};

/// Deepest chain of nested user-function calls
pub const MAX_CALL_DEPTH: usize = 100;

type Eval<T> = Result<T, ScriptError>;

/// How a statement finished
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Runs statements against a global scope plus a stack of function frames
pub struct Interpreter<'a> {
    globals: &'a mut Bindings,
    sink: &'a mut OutputSink,
    frames: Vec<BTreeMap<String, Value>>,
}

impl<'a> Interpreter<'a> {
    pub fn new(globals: &'a mut Bindings, sink: &'a mut OutputSink) -> Self {
        Self {
            globals,
            sink,
            frames: Vec::new(),
        }
    }

    /// Execute a whole cell; stops at the first error
    pub fn run(&mut self, program: &Program) -> Eval<()> {
        match self.exec_block(&program.statements)? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => Err(misplaced("'return' outside function")),
            Flow::Break => Err(misplaced("'break' outside loop")),
            Flow::Continue => Err(misplaced("'continue' not properly in loop")),
        }
    }

    fn exec_block(&mut self, statements: &[Stmt]) -> Eval<Flow> {
        for stmt in statements {
            match self.exec(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> Eval<Flow> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Assign(assign) => {
                self.exec_assign(assign)?;
                Ok(Flow::Normal)
            }
            Stmt::If(if_stmt) => self.exec_if(if_stmt),
            Stmt::While(while_loop) => self.exec_while(while_loop),
            Stmt::For(for_loop) => self.exec_for(for_loop),
            Stmt::FnDef(def) => {
                self.store(&def.name, Value::Function(Arc::clone(def)))?;
                Ok(Flow::Normal)
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
        }
    }

    fn exec_if(&mut self, if_stmt: &IfStatement) -> Eval<Flow> {
        for (condition, body) in &if_stmt.branches {
            if self.eval(condition)?.is_truthy() {
                return self.exec_block(body);
            }
        }
        match &if_stmt.else_body {
            Some(body) => self.exec_block(body),
            None => Ok(Flow::Normal),
        }
    }

    fn exec_while(&mut self, while_loop: &WhileLoop) -> Eval<Flow> {
        while self.eval(&while_loop.condition)?.is_truthy() {
            match self.exec_block(&while_loop.body)? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal | Flow::Continue => {}
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_for(&mut self, for_loop: &ForLoop) -> Eval<Flow> {
        let items = match self.eval(&for_loop.iterable)? {
            Value::List(items) => items,
            Value::Map(map) => map.into_keys().map(Value::Str).collect(),
            Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
            other => {
                return Err(ScriptError::type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )))
            }
        };

        for item in items {
            self.store(&for_loop.iterator_var, item)?;
            match self.exec_block(&for_loop.body)? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal | Flow::Continue => {}
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_assign(&mut self, assign: &Assignment) -> Eval<()> {
        let target = &assign.target;
        let mut value = self.eval(&assign.value)?;

        if target.indexes.is_empty() {
            if let Some(op) = assign.op.binary() {
                let current = self.lookup(&target.name)?;
                value = binary(op, current, value)?;
            }
            return self.store(&target.name, value);
        }

        let keys = target
            .indexes
            .iter()
            .map(|index| self.eval(index))
            .collect::<Eval<Vec<_>>>()?;

        let (last, path) = keys
            .split_last()
            .ok_or_else(|| misplaced("empty assignment target"))?;
        let slot = self
            .slot_mut(&target.name)
            .ok_or_else(|| ScriptError::undefined(&target.name))?;
        let mut container = slot;
        for key in path {
            container = index_mut(container, key)?;
        }

        if let Some(op) = assign.op.binary() {
            let current = index_value(container, last)?;
            value = binary(op, current, value)?;
        }
        set_index(container, last, value)
    }

    /// Bind a name in the innermost scope
    fn store(&mut self, name: &str, value: Value) -> Eval<()> {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value);
            return Ok(());
        }
        if is_reserved(name) {
            return Err(ScriptError::new(
                ErrorKind::NameError,
                format!("cannot assign to reserved name '{}'", name),
            ));
        }
        self.globals.insert(name, value);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Eval<Value> {
        if let Some(value) = self.frames.last().and_then(|frame| frame.get(name)) {
            return Ok(value.clone());
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        builtins::lookup(name).ok_or_else(|| ScriptError::undefined(name))
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut Value> {
        slot_in(&mut self.frames, self.globals, name)
    }

    fn eval(&mut self, expr: &Expr) -> Eval<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::None => Value::None,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(n) => Value::Int(*n),
                Literal::Float(f) => Value::Float(*f),
                Literal::Str(s) => Value::Str(s.clone()),
            }),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Eval<_>>()?,
            )),
            Expr::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let key = match self.eval(key)? {
                        Value::Str(s) => s,
                        other => {
                            return Err(ScriptError::type_error(format!(
                                "map keys must be strings, not '{}'",
                                other.type_name()
                            )))
                        }
                    };
                    map.insert(key, self.eval(value)?);
                }
                Ok(Value::Map(map))
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                unary(*op, value)
            }
            Expr::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => {
                let left = self.eval(lhs)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(rhs)
            }
            Expr::Binary {
                op: BinaryOp::Or,
                lhs,
                rhs,
            } => {
                let left = self.eval(lhs)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(rhs)
            }
            Expr::Binary { op, lhs, rhs } => {
                let left = self.eval(lhs)?;
                let right = self.eval(rhs)?;
                binary(*op, left, right)
            }
            Expr::Call { callee, args } => self.eval_call(callee, args),
            Expr::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                index_value(&object, &index)
            }
            Expr::Attr { object, name } => {
                let object = self.eval(object)?;
                methods::get_attribute(&object, name)
            }
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> Eval<Value> {
        if let Expr::Attr { object, name } = callee {
            return self.eval_method_call(object, name, args);
        }

        let function = self.eval(callee)?;
        let args = self.eval_args(args)?;
        self.call_value(function, args)
    }

    /// Method calls on a named variable (or an index into one) act on the
    /// stored value so that `xs.append(1)` is visible afterwards
    fn eval_method_call(&mut self, object: &Expr, name: &str, args: &[Expr]) -> Eval<Value> {
        if let Some((root, path)) = place_of(object) {
            let keys = path
                .iter()
                .map(|index| self.eval(index))
                .collect::<Eval<Vec<_>>>()?;
            let args = self.eval_args(args)?;

            if self.slot_mut(root).is_none() {
                // Builtins and undefined names
                let mut receiver = self.lookup(root)?;
                for key in &keys {
                    receiver = index_value(&receiver, key)?;
                }
                return methods::call_method(&mut receiver, name, args, self.sink);
            }

            let Interpreter {
                globals,
                sink,
                frames,
            } = self;
            let mut receiver = slot_in(frames, globals, root).ok_or_else(|| ScriptError::undefined(root))?;
            for key in &keys {
                receiver = index_mut(receiver, key)?;
            }
            return methods::call_method(receiver, name, args, sink);
        }

        let mut receiver = self.eval(object)?;
        let args = self.eval_args(args)?;
        methods::call_method(&mut receiver, name, args, self.sink)
    }

    fn eval_args(&mut self, args: &[Expr]) -> Eval<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    fn call_value(&mut self, function: Value, args: Vec<Value>) -> Eval<Value> {
        match function {
            Value::Builtin(builtin) => (builtin.func)(self.sink, args),
            Value::Function(def) => self.call_function(&def, args),
            Value::Type(name) => Err(ScriptError::type_error(format!(
                "cannot create '{}' objects from a script",
                name
            ))),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(&mut self, def: &FunctionDef, args: Vec<Value>) -> Eval<Value> {
        if args.len() != def.params.len() {
            return Err(ScriptError::type_error(format!(
                "{}() takes {} argument{} but {} were given",
                def.name,
                def.params.len(),
                if def.params.len() == 1 { "" } else { "s" },
                args.len()
            )));
        }
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(ScriptError::new(
                ErrorKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }

        trace!(function = %def.name, depth = self.frames.len() + 1, "call");
        let frame = def.params.iter().cloned().zip(args).collect();
        self.frames.push(frame);
        let result = self.exec_block(&def.body);
        self.frames.pop();

        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::None),
            Flow::Break => Err(misplaced("'break' outside loop")),
            Flow::Continue => Err(misplaced("'continue' not properly in loop")),
        }
    }
}

fn misplaced(message: &str) -> ScriptError {
    ScriptError::new(ErrorKind::SyntaxError, message)
}

/// A variable name followed by index expressions, e.g. `grid[0][1]`
fn place_of(expr: &Expr) -> Option<(&str, Vec<&Expr>)> {
    match expr {
        Expr::Name(name) => Some((name.as_str(), Vec::new())),
        Expr::Index { object, index } => {
            let (root, mut path) = place_of(object)?;
            path.push(index.as_ref());
            Some((root, path))
        }
        _ => None,
    }
}

fn slot_in<'v>(
    frames: &'v mut [BTreeMap<String, Value>],
    globals: &'v mut Bindings,
    name: &str,
) -> Option<&'v mut Value> {
    match frames.last_mut() {
        Some(frame) if frame.contains_key(name) => frame.get_mut(name),
        _ => globals.get_mut(name),
    }
}

fn type_mismatch(op: BinaryOp, left: &Value, right: &Value) -> ScriptError {
    ScriptError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op,
        left.type_name(),
        right.type_name()
    ))
}

fn unary(op: UnaryOp, value: Value) -> Eval<Value> {
    match (op, value) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Neg, Value::Int(n)) => n.checked_neg().map(Value::Int).ok_or_else(ScriptError::overflow),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, other) => Err(ScriptError::type_error(format!(
            "bad operand type for unary -: '{}'",
            other.type_name()
        ))),
    }
}

/// Longest string `str * int` will build, in bytes
pub const MAX_STR_REPEAT_LEN: usize = 100_000_000;

/// Longest list `list * int` will build
pub const MAX_LIST_REPEAT_LEN: usize = builtins::MAX_RANGE_LEN as usize;

/// Clamp a repeat count to zero and check the resulting length against `limit`
fn repeat_count(unit: usize, n: i64, limit: usize) -> Eval<usize> {
    let count = usize::try_from(n.max(0)).map_err(|_| ScriptError::overflow())?;
    if unit == 0 {
        return Ok(0);
    }
    match unit.checked_mul(count) {
        Some(total) if total <= limit => Ok(count),
        _ => Err(ScriptError::new(
            ErrorKind::OverflowError,
            "repeated sequence is too large",
        )),
    }
}

fn checked(result: Option<i64>) -> Eval<Value> {
    result.map(Value::Int).ok_or_else(ScriptError::overflow)
}

/// Evaluate a non-short-circuit binary operator
pub fn binary(op: BinaryOp, left: Value, right: Value) -> Eval<Value> {
    use BinaryOp::*;

    match op {
        Or => Ok(if left.is_truthy() { left } else { right }),
        And => Ok(if left.is_truthy() { right } else { left }),
        Eq => Ok(Value::Bool(left == right)),
        Ne => Ok(Value::Bool(left != right)),
        Lt | Le | Gt | Ge => {
            let ordering = left.compare(&right).ok_or_else(|| {
                ScriptError::type_error(format!(
                    "'{}' not supported between '{}' and '{}'",
                    op,
                    left.type_name(),
                    right.type_name()
                ))
            })?;
            Ok(Value::Bool(match op {
                Lt => ordering.is_lt(),
                Le => ordering.is_le(),
                Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        In => contains(&right, &left).map(Value::Bool),
        Add => match (left, right) {
            (Value::Int(a), Value::Int(b)) => checked(a.checked_add(b)),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (a, b) => float_op(op, &a, &b, |x, y| x + y),
        },
        Sub => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => checked(a.checked_sub(*b)),
            (a, b) => float_op(op, a, b, |x, y| x - y),
        },
        Mul => match (left, right) {
            (Value::Int(a), Value::Int(b)) => checked(a.checked_mul(b)),
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
                let count = repeat_count(s.len(), n, MAX_STR_REPEAT_LEN)?;
                Ok(Value::Str(s.repeat(count)))
            }
            (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
                let count = repeat_count(items.len(), n, MAX_LIST_REPEAT_LEN)?;
                let mut out = Vec::with_capacity(items.len() * count);
                for _ in 0..count {
                    out.extend(items.iter().cloned());
                }
                Ok(Value::List(out))
            }
            (a, b) => float_op(op, &a, &b, |x, y| x * y),
        },
        Div => {
            let (x, y) = numbers(op, &left, &right)?;
            if y == 0.0 {
                return Err(ScriptError::division_by_zero("division by zero"));
            }
            Ok(Value::Float(x / y))
        }
        FloorDiv => match (&left, &right) {
            (Value::Int(_), Value::Int(0)) => Err(ScriptError::division_by_zero(
                "integer division or modulo by zero",
            )),
            (Value::Int(a), Value::Int(b)) => {
                let q = a.checked_div(*b).ok_or_else(ScriptError::overflow)?;
                let adjust = (a % b != 0) && ((*a < 0) != (*b < 0));
                Ok(Value::Int(if adjust { q - 1 } else { q }))
            }
            (a, b) => {
                let (x, y) = numbers(op, a, b)?;
                if y == 0.0 {
                    return Err(ScriptError::division_by_zero("float floor division by zero"));
                }
                Ok(Value::Float((x / y).floor()))
            }
        },
        Rem => match (&left, &right) {
            (Value::Int(_), Value::Int(0)) => Err(ScriptError::division_by_zero(
                "integer division or modulo by zero",
            )),
            (Value::Int(a), Value::Int(b)) => {
                let r = a.checked_rem(*b).ok_or_else(ScriptError::overflow)?;
                Ok(Value::Int(if r != 0 && ((r < 0) != (*b < 0)) { r + b } else { r }))
            }
            (a, b) => {
                let (x, y) = numbers(op, a, b)?;
                if y == 0.0 {
                    return Err(ScriptError::division_by_zero("float modulo"));
                }
                let r = x % y;
                Ok(Value::Float(if r != 0.0 && ((r < 0.0) != (y < 0.0)) { r + y } else { r }))
            }
        },
    }
}

fn numbers(op: BinaryOp, left: &Value, right: &Value) -> Eval<(f64, f64)> {
    match (left.as_f64(), right.as_f64()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(type_mismatch(op, left, right)),
    }
}

fn float_op(op: BinaryOp, left: &Value, right: &Value, f: impl Fn(f64, f64) -> f64) -> Eval<Value> {
    let (x, y) = numbers(op, left, right)?;
    Ok(Value::Float(f(x, y)))
}

fn contains(container: &Value, item: &Value) -> Eval<bool> {
    match (container, item) {
        (Value::List(items), item) => Ok(items.contains(item)),
        (Value::Map(map), Value::Str(key)) => Ok(map.contains_key(key)),
        (Value::Map(_), _) => Ok(false),
        (Value::Str(s), Value::Str(sub)) => Ok(s.contains(sub.as_str())),
        (Value::Str(_), other) => Err(ScriptError::type_error(format!(
            "'in <str>' requires a str as left operand, not '{}'",
            other.type_name()
        ))),
        (other, _) => Err(ScriptError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn list_position(items_len: usize, index: &Value) -> Eval<Option<usize>> {
    match index {
        Value::Int(i) => Ok(normalize_index(*i, items_len)),
        other => Err(ScriptError::type_error(format!(
            "indices must be integers, not '{}'",
            other.type_name()
        ))),
    }
}

fn key_error(key: &str) -> ScriptError {
    ScriptError::new(ErrorKind::KeyError, format!("'{}'", key))
}

fn map_key(index: &Value) -> Eval<&str> {
    match index {
        Value::Str(key) => Ok(key),
        other => Err(ScriptError::type_error(format!(
            "map keys must be strings, not '{}'",
            other.type_name()
        ))),
    }
}

fn index_value(object: &Value, index: &Value) -> Eval<Value> {
    match object {
        Value::List(items) => list_position(items.len(), index)?
            .map(|i| items[i].clone())
            .ok_or_else(|| ScriptError::new(ErrorKind::IndexError, "list index out of range")),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            list_position(chars.len(), index)?
                .map(|i| Value::Str(chars[i].to_string()))
                .ok_or_else(|| ScriptError::new(ErrorKind::IndexError, "string index out of range"))
        }
        Value::Map(map) => {
            let key = map_key(index)?;
            map.get(key).cloned().ok_or_else(|| key_error(key))
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn index_mut<'v>(object: &'v mut Value, index: &Value) -> Eval<&'v mut Value> {
    match object {
        Value::List(items) => {
            let position = list_position(items.len(), index)?
                .ok_or_else(|| ScriptError::new(ErrorKind::IndexError, "list index out of range"))?;
            Ok(&mut items[position])
        }
        Value::Map(map) => {
            let key = map_key(index)?;
            map.get_mut(key).ok_or_else(|| key_error(key))
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn set_index(object: &mut Value, index: &Value, value: Value) -> Eval<()> {
    match object {
        Value::List(items) => {
            let position = list_position(items.len(), index)?.ok_or_else(|| {
                ScriptError::new(ErrorKind::IndexError, "list assignment index out of range")
            })?;
            items[position] = value;
            Ok(())
        }
        Value::Map(map) => {
            let key = map_key(index)?;
            map.insert(key.to_string(), value);
            Ok(())
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}
