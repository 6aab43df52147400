//! Tree-walking evaluator for scripts, modules and script functions.

use std::rc::Rc;

use log::debug;

use super::Throw;
use super::ast::{
    BinaryOp, ExportDecl, Expr, FunctionBody, FunctionDef, LogicalOp, Program, PropertyName, Stmt, UnaryOp, VarKind,
};
use super::lexer::SyntaxError;
use super::module::ModuleDef;
use super::object::{ExoticObject, FunctionKind, Object, ObjectData};
use super::parser::parse_script;
use super::runtime::{ErrorKind, Runtime};
use super::value::{CheapClone, JsString, JsValue, Property, PropertyKey};

/// Binding name used for the value of `export default <expr>`.
pub(crate) const DEFAULT_EXPORT_BINDING: &str = "*default*";

enum Completion {
    Normal,
    Return(JsValue),
}

/// Evaluation state of one function, script or module body.
struct Frame<'a> {
    rt: &'a Runtime,
    /// Innermost lexical scope.
    scope: Object,
    /// Receiver of `var` declarations; `None` at script top level, where
    /// they become global object properties.
    var_scope: Option<Object>,
    this: JsValue,
    module: Option<ModuleDef>,
    /// Value of the last expression statement, for script results.
    completion: JsValue,
}

impl Runtime {
    /// Convert a parse failure into a thrown `SyntaxError`.
    pub fn syntax_error(&self, err: &SyntaxError) -> Throw {
        self.throw_error(ErrorKind::SyntaxError, &err.message)
    }

    /// Evaluate a classic script in the global scope and return its
    /// completion value.
    pub fn eval_script(&self, source: &str, filename: &str) -> Result<JsValue, Throw> {
        self.check_terminated()?;
        let program = parse_script(source).map_err(|e| {
            debug!("{}:{}:{}: {}", filename, e.line, e.column, e.message);
            self.syntax_error(&e)
        })?;
        self.with_stack_base(|| self.run_program(&program))
    }

    /// Evaluate `source`, which must consist of a single function
    /// expression, and return the function object.
    pub fn compile_function(&self, source: &str, filename: &str) -> Result<JsValue, Throw> {
        self.check_terminated()?;
        let program = parse_script(source).map_err(|e| {
            debug!("{}:{}:{}: {}", filename, e.line, e.column, e.message);
            self.syntax_error(&e)
        })?;
        if !matches!(program.body.as_slice(), [Stmt::Expr(Expr::Function(_))]) {
            return Err(self.throw_error(ErrorKind::SyntaxError, "Function body must not close the function"));
        }
        self.with_stack_base(|| self.run_program(&program))
    }

    fn run_program(&self, program: &Program) -> Result<JsValue, Throw> {
        let mut frame = Frame {
            rt: self,
            scope: self.0.realm.global_scope.cheap_clone(),
            var_scope: None,
            this: JsValue::Object(self.global().cheap_clone()),
            module: None,
            completion: JsValue::Undefined,
        };
        frame.hoist_functions(&program.body)?;
        for stmt in &program.body {
            if let Completion::Return(value) = frame.exec(stmt)? {
                return Ok(value);
            }
        }
        let result = std::mem::take(&mut frame.completion);
        drop(frame);
        self.maybe_gc();
        Ok(result)
    }
}

/// Run the body of a text module inside its module scope. Imports are bound
/// from the already evaluated dependencies first.
pub(crate) fn run_module_body(
    rt: &Runtime,
    module: &ModuleDef,
    program: &Program,
    env: &Object,
) -> Result<Vec<(JsString, JsValue)>, Throw> {
    rt.with_stack_base(|| module_body(rt, module, program, env))
}

fn module_body(
    rt: &Runtime,
    module: &ModuleDef,
    program: &Program,
    env: &Object,
) -> Result<Vec<(JsString, JsValue)>, Throw> {
    let mut frame = Frame {
        rt,
        scope: env.cheap_clone(),
        var_scope: Some(env.cheap_clone()),
        this: JsValue::Undefined,
        module: Some(module.clone()),
        completion: JsValue::Undefined,
    };

    for stmt in &program.body {
        if let Stmt::Import(import) = stmt {
            let dep = module.requested(&import.source).ok_or_else(|| {
                rt.throw_error(
                    ErrorKind::ReferenceError,
                    &format!("Module '{}' has not been linked", import.source),
                )
            })?;
            if let Some(local) = &import.default {
                let value = dep.export_value(rt, "default")?;
                frame.bind(local, value, false)?;
            }
            if let Some(local) = &import.namespace {
                let ns = dep.namespace(rt);
                frame.bind(local, JsValue::Object(ns), false)?;
            }
            for (imported, local) in &import.named {
                let value = dep.export_value(rt, imported.as_str())?;
                frame.bind(local, value, false)?;
            }
        }
    }

    frame.hoist_functions(&program.body)?;
    for stmt in &program.body {
        frame.exec(stmt)?;
    }

    let mut exports = Vec::new();
    for stmt in &program.body {
        let Stmt::Export(decl) = stmt else { continue };
        match decl {
            ExportDecl::Declaration(inner) => {
                for name in declared_names(inner) {
                    let value = frame.lookup(&name)?;
                    exports.push((name, value));
                }
            }
            ExportDecl::Default(_) => {
                let value = frame.lookup(&JsString::from(DEFAULT_EXPORT_BINDING))?;
                exports.push((JsString::from("default"), value));
            }
            ExportDecl::Named(names) => {
                for (local, exported) in names {
                    exports.push((exported.cheap_clone(), frame.lookup(local)?));
                }
            }
            ExportDecl::From { source, names } => {
                let Some(dep) = module.requested(source) else { continue };
                if names.is_empty() {
                    for (name, value) in dep.exports() {
                        if name.as_str() != "default" {
                            exports.push((name, value));
                        }
                    }
                } else {
                    for (imported, exported) in names {
                        exports.push((exported.cheap_clone(), dep.export_value(rt, imported.as_str())?));
                    }
                }
            }
        }
    }
    Ok(exports)
}

/// Invoke a script function with a fresh activation scope.
pub(crate) fn call_script_function(
    rt: &Runtime,
    def: &Rc<FunctionDef>,
    scope: &Object,
    this: JsValue,
    args: Vec<JsValue>,
    module: Option<ModuleDef>,
) -> Result<JsValue, Throw> {
    let env = new_scope(rt, scope);
    let mut frame = Frame {
        rt,
        scope: env.cheap_clone(),
        var_scope: Some(env),
        this,
        module,
        completion: JsValue::Undefined,
    };
    let mut args = args.into_iter();
    for param in &def.params {
        let value = args.next().unwrap_or_default();
        frame.bind(param, value, true)?;
    }
    match &def.body {
        FunctionBody::Expr(expr) => frame.eval(expr),
        FunctionBody::Block(body) => {
            frame.hoist_functions(body)?;
            for stmt in body {
                if let Completion::Return(value) = frame.exec(stmt)? {
                    return Ok(value);
                }
            }
            Ok(JsValue::Undefined)
        }
    }
}

fn new_scope(rt: &Runtime, parent: &Object) -> Object {
    rt.alloc(ObjectData::new(Some(parent.cheap_clone()), ExoticObject::Environment))
}

fn declared_names(stmt: &Stmt) -> Vec<JsString> {
    match stmt {
        Stmt::Declaration { declarations, .. } => declarations.iter().map(|(n, _)| n.cheap_clone()).collect(),
        Stmt::Function(def) => def.name.iter().cloned().collect(),
        _ => Vec::new(),
    }
}

fn is_environment(obj: &Object) -> bool {
    matches!(obj.borrow().exotic, ExoticObject::Environment)
}

impl Frame<'_> {
    // ------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------

    /// Create a binding in the innermost scope.
    fn bind(&mut self, name: &JsString, value: JsValue, writable: bool) -> Result<(), Throw> {
        let key = PropertyKey::from(name.cheap_clone());
        if self.scope.has_own_property(&key) {
            return Err(self.rt.throw_error(
                ErrorKind::SyntaxError,
                &format!("Identifier '{}' has already been declared", name),
            ));
        }
        self.scope
            .define_own_property(key, Property::with_flags(value, writable, true, false));
        Ok(())
    }

    fn declare_var(&mut self, name: &JsString, value: Option<JsValue>) -> Result<(), Throw> {
        let key = PropertyKey::from(name.cheap_clone());
        match &self.var_scope {
            Some(scope) => {
                if value.is_some() || !scope.has_own_property(&key) {
                    scope.define_own_property(
                        key,
                        Property::with_flags(value.unwrap_or_default(), true, true, false),
                    );
                }
            }
            None => {
                let global = self.rt.global().cheap_clone();
                match value {
                    Some(value) => {
                        self.rt.set(&global, key, value)?;
                    }
                    None => {
                        if !self.rt.has_own_property(&global, &key)? {
                            self.rt.set(&global, key, JsValue::Undefined)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Scope object holding `name`, if any. Falls through to the global object.
    fn resolve(&self, key: &PropertyKey) -> Result<Option<Object>, Throw> {
        let mut current = Some(self.scope.cheap_clone());
        while let Some(scope) = current {
            if !is_environment(&scope) {
                break;
            }
            if scope.has_own_property(key) {
                return Ok(Some(scope));
            }
            current = scope.prototype();
        }
        let global = self.rt.global();
        if self.rt.has_property(global, key)? {
            return Ok(Some(global.cheap_clone()));
        }
        Ok(None)
    }

    fn lookup(&self, name: &JsString) -> Result<JsValue, Throw> {
        let key = PropertyKey::from(name.cheap_clone());
        match self.resolve(&key)? {
            Some(scope) if is_environment(&scope) => {
                Ok(scope.get_own_property(&key).map(|p| p.value).unwrap_or_default())
            }
            Some(global) => self.rt.get(&global, &key),
            None => Err(self
                .rt
                .throw_error(ErrorKind::ReferenceError, &format!("{} is not defined", name))),
        }
    }

    fn assign(&mut self, name: &JsString, value: JsValue) -> Result<(), Throw> {
        let key = PropertyKey::from(name.cheap_clone());
        match self.resolve(&key)? {
            Some(scope) if is_environment(&scope) => {
                let Some(prop) = scope.get_own_property(&key) else {
                    return Ok(());
                };
                if !prop.writable {
                    return Err(self.rt.type_error("Assignment to constant variable."));
                }
                scope.define_own_property(key, Property::with_flags(value, true, prop.enumerable, false));
                Ok(())
            }
            Some(global) => {
                self.rt.set(&global, key, value)?;
                Ok(())
            }
            None => {
                let global = self.rt.global().cheap_clone();
                self.rt.set(&global, key, value)?;
                Ok(())
            }
        }
    }

    fn make_function(&self, def: &Rc<FunctionDef>) -> Object {
        let name = def.name.clone().unwrap_or_else(|| JsString::from(""));
        self.rt.new_function(
            name,
            FunctionKind::Script {
                def: def.cheap_clone(),
                scope: self.scope.cheap_clone(),
                this: def.arrow.then(|| self.this.clone()),
                module: self.module.clone(),
            },
            !def.arrow,
        )
    }

    /// Instantiate function declarations before the body runs.
    fn hoist_functions(&mut self, body: &[Stmt]) -> Result<(), Throw> {
        for stmt in body {
            let def = match stmt {
                Stmt::Function(def) => def,
                Stmt::Export(ExportDecl::Declaration(inner)) => match inner.as_ref() {
                    Stmt::Function(def) => def,
                    _ => continue,
                },
                _ => continue,
            };
            if let Some(name) = &def.name {
                let func = self.make_function(def);
                self.declare_var(name, Some(JsValue::Object(func)))?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn exec(&mut self, stmt: &Stmt) -> Result<Completion, Throw> {
        self.rt.check_terminated()?;
        self.rt.check_stack()?;
        match stmt {
            Stmt::Expr(expr) => {
                self.completion = self.eval(expr)?;
                Ok(Completion::Normal)
            }
            Stmt::Declaration { kind, declarations } => {
                for (name, init) in declarations {
                    let value = match init {
                        Some(expr) => Some(self.eval(expr)?),
                        None => None,
                    };
                    match kind {
                        VarKind::Var => self.declare_var(name, value)?,
                        VarKind::Let => self.bind(name, value.unwrap_or_default(), true)?,
                        VarKind::Const => self.bind(name, value.unwrap_or_default(), false)?,
                    }
                }
                Ok(Completion::Normal)
            }
            // Hoisted
            Stmt::Function(_) | Stmt::Import(_) | Stmt::Empty => Ok(Completion::Normal),
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(e) => self.eval(e)?,
                    None => JsValue::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Stmt::Throw(expr) => {
                let value = self.eval(expr)?;
                Err(Throw::new(value))
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.to_boolean() {
                    self.exec(consequent)
                } else if let Some(alt) = alternate {
                    self.exec(alt)
                } else {
                    Ok(Completion::Normal)
                }
            }
            Stmt::While { test, body } => {
                while self.eval(test)?.to_boolean() {
                    if let Completion::Return(v) = self.exec(body)? {
                        return Ok(Completion::Return(v));
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::Block(body) => self.exec_block(body, None),
            Stmt::Try {
                block,
                param,
                handler,
                finalizer,
            } => {
                let mut result = self.exec_block(block, None);
                if let (Err(err), Some(handler)) = (&result, handler)
                    && !err.uncatchable
                {
                    let binding = param.as_ref().map(|p| (p.cheap_clone(), err.value.clone()));
                    result = self.exec_block(handler, binding);
                }
                if let Some(finalizer) = finalizer {
                    match self.exec_block(finalizer, None)? {
                        Completion::Normal => {}
                        ret @ Completion::Return(_) => return Ok(ret),
                    }
                }
                result
            }
            Stmt::Export(decl) => match decl {
                ExportDecl::Declaration(inner) => self.exec(inner),
                ExportDecl::Default(expr) => {
                    let value = self.eval(expr)?;
                    self.bind(&JsString::from(DEFAULT_EXPORT_BINDING), value, false)?;
                    Ok(Completion::Normal)
                }
                ExportDecl::Named(_) | ExportDecl::From { .. } => Ok(Completion::Normal),
            },
        }
    }

    fn exec_block(&mut self, body: &[Stmt], binding: Option<(JsString, JsValue)>) -> Result<Completion, Throw> {
        let parent = self.scope.cheap_clone();
        let outer = std::mem::replace(&mut self.scope, new_scope(self.rt, &parent));
        let result = (|| -> Result<Completion, Throw> {
            if let Some((name, value)) = binding {
                self.bind(&name, value, true)?;
            }
            self.hoist_functions(body)?;
            for stmt in body {
                if let Completion::Return(v) = self.exec(stmt)? {
                    return Ok(Completion::Return(v));
                }
            }
            Ok(Completion::Normal)
        })();
        self.scope = outer;
        result
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn eval(&mut self, expr: &Expr) -> Result<JsValue, Throw> {
        self.rt.check_stack()?;
        match expr {
            Expr::Number(n) => Ok(JsValue::Number(*n)),
            Expr::BigInt(n) => Ok(JsValue::BigInt(*n)),
            Expr::String(s) => Ok(JsValue::String(s.cheap_clone())),
            Expr::Boolean(b) => Ok(JsValue::Boolean(*b)),
            Expr::Null => Ok(JsValue::Null),
            Expr::This => Ok(self.this.clone()),
            Expr::Ident(name) => {
                if name.as_str() == "undefined" {
                    return Ok(JsValue::Undefined);
                }
                self.lookup(name)
            }
            Expr::Array(elements) => {
                let values = elements.iter().map(|e| self.eval(e)).collect::<Result<Vec<_>, _>>()?;
                Ok(JsValue::Object(self.rt.new_array(values)))
            }
            Expr::Object(props) => {
                let obj = self.rt.new_object();
                for (name, value_expr) in props {
                    let key = match name {
                        PropertyName::Ident(name) => PropertyKey::from_string(name.cheap_clone()),
                        PropertyName::Computed(e) => {
                            let k = self.eval(e)?;
                            self.rt.to_property_key(&k)?
                        }
                    };
                    let value = self.eval(value_expr)?;
                    obj.define_own_property(key, Property::data(value));
                }
                Ok(JsValue::Object(obj))
            }
            Expr::Function(def) => Ok(JsValue::Object(self.make_function(def))),
            Expr::Unary(op, operand) => self.eval_unary(*op, operand),
            Expr::Binary(op, left, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                binary(self.rt, *op, &l, &r)
            }
            Expr::Logical(op, left, right) => {
                let l = self.eval(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !l.to_boolean(),
                    LogicalOp::Or => l.to_boolean(),
                    LogicalOp::Nullish => !l.is_nullish(),
                };
                if short_circuit { Ok(l) } else { self.eval(right) }
            }
            Expr::Conditional(test, then, otherwise) => {
                if self.eval(test)?.to_boolean() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Assign { op, target, value } => self.eval_assign(*op, target, value),
            Expr::Member(object, name) => {
                let base = self.eval(object)?;
                self.rt.get_value(&base, &PropertyKey::from_string(name.cheap_clone()))
            }
            Expr::Index(object, index) => {
                let base = self.eval(object)?;
                let key = self.eval(index)?;
                let key = self.rt.to_property_key(&key)?;
                self.rt.get_value(&base, &key)
            }
            Expr::Call(callee, args) => {
                let (func, this) = match callee.as_ref() {
                    Expr::Member(object, name) => {
                        let base = self.eval(object)?;
                        let func = self.rt.get_value(&base, &PropertyKey::from_string(name.cheap_clone()))?;
                        (func, base)
                    }
                    Expr::Index(object, index) => {
                        let base = self.eval(object)?;
                        let key = self.eval(index)?;
                        let key = self.rt.to_property_key(&key)?;
                        (self.rt.get_value(&base, &key)?, base)
                    }
                    other => (self.eval(other)?, JsValue::Undefined),
                };
                let args = self.eval_args(args)?;
                if !func.is_callable() {
                    return Err(self
                        .rt
                        .type_error(&format!("{} is not a function", describe_callee(callee))));
                }
                self.rt.call(&func, this, args)
            }
            Expr::New(callee, args) => {
                let ctor = self.eval(callee)?;
                let args = self.eval_args(args)?;
                match &ctor {
                    JsValue::Object(obj) if obj.is_constructor() => self.rt.construct(obj, args, None),
                    _ => Err(self
                        .rt
                        .type_error(&format!("{} is not a constructor", describe_callee(callee)))),
                }
            }
            Expr::ImportCall(specifier) => {
                let specifier = self.eval(specifier)?;
                let promise = match self.rt.to_string(&specifier) {
                    Ok(s) => self.rt.dynamic_import(s.as_str(), self.module.as_ref())?,
                    Err(err) if err.uncatchable => return Err(err),
                    Err(err) => self.rt.promise_reject(err.value),
                };
                Ok(JsValue::Object(promise))
            }
            Expr::ImportMeta => match &self.module {
                Some(module) => Ok(JsValue::Object(module.import_meta(self.rt))),
                None => Err(self
                    .rt
                    .throw_error(ErrorKind::SyntaxError, "Cannot use 'import.meta' outside a module")),
            },
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<JsValue>, Throw> {
        args.iter().map(|a| self.eval(a)).collect()
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<JsValue, Throw> {
        if op == UnaryOp::Typeof
            && let Expr::Ident(name) = operand
            && self.resolve(&PropertyKey::from(name.cheap_clone()))?.is_none()
        {
            return Ok(JsValue::from("undefined"));
        }
        let value = self.eval(operand)?;
        match op {
            UnaryOp::Neg => match value {
                JsValue::BigInt(n) => Ok(JsValue::BigInt(-n)),
                other => Ok(JsValue::Number(-self.rt.to_number(&other)?)),
            },
            UnaryOp::Plus => Ok(JsValue::Number(self.rt.to_number(&value)?)),
            UnaryOp::Not => Ok(JsValue::Boolean(!value.to_boolean())),
            UnaryOp::Typeof => Ok(JsValue::from(value.type_of())),
            UnaryOp::Void => Ok(JsValue::Undefined),
        }
    }

    fn eval_assign(&mut self, op: Option<BinaryOp>, target: &Expr, value: &Expr) -> Result<JsValue, Throw> {
        match target {
            Expr::Ident(name) => {
                let result = match op {
                    Some(op) => {
                        let current = self.lookup(name)?;
                        let rhs = self.eval(value)?;
                        binary(self.rt, op, &current, &rhs)?
                    }
                    None => self.eval(value)?,
                };
                self.assign(name, result.clone())?;
                Ok(result)
            }
            Expr::Member(object, name) => {
                let base = self.eval(object)?;
                self.assign_property(op, base, PropertyKey::from_string(name.cheap_clone()), value)
            }
            Expr::Index(object, index) => {
                let base = self.eval(object)?;
                let key = self.eval(index)?;
                let key = self.rt.to_property_key(&key)?;
                self.assign_property(op, base, key, value)
            }
            _ => Err(self
                .rt
                .throw_error(ErrorKind::SyntaxError, "Invalid left-hand side in assignment")),
        }
    }
}

impl Frame<'_> {
    fn assign_property(
        &mut self,
        op: Option<BinaryOp>,
        base: JsValue,
        key: PropertyKey,
        value: &Expr,
    ) -> Result<JsValue, Throw> {
        let result = match op {
            Some(op) => {
                let current = self.rt.get_value(&base, &key)?;
                let rhs = self.eval(value)?;
                binary(self.rt, op, &current, &rhs)?
            }
            None => self.eval(value)?,
        };
        self.rt.set_value(&base, key, result.clone())?;
        Ok(result)
    }
}

fn describe_callee(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.to_string(),
        Expr::Member(object, name) => format!("{}.{}", describe_callee(object), name),
        Expr::This => "this".to_string(),
        Expr::Call(callee, _) => format!("{}(...)", describe_callee(callee)),
        _ => "expression".to_string(),
    }
}

/// Evaluate a binary operator on two values.
pub(crate) fn binary(rt: &Runtime, op: BinaryOp, left: &JsValue, right: &JsValue) -> Result<JsValue, Throw> {
    match op {
        BinaryOp::Add => {
            let l = rt.to_primitive(left, false)?;
            let r = rt.to_primitive(right, false)?;
            if matches!(l, JsValue::String(_)) || matches!(r, JsValue::String(_)) {
                let mut s = rt.to_string(&l)?.to_string();
                s.push_str(rt.to_string(&r)?.as_str());
                return Ok(JsValue::from(s));
            }
            numeric(rt, op, &l, &r)
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let l = rt.to_primitive(left, false)?;
            let r = rt.to_primitive(right, false)?;
            numeric(rt, op, &l, &r)
        }
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
            let l = rt.to_primitive(left, false)?;
            let r = rt.to_primitive(right, false)?;
            let ordering = match (&l, &r) {
                (JsValue::String(a), JsValue::String(b)) => Some(a.as_str().cmp(b.as_str())),
                (JsValue::BigInt(a), JsValue::BigInt(b)) => Some(a.cmp(b)),
                _ => {
                    let a = big_or_number(rt, &l)?;
                    let b = big_or_number(rt, &r)?;
                    a.partial_cmp(&b)
                }
            };
            let Some(ordering) = ordering else {
                return Ok(JsValue::Boolean(false));
            };
            Ok(JsValue::Boolean(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::LtEq => ordering.is_le(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::Eq => Ok(JsValue::Boolean(rt.loose_equals(left, right)?)),
        BinaryOp::NotEq => Ok(JsValue::Boolean(!rt.loose_equals(left, right)?)),
        BinaryOp::StrictEq => Ok(JsValue::Boolean(left.strict_equals(right))),
        BinaryOp::StrictNotEq => Ok(JsValue::Boolean(!left.strict_equals(right))),
        BinaryOp::Instanceof => Ok(JsValue::Boolean(rt.instance_of(left, right)?)),
        BinaryOp::In => {
            let JsValue::Object(obj) = right else {
                return Err(rt.type_error("Cannot use 'in' operator to search for a key in a non-object"));
            };
            let key = rt.to_property_key(left)?;
            Ok(JsValue::Boolean(rt.has_property(obj, &key)?))
        }
    }
}

fn big_or_number(rt: &Runtime, value: &JsValue) -> Result<f64, Throw> {
    match value {
        JsValue::BigInt(n) => Ok(*n as f64),
        other => rt.to_number(other),
    }
}

fn numeric(rt: &Runtime, op: BinaryOp, left: &JsValue, right: &JsValue) -> Result<JsValue, Throw> {
    match (left, right) {
        (JsValue::BigInt(a), JsValue::BigInt(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Sub => a.checked_sub(*b),
                BinaryOp::Mul => a.checked_mul(*b),
                BinaryOp::Div | BinaryOp::Mod if *b == 0 => {
                    return Err(rt.throw_error(ErrorKind::RangeError, "Division by zero"));
                }
                BinaryOp::Div => a.checked_div(*b),
                _ => a.checked_rem(*b),
            };
            result
                .map(JsValue::BigInt)
                .ok_or_else(|| rt.throw_error(ErrorKind::RangeError, "Maximum BigInt size exceeded"))
        }
        (JsValue::BigInt(_), _) | (_, JsValue::BigInt(_)) => {
            Err(rt.type_error("Cannot mix BigInt and other types, use explicit conversions"))
        }
        _ => {
            let a = rt.to_number(left)?;
            let b = rt.to_number(right)?;
            Ok(JsValue::Number(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            }))
        }
    }
}
