//! Module records: source text modules and host-populated synthetic modules.
//!
//! A module goes through `Unlinked -> Linking -> Linked -> Evaluating ->
//! Evaluated`, or ends up `Errored` when its evaluation throws. Linking asks
//! the runtime's module loader for every static dependency; evaluation runs
//! dependencies first, then the module body.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::prelude::{IndexMap, index_map_new};

use super::Throw;
use super::ast::Program;
use super::eval::run_module_body;
use super::object::{ExoticObject, Object, ObjectData};
use super::parser::parse_module;
use super::runtime::{ErrorKind, Runtime};
use super::value::{CheapClone, JsString, JsValue, Property, PropertyKey};

/// Resolves `(specifier, referrer)` to a module. The referrer is `None` for
/// imports issued from classic scripts.
pub type ModuleLoader = Rc<dyn Fn(&Runtime, &str, Option<&ModuleDef>) -> Result<ModuleDef, Throw>>;

/// Evaluation step of a synthetic module; populates its exports.
pub type SyntheticEvaluate = Rc<dyn Fn(&Runtime, &ModuleDef) -> Result<(), Throw>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleStatus {
    Unlinked,
    Linking,
    Linked,
    Evaluating,
    Evaluated,
    Errored,
}

enum ModuleSource {
    Text(Program),
    Synthetic {
        export_names: Vec<JsString>,
        evaluate: Option<SyntheticEvaluate>,
    },
}

struct ModuleRecord {
    name: JsString,
    source: ModuleSource,
    status: Cell<ModuleStatus>,
    /// Linked dependencies keyed by specifier.
    resolved: RefCell<Vec<(JsString, ModuleDef)>>,
    exports: RefCell<IndexMap<JsString, JsValue>>,
    namespace: RefCell<Option<Object>>,
    meta: RefCell<Option<Object>>,
    error: RefCell<Option<JsValue>>,
}

/// Shared handle to a module record.
#[derive(Clone)]
pub struct ModuleDef(Rc<ModuleRecord>);

impl CheapClone for ModuleDef {}

impl ModuleDef {
    fn new(name: JsString, source: ModuleSource) -> Self {
        let mut exports = index_map_new();
        if let ModuleSource::Synthetic { export_names, .. } = &source {
            for name in export_names {
                exports.insert(name.cheap_clone(), JsValue::Undefined);
            }
        }
        ModuleDef(Rc::new(ModuleRecord {
            name,
            source,
            status: Cell::new(ModuleStatus::Unlinked),
            resolved: RefCell::new(Vec::new()),
            exports: RefCell::new(exports),
            namespace: RefCell::new(None),
            meta: RefCell::new(None),
            error: RefCell::new(None),
        }))
    }

    pub fn name(&self) -> &JsString {
        &self.0.name
    }

    pub fn status(&self) -> ModuleStatus {
        self.0.status.get()
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self.0.source, ModuleSource::Synthetic { .. })
    }

    pub fn ptr_eq(&self, other: &ModuleDef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable identity of the record.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Dependency linked for `specifier`.
    pub fn requested(&self, specifier: &JsString) -> Option<ModuleDef> {
        self.0
            .resolved
            .borrow()
            .iter()
            .find(|(s, _)| s == specifier)
            .map(|(_, m)| m.cheap_clone())
    }

    /// Snapshot of the current exports.
    pub fn exports(&self) -> Vec<(JsString, JsValue)> {
        self.0
            .exports
            .borrow()
            .iter()
            .map(|(k, v)| (k.cheap_clone(), v.clone()))
            .collect()
    }

    pub fn export_value(&self, rt: &Runtime, name: &str) -> Result<JsValue, Throw> {
        self.0.exports.borrow().get(name).cloned().ok_or_else(|| {
            rt.throw_error(
                ErrorKind::SyntaxError,
                &format!(
                    "The requested module '{}' does not provide an export named '{}'",
                    self.0.name, name
                ),
            )
        })
    }

    /// Set an export declared at creation. Returns false for unknown names
    /// and for text modules.
    pub fn set_export(&self, name: &str, value: JsValue) -> bool {
        let ModuleSource::Synthetic { export_names, .. } = &self.0.source else {
            return false;
        };
        if !export_names.iter().any(|n| n.as_str() == name) {
            return false;
        }
        self.0.exports.borrow_mut().insert(JsString::from(name), value.clone());
        let namespace = self.0.namespace.borrow().clone();
        if let Some(ns) = namespace {
            ns.define_own_property(PropertyKey::from(name), namespace_property(value));
        }
        true
    }

    /// Error recorded by a failed evaluation.
    pub fn error(&self) -> Option<JsValue> {
        self.0.error.borrow().clone()
    }

    /// The module namespace object, created on first request.
    pub fn namespace(&self, rt: &Runtime) -> Object {
        if let Some(ns) = self.0.namespace.borrow().as_ref() {
            return ns.cheap_clone();
        }
        let ns = rt.alloc(ObjectData::new(None, ExoticObject::Namespace));
        self.fill_namespace(&ns);
        *self.0.namespace.borrow_mut() = Some(ns.cheap_clone());
        ns
    }

    fn fill_namespace(&self, ns: &Object) {
        let mut names: Vec<(JsString, JsValue)> = self.exports();
        names.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        for (name, value) in names {
            ns.define_own_property(PropertyKey::from_string(name), namespace_property(value));
        }
        ns.borrow_mut().extensible = false;
    }

    /// The `import.meta` object, created on first request.
    pub fn import_meta(&self, rt: &Runtime) -> Object {
        if let Some(meta) = self.0.meta.borrow().as_ref() {
            return meta.cheap_clone();
        }
        let meta = rt.new_object_with_proto(None);
        *self.0.meta.borrow_mut() = Some(meta.cheap_clone());
        meta
    }

    fn publish(&self, exports: Vec<(JsString, JsValue)>) {
        {
            let mut map = self.0.exports.borrow_mut();
            for (name, value) in exports {
                map.insert(name, value);
            }
        }
        let namespace = self.0.namespace.borrow().clone();
        if let Some(ns) = namespace {
            ns.borrow_mut().extensible = true;
            self.fill_namespace(&ns);
        }
    }
}

fn namespace_property(value: JsValue) -> Property {
    Property::with_flags(value, true, true, false)
}

impl fmt::Debug for ModuleDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Module({}, {:?})", self.0.name, self.0.status.get())
    }
}

impl Runtime {
    /// Parse a module. Dependencies are not resolved until linking.
    pub fn compile_module(&self, name: &str, source: &str) -> Result<ModuleDef, Throw> {
        let program = parse_module(source).map_err(|e| {
            debug!("{}:{}:{}: {}", name, e.line, e.column, e.message);
            self.syntax_error(&e)
        })?;
        Ok(ModuleDef::new(JsString::from(name), ModuleSource::Text(program)))
    }

    /// A module whose exports are provided by the host. Every export starts
    /// out `undefined`.
    pub fn new_synthetic_module(
        &self,
        name: &str,
        export_names: Vec<JsString>,
        evaluate: Option<SyntheticEvaluate>,
    ) -> ModuleDef {
        ModuleDef::new(
            JsString::from(name),
            ModuleSource::Synthetic { export_names, evaluate },
        )
    }

    pub fn set_module_loader(&self, loader: Option<ModuleLoader>) {
        *self.0.module_loader.borrow_mut() = loader;
    }

    /// Module whose code is currently running.
    pub fn current_module(&self) -> Option<ModuleDef> {
        self.0.module_stack.borrow().last().cloned()
    }

    fn load_module(&self, specifier: &str, referrer: Option<&ModuleDef>) -> Result<ModuleDef, Throw> {
        let loader = self.0.module_loader.borrow().clone();
        match loader {
            Some(loader) => loader(self, specifier, referrer),
            None => Err(self.throw_error(
                ErrorKind::ReferenceError,
                &format!("Could not resolve module '{}'", specifier),
            )),
        }
    }

    /// Resolve every static dependency of `module`, recursively.
    pub fn link_module(&self, module: &ModuleDef) -> Result<(), Throw> {
        match module.status() {
            ModuleStatus::Unlinked => {}
            ModuleStatus::Errored => {
                return Err(Throw::new(module.error().unwrap_or_default()));
            }
            _ => return Ok(()),
        }
        module.0.status.set(ModuleStatus::Linking);
        let ModuleSource::Text(program) = &module.0.source else {
            module.0.status.set(ModuleStatus::Linked);
            return Ok(());
        };
        for specifier in program.requested_modules() {
            let linked = self
                .load_module(specifier.as_str(), Some(module))
                .and_then(|dep| self.link_module(&dep).map(|()| dep));
            match linked {
                Ok(dep) => module.0.resolved.borrow_mut().push((specifier, dep)),
                Err(err) => {
                    module.0.resolved.borrow_mut().clear();
                    module.0.status.set(ModuleStatus::Unlinked);
                    return Err(err);
                }
            }
        }
        module.0.status.set(ModuleStatus::Linked);
        debug!("linked module {}", module.name());
        Ok(())
    }

    /// Evaluate `module` after its dependencies. Evaluation happens once; a
    /// failure is recorded and rethrown on later attempts.
    pub fn evaluate_module(&self, module: &ModuleDef) -> Result<(), Throw> {
        match module.status() {
            ModuleStatus::Evaluated | ModuleStatus::Evaluating => return Ok(()),
            ModuleStatus::Errored => return Err(Throw::new(module.error().unwrap_or_default())),
            ModuleStatus::Unlinked | ModuleStatus::Linking => self.link_module(module)?,
            ModuleStatus::Linked => {}
        }
        module.0.status.set(ModuleStatus::Evaluating);

        let result = self.run_module(module);
        match &result {
            Ok(()) => module.0.status.set(ModuleStatus::Evaluated),
            Err(err) => {
                *module.0.error.borrow_mut() = Some(err.value.clone());
                module.0.status.set(ModuleStatus::Errored);
            }
        }
        self.maybe_gc();
        result
    }

    fn run_module(&self, module: &ModuleDef) -> Result<(), Throw> {
        let deps: Vec<ModuleDef> = module.0.resolved.borrow().iter().map(|(_, m)| m.cheap_clone()).collect();
        for dep in deps {
            self.evaluate_module(&dep)?;
        }
        self.check_terminated()?;

        self.0.module_stack.borrow_mut().push(module.cheap_clone());
        let result = match &module.0.source {
            ModuleSource::Text(program) => {
                let env = self.alloc(ObjectData::new(
                    Some(self.0.realm.global_scope.cheap_clone()),
                    ExoticObject::Environment,
                ));
                run_module_body(self, module, program, &env).map(|exports| module.publish(exports))
            }
            ModuleSource::Synthetic { evaluate, .. } => match evaluate {
                Some(evaluate) => evaluate(self, module),
                None => Ok(()),
            },
        };
        self.0.module_stack.borrow_mut().pop();
        result
    }

    /// `import(specifier)`: load, link and evaluate through the module
    /// loader. The returned promise is already settled. Only an uncatchable
    /// error escapes as `Err`.
    pub fn dynamic_import(&self, specifier: &str, referrer: Option<&ModuleDef>) -> Result<Object, Throw> {
        let result = self.load_module(specifier, referrer).and_then(|module| {
            self.link_module(&module)?;
            self.evaluate_module(&module)?;
            Ok(module.namespace(self))
        });
        match result {
            Ok(ns) => Ok(self.promise_resolve(JsValue::Object(ns))),
            Err(err) if err.uncatchable => Err(err),
            Err(err) => Ok(self.promise_reject(err.value)),
        }
    }
}
