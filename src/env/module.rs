//! Module records and the resolver and evaluator chains.
//!
//! The runtime asks a single loader hook for every import. Each
//! `instantiate_module` call pushes a resolver frame for the duration of
//! linking, so the hook answers with the resolver of the innermost
//! instantiation in progress. Imports issued while no instantiation is in
//! progress go to the dynamic-import callback.
//!
//! Synthetic modules register an evaluator frame at creation. The runtime's
//! evaluation step finds its frame by module identity and calls the host.

use std::rc::Rc;

use log::{debug, trace};

use crate::engine::{
    CheapClone, ErrorKind, JsString, JsValue, ModuleDef, ModuleStatus, Runtime, SyntheticEvaluate, Throw,
};
use crate::error::{Error, Result};

use super::arena::Index;
use super::function::env_for_call;
use super::{Env, Value};

/// Handle to a module record. Valid until deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Module(Index);

impl Module {
    pub fn to_bits(self) -> u64 {
        self.0.to_bits()
    }

    pub fn from_bits(bits: u64) -> Self {
        Module(Index::from_bits(bits))
    }
}

/// Receives `(specifier, assertions, referrer)` and returns the module the
/// specifier names.
pub type ModuleResolver = Rc<dyn Fn(&Env, Value, Value, Module) -> Result<Module>>;

/// Populates `import.meta` for a module before it first runs.
pub type ModuleMetaCallback = Rc<dyn Fn(&Env, Module, Value) -> Result<()>>;

/// Populates the exports of a synthetic module.
pub type SyntheticEvaluator = Rc<dyn Fn(&Env, Module) -> Result<()>>;

/// Receives `(specifier, assertions, referrer name)` for `import()` calls
/// made outside of any instantiation.
pub type DynamicImportHandler = Rc<dyn Fn(&Env, Value, Value, Value) -> Result<Module>>;

pub(super) struct ModuleEntry {
    name: String,
    def: ModuleDef,
    meta: Option<ModuleMetaCallback>,
}

pub(super) struct ResolverFrame {
    module: Module,
    resolver: ModuleResolver,
}

pub(super) struct EvaluatorFrame {
    module: Module,
    def: ModuleDef,
    evaluator: SyntheticEvaluator,
}

impl Env {
    fn module_def(&self, module: Module) -> Result<ModuleDef> {
        self.0
            .modules
            .borrow()
            .get(module.0)
            .map(|m| m.def.cheap_clone())
            .ok_or(Error::InvalidHandle("module"))
    }

    fn module_for_def(&self, def: &ModuleDef) -> Option<Module> {
        self.0
            .modules
            .borrow()
            .iter()
            .find(|(_, entry)| entry.def.ptr_eq(def))
            .map(|(idx, _)| Module(idx))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Creation
    // ═══════════════════════════════════════════════════════════════════════

    /// Compile a source text module. A syntax error is left pending.
    pub fn create_module(
        &self,
        name: &str,
        source: Value,
        meta: Option<ModuleMetaCallback>,
    ) -> Result<Module> {
        self.ensure_ready()?;
        let source = self.string_of(source)?;
        let def = self.check(self.0.runtime.compile_module(name, source.as_str()))?;
        let index = self.0.modules.borrow_mut().insert(ModuleEntry {
            name: name.to_string(),
            def,
            meta,
        });
        trace!("created module {} as {:?}", name, index);
        Ok(Module(index))
    }

    pub fn create_synthetic_module(
        &self,
        name: &str,
        export_names: &[Value],
        evaluator: Option<SyntheticEvaluator>,
    ) -> Result<Module> {
        self.ensure_ready()?;
        let names = export_names
            .iter()
            .map(|&n| self.string_of(n))
            .collect::<Result<Vec<JsString>>>()?;

        let evaluate = evaluator.as_ref().map(|_| {
            let weak = self.downgrade();
            Rc::new(move |rt: &Runtime, def: &ModuleDef| {
                let env = env_for_call(&weak, rt)?;
                env.evaluate_synthetic(rt, def)
            }) as SyntheticEvaluate
        });
        let def = self.0.runtime.new_synthetic_module(name, names, evaluate);
        let index = self.0.modules.borrow_mut().insert(ModuleEntry {
            name: name.to_string(),
            def: def.cheap_clone(),
            meta: None,
        });
        if let Some(evaluator) = evaluator {
            self.0.evaluators.borrow_mut().push(EvaluatorFrame {
                module: Module(index),
                def,
                evaluator,
            });
        }
        Ok(Module(index))
    }

    fn evaluate_synthetic(&self, rt: &Runtime, def: &ModuleDef) -> std::result::Result<(), Throw> {
        let frame = self
            .0
            .evaluators
            .borrow()
            .iter()
            .rev()
            .find(|f| f.def.ptr_eq(def))
            .map(|f| (f.module, f.evaluator.clone()));
        let Some((module, evaluator)) = frame else {
            return Err(rt.throw_error(
                ErrorKind::InternalError,
                &format!("no evaluator registered for module '{}'", def.name()),
            ));
        };
        self.with_scope(|| {
            let outcome = evaluator(self, module);
            if let Some(thrown) = self.take_exception() {
                return Err(thrown);
            }
            outcome.map_err(|e| self.callback_failure(&e))
        })
    }

    pub fn delete_module(&self, module: Module) -> Result<()> {
        let entry = self
            .0
            .modules
            .borrow_mut()
            .remove(module.0)
            .ok_or(Error::InvalidHandle("module"))?;
        self.0.evaluators.borrow_mut().retain(|f| f.module != module);
        drop(entry);
        self.run_finalizers();
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Linking and evaluation
    // ═══════════════════════════════════════════════════════════════════════

    /// Resolve the static imports of `module` through `resolver`, recursively.
    pub fn instantiate_module(&self, module: Module, resolver: ModuleResolver) -> Result<()> {
        self.ensure_ready()?;
        let def = self.module_def(module)?;
        self.0.resolvers.borrow_mut().push(ResolverFrame { module, resolver });
        let result = self.enter(|rt| rt.link_module(&def));
        self.0.resolvers.borrow_mut().pop();
        result?;
        debug!("instantiated module {}", def.name());
        Ok(())
    }

    /// Evaluate `module`, linking it first if needed. Returns a promise that
    /// settles with the outcome of evaluation.
    pub fn run_module(&self, module: Module) -> Result<Value> {
        self.ensure_ready()?;
        let def = self.module_def(module)?;
        self.run_meta(module)?;

        let outcome = self.enter(|rt| match rt.evaluate_module(&def) {
            Ok(()) => Ok(None),
            Err(thrown) if thrown.uncatchable => Err(thrown),
            Err(thrown) => Ok(Some(thrown.value)),
        })?;

        let rt = &self.0.runtime;
        let promise = match outcome {
            None => rt.promise_resolve(JsValue::Undefined),
            Some(reason) => {
                debug!("module {} failed to evaluate", def.name());
                rt.promise_reject(reason)
            }
        };
        self.attach(JsValue::Object(promise))
    }

    /// Hand `import.meta` to the module's meta callback, once.
    fn run_meta(&self, module: Module) -> Result<()> {
        let (def, meta) = {
            let mut modules = self.0.modules.borrow_mut();
            let entry = modules.get_mut(module.0).ok_or(Error::InvalidHandle("module"))?;
            (entry.def.cheap_clone(), entry.meta.take())
        };
        let Some(meta) = meta else { return Ok(()) };
        self.with_scope(|| {
            let object = self.attach(JsValue::Object(def.import_meta(&self.0.runtime)))?;
            meta(self, module, object)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Exports
    // ═══════════════════════════════════════════════════════════════════════

    /// Set an export declared by a synthetic module.
    pub fn set_module_export(&self, module: Module, name: Value, value: Value) -> Result<()> {
        self.ensure_open()?;
        let def = self.module_def(module)?;
        let name = self.string_of(name)?;
        let value = self.value(value)?;
        if def.set_export(name.as_str(), value) {
            return Ok(());
        }
        let thrown = self
            .0
            .runtime
            .throw_error(ErrorKind::Error, "Could not set module export");
        self.set_exception(thrown);
        Err(Error::InvalidArgument(format!("module has no export named '{}'", name)))
    }

    pub fn get_module_name(&self, module: Module) -> Result<String> {
        self.0
            .modules
            .borrow()
            .get(module.0)
            .map(|m| m.name.clone())
            .ok_or(Error::InvalidHandle("module"))
    }

    pub fn get_module_namespace(&self, module: Module) -> Result<Value> {
        self.ensure_open()?;
        let def = self.module_def(module)?;
        let namespace = def.namespace(&self.0.runtime);
        self.attach(JsValue::Object(namespace))
    }

    pub fn get_module_status(&self, module: Module) -> Result<ModuleStatus> {
        Ok(self.module_def(module)?.status())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Loader hook
    // ═══════════════════════════════════════════════════════════════════════

    pub(super) fn on_resolve_module(
        &self,
        specifier: &str,
        referrer: Option<&ModuleDef>,
    ) -> std::result::Result<ModuleDef, Throw> {
        let rt = &self.0.runtime;
        let frame = self
            .0
            .resolvers
            .borrow()
            .last()
            .map(|f| (f.module, f.resolver.clone()));

        let resolved = self.with_scope(|| {
            let specifier = self.attach(JsValue::from(specifier))?;
            let assertions = self.attach(JsValue::Null)?;
            match &frame {
                Some((root, resolver)) => {
                    let referrer = referrer.and_then(|def| self.module_for_def(def)).unwrap_or(*root);
                    resolver(self, specifier, assertions, referrer).map(Some)
                }
                None => {
                    let handler = self.0.callbacks.borrow().dynamic_import.clone();
                    let Some(handler) = handler else { return Ok(None) };
                    let referrer = match referrer {
                        Some(def) => JsValue::String(def.name().cheap_clone()),
                        None => JsValue::Undefined,
                    };
                    let referrer = self.attach(referrer)?;
                    handler(self, specifier, assertions, referrer).map(Some)
                }
            }
        });

        let module = match resolved {
            Ok(Some(module)) => module,
            Ok(None) => {
                return Err(rt.throw_error(ErrorKind::TypeError, "Dynamic import() is not supported"));
            }
            Err(e) => {
                return Err(match self.take_exception() {
                    Some(thrown) => thrown,
                    None => rt.throw_error(ErrorKind::Error, &e.to_string()),
                });
            }
        };

        if let Err(e) = self.run_meta(module) {
            return Err(self.callback_failure(&e));
        }
        trace!("resolved '{}' to {:?}", specifier, module.0);
        self.module_def(module).map_err(|e| self.callback_failure(&e))
    }
}
