// Tests for source text and synthetic modules, resolvers and import.meta

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::{create_test_env, eval_int, eval_string, run, take_error_message};
use jsembed::{
    Env, Error, Module, ModuleMetaCallback, ModuleResolver, ModuleStatus, PromiseStatus, SyntheticEvaluator,
    Value,
};

fn module(env: &Env, name: &str, source: &str) -> Module {
    let source = env.create_string_utf8(source).unwrap();
    env.create_module(name, source, None).unwrap()
}

/// A resolver answering from a fixed specifier table.
fn table(entries: &[(&str, Module)]) -> ModuleResolver {
    let map: HashMap<String, Module> = entries.iter().map(|(k, m)| (k.to_string(), *m)).collect();
    Rc::new(move |env: &Env, specifier: Value, _assertions: Value, _referrer: Module| {
        let specifier = env.get_value_string_utf8(specifier)?;
        match map.get(&specifier) {
            Some(module) => Ok(*module),
            None => {
                env.throw_error(None, &format!("Cannot find module '{}'", specifier))?;
                Err(Error::PendingException)
            }
        }
    })
}

fn namespace_int(env: &Env, module: Module, name: &str) -> i32 {
    let namespace = env.get_module_namespace(module).unwrap();
    let value = env.get_named_property(namespace, name).unwrap();
    env.get_value_int32(value).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// Source text modules
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_run_module_with_static_import() {
    let t = create_test_env();
    let env = &t.env;
    let dep = module(env, "dep.js", "export const base = 40;");
    let main = module(env, "main.js", "import { base } from 'dep'; export const answer = base + 2;");
    assert_eq!(env.get_module_status(main).unwrap(), ModuleStatus::Unlinked);

    env.instantiate_module(main, table(&[("dep", dep)])).unwrap();
    assert_eq!(env.get_module_status(main).unwrap(), ModuleStatus::Linked);

    let promise = env.run_module(main).unwrap();
    assert_eq!(env.get_promise_state(promise).unwrap(), PromiseStatus::Fulfilled);
    assert_eq!(env.get_module_status(main).unwrap(), ModuleStatus::Evaluated);
    assert_eq!(namespace_int(env, main, "answer"), 42);
    assert_eq!(env.get_module_name(main).unwrap(), "main.js");
}

#[test]
fn test_resolver_sees_referrer() {
    let t = create_test_env();
    let env = &t.env;
    let leaf = module(env, "leaf.js", "export default 1;");
    let middle = module(env, "middle.js", "import x from 'leaf'; export const y = x + 1;");
    let main = module(env, "main.js", "import { y } from 'middle'; export const z = y + 1;");

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let modules = [("leaf", leaf), ("middle", middle)];
    let inner = table(&modules);
    let resolver: ModuleResolver = Rc::new(move |env: &Env, specifier: Value, assertions: Value, referrer: Module| {
        sink.borrow_mut().push(env.get_module_name(referrer)?);
        inner(env, specifier, assertions, referrer)
    });

    env.instantiate_module(main, resolver).unwrap();
    env.run_module(main).unwrap();
    assert_eq!(*seen.borrow(), vec!["main.js", "middle.js"]);
    assert_eq!(namespace_int(env, main, "z"), 3);
}

/// Link and run an importer of two modules, returning its exports.
fn run_importer(env: &Env) -> (String, i32) {
    let a = module(env, "a.js", "globalThis.trace = (globalThis.trace || '') + 'a'; export const x = 1;");
    let b = module(env, "b.js", "globalThis.trace = (globalThis.trace || '') + 'b'; export const y = 2;");
    let main = module(
        env,
        "main.js",
        "import { x } from 'a'; import { y } from 'b'; export const order = trace; export const sum = x * 10 + y;",
    );
    env.instantiate_module(main, table(&[("b", b), ("a", a)])).unwrap();
    env.run_module(main).unwrap();

    let namespace = env.get_module_namespace(main).unwrap();
    let order = env.get_named_property(namespace, "order").unwrap();
    (env.get_value_string_utf8(order).unwrap(), namespace_int(env, main, "sum"))
}

#[test]
fn test_resolution_is_the_same_in_fresh_environments() {
    let first = create_test_env();
    let second = create_test_env();
    let one = run_importer(&first.env);
    let two = run_importer(&second.env);
    assert_eq!(one, ("ab".to_string(), 12));
    assert_eq!(one, two);
}

#[test]
fn test_unresolved_import_fails_instantiation() {
    let t = create_test_env();
    let env = &t.env;
    let main = module(env, "main.js", "import { a } from 'missing';");

    assert_eq!(env.instantiate_module(main, table(&[])), Err(Error::PendingException));
    assert_eq!(take_error_message(env), "Cannot find module 'missing'");
    assert_eq!(env.get_module_status(main).unwrap(), ModuleStatus::Unlinked);
}

#[test]
fn test_module_syntax_error_is_pending() {
    let t = create_test_env();
    let env = &t.env;
    let source = env.create_string_utf8("export const = 1;").unwrap();
    assert_eq!(env.create_module("bad.js", source, None), Err(Error::PendingException));

    let error = env.get_and_clear_last_exception().unwrap();
    let name = env.get_named_property(error, "name").unwrap();
    assert_eq!(env.get_value_string_utf8(name).unwrap(), "SyntaxError");
}

#[test]
fn test_evaluation_error_rejects_promise() {
    let t = create_test_env();
    let env = &t.env;
    let main = module(env, "main.js", "throw new Error('init failed');");
    env.instantiate_module(main, table(&[])).unwrap();

    let promise = env.run_module(main).unwrap();
    assert_eq!(env.get_promise_state(promise).unwrap(), PromiseStatus::Rejected);
    let reason = env.get_promise_result(promise).unwrap();
    let message = env.get_named_property(reason, "message").unwrap();
    assert_eq!(env.get_value_string_utf8(message).unwrap(), "init failed");
    assert_eq!(env.get_module_status(main).unwrap(), ModuleStatus::Errored);
    assert!(!env.is_exception_pending());
}

#[test]
fn test_deleted_module_handle_is_invalid() {
    let t = create_test_env();
    let env = &t.env;
    let main = module(env, "main.js", "export const a = 1;");
    env.delete_module(main).unwrap();
    assert_eq!(env.get_module_status(main), Err(Error::InvalidHandle("module")));
}

// ═══════════════════════════════════════════════════════════════════════════
// import.meta
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_meta_callback_fills_import_meta() {
    let t = create_test_env();
    let env = &t.env;
    let meta: ModuleMetaCallback = Rc::new(|env: &Env, module: Module, meta: Value| {
        let url = format!("file:///{}", env.get_module_name(module)?);
        let url = env.create_string_utf8(&url)?;
        env.set_named_property(meta, "url", url)
    });
    let source = env.create_string_utf8("export const url = import.meta.url;").unwrap();
    let main = env.create_module("main.js", source, Some(meta)).unwrap();
    env.instantiate_module(main, table(&[])).unwrap();
    env.run_module(main).unwrap();

    let namespace = env.get_module_namespace(main).unwrap();
    let url = env.get_named_property(namespace, "url").unwrap();
    assert_eq!(env.get_value_string_utf8(url).unwrap(), "file:///main.js");
}

// ═══════════════════════════════════════════════════════════════════════════
// Synthetic modules
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_synthetic_module_exports() {
    let t = create_test_env();
    let env = &t.env;
    let names = [env.create_string_utf8("version").unwrap()];
    let evaluator: SyntheticEvaluator = Rc::new(|env: &Env, module: Module| {
        let name = env.create_string_utf8("version")?;
        let value = env.create_int32(3)?;
        env.set_module_export(module, name, value)
    });
    let host = env.create_synthetic_module("host", &names, Some(evaluator)).unwrap();
    let main = module(env, "main.js", "import { version } from 'host'; export const next = version + 1;");

    env.instantiate_module(main, table(&[("host", host)])).unwrap();
    env.run_module(main).unwrap();
    assert_eq!(namespace_int(env, main, "next"), 4);
    assert_eq!(namespace_int(env, host, "version"), 3);
}

#[test]
fn test_undeclared_synthetic_export_fails() {
    let t = create_test_env();
    let env = &t.env;
    let names = [env.create_string_utf8("a").unwrap()];
    let host = env.create_synthetic_module("host", &names, None).unwrap();
    let name = env.create_string_utf8("b").unwrap();
    let value = env.create_int32(1).unwrap();

    assert!(matches!(
        env.set_module_export(host, name, value),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(take_error_message(env), "Could not set module export");
}

// ═══════════════════════════════════════════════════════════════════════════
// Dynamic import
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_dynamic_import_without_handler_rejects() {
    let t = create_test_env();
    let env = &t.env;
    run(
        env,
        r#"
        globalThis.failure = "";
        import("anything").catch((e) => { failure = e.message; });
    "#,
    )
    .unwrap();
    assert_eq!(eval_string(env, "failure"), "Dynamic import() is not supported");
}

#[test]
fn test_dynamic_import_through_handler() {
    let t = create_test_env();
    let env = &t.env;
    let lib = module(env, "lib.js", "export const value = 11;");
    env.on_dynamic_import(move |env, specifier, _assertions, referrer| {
        assert!(env.is_undefined(referrer)?);
        assert_eq!(env.get_value_string_utf8(specifier)?, "lib");
        Ok(lib)
    });

    run(env, "globalThis.got = 0; import('lib').then((ns) => { got = ns.value; })").unwrap();
    assert_eq!(eval_int(env, "got"), 11);
}
