// Tests for host functions, classes and calls into script

use std::cell::Cell;
use std::rc::Rc;

use super::{create_test_env, eval_bool, eval_int, eval_string, run, take_error_message};
use jsembed::{Env, Error, PropertyAttributes, PropertyDescriptor, Value};

fn install(env: &Env, name: &str, function: Value) {
    let global = env.get_global().unwrap();
    env.set_named_property(global, name, function).unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════
// Host functions
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_host_function_called_from_script() {
    let t = create_test_env();
    let env = &t.env;
    let add = env
        .create_function("add", |env, info| {
            let mut sum = 0.0;
            for &arg in info.args() {
                sum += env.get_value_double(arg)?;
            }
            env.create_double(sum).map(Some)
        })
        .unwrap();
    install(env, "add", add);

    assert_eq!(eval_int(env, "add(2, 3, 4)"), 9);
    assert_eq!(eval_string(env, "add.name"), "add");
}

#[test]
fn test_host_function_without_result_returns_undefined() {
    let t = create_test_env();
    let env = &t.env;
    let noop = env.create_function("noop", |_, _| Ok(None)).unwrap();
    install(env, "noop", noop);
    assert!(eval_bool(env, "noop() === undefined"));
}

#[test]
fn test_host_function_sees_receiver() {
    let t = create_test_env();
    let env = &t.env;
    let get_tag = env
        .create_function("getTag", |env, info| env.get_named_property(info.receiver(), "tag").map(Some))
        .unwrap();
    install(env, "getTag", get_tag);
    assert_eq!(eval_string(env, "({ tag: 'mine', getTag: getTag }).getTag()"), "mine");
}

#[test]
fn test_thrown_error_is_catchable_in_script() {
    let t = create_test_env();
    let env = &t.env;
    let fail = env
        .create_function("fail", |env, _| {
            env.throw_range_error(Some("ERR_OUT_OF_RANGE"), "too far")?;
            Ok(None)
        })
        .unwrap();
    install(env, "fail", fail);

    let caught = eval_string(
        env,
        r#"
        let seen = "";
        try { fail(); } catch (e) { seen = e.name + ":" + e.code + ":" + e.message; }
        seen
    "#,
    );
    assert_eq!(caught, "RangeError:ERR_OUT_OF_RANGE:too far");
}

#[test]
fn test_host_error_becomes_script_error() {
    let t = create_test_env();
    let env = &t.env;
    let fail = env
        .create_function("fail", |_, _| Err(Error::InvalidArgument("bad input".into())))
        .unwrap();
    install(env, "fail", fail);

    assert_eq!(
        eval_string(env, "let m = ''; try { fail(); } catch (e) { m = e.message; } m"),
        "invalid argument: bad input"
    );
}

#[test]
fn test_call_function_from_host() {
    let t = create_test_env();
    let env = &t.env;
    let function = run(env, "(function (a, b) { return this.base + a * b; })").unwrap();
    let receiver = run(env, "({ base: 100 })").unwrap();
    let args = [env.create_int32(6).unwrap(), env.create_int32(7).unwrap()];

    let result = env.call_function(receiver, function, &args).unwrap();
    assert_eq!(env.get_value_int32(result).unwrap(), 142);
}

#[test]
fn test_call_non_function_is_type_mismatch() {
    let t = create_test_env();
    let env = &t.env;
    let global = env.get_global().unwrap();
    let object = env.create_object().unwrap();
    assert!(matches!(
        env.call_function(global, object, &[]),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_nested_call_from_host_callback() {
    let t = create_test_env();
    let env = &t.env;
    let depth_inside = Rc::new(Cell::new(0));
    let seen = depth_inside.clone();
    let twice = env
        .create_function("twice", move |env, info| {
            seen.set(env.depth());
            let callback = info.arg(0).ok_or(Error::InvalidArgument("missing callback".into()))?;
            let global = env.get_global()?;
            let first = env.call_function(global, callback, &[])?;
            let second = env.call_function(global, callback, &[first])?;
            Ok(Some(second))
        })
        .unwrap();
    install(env, "twice", twice);

    assert_eq!(eval_int(env, "twice((n) => (n === undefined ? 1 : n + 1))"), 2);
    assert_eq!(depth_inside.get(), 1);
    assert_eq!(env.depth(), 0);
}

#[test]
fn test_function_from_source() {
    let t = create_test_env();
    let env = &t.env;
    let params = [env.create_string_utf8("a").unwrap(), env.create_string_utf8("b").unwrap()];
    let body = env.create_string_utf8("return a - b;").unwrap();
    let function = env
        .create_function_with_source(Some("minus"), "minus.js", &params, body)
        .unwrap();

    let global = env.get_global().unwrap();
    let args = [env.create_int32(10).unwrap(), env.create_int32(4).unwrap()];
    let result = env.call_function(global, function, &args).unwrap();
    assert_eq!(env.get_value_int32(result).unwrap(), 6);
}

fn minus(env: &Env, name: Option<&str>) -> jsembed::Result<Value> {
    let params = [env.create_string_utf8("a").unwrap(), env.create_string_utf8("b").unwrap()];
    let body = env.create_string_utf8("return a - b;").unwrap();
    env.create_function_with_source(name, "minus.js", &params, body)
}

#[test]
fn test_function_with_source_can_reuse_a_name() {
    let t = create_test_env();
    let env = &t.env;
    let first = minus(env, Some("minus")).unwrap();
    let second = minus(env, Some("minus")).unwrap();
    install(env, "first", first);
    install(env, "second", second);

    assert_eq!(eval_string(env, "first.name"), "minus");
    assert_eq!(eval_string(env, "second.name"), "minus");
    assert!(eval_bool(env, "typeof minus === 'undefined'"));
    assert_eq!(eval_int(env, "second(7, 2)"), 5);
}

#[test]
fn test_function_with_source_rejects_bad_names() {
    let t = create_test_env();
    let env = &t.env;
    assert!(matches!(minus(env, Some("a; b")), Err(Error::InvalidArgument(_))));
    assert!(matches!(minus(env, Some("return")), Err(Error::InvalidArgument(_))));
    assert!(matches!(minus(env, Some("")), Err(Error::InvalidArgument(_))));

    let bad = [env.create_string_utf8("a = globalThis.leak = 1").unwrap()];
    let body = env.create_string_utf8("return a;").unwrap();
    assert!(matches!(
        env.create_function_with_source(None, "bad.js", &bad, body),
        Err(Error::InvalidArgument(_))
    ));
    assert!(eval_bool(env, "typeof leak === 'undefined'"));
}

#[test]
fn test_function_body_cannot_escape_the_function() {
    let t = create_test_env();
    let env = &t.env;
    let body = env.create_string_utf8("}; globalThis.leak = 1; (() => {").unwrap();
    assert_eq!(
        env.create_function_with_source(None, "escape.js", &[], body),
        Err(Error::PendingException)
    );
    assert_eq!(take_error_message(env), "Function body must not close the function");
    assert!(eval_bool(env, "typeof leak === 'undefined'"));
}

#[test]
fn test_function_from_bad_source_leaves_syntax_error() {
    let t = create_test_env();
    let env = &t.env;
    let body = env.create_string_utf8("return (;").unwrap();
    assert_eq!(
        env.create_function_with_source(None, "bad.js", &[], body),
        Err(Error::PendingException)
    );
    let error = env.get_and_clear_last_exception().unwrap();
    let name = env.get_named_property(error, "name").unwrap();
    assert_eq!(env.get_value_string_utf8(name).unwrap(), "SyntaxError");
}

// ═══════════════════════════════════════════════════════════════════════════
// Classes
// ═══════════════════════════════════════════════════════════════════════════

fn define_point(env: &Env) -> Value {
    let norm = PropertyDescriptor::method("norm1", |env, info| {
        let x = env.get_named_property(info.receiver(), "x")?;
        let y = env.get_named_property(info.receiver(), "y")?;
        let sum = env.get_value_double(x)?.abs() + env.get_value_double(y)?.abs();
        env.create_double(sum).map(Some)
    });
    let origin = PropertyDescriptor::method("origin", |env, _| {
        let global = env.get_global()?;
        let point = env.get_named_property(global, "Point")?;
        let zero = env.create_int32(0)?;
        env.new_instance(point, &[zero, zero]).map(Some)
    })
    .with_attributes(PropertyAttributes {
        is_static: true,
        ..PropertyAttributes::all()
    });

    let class = env
        .define_class(
            "Point",
            |env, info| {
                let this = info.receiver();
                let x = info.arg(0).map_or_else(|| env.create_int32(0), Ok)?;
                let y = info.arg(1).map_or_else(|| env.create_int32(0), Ok)?;
                env.set_named_property(this, "x", x)?;
                env.set_named_property(this, "y", y)?;
                Ok(None)
            },
            &[norm, origin],
        )
        .unwrap();
    install(env, "Point", class);
    class
}

#[test]
fn test_class_instances_from_script() {
    let t = create_test_env();
    let env = &t.env;
    define_point(env);

    assert_eq!(eval_int(env, "new Point(3, -4).norm1()"), 7);
    assert!(eval_bool(env, "new Point(1, 1) instanceof Point"));
    assert!(eval_bool(env, "Point.prototype.constructor === Point"));
}

#[test]
fn test_class_static_method() {
    let t = create_test_env();
    let env = &t.env;
    define_point(env);
    assert!(eval_bool(env, "const o = Point.origin(); o.x === 0 && o.y === 0"));
}

#[test]
fn test_class_requires_new() {
    let t = create_test_env();
    let env = &t.env;
    define_point(env);

    assert_eq!(
        eval_string(env, "let m = ''; try { Point(1, 2); } catch (e) { m = e.name + ': ' + e.message; } m"),
        "TypeError: Class constructor Point cannot be invoked without 'new'"
    );
}

#[test]
fn test_new_instance_from_host() {
    let t = create_test_env();
    let env = &t.env;
    let class = define_point(env);
    let args = [env.create_int32(5).unwrap(), env.create_int32(6).unwrap()];

    let point = env.new_instance(class, &args).unwrap();
    assert!(env.instanceof(point, class).unwrap());
    let y = env.get_named_property(point, "y").unwrap();
    assert_eq!(env.get_value_int32(y).unwrap(), 6);
}

#[test]
fn test_script_error_in_call_is_pending() {
    let t = create_test_env();
    let env = &t.env;
    let function = run(env, "(function () { throw new Error('boom'); })").unwrap();
    let global = env.get_global().unwrap();

    assert_eq!(env.call_function(global, function, &[]), Err(Error::PendingException));
    assert_eq!(take_error_message(env), "boom");
}
