use super::*;
use crate::resolution::SELF_RESOLUTION_MESSAGE;

fn resolve_with(rt: &mut Runtime, value: Value) -> Promise {
    rt.new_promise(move |rt, resolve, _reject| {
        resolve.call(rt, value);
        Ok(())
    })
}

#[test]
fn synchronous_thenable_is_unwrapped() -> Result<()> {
    let mut rt = Runtime::new();
    let p = resolve_with(&mut rt, sync_thenable(Value::from(5)));
    rt.run_microtasks()?;
    assert_eq!(p.state(), PromiseState::Fulfilled(Value::Number(5)));
    Ok(())
}

#[test]
fn thenable_is_called_with_itself_as_receiver() -> Result<()> {
    let mut rt = Runtime::new();
    let seen_receiver = Rc::new(RefCell::new(Value::Undefined));
    let recorded = seen_receiver.clone();
    let thenable = Value::object(vec![(
        "then",
        Value::function("then", move |rt, this, args| {
            *recorded.borrow_mut() = this.clone();
            rt.call_function(&first_arg(args), &Value::Undefined, &[Value::from("ok")])?;
            Ok(Value::Undefined)
        }),
    )]);
    let p = resolve_with(&mut rt, thenable.clone());
    assert_eq!(*seen_receiver.borrow(), thenable);
    assert_eq!(p.value(), Some(Value::from("ok")));
    Ok(())
}

#[test]
fn object_with_non_callable_then_fulfills_with_object_itself() -> Result<()> {
    let mut rt = Runtime::new();
    let object = Value::object(vec![("then", Value::from(5)), ("other", Value::Null)]);
    let p = resolve_with(&mut rt, object.clone());
    assert_eq!(p.value(), Some(object));

    let plain = Value::object(vec![]);
    let q = resolve_with(&mut rt, plain.clone());
    assert_eq!(q.value(), Some(plain));
    Ok(())
}

#[test]
fn primitives_are_never_probed_for_then() -> Result<()> {
    let mut rt = Runtime::new();
    for value in [
        Value::Undefined,
        Value::Null,
        Value::Bool(false),
        Value::Float(1.5),
        Value::BigInt(BigInt::from(12)),
        Value::from("then"),
    ] {
        let p = resolve_with(&mut rt, value.clone());
        assert_eq!(p.state(), PromiseState::Fulfilled(value));
    }
    Ok(())
}

#[test]
fn callable_with_then_property_is_treated_as_thenable() -> Result<()> {
    let mut rt = Runtime::new();
    let callable = Value::function("callable", |_rt, _this, _args| Ok(Value::Undefined));
    let Value::Function(function) = &callable else {
        unreachable!("Value::function builds a function value");
    };
    function.insert_property(
        "then",
        Value::function("then", |rt, _this, args| {
            rt.call_function(&first_arg(args), &Value::Undefined, &[Value::from(8)])?;
            Ok(Value::Undefined)
        }),
    );
    let p = resolve_with(&mut rt, callable);
    assert_eq!(p.value(), Some(Value::Number(8)));
    Ok(())
}

#[test]
fn throwing_then_getter_rejects_with_its_error() -> Result<()> {
    let mut rt = Runtime::new();
    let mut object = ObjectValue::default();
    object.define_getter(
        "then",
        Value::function("getThen", |_rt, _this, _args| throw("getter exploded")),
    );
    let p = resolve_with(&mut rt, Value::from_object(object));
    assert_eq!(p.state(), PromiseState::Rejected(Value::from("getter exploded")));
    Ok(())
}

#[test]
fn then_getter_is_read_exactly_once() -> Result<()> {
    let mut rt = Runtime::new();
    let reads = Rc::new(Cell::new(0usize));
    let counter = reads.clone();
    let mut object = ObjectValue::default();
    object.define_getter(
        "then",
        Value::function("getThen", move |_rt, _this, _args| {
            counter.set(counter.get() + 1);
            Ok(Value::function("then", |rt, _this, args| {
                rt.call_function(&first_arg(args), &Value::Undefined, &[Value::from(1)])?;
                Ok(Value::Undefined)
            }))
        }),
    );
    let p = resolve_with(&mut rt, Value::from_object(object));
    rt.run_microtasks()?;
    assert_eq!(reads.get(), 1);
    assert_eq!(p.value(), Some(Value::Number(1)));
    Ok(())
}

#[test]
fn then_throwing_before_callbacks_rejects() -> Result<()> {
    let mut rt = Runtime::new();
    let raised = Value::error("RangeError", "nope");
    let thrown = raised.clone();
    let thenable = Value::object(vec![(
        "then",
        Value::function("then", move |_rt, _this, _args| throw(thrown.clone())),
    )]);
    let p = resolve_with(&mut rt, thenable);
    assert_eq!(p.state(), PromiseState::Rejected(raised));
    Ok(())
}

#[test]
fn then_throwing_after_resolving_is_ignored() -> Result<()> {
    let mut rt = Runtime::new();
    let thenable = Value::object(vec![(
        "then",
        Value::function("then", |rt, _this, args| {
            rt.call_function(&first_arg(args), &Value::Undefined, &[Value::from("kept")])?;
            throw("ignored")
        }),
    )]);
    let p = resolve_with(&mut rt, thenable);
    assert_eq!(p.value(), Some(Value::from("kept")));
    Ok(())
}

#[test]
fn only_first_thenable_callback_counts() -> Result<()> {
    let mut rt = Runtime::new();
    let thenable = Value::object(vec![(
        "then",
        Value::function("then", |rt, _this, args| {
            let resolve = first_arg(args);
            let reject = args.get(1).cloned().unwrap_or(Value::Undefined);
            rt.call_function(&reject, &Value::Undefined, &[Value::from("first")])?;
            rt.call_function(&resolve, &Value::Undefined, &[Value::from("second")])?;
            rt.call_function(&reject, &Value::Undefined, &[Value::from("third")])?;
            Ok(Value::Undefined)
        }),
    )]);
    let p = resolve_with(&mut rt, thenable);
    assert_eq!(p.state(), PromiseState::Rejected(Value::from("first")));
    Ok(())
}

#[test]
fn late_thenable_callbacks_are_ignored() -> Result<()> {
    let mut rt = Runtime::new();
    let captured: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
    let store = captured.clone();
    let thenable = Value::object(vec![(
        "then",
        Value::function("then", move |_rt, _this, args| {
            store.borrow_mut().extend(args.iter().cloned());
            Ok(Value::Undefined)
        }),
    )]);
    let p = resolve_with(&mut rt, thenable);
    assert!(p.is_pending());

    let callbacks = captured.borrow().clone();
    rt.call_function(&callbacks[0], &Value::Undefined, &[Value::from(1)])?;
    rt.call_function(&callbacks[0], &Value::Undefined, &[Value::from(2)])?;
    rt.call_function(&callbacks[1], &Value::Undefined, &[Value::from(3)])?;
    assert_eq!(p.value(), Some(Value::Number(1)));
    Ok(())
}

#[test]
fn thenable_resolving_to_another_thenable_recurses() -> Result<()> {
    let mut rt = Runtime::new();
    let mut value = Value::from("core");
    for _ in 0..25 {
        value = sync_thenable(value);
    }
    let p = resolve_with(&mut rt, value);
    assert_eq!(p.value(), Some(Value::from("core")));
    Ok(())
}

#[test]
fn thenable_resolving_with_target_promise_rejects_with_cycle_error() -> Result<()> {
    let mut rt = Runtime::new();
    let d = rt.deferred();
    let target = d.promise.clone();
    let thenable = Value::object(vec![(
        "then",
        Value::function("then", move |rt, _this, args| {
            rt.call_function(
                &first_arg(args),
                &Value::Undefined,
                &[Value::Promise(target.clone())],
            )?;
            Ok(Value::Undefined)
        }),
    )]);
    d.resolve(&mut rt, thenable);
    assert_type_error(d.promise.state(), SELF_RESOLUTION_MESSAGE);
    Ok(())
}

#[test]
fn adopting_engine_promise_is_deferred_even_when_settled() -> Result<()> {
    let mut rt = Runtime::new();
    let settled = rt.resolved(3);
    let p = resolve_with(&mut rt, Value::Promise(settled));
    assert!(p.is_pending());
    rt.run_microtasks()?;
    assert_eq!(p.value(), Some(Value::Number(3)));

    let failed = rt.rejected("no");
    let q = resolve_with(&mut rt, Value::Promise(failed));
    rt.run_microtasks()?;
    assert_eq!(q.reason(), Some(Value::from("no")));
    Ok(())
}

#[test]
fn error_values_are_plain_payloads() -> Result<()> {
    let mut rt = Runtime::new();
    let error = Value::error("TypeError", "as data");
    let p = resolve_with(&mut rt, error.clone());
    assert_eq!(p.value(), Some(error.clone()));
    assert_eq!(rt.get_property(&error, "message")?, Value::from("as data"));
    Ok(())
}

#[test]
fn indirect_adoption_cycle_stays_pending() -> Result<()> {
    let mut rt = Runtime::new();
    let a = rt.deferred();
    let b = rt.deferred();
    a.resolve(&mut rt, b.promise.clone());
    b.resolve(&mut rt, a.promise.clone());

    let log = new_log();
    let observed = rt.then(&a.promise, Some(recorder(&log, "a")), Some(recorder(&log, "a-err")));
    assert_eq!(rt.run_microtasks()?, 0);

    assert!(a.promise.is_pending());
    assert!(b.promise.is_pending());
    assert!(observed.is_pending());
    assert!(log_lines(&log).is_empty());

    a.reject(&mut rt, "late");
    b.reject(&mut rt, "late");
    rt.run_microtasks()?;
    assert!(a.promise.is_pending());
    Ok(())
}
