use super::*;

mod resolution_procedure;

type Log = Rc<RefCell<Vec<String>>>;

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn log_lines(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

fn first_arg(args: &[Value]) -> Value {
    args.first().cloned().unwrap_or(Value::Undefined)
}

fn recorder(log: &Log, label: &str) -> Value {
    let log = log.clone();
    let label = label.to_string();
    Value::function(&label.clone(), move |_runtime, _this, args| {
        let value = first_arg(args);
        log.borrow_mut().push(format!("{label}:{value}"));
        Ok(value)
    })
}

fn add_one() -> Value {
    Value::function("addOne", |_runtime, _this, args| {
        let n = first_arg(args).as_i64().unwrap_or_default();
        Ok(Value::Number(n + 1))
    })
}

fn identity() -> Value {
    Value::function("identity", |_runtime, _this, args| Ok(first_arg(args)))
}

fn sync_thenable(value: Value) -> Value {
    Value::object(vec![(
        "then",
        Value::function("then", move |runtime, _this, args| {
            let resolve = first_arg(args);
            runtime.call_function(&resolve, &Value::Undefined, std::slice::from_ref(&value))?;
            Ok(Value::Undefined)
        }),
    )])
}

fn assert_type_error(state: PromiseState, fragment: &str) {
    match state {
        PromiseState::Rejected(Value::Error(err)) => {
            assert_eq!(err.name, "TypeError");
            assert!(
                err.message.contains(fragment),
                "unexpected TypeError message: {}",
                err.message
            );
        }
        other => panic!("expected TypeError rejection, got: {other:?}"),
    }
}
