use super::*;

pub(crate) const SELF_RESOLUTION_MESSAGE: &str =
    "Chaining cycle detected: promise resolved with itself";

/// First-caller-wins flag shared by the callbacks handed to one foreign
/// `then` invocation.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResolutionGuard {
    fired: Rc<Cell<bool>>,
}

impl ResolutionGuard {
    pub(crate) fn claim(&self) -> bool {
        !self.fired.replace(true)
    }
}

impl Runtime {
    /// Unwraps `value` into the settlement of `promise`.
    pub(crate) fn promise_resolve(&mut self, promise: &Promise, value: Value) {
        if !promise.is_pending() {
            return;
        }

        if let Value::Promise(other) = &value {
            if other.ptr_eq(promise) {
                self.trace_resolution_line(format!(
                    "[resolve] #{} rejected: resolved with itself",
                    promise.id()
                ));
                let reason = ErrorValue::type_error(SELF_RESOLUTION_MESSAGE).into();
                self.promise_reject(promise, reason);
                return;
            }

            self.trace_resolution_line(format!(
                "[resolve] #{} adopts #{}",
                promise.id(),
                other.id()
            ));
            let kind = PromiseReactionKind::ResolveTo {
                target: promise.clone(),
            };
            self.promise_add_reaction(other, kind.clone(), kind);
            return;
        }

        if value.is_object_like() {
            let guard = ResolutionGuard::default();
            let then = match self.get_property(&value, "then") {
                Ok(then) => then,
                Err(err) => {
                    if guard.claim() {
                        self.trace_resolution_line(format!(
                            "[resolve] #{} reading then raised: {err}",
                            promise.id()
                        ));
                        self.promise_reject(promise, err.into_reason());
                    }
                    return;
                }
            };

            if then.is_callable() {
                self.trace_resolution_line(format!(
                    "[resolve] #{} calling thenable then",
                    promise.id()
                ));
                let (on_resolve, on_reject) = Self::new_resolution_callbacks(promise, &guard);
                if let Err(err) = self.call_function(&then, &value, &[on_resolve, on_reject]) {
                    if guard.claim() {
                        self.trace_resolution_line(format!(
                            "[resolve] #{} thenable then raised: {err}",
                            promise.id()
                        ));
                        self.promise_reject(promise, err.into_reason());
                    } else {
                        self.trace_resolution_line(format!(
                            "[resolve] #{} ignored raise after thenable settled: {err}",
                            promise.id()
                        ));
                    }
                }
                return;
            }
        }

        self.promise_fulfill(promise, value);
    }

    fn new_resolution_callbacks(promise: &Promise, guard: &ResolutionGuard) -> (Value, Value) {
        let resolve_target = promise.clone();
        let resolve_guard = guard.clone();
        let on_resolve = Value::function("resolvePromise", move |runtime, _this, args| {
            let value = args.first().cloned().unwrap_or(Value::Undefined);
            if resolve_guard.claim() {
                runtime.promise_resolve(&resolve_target, value);
            } else {
                runtime.trace_resolution_line(format!(
                    "[resolve] #{} ignored extra thenable callback with {value}",
                    resolve_target.id()
                ));
            }
            Ok(Value::Undefined)
        });

        let reject_target = promise.clone();
        let reject_guard = guard.clone();
        let on_reject = Value::function("rejectPromise", move |runtime, _this, args| {
            let reason = args.first().cloned().unwrap_or(Value::Undefined);
            if reject_guard.claim() {
                runtime.promise_reject(&reject_target, reason);
            } else {
                runtime.trace_resolution_line(format!(
                    "[resolve] #{} ignored extra thenable callback with {reason}",
                    reject_target.id()
                ));
            }
            Ok(Value::Undefined)
        });

        (on_resolve, on_reject)
    }
}
