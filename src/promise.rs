use super::*;

/// Handle to one deferred-value record. Clones share the record.
#[derive(Clone)]
pub struct Promise {
    pub(crate) inner: Rc<RefCell<PromiseValue>>,
}

impl Promise {
    pub fn id(&self) -> usize {
        self.inner.borrow().id
    }

    pub fn state(&self) -> PromiseState {
        self.inner.borrow().state.clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.inner.borrow().state, PromiseState::Pending)
    }

    pub fn value(&self) -> Option<Value> {
        match &self.inner.borrow().state {
            PromiseState::Fulfilled(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<Value> {
        match &self.inner.borrow().state {
            PromiseState::Rejected(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => {
                let state = match &inner.state {
                    PromiseState::Pending => "pending",
                    PromiseState::Fulfilled(_) => "fulfilled",
                    PromiseState::Rejected(_) => "rejected",
                };
                write!(f, "Promise(#{} {state})", inner.id)
            }
            Err(_) => write!(f, "Promise(<borrowed>)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TriggerKind {
    Resolve,
    Reject,
}

/// Settlement capability for one promise. The resolve and reject triggers
/// of a promise share one flag, so only the first call across both counts.
#[derive(Clone)]
pub struct Trigger {
    promise: Promise,
    already_resolved: Rc<Cell<bool>>,
    kind: TriggerKind,
}

impl Trigger {
    pub fn call(&self, runtime: &mut Runtime, value: impl Into<Value>) {
        runtime.fire_trigger(self, value.into());
    }

    pub fn promise(&self) -> &Promise {
        &self.promise
    }

    /// Function value form, for handing to foreign thenables.
    pub fn to_value(&self) -> Value {
        let trigger = self.clone();
        let name = match self.kind {
            TriggerKind::Resolve => "resolve",
            TriggerKind::Reject => "reject",
        };
        Value::function(name, move |runtime, _this, args| {
            let value = args.first().cloned().unwrap_or(Value::Undefined);
            trigger.call(runtime, value);
            Ok(Value::Undefined)
        })
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("promise", &self.promise)
            .field("kind", &self.kind)
            .field("already_resolved", &self.already_resolved.get())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Deferred {
    pub promise: Promise,
    pub resolve: Trigger,
    pub reject: Trigger,
}

impl Deferred {
    pub fn resolve(&self, runtime: &mut Runtime, value: impl Into<Value>) {
        self.resolve.call(runtime, value);
    }

    pub fn reject(&self, runtime: &mut Runtime, reason: impl Into<Value>) {
        self.reject.call(runtime, reason);
    }
}

impl Runtime {
    pub(crate) fn new_pending_promise(&mut self) -> Promise {
        let id = self.promise_runtime.allocate_promise_id();
        Promise {
            inner: Rc::new(RefCell::new(PromiseValue {
                id,
                state: PromiseState::Pending,
                fulfill_reactions: Vec::new(),
                reject_reactions: Vec::new(),
            })),
        }
    }

    pub(crate) fn new_settlement_triggers(&self, promise: &Promise) -> (Trigger, Trigger) {
        let already_resolved = Rc::new(Cell::new(false));
        let resolve = Trigger {
            promise: promise.clone(),
            already_resolved: already_resolved.clone(),
            kind: TriggerKind::Resolve,
        };
        let reject = Trigger {
            promise: promise.clone(),
            already_resolved,
            kind: TriggerKind::Reject,
        };
        (resolve, reject)
    }

    fn fire_trigger(&mut self, trigger: &Trigger, value: Value) {
        if trigger.already_resolved.replace(true) {
            self.trace_reaction_line(format!(
                "[promise] #{} ignored repeated {:?} with {value}",
                trigger.promise.id(),
                trigger.kind
            ));
            return;
        }
        match trigger.kind {
            TriggerKind::Resolve => self.promise_resolve(&trigger.promise, value),
            TriggerKind::Reject => self.promise_reject(&trigger.promise, value),
        }
    }

    /// Creates a promise and runs `executor` synchronously with its triggers.
    /// An `Err` from the executor rejects the promise unless a trigger was
    /// already called.
    pub fn new_promise<F>(&mut self, executor: F) -> Promise
    where
        F: FnOnce(&mut Runtime, Trigger, Trigger) -> Result<()>,
    {
        let promise = self.new_pending_promise();
        let (resolve, reject) = self.new_settlement_triggers(&promise);
        if let Err(err) = executor(self, resolve, reject.clone()) {
            self.trace_reaction_line(format!(
                "[promise] #{} executor failed: {err}",
                promise.id()
            ));
            reject.call(self, err.into_reason());
        }
        promise
    }

    pub fn deferred(&mut self) -> Deferred {
        let promise = self.new_pending_promise();
        let (resolve, reject) = self.new_settlement_triggers(&promise);
        Deferred {
            promise,
            resolve,
            reject,
        }
    }

    pub fn resolved(&mut self, value: impl Into<Value>) -> Promise {
        let value = value.into();
        if let Value::Promise(promise) = value {
            return promise;
        }
        let promise = self.new_pending_promise();
        self.promise_resolve(&promise, value);
        promise
    }

    pub fn rejected(&mut self, reason: impl Into<Value>) -> Promise {
        let promise = self.new_pending_promise();
        self.promise_reject(&promise, reason.into());
        promise
    }

    pub(crate) fn promise_add_reaction(
        &mut self,
        promise: &Promise,
        on_fulfilled: PromiseReactionKind,
        on_rejected: PromiseReactionKind,
    ) {
        let (id, settled) = {
            let mut promise_ref = promise.inner.borrow_mut();
            let promise_ref = &mut *promise_ref;
            let id = promise_ref.id;
            match &promise_ref.state {
                PromiseState::Pending => {
                    promise_ref
                        .fulfill_reactions
                        .push(PromiseReaction { kind: on_fulfilled });
                    promise_ref
                        .reject_reactions
                        .push(PromiseReaction { kind: on_rejected });
                    return;
                }
                PromiseState::Fulfilled(value) => {
                    (id, PromiseSettledValue::Fulfilled(value.clone()))
                }
                PromiseState::Rejected(reason) => {
                    (id, PromiseSettledValue::Rejected(reason.clone()))
                }
            }
        };
        let kind = match settled {
            PromiseSettledValue::Fulfilled(_) => on_fulfilled,
            PromiseSettledValue::Rejected(_) => on_rejected,
        };
        self.queue_promise_reaction_microtask(id, PromiseReaction { kind }, settled);
    }

    pub(crate) fn promise_fulfill(&mut self, promise: &Promise, value: Value) {
        let (id, reactions) = {
            let mut promise_ref = promise.inner.borrow_mut();
            if !matches!(promise_ref.state, PromiseState::Pending) {
                return;
            }
            promise_ref.state = PromiseState::Fulfilled(value.clone());
            promise_ref.reject_reactions.clear();
            (promise_ref.id, std::mem::take(&mut promise_ref.fulfill_reactions))
        };
        self.trace_reaction_line(format!(
            "[promise] #{id} fulfilled value={value} reactions={}",
            reactions.len()
        ));
        for reaction in reactions {
            self.queue_promise_reaction_microtask(
                id,
                reaction,
                PromiseSettledValue::Fulfilled(value.clone()),
            );
        }
    }

    pub(crate) fn promise_reject(&mut self, promise: &Promise, reason: Value) {
        let (id, reactions) = {
            let mut promise_ref = promise.inner.borrow_mut();
            if !matches!(promise_ref.state, PromiseState::Pending) {
                return;
            }
            promise_ref.state = PromiseState::Rejected(reason.clone());
            promise_ref.fulfill_reactions.clear();
            (promise_ref.id, std::mem::take(&mut promise_ref.reject_reactions))
        };
        self.trace_reaction_line(format!(
            "[promise] #{id} rejected reason={reason} reactions={}",
            reactions.len()
        ));
        for reaction in reactions {
            self.queue_promise_reaction_microtask(
                id,
                reaction,
                PromiseSettledValue::Rejected(reason.clone()),
            );
        }
    }

    /// Registers handlers on `promise` and returns the derived promise.
    /// Handlers that are not callable are treated as absent.
    pub fn then(
        &mut self,
        promise: &Promise,
        on_fulfilled: Option<Value>,
        on_rejected: Option<Value>,
    ) -> Promise {
        let on_fulfilled = on_fulfilled.filter(Value::is_callable);
        let on_rejected = on_rejected.filter(Value::is_callable);
        let result = self.new_pending_promise();
        self.trace_reaction_line(format!(
            "[promise] #{} then -> #{} fulfilled_handler={} rejected_handler={}",
            promise.id(),
            result.id(),
            on_fulfilled.is_some(),
            on_rejected.is_some()
        ));
        self.promise_add_reaction(
            promise,
            PromiseReactionKind::Then {
                handler: on_fulfilled,
                result: result.clone(),
            },
            PromiseReactionKind::Then {
                handler: on_rejected,
                result: result.clone(),
            },
        );
        result
    }

    pub fn catch(&mut self, promise: &Promise, on_rejected: Option<Value>) -> Promise {
        self.then(promise, None, on_rejected)
    }

    pub fn finally(&mut self, promise: &Promise, callback: Option<Value>) -> Promise {
        let callback = callback.filter(Value::is_callable);
        let result = self.new_pending_promise();
        self.trace_reaction_line(format!(
            "[promise] #{} finally -> #{}",
            promise.id(),
            result.id()
        ));
        let kind = PromiseReactionKind::Finally {
            callback,
            result: result.clone(),
        };
        self.promise_add_reaction(promise, kind.clone(), kind);
        result
    }

    pub(crate) fn promise_member(promise: &Promise, key: &str) -> Value {
        let target = promise.clone();
        match key {
            "then" => Value::function("then", move |runtime, _this, args| {
                let derived = runtime.then(&target, args.first().cloned(), args.get(1).cloned());
                Ok(Value::Promise(derived))
            }),
            "catch" => Value::function("catch", move |runtime, _this, args| {
                let derived = runtime.catch(&target, args.first().cloned());
                Ok(Value::Promise(derived))
            }),
            "finally" => Value::function("finally", move |runtime, _this, args| {
                let derived = runtime.finally(&target, args.first().cloned());
                Ok(Value::Promise(derived))
            }),
            _ => Value::Undefined,
        }
    }

    fn run_reaction_handler(&mut self, handler: &Value, argument: Value, result: &Promise) {
        match self.call_function(handler, &Value::Undefined, std::slice::from_ref(&argument)) {
            Ok(next) => self.promise_resolve(result, next),
            Err(err) => {
                self.trace_reaction_line(format!(
                    "[promise] #{} handler raised: {err}",
                    result.id()
                ));
                self.promise_reject(result, err.into_reason());
            }
        }
    }

    pub(crate) fn run_promise_reaction_task(
        &mut self,
        reaction: PromiseReaction,
        settled: PromiseSettledValue,
    ) {
        match reaction.kind {
            PromiseReactionKind::Then { handler, result } => match (handler, settled) {
                (Some(handler), PromiseSettledValue::Fulfilled(value)) => {
                    self.run_reaction_handler(&handler, value, &result)
                }
                (Some(handler), PromiseSettledValue::Rejected(reason)) => {
                    self.run_reaction_handler(&handler, reason, &result)
                }
                (None, PromiseSettledValue::Fulfilled(value)) => {
                    self.promise_fulfill(&result, value)
                }
                (None, PromiseSettledValue::Rejected(reason)) => {
                    self.promise_reject(&result, reason)
                }
            },
            PromiseReactionKind::Finally { callback, result } => {
                let Some(callback) = callback else {
                    match settled {
                        PromiseSettledValue::Fulfilled(value) => {
                            self.promise_fulfill(&result, value)
                        }
                        PromiseSettledValue::Rejected(reason) => {
                            self.promise_reject(&result, reason)
                        }
                    }
                    return;
                };
                match self.call_function(&callback, &Value::Undefined, &[]) {
                    Ok(next) => {
                        let continuation = self.resolved(next);
                        let kind = PromiseReactionKind::FinallyContinuation {
                            original: settled,
                            result,
                        };
                        self.promise_add_reaction(&continuation, kind.clone(), kind);
                    }
                    Err(err) => self.promise_reject(&result, err.into_reason()),
                }
            }
            PromiseReactionKind::FinallyContinuation { original, result } => match settled {
                PromiseSettledValue::Fulfilled(_) => match original {
                    PromiseSettledValue::Fulfilled(value) => self.promise_fulfill(&result, value),
                    PromiseSettledValue::Rejected(reason) => self.promise_reject(&result, reason),
                },
                PromiseSettledValue::Rejected(reason) => self.promise_reject(&result, reason),
            },
            PromiseReactionKind::ResolveTo { target } => match settled {
                PromiseSettledValue::Fulfilled(value) => self.promise_fulfill(&target, value),
                PromiseSettledValue::Rejected(reason) => self.promise_reject(&target, reason),
            },
        }
    }
}
