use super::*;

const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROWTH: usize = 32 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct Runtime {
    pub(crate) scheduler: SchedulerState,
    pub(crate) promise_runtime: PromiseRuntimeState,
    pub(crate) trace_state: TraceState,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_trace(&mut self, enabled: bool) {
        self.trace_state.enabled = enabled;
    }

    pub fn take_trace_logs(&mut self) -> Vec<String> {
        std::mem::take(&mut self.trace_state.logs).into()
    }

    pub fn set_trace_stderr(&mut self, enabled: bool) {
        self.trace_state.to_stderr = enabled;
    }

    pub fn set_trace_reactions(&mut self, enabled: bool) {
        self.trace_state.reactions = enabled;
    }

    pub fn set_trace_resolution(&mut self, enabled: bool) {
        self.trace_state.resolution = enabled;
    }

    pub fn set_trace_scheduler(&mut self, enabled: bool) {
        self.trace_state.scheduler = enabled;
    }

    pub fn set_trace_log_limit(&mut self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::InvalidConfig(
                "set_trace_log_limit requires at least 1 entry".into(),
            ));
        }
        self.trace_state.log_limit = max_entries;
        self.trace_state.truncate_to_limit();
        Ok(())
    }

    pub fn set_microtask_step_limit(&mut self, max_steps: usize) -> Result<()> {
        if max_steps == 0 {
            return Err(Error::InvalidConfig(
                "set_microtask_step_limit requires at least 1 step".into(),
            ));
        }
        self.scheduler.microtask_step_limit = max_steps;
        Ok(())
    }

    pub fn microtask_step_limit(&self) -> usize {
        self.scheduler.microtask_step_limit
    }

    pub(crate) fn trace_reaction_line(&mut self, line: String) {
        if self.trace_state.enabled && self.trace_state.reactions {
            self.trace_state.push(line);
        }
    }

    pub(crate) fn trace_resolution_line(&mut self, line: String) {
        if self.trace_state.enabled && self.trace_state.resolution {
            self.trace_state.push(line);
        }
    }

    pub(crate) fn trace_scheduler_line(&mut self, line: String) {
        if self.trace_state.enabled && self.trace_state.scheduler {
            self.trace_state.push(line);
        }
    }

    /// Reads `key` from `target`, running accessor getters.
    pub fn get_property(&mut self, target: &Value, key: &str) -> Result<Value> {
        let property = match target {
            Value::Object(object) => object.borrow().get_entry(key).cloned(),
            Value::Function(function) => function.properties.borrow().get_entry(key).cloned(),
            Value::Promise(promise) => return Ok(Self::promise_member(promise, key)),
            Value::Error(error) => {
                return Ok(match key {
                    "name" => Value::String(error.name.clone()),
                    "message" => Value::String(error.message.clone()),
                    _ => Value::Undefined,
                });
            }
            Value::Undefined | Value::Null => {
                return Err(Error::TypeError(format!(
                    "cannot read property '{key}' of {target}"
                )));
            }
            _ => None,
        };

        match property {
            None => Ok(Value::Undefined),
            Some(Property::Data(value)) => Ok(value),
            Some(Property::Accessor { getter }) => self.call_function(&getter, target, &[]),
        }
    }

    pub fn call_function(&mut self, callee: &Value, this: &Value, args: &[Value]) -> Result<Value> {
        let Value::Function(function) = callee else {
            return Err(Error::TypeError(format!(
                "{} is not a function",
                callee.type_name()
            )));
        };
        let function = Rc::clone(function);
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH, || {
            (function.body)(self, this, args)
        })
    }

    pub fn queue_microtask(&mut self, callback: Value) -> Result<()> {
        if !callback.is_callable() {
            return Err(Error::TypeError(format!(
                "queue_microtask expects a function, got {}",
                callback.type_name()
            )));
        }
        self.scheduler
            .microtask_queue
            .push_back(ScheduledMicrotask::Callback { callback });
        Ok(())
    }

    pub(crate) fn queue_promise_reaction_microtask(
        &mut self,
        source: usize,
        reaction: PromiseReaction,
        settled: PromiseSettledValue,
    ) {
        self.scheduler
            .microtask_queue
            .push_back(ScheduledMicrotask::Promise {
                source,
                reaction,
                settled,
            });
    }

    pub fn pending_microtasks(&self) -> usize {
        self.scheduler.microtask_queue.len()
    }

    /// Drains the microtask queue, including work queued while draining.
    ///
    /// Called from inside a running microtask this is a no-op returning
    /// `Ok(0)`: the outer drain picks up whatever was queued.
    pub fn run_microtasks(&mut self) -> Result<usize> {
        if self.scheduler.draining {
            return Ok(0);
        }
        self.scheduler.draining = true;
        let run_result =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.drain_microtask_queue()));
        self.scheduler.draining = false;
        match run_result {
            Ok(result) => result,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    fn drain_microtask_queue(&mut self) -> Result<usize> {
        let mut steps = 0usize;
        loop {
            if self.scheduler.microtask_queue.is_empty() {
                break;
            }
            if steps >= self.scheduler.microtask_step_limit {
                return Err(self.microtask_limit_error(steps));
            }
            let Some(task) = self.scheduler.microtask_queue.pop_front() else {
                break;
            };
            steps += 1;

            match task {
                ScheduledMicrotask::Callback { callback } => {
                    self.trace_scheduler_line(format!("[microtask] run callback {callback}"));
                    self.call_function(&callback, &Value::Undefined, &[])?;
                }
                ScheduledMicrotask::Promise {
                    source,
                    reaction,
                    settled,
                } => {
                    self.trace_scheduler_line(format!(
                        "[microtask] run {} reaction source=#{source}",
                        reaction.kind.label()
                    ));
                    self.run_promise_reaction_task(reaction, settled);
                }
            }
        }
        if steps > 0 {
            self.trace_scheduler_line(format!("[microtask] flush ran={steps}"));
        }
        Ok(steps)
    }

    fn microtask_limit_error(&self, steps: usize) -> Error {
        let next_task_desc = self
            .scheduler
            .microtask_queue
            .front()
            .map(|task| match task {
                ScheduledMicrotask::Callback { callback } => format!("callback {callback}"),
                ScheduledMicrotask::Promise {
                    source, reaction, ..
                } => format!("{} reaction source=#{source}", reaction.kind.label()),
            })
            .unwrap_or_else(|| "none".into());
        Error::MicrotaskLimitExceeded {
            limit: self.scheduler.microtask_step_limit,
            ran: steps,
            next_task: next_task_desc,
        }
    }

    fn with_task_depth<T>(&mut self, run: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.scheduler.task_depth += 1;
        let run_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run(self)));
        self.scheduler.task_depth = self.scheduler.task_depth.saturating_sub(1);
        match run_result {
            Ok(result) => result,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    /// Runs one synchronous turn. The outermost turn flushes microtasks
    /// once it returns successfully.
    pub fn run_task<T>(&mut self, run: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = self.with_task_depth(run);
        let should_flush_microtasks = self.scheduler.task_depth == 0;
        match result {
            Ok(value) => {
                if should_flush_microtasks {
                    self.run_microtasks()?;
                }
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }
}
