use super::*;

#[derive(Debug)]
pub(crate) enum ScheduledMicrotask {
    Callback {
        callback: Value,
    },
    Promise {
        source: usize,
        reaction: PromiseReaction,
        settled: PromiseSettledValue,
    },
}

#[derive(Debug)]
pub(crate) struct SchedulerState {
    pub(crate) microtask_queue: VecDeque<ScheduledMicrotask>,
    pub(crate) microtask_step_limit: usize,
    pub(crate) task_depth: usize,
    pub(crate) draining: bool,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            microtask_queue: VecDeque::new(),
            microtask_step_limit: 10_000,
            task_depth: 0,
            draining: false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct PromiseRuntimeState {
    pub(crate) next_promise_id: usize,
}

impl Default for PromiseRuntimeState {
    fn default() -> Self {
        Self { next_promise_id: 1 }
    }
}

impl PromiseRuntimeState {
    pub(crate) fn allocate_promise_id(&mut self) -> usize {
        let id = self.next_promise_id;
        self.next_promise_id = self.next_promise_id.saturating_add(1);
        id
    }
}

#[derive(Debug)]
pub(crate) struct TraceState {
    pub(crate) enabled: bool,
    pub(crate) reactions: bool,
    pub(crate) resolution: bool,
    pub(crate) scheduler: bool,
    pub(crate) logs: VecDeque<String>,
    pub(crate) log_limit: usize,
    pub(crate) to_stderr: bool,
}

impl Default for TraceState {
    fn default() -> Self {
        Self {
            enabled: false,
            reactions: true,
            resolution: true,
            scheduler: true,
            logs: VecDeque::new(),
            log_limit: 10_000,
            to_stderr: true,
        }
    }
}

impl TraceState {
    pub(crate) fn push(&mut self, line: String) {
        if !self.enabled {
            return;
        }
        if self.to_stderr {
            eprintln!("{line}");
        }
        while self.logs.len() >= self.log_limit {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    pub(crate) fn truncate_to_limit(&mut self) {
        while self.logs.len() > self.log_limit {
            self.logs.pop_front();
        }
    }
}
