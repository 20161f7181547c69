//! FIFO of pending handler tasks for one generation.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::event::HandlerTask;

#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<HandlerTask>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: HandlerTask) {
        self.lock().push_back(task);
    }

    pub fn extend(&self, tasks: impl IntoIterator<Item = HandlerTask>) {
        self.lock().extend(tasks);
    }

    pub fn pop(&self) -> Option<HandlerTask> {
        self.lock().pop_front()
    }

    /// Drop every pending task; returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut tasks = self.lock();
        let n = tasks.len();
        tasks.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<HandlerTask>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}
