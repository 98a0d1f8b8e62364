use super::{QueueClient, QueueError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    lists: HashMap<String, VecDeque<String>>,
    values: HashMap<String, String>,
    writes: Vec<(String, String)>,
    failing_pops: usize,
    failing_sets: usize,
}

/// In-process FIFO lists and key/value store with the same contract as the remote service
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, QueueError> {
        self.state
            .lock()
            .map_err(|_| QueueError::Transport("memory queue lock poisoned".to_string()))
    }

    /// Append an item to the tail of `list`
    pub fn push(&self, list: &str, item: impl Into<String>) {
        if let Ok(mut state) = self.lock() {
            state
                .lists
                .entry(list.to_string())
                .or_default()
                .push_back(item.into());
        }
    }

    /// Current value at `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().ok()?.values.get(key).cloned()
    }

    /// Every `set` performed so far, in order
    pub fn writes(&self) -> Vec<(String, String)> {
        self.lock().map(|s| s.writes.clone()).unwrap_or_default()
    }

    /// Items still waiting in `list`
    pub fn pending(&self, list: &str) -> usize {
        self.lock()
            .map(|s| s.lists.get(list).map_or(0, VecDeque::len))
            .unwrap_or(0)
    }

    /// Make the next `count` pops fail with a transport error
    pub fn fail_next_pops(&self, count: usize) {
        if let Ok(mut state) = self.lock() {
            state.failing_pops = count;
        }
    }

    /// Make the next `count` sets fail with a transport error
    pub fn fail_next_sets(&self, count: usize) {
        if let Ok(mut state) = self.lock() {
            state.failing_sets = count;
        }
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn pop(&self, list: &str) -> Result<Option<String>, QueueError> {
        let mut state = self.lock()?;
        if state.failing_pops > 0 {
            state.failing_pops -= 1;
            return Err(QueueError::Transport("simulated connection failure".to_string()));
        }
        Ok(state.lists.get_mut(list).and_then(VecDeque::pop_front))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        if state.failing_sets > 0 {
            state.failing_sets -= 1;
            return Err(QueueError::Transport("simulated connection failure".to_string()));
        }
        state.values.insert(key.to_string(), value.to_string());
        state.writes.push((key.to_string(), value.to_string()));
        Ok(())
    }
}
