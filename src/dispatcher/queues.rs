//! Class queues: one FIFO of task batches per work class.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::debug;

use crate::config::DEFAULT_CLASS;
use crate::protocol::TaskBatch;

/// Per-class FIFO queues with a catch-all `default` class.
#[derive(Debug)]
pub struct ClassQueues {
    queues: HashMap<String, VecDeque<TaskBatch>>,
}

impl ClassQueues {
    pub fn new() -> Self {
        let mut queues = HashMap::new();
        queues.insert(DEFAULT_CLASS.to_string(), VecDeque::new());
        Self { queues }
    }

    /// Append a batch. Unseen classes get a queue on first use; a blank
    /// class name goes to `default`. Returns the class the batch landed in.
    pub fn enqueue(&mut self, class: &str, batch: TaskBatch) -> String {
        let class = resolve(class);
        let queue = self.queues.entry(class.to_string()).or_default();
        queue.push_back(batch);
        debug!(class = %class, depth = queue.len(), "Batch enqueued");
        class.to_string()
    }

    /// Pop the oldest batch for `class`, falling back to `default` when the
    /// class queue is empty.
    pub fn dequeue(&mut self, class: &str) -> Option<TaskBatch> {
        let class = resolve(class);
        if let Some(batch) = self.queues.get_mut(class).and_then(VecDeque::pop_front) {
            return Some(batch);
        }
        if class == DEFAULT_CLASS {
            return None;
        }
        let batch = self
            .queues
            .get_mut(DEFAULT_CLASS)
            .and_then(VecDeque::pop_front)?;
        debug!(class = %class, "Class queue empty, served from default");
        Some(batch)
    }

    pub fn depth(&self, class: &str) -> usize {
        self.queues.get(resolve(class)).map_or(0, VecDeque::len)
    }

    /// Batches waiting across every class.
    pub fn total(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    /// Depth per known class, sorted by class name.
    pub fn depths(&self) -> BTreeMap<String, usize> {
        self.queues
            .iter()
            .map(|(class, queue)| (class.clone(), queue.len()))
            .collect()
    }
}

impl Default for ClassQueues {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(class: &str) -> &str {
    let class = class.trim();
    if class.is_empty() { DEFAULT_CLASS } else { class }
}
