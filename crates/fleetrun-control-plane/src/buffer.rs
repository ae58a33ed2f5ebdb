//! Local buffer of results waiting to be replayed to the center.

use std::sync::{Mutex, MutexGuard, PoisonError};

use fleetrun_core::TaskHost;

const INITIAL_CAPACITY: usize = 128;

/// Process-local, append-only queue of finished task host snapshots.
///
/// Not persisted: anything still buffered is lost when the process stops.
pub struct ResultBuffer {
    results: Mutex<Vec<TaskHost>>,
}

impl ResultBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            results: Mutex::new(Vec::with_capacity(INITIAL_CAPACITY)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TaskHost>> {
        // A panic while pushing cannot leave the Vec half-written.
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a result.
    pub fn push(&self, result: TaskHost) {
        self.lock().push(result);
    }

    /// Take every buffered result, leaving the buffer empty.
    pub fn pop_all(&self) -> Vec<TaskHost> {
        std::mem::replace(&mut *self.lock(), Vec::with_capacity(INITIAL_CAPACITY))
    }

    /// Number of buffered results.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResultBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::sync::Arc;

    use fleetrun_core::TaskId;

    #[test]
    fn test_pop_all_drains_in_order() {
        let buffer = ResultBuffer::new();
        buffer.push(TaskHost::new(TaskId::new(1), "h1"));
        buffer.push(TaskHost::new(TaskId::new(1), "h2"));
        assert_eq!(buffer.len(), 2);

        let results = buffer.pop_all();
        assert_eq!(results[0].host, "h1");
        assert_eq!(results[1].host, "h2");
        assert!(buffer.is_empty());
        assert!(buffer.pop_all().is_empty());
    }

    #[test]
    fn test_concurrent_push_and_pop_loses_nothing() {
        let buffer = Arc::new(ResultBuffer::new());
        let writers: Vec<_> = (0..8)
            .map(|w| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        buffer.push(TaskHost::new(TaskId::new(w * 1_000 + i), "h"));
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        while writers.iter().any(|w| !w.is_finished()) {
            seen.extend(buffer.pop_all());
        }
        for writer in writers {
            writer.join().unwrap();
        }
        seen.extend(buffer.pop_all());

        let unique: HashSet<_> = seen.iter().map(|r| r.id).collect();
        assert_eq!(seen.len(), 8 * 500);
        assert_eq!(unique.len(), seen.len());
    }
}
