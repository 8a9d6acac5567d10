//! Priority heap over the task DAG, keyed `(priority asc, creationTime asc)`
//! with a side-index on dependencies (§4.2).

use std::collections::{BinaryHeap, HashMap, HashSet};

use wavekeep_core::types::{Task, TaskStatus};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("task `{0}` declares unknown dependency `{1}`")]
    UnknownDependency(String, String),
    #[error("task `{0}` not found")]
    NotFound(String),
}

/// Min-heap entry ordered so the lowest `(priority, created_at)` pops first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReadyEntry {
    priority: i32,
    created_at: chrono::DateTime<chrono::Utc>,
    id: String,
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; invert so smaller (priority, created_at)
        // sorts greater and pops first.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.created_at.cmp(&self.created_at))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Dependency-aware task queue. `dequeue` only returns tasks whose
/// dependencies have all reached `Completed` and whose wave matches
/// `current_wave`; the coordinator advances `current_wave` explicitly.
pub struct TaskQueue {
    tasks: HashMap<String, Task>,
    current_wave: u32,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            current_wave: 0,
        }
    }

    pub fn current_wave(&self) -> u32 {
        self.current_wave
    }

    pub fn set_current_wave(&mut self, wave: u32) {
        self.current_wave = wave;
    }

    /// Validates that every declared dependency exists, then stores the
    /// task with status `Queued`.
    pub fn enqueue(&mut self, mut task: Task) -> Result<(), QueueError> {
        for dep in &task.dependencies {
            if !self.tasks.contains_key(dep) {
                return Err(QueueError::UnknownDependency(task.id.clone(), dep.clone()));
            }
        }
        task.status = TaskStatus::Queued;
        self.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    fn is_ready(&self, task: &Task) -> bool {
        task.status == TaskStatus::Queued
            && task.wave_id.unwrap_or(0) == self.current_wave
            && task
                .dependencies
                .iter()
                .all(|dep| self.tasks.get(dep).map(|t| t.status == TaskStatus::Completed).unwrap_or(false))
    }

    /// Returns the highest-priority ready task (earliest insertion wins
    /// ties), or `None` if no task in the current wave is ready.
    pub fn dequeue(&self) -> Option<&Task> {
        let mut heap: BinaryHeap<ReadyEntry> = BinaryHeap::new();
        for task in self.tasks.values() {
            if self.is_ready(task) {
                heap.push(ReadyEntry {
                    priority: task.priority,
                    created_at: task.created_at,
                    id: task.id.clone(),
                });
            }
        }
        heap.pop().and_then(|entry| self.tasks.get(&entry.id))
    }

    pub fn get_ready_tasks(&self) -> Vec<&Task> {
        let mut ready: Vec<&Task> = self.tasks.values().filter(|t| self.is_ready(t)).collect();
        ready.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
        ready
    }

    pub fn get_by_wave(&self, wave_id: u32) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|t| t.wave_id.unwrap_or(0) == wave_id)
            .collect()
    }

    pub fn mark_assigned(&mut self, id: &str) -> Result<(), QueueError> {
        let task = self.tasks.get_mut(id).ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        task.status = TaskStatus::Assigned;
        Ok(())
    }

    pub fn mark_running(&mut self, id: &str) -> Result<(), QueueError> {
        let task = self.tasks.get_mut(id).ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        task.status = TaskStatus::Running;
        Ok(())
    }

    pub fn mark_complete(&mut self, id: &str) -> Result<(), QueueError> {
        let task = self.tasks.get_mut(id).ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        task.status = TaskStatus::Completed;
        Ok(())
    }

    pub fn mark_failed(&mut self, id: &str) -> Result<(), QueueError> {
        let task = self.tasks.get_mut(id).ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        task.status = TaskStatus::Failed;
        Ok(())
    }

    pub fn mark_escalated(&mut self, id: &str) -> Result<(), QueueError> {
        let task = self.tasks.get_mut(id).ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        task.status = TaskStatus::Escalated;
        Ok(())
    }

    /// A task is `blocked` (report-only, never stored) when any transitive
    /// ancestor has failed or escalated.
    pub fn has_failed_ancestor(&self, id: &str) -> bool {
        let mut seen = HashSet::new();
        let mut stack: Vec<&str> = match self.tasks.get(id) {
            Some(t) => t.dependencies.iter().map(|s| s.as_str()).collect(),
            None => return false,
        };
        while let Some(dep_id) = stack.pop() {
            if !seen.insert(dep_id) {
                continue;
            }
            match self.tasks.get(dep_id) {
                Some(dep) if dep.status == TaskStatus::Failed || dep.status == TaskStatus::Escalated => {
                    return true;
                }
                Some(dep) => stack.extend(dep.dependencies.iter().map(|s| s.as_str())),
                None => {}
            }
        }
        false
    }

    /// Effective status: `Blocked` overrides the stored status when the
    /// task has a failed/escalated ancestor and isn't itself terminal.
    pub fn effective_status(&self, id: &str) -> Option<TaskStatus> {
        let task = self.tasks.get(id)?;
        if !task.status.is_terminal() && self.has_failed_ancestor(id) {
            Some(TaskStatus::Blocked)
        } else {
            Some(task.status)
        }
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn size(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// `true` once every task in `wave_id` has reached a terminal status.
    pub fn wave_complete(&self, wave_id: u32) -> bool {
        self.get_by_wave(wave_id).iter().all(|t| t.status.is_terminal())
    }

    /// The minimum wave id that still has a non-terminal task, or `None`
    /// if every task across every wave is terminal.
    pub fn next_pending_wave(&self) -> Option<u32> {
        self.tasks
            .values()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.wave_id.unwrap_or(0))
            .min()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, priority: i32, deps: &[&str], wave: u32) -> Task {
        let mut t = Task::new(id, id, priority);
        t.dependencies = deps.iter().map(|s| s.to_string()).collect();
        t.wave_id = Some(wave);
        t
    }

    #[test]
    fn enqueue_rejects_unknown_dependency() {
        let mut q = TaskQueue::new();
        let err = q.enqueue(task("b", 1, &["a"], 0)).unwrap_err();
        assert!(matches!(err, QueueError::UnknownDependency(_, _)));
    }

    #[test]
    fn dequeue_returns_none_when_deps_incomplete() {
        let mut q = TaskQueue::new();
        q.enqueue(task("a", 1, &[], 0)).unwrap();
        q.enqueue(task("b", 1, &["a"], 0)).unwrap();
        let next = q.dequeue().unwrap();
        assert_eq!(next.id, "a");
    }

    #[test]
    fn dequeue_prefers_lower_priority_value() {
        let mut q = TaskQueue::new();
        q.enqueue(task("a", 5, &[], 0)).unwrap();
        q.enqueue(task("b", 1, &[], 0)).unwrap();
        assert_eq!(q.dequeue().unwrap().id, "b");
    }

    #[test]
    fn dequeue_ties_break_by_insertion_order() {
        let mut q = TaskQueue::new();
        q.enqueue(task("a", 1, &[], 0)).unwrap();
        q.enqueue(task("b", 1, &[], 0)).unwrap();
        // "a" was inserted first so has an earlier created_at.
        assert_eq!(q.dequeue().unwrap().id, "a");
    }

    #[test]
    fn dequeue_respects_current_wave() {
        let mut q = TaskQueue::new();
        q.enqueue(task("a", 1, &[], 1)).unwrap();
        assert!(q.dequeue().is_none());
        q.set_current_wave(1);
        assert_eq!(q.dequeue().unwrap().id, "a");
    }

    #[test]
    fn mark_complete_unblocks_dependent() {
        let mut q = TaskQueue::new();
        q.enqueue(task("a", 1, &[], 0)).unwrap();
        q.enqueue(task("b", 1, &["a"], 0)).unwrap();
        assert!(q.get_ready_tasks().iter().all(|t| t.id != "b"));
        q.mark_complete("a").unwrap();
        assert!(q.get_ready_tasks().iter().any(|t| t.id == "b"));
    }

    #[test]
    fn failed_ancestor_reports_blocked() {
        let mut q = TaskQueue::new();
        q.enqueue(task("a", 1, &[], 0)).unwrap();
        q.enqueue(task("b", 1, &["a"], 0)).unwrap();
        q.enqueue(task("c", 1, &["b"], 0)).unwrap();
        q.mark_failed("a").unwrap();
        assert_eq!(q.effective_status("b"), Some(TaskStatus::Blocked));
        assert_eq!(q.effective_status("c"), Some(TaskStatus::Blocked));
    }

    #[test]
    fn terminal_status_is_not_overridden_by_blocked() {
        let mut q = TaskQueue::new();
        q.enqueue(task("a", 1, &[], 0)).unwrap();
        q.enqueue(task("b", 1, &["a"], 0)).unwrap();
        q.mark_failed("a").unwrap();
        q.mark_complete("b").unwrap();
        assert_eq!(q.effective_status("b"), Some(TaskStatus::Completed));
    }

    #[test]
    fn wave_complete_requires_all_terminal() {
        let mut q = TaskQueue::new();
        q.enqueue(task("a", 1, &[], 0)).unwrap();
        q.enqueue(task("b", 1, &[], 0)).unwrap();
        assert!(!q.wave_complete(0));
        q.mark_complete("a").unwrap();
        assert!(!q.wave_complete(0));
        q.mark_failed("b").unwrap();
        assert!(q.wave_complete(0));
    }

    #[test]
    fn next_pending_wave_tracks_lowest_incomplete() {
        let mut q = TaskQueue::new();
        q.enqueue(task("a", 1, &[], 0)).unwrap();
        q.enqueue(task("b", 1, &[], 1)).unwrap();
        assert_eq!(q.next_pending_wave(), Some(0));
        q.mark_complete("a").unwrap();
        assert_eq!(q.next_pending_wave(), Some(1));
        q.mark_complete("b").unwrap();
        assert_eq!(q.next_pending_wave(), None);
    }
}
