//! Task priority.
//!
//! The wire schema (plan files, CLI, status snapshots) uses a plain
//! integer where *lower* means *more urgent* — `0` is highest. `TaskPriority`
//! keeps that representation but reverses `Ord` so scheduling code can use
//! the natural `BinaryHeap` "pop the greatest" idiom to mean "pop the most
//! urgent task" without special-casing the comparison at every call site.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskPriority(pub u8);

impl TaskPriority {
    pub const HIGHEST: TaskPriority = TaskPriority(0);
    pub const LOWEST: TaskPriority = TaskPriority(3);

    pub fn new(value: u8) -> Self {
        Self(value)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority(2)
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Ord for TaskPriority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed: a smaller numeric value is a *higher* priority.
        other.0.cmp(&self.0)
    }
}

impl PartialOrd for TaskPriority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_number_sorts_as_higher_priority() {
        assert!(TaskPriority(0) > TaskPriority(1));
        assert!(TaskPriority(1) > TaskPriority(2));
        assert!(TaskPriority(3) < TaskPriority(0));
    }

    #[test]
    fn binary_heap_pops_highest_priority_first() {
        use std::collections::BinaryHeap;
        let mut heap = BinaryHeap::new();
        heap.push(TaskPriority(2));
        heap.push(TaskPriority(0));
        heap.push(TaskPriority(3));
        heap.push(TaskPriority(1));

        assert_eq!(heap.pop(), Some(TaskPriority(0)));
        assert_eq!(heap.pop(), Some(TaskPriority(1)));
        assert_eq!(heap.pop(), Some(TaskPriority(2)));
        assert_eq!(heap.pop(), Some(TaskPriority(3)));
    }
}
