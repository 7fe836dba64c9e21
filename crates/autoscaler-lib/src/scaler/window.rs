//! Bounded vote history

use super::{ScaleDirection, Vote};
use std::collections::VecDeque;

/// Upper bound on slots reserved up front; larger windows grow on demand
const MAX_PREALLOCATED_VOTES: usize = 64;

/// The most recent `capacity` votes.
///
/// A direction fires only when every slot of a full window agrees.
#[derive(Debug, Clone)]
pub struct VoteWindow {
    votes: VecDeque<Vote>,
    capacity: usize,
}

impl VoteWindow {
    /// Create an empty window; a zero capacity is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            votes: VecDeque::with_capacity(capacity.min(MAX_PREALLOCATED_VOTES)),
            capacity,
        }
    }

    /// Append a vote, dropping the oldest if the window is full
    pub fn push(&mut self, vote: Vote) {
        if self.votes.len() == self.capacity {
            self.votes.pop_front();
        }
        self.votes.push_back(vote);
    }

    pub fn sum(&self) -> i64 {
        self.votes.iter().map(|v| v.value()).sum()
    }

    /// Direction the window unanimously agrees on, if any
    pub fn unanimous(&self) -> Option<ScaleDirection> {
        let sum = self.sum();
        let Ok(capacity) = i64::try_from(self.capacity) else {
            return None;
        };
        if sum == capacity {
            Some(ScaleDirection::Out)
        } else if sum == -capacity {
            Some(ScaleDirection::In)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.votes.clear();
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn votes(&self) -> impl Iterator<Item = Vote> + '_ {
        self.votes.iter().copied()
    }
}
