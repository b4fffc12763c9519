//! Append-only step result store.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{SessionError, SessionResult};
use crate::step::StepResult;

/// Authoritative ledger of step outcomes for one session.
///
/// Entries are kept in record order and never modified. A step that is run
/// again is appended as a new attempt; [`get`](Self::get) returns the latest
/// attempt while [`attempts`](Self::attempts) exposes the full history.
#[derive(Debug, Clone, Default)]
pub struct StepResultStore {
    entries: Vec<Arc<StepResult>>,
    /// Step number to index of its latest attempt in `entries`.
    latest: BTreeMap<u32, usize>,
}

impl StepResultStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the first result for a step.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::DuplicateStep` if the step already has an entry,
    /// or `SessionError::InvalidStepNumber` for step 0. The store is left
    /// unchanged on error.
    pub fn record(&mut self, step_number: u32, result: StepResult) -> SessionResult<&StepResult> {
        if step_number == 0 {
            return Err(SessionError::InvalidStepNumber(step_number));
        }
        if self.latest.contains_key(&step_number) {
            return Err(SessionError::DuplicateStep(step_number));
        }
        Ok(self.push(step_number, result.stamp(step_number, 1)))
    }

    /// Records another attempt for a step that already has a result.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StepNotRecorded` if the step has no entry yet.
    pub fn record_retry(
        &mut self,
        step_number: u32,
        result: StepResult,
    ) -> SessionResult<&StepResult> {
        let attempt = self
            .get(step_number)
            .map(StepResult::attempt)
            .ok_or(SessionError::StepNotRecorded(step_number))?;
        Ok(self.push(step_number, result.stamp(step_number, attempt + 1)))
    }

    fn push(&mut self, step_number: u32, result: StepResult) -> &StepResult {
        self.entries.push(Arc::new(result));
        let index = self.entries.len() - 1;
        self.latest.insert(step_number, index);
        &self.entries[index]
    }

    /// Returns the latest result for a step, or `None` if it has not run.
    #[must_use]
    pub fn get(&self, step_number: u32) -> Option<&StepResult> {
        self.latest
            .get(&step_number)
            .map(|&index| self.entries[index].as_ref())
    }

    /// Checks whether a step has a result.
    #[must_use]
    pub fn contains(&self, step_number: u32) -> bool {
        self.latest.contains_key(&step_number)
    }

    /// Returns every attempt recorded for a step, oldest first.
    #[must_use]
    pub fn attempts(&self, step_number: u32) -> Vec<&StepResult> {
        self.entries
            .iter()
            .filter(|e| e.step_number() == step_number)
            .map(AsRef::as_ref)
            .collect()
    }

    /// Highest step number with a result, 0 when nothing has completed.
    #[must_use]
    pub fn highest_completed(&self) -> u32 {
        self.latest.keys().next_back().copied().unwrap_or(0)
    }

    /// Returns the most recently recorded entry.
    #[must_use]
    pub fn last(&self) -> Option<&StepResult> {
        self.entries.last().map(AsRef::as_ref)
    }

    /// Iterates over all entries in record order.
    pub fn iter(&self) -> impl Iterator<Item = &StepResult> {
        self.entries.iter().map(AsRef::as_ref)
    }

    /// Number of recorded entries, attempts included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Takes an immutable snapshot of the latest results for steps
    /// `1..=visible_through`.
    #[must_use]
    pub fn snapshot(&self, visible_through: u32) -> StepSnapshot {
        let steps = self
            .latest
            .range(..=visible_through)
            .map(|(&n, &index)| (n, Arc::clone(&self.entries[index])))
            .collect();
        StepSnapshot {
            steps: Arc::new(steps),
            visible_through,
        }
    }
}

/// Immutable view of completed steps handed to one script evaluation.
///
/// Cloning is cheap; the underlying results are shared, never copied.
#[derive(Debug, Clone, Default)]
pub struct StepSnapshot {
    steps: Arc<BTreeMap<u32, Arc<StepResult>>>,
    visible_through: u32,
}

impl StepSnapshot {
    /// Returns the result for a step if it is part of the snapshot.
    #[must_use]
    pub fn get(&self, step_number: u32) -> Option<&Arc<StepResult>> {
        self.steps.get(&step_number)
    }

    /// Highest step number the snapshot was allowed to contain.
    #[must_use]
    pub const fn visible_through(&self) -> u32 {
        self.visible_through
    }

    /// Step numbers present in the snapshot, ascending.
    pub fn step_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.steps.keys().copied()
    }

    /// Number of steps in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Checks whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
