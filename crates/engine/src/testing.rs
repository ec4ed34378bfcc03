//! Downstream double for tests and dry runs

use crate::publish::{Downstream, DownstreamError};
use cairn_core::{EnrichedRecord, EventId};

/// Downstream that fails on request and records what it saw
#[derive(Debug, Default, Clone)]
pub struct ScriptedDownstream {
    /// Fail every `prepare`
    pub fail_prepare: bool,
    /// Fail every `commit`
    pub fail_commit: bool,
    /// Fail every `rollback`
    pub fail_rollback: bool,
    /// Fail only these prepare calls (0-based call index)
    pub fail_prepare_on: Vec<usize>,
    /// Number of `prepare` calls so far
    pub prepare_calls: usize,
    /// Events committed
    pub committed: Vec<EventId>,
    /// Events rolled back
    pub rolled_back: Vec<EventId>,
}

impl ScriptedDownstream {
    /// Fails every prepare
    pub fn failing_prepare() -> Self {
        ScriptedDownstream {
            fail_prepare: true,
            ..Default::default()
        }
    }

    /// Fails every commit
    pub fn failing_commit() -> Self {
        ScriptedDownstream {
            fail_commit: true,
            ..Default::default()
        }
    }

    /// Fails the prepare calls at the given indices
    pub fn failing_prepare_on(calls: impl IntoIterator<Item = usize>) -> Self {
        ScriptedDownstream {
            fail_prepare_on: calls.into_iter().collect(),
            ..Default::default()
        }
    }
}

impl Downstream for ScriptedDownstream {
    fn prepare(&mut self, _: &EnrichedRecord, target_uri: &str) -> Result<(), DownstreamError> {
        let call = self.prepare_calls;
        self.prepare_calls += 1;
        if self.fail_prepare || self.fail_prepare_on.contains(&call) {
            return Err(DownstreamError::new(format!("{target_uri} refused prepare")));
        }
        Ok(())
    }

    fn commit(&mut self, record: &EnrichedRecord, target_uri: &str) -> Result<(), DownstreamError> {
        if self.fail_commit {
            return Err(DownstreamError::new(format!("{target_uri} refused commit")));
        }
        self.committed.push(record.event_id());
        Ok(())
    }

    fn rollback(&mut self, record: &EnrichedRecord, target_uri: &str) -> Result<(), DownstreamError> {
        if self.fail_rollback {
            return Err(DownstreamError::new(format!("{target_uri} refused rollback")));
        }
        self.rolled_back.push(record.event_id());
        Ok(())
    }
}
