use std::sync::Arc;

use parking_lot::RwLock;

use super::{ConcurrencyGroup, UnitGroup, UnitId};
use crate::{Fault, ResultSink};

/// A [`ConcurrencyGroup`] whose uncaught faults end up in a result sink.
///
/// Faults are attributed to one owner identity (usually the load test that
/// created the group). A real fault also interrupts every other live member.
pub struct FaultFunnel {
    group: ConcurrencyGroup,
    owner: String,
    result: RwLock<Option<Arc<dyn ResultSink>>>,
}

impl FaultFunnel {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: ConcurrencyGroup::new(name),
            owner: owner.into(),
            result: RwLock::new(None),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Sets the sink faults are reported to from now on.
    pub fn bind_result_sink(&self, result: Arc<dyn ResultSink>) {
        *self.result.write() = Some(result);
    }
}

impl UnitGroup for FaultFunnel {
    fn group(&self) -> &ConcurrencyGroup {
        &self.group
    }

    fn uncaught_fault(&self, unit: UnitId, fault: Fault) {
        if fault.is_teardown() {
            tracing::debug!(%unit, "Unit torn down");
            return;
        }

        let sink = self.result.read().clone();
        match sink {
            Some(sink) => {
                tracing::warn!(owner = %self.owner, %unit, %fault, "Funneling uncaught fault");
                fault.report(sink.as_ref(), &self.owner);
            }
            None => {
                tracing::error!(owner = %self.owner, %unit, %fault, "Uncaught fault with no result sink bound");
            }
        }

        let interrupted = self.group.interrupt(Some(unit));
        tracing::debug!(group = %self.group.name(), interrupted, "Interrupted sibling units");
    }
}
