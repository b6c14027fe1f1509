use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{Fault, GroupError};

/// Identity of one concurrency unit. Unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(u64);

impl UnitId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit-{}", self.0)
    }
}

/// Named registry of the units that are currently alive.
///
/// Every member owns an interrupt flag; [`interrupt`](Self::interrupt) raises
/// it for the members present at that moment. The live count is observable
/// through [`wait_until_empty`](Self::wait_until_empty).
#[derive(Debug)]
pub struct ConcurrencyGroup {
    name: String,
    members: Mutex<HashMap<UnitId, watch::Sender<bool>>>,
    active: watch::Sender<usize>,
}

impl ConcurrencyGroup {
    pub fn new(name: impl Into<String>) -> Self {
        let (active, _) = watch::channel(0);
        Self {
            name: name.into(),
            members: Mutex::new(HashMap::new()),
            active,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers `unit` and hands back its interrupt flag.
    pub fn add_member(&self, unit: UnitId) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        let mut members = self.members.lock();
        members.insert(unit, tx);
        self.active.send_replace(members.len());
        rx
    }

    /// Returns `false` if `unit` was not a member (already removed, or the
    /// group was destroyed).
    pub fn remove_member(&self, unit: UnitId) -> bool {
        let mut members = self.members.lock();
        let removed = members.remove(&unit).is_some();
        if removed {
            self.active.send_replace(members.len());
        }
        removed
    }

    pub fn active_count(&self) -> usize {
        self.members.lock().len()
    }

    /// Raises the interrupt flag of every member except `except`.
    /// Returns how many members were interrupted.
    pub fn interrupt(&self, except: Option<UnitId>) -> usize {
        let members = self.members.lock();
        let mut interrupted = 0;
        for (unit, flag) in members.iter() {
            if Some(*unit) != except {
                flag.send_replace(true);
                interrupted += 1;
            }
        }
        interrupted
    }

    /// Resolves once no member is left.
    pub async fn wait_until_empty(&self) {
        let mut active = self.active.subscribe();
        let empty = active.wait_for(|n| *n == 0).await.is_ok();
        debug_assert!(empty);
    }

    /// Clears all membership. Members that are still running keep running
    /// but are no longer tracked.
    pub fn destroy(&self) -> Result<(), GroupError> {
        let mut members = self.members.lock();
        let leftover = members.len();
        members.clear();
        self.active.send_replace(0);
        if leftover > 0 {
            return Err(GroupError::ActiveMembers(leftover));
        }
        Ok(())
    }
}

/// A group that units can belong to, together with what happens when one of
/// its units ends with a fault nobody handled.
pub trait UnitGroup: Send + Sync {
    fn group(&self) -> &ConcurrencyGroup;

    fn uncaught_fault(&self, unit: UnitId, fault: Fault);
}

impl UnitGroup for ConcurrencyGroup {
    fn group(&self) -> &ConcurrencyGroup {
        self
    }

    fn uncaught_fault(&self, unit: UnitId, fault: Fault) {
        if !fault.is_teardown() {
            tracing::error!(group = %self.name, %unit, %fault, "Uncaught fault in unit");
        }
    }
}

/// Membership of one unit in a group. Leaves the group when dropped, so the
/// unit is removed exactly once on every exit path.
pub struct Membership {
    group: Arc<dyn UnitGroup>,
    unit: UnitId,
    interrupt: watch::Receiver<bool>,
}

impl Membership {
    pub fn join(group: Arc<dyn UnitGroup>) -> Self {
        let unit = UnitId::next();
        let interrupt = group.group().add_member(unit);
        Self {
            group,
            unit,
            interrupt,
        }
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }

    pub fn group(&self) -> &Arc<dyn UnitGroup> {
        &self.group
    }

    /// Resolves when the group interrupts this unit. Never resolves once the
    /// unit is no longer tracked.
    pub async fn interrupted(&mut self) {
        if self.interrupt.wait_for(|flag| *flag).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.group.group().remove_member(self.unit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn unit_ids_are_unique() {
        let a = UnitId::next();
        let b = UnitId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("unit-"));
    }

    #[test]
    fn membership_is_added_and_removed_once() {
        let group = ConcurrencyGroup::new("members");
        let unit = UnitId::next();

        let _flag = group.add_member(unit);
        assert_eq!(group.active_count(), 1);
        assert!(group.remove_member(unit));
        assert!(!group.remove_member(unit));
        assert_eq!(group.active_count(), 0);
    }

    #[test]
    fn dropping_a_membership_leaves_the_group() {
        let group: Arc<dyn UnitGroup> = Arc::new(ConcurrencyGroup::new("raii"));
        let first = Membership::join(group.clone());
        let second = Membership::join(group.clone());
        assert_eq!(group.group().active_count(), 2);

        drop(first);
        assert_eq!(group.group().active_count(), 1);
        drop(second);
        assert_eq!(group.group().active_count(), 0);
    }

    #[test]
    fn interrupt_skips_the_excepted_unit() {
        let group = ConcurrencyGroup::new("interrupts");
        let faulted = UnitId::next();
        let sibling = UnitId::next();
        let faulted_flag = group.add_member(faulted);
        let sibling_flag = group.add_member(sibling);

        assert_eq!(group.interrupt(Some(faulted)), 1);
        assert!(!*faulted_flag.borrow());
        assert!(*sibling_flag.borrow());
    }

    #[test]
    fn destroy_reports_leftover_members() {
        let group = ConcurrencyGroup::new("teardown");
        assert_eq!(group.destroy(), Ok(()));

        let unit = UnitId::next();
        let _flag = group.add_member(unit);
        assert_eq!(group.destroy(), Err(GroupError::ActiveMembers(1)));
        assert_eq!(group.active_count(), 0);
        assert!(!group.remove_member(unit));
    }

    #[tokio::test]
    async fn interrupted_resolves_after_interrupt() {
        let group: Arc<dyn UnitGroup> = Arc::new(ConcurrencyGroup::new("wakeup"));
        let mut membership = Membership::join(group.clone());

        group.group().interrupt(None);
        tokio::time::timeout(Duration::from_millis(200), membership.interrupted())
            .await
            .expect("interrupt was not observed");
    }

    #[tokio::test]
    async fn interrupted_pends_after_destroy() {
        let group: Arc<dyn UnitGroup> = Arc::new(ConcurrencyGroup::new("destroyed"));
        let mut membership = Membership::join(group.clone());

        assert!(group.group().destroy().is_err());
        let waited =
            tokio::time::timeout(Duration::from_millis(50), membership.interrupted()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn wait_until_empty_tracks_the_last_member() {
        let group: Arc<dyn UnitGroup> = Arc::new(ConcurrencyGroup::new("drain"));
        let membership = Membership::join(group.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(membership);
        });

        tokio::time::timeout(Duration::from_secs(2), group.group().wait_until_empty())
            .await
            .expect("group never drained");
    }
}
