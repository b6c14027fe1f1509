//! Concurrency units, the groups that track them, and the barrier that counts them.
//!
//! A unit is a tokio task that belongs to exactly one [`ConcurrencyGroup`] for
//! its whole life. The task holds a [`Membership`] and drops it as its last
//! act, so the group always knows how many units are alive without holding
//! any task handle.
//!
//! # Faults at the unit boundary
//!
//! Every unit body runs under `catch_unwind`. Whatever ends the body
//! abnormally (an `Err` returned by the body, a panic, or an interrupt from
//! the group) is turned into a [`Fault`] and handed to
//! [`UnitGroup::uncaught_fault`]. A plain group only logs it; a
//! [`FaultFunnel`] reports it to its result sink and interrupts the siblings.
//! Nothing a unit does can crash the task that dispatched it.
//!
//! # Sub-units
//!
//! While a unit runs, its group is available through a task-local. Test
//! bodies that need helper tasks should start them with [`spawn`], which makes
//! them members of the same group. Atomic load tests wait for those as well.
pub mod barrier;
pub mod funnel;
pub mod group;

pub use barrier::CompletionBarrier;
pub use funnel::FaultFunnel;
pub use group::{ConcurrencyGroup, Membership, UnitGroup, UnitId};

use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use tokio::task::JoinHandle;

use crate::{Fault, Outcome};

tokio::task_local! {
    static CURRENT_GROUP: Arc<dyn UnitGroup>;
}

/// Group of the unit the caller runs in, if any.
pub fn current_group() -> Option<Arc<dyn UnitGroup>> {
    CURRENT_GROUP.try_with(Arc::clone).ok()
}

/// Spawns `body` as a new unit in the caller's group.
///
/// Outside of any unit the new task gets a detached group of its own, which
/// only logs faults.
pub fn spawn<F>(body: F) -> JoinHandle<()>
where
    F: Future<Output = Outcome> + Send + 'static,
{
    let group = current_group()
        .unwrap_or_else(|| Arc::new(ConcurrencyGroup::new("detached")) as Arc<dyn UnitGroup>);
    spawn_member(Membership::join(group), body, |_| {})
}

/// Spawns `body` for an already registered unit. `on_exit` runs after any
/// fault was handed to the group and before the membership is released.
pub(crate) fn spawn_member<F, E>(membership: Membership, body: F, on_exit: E) -> JoinHandle<()>
where
    F: Future<Output = Outcome> + Send + 'static,
    E: FnOnce(UnitId) + Send + 'static,
{
    tokio::spawn(run_member(membership, body, on_exit))
}

/// Spawns `body` so that it counts as a member of the caller's group, if the
/// caller runs in one, and sees that group as its own.
///
/// Unlike [`spawn`], the output comes back through the handle and faults are
/// left to the caller. The membership lasts until `body` completes, even when
/// the caller stops waiting for it.
pub(crate) fn spawn_in_current_group<F>(body: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match current_group() {
        Some(group) => {
            let membership = Membership::join(group.clone());
            tokio::spawn(async move {
                let output = CURRENT_GROUP.scope(group, body).await;
                drop(membership);
                output
            })
        }
        None => tokio::spawn(body),
    }
}

async fn run_member<F, E>(mut membership: Membership, body: F, on_exit: E)
where
    F: Future<Output = Outcome> + Send + 'static,
    E: FnOnce(UnitId) + Send + 'static,
{
    let unit = membership.unit();
    let group = membership.group().clone();
    tracing::debug!(group = %group.group().name(), %unit, "Unit started");

    let guarded = AssertUnwindSafe(CURRENT_GROUP.scope(group.clone(), body)).catch_unwind();
    let outcome = tokio::select! {
        // The body always gets polled first, so an interrupted unit has still started
        biased;
        caught = guarded => caught.unwrap_or_else(|payload| Err(Fault::from_panic(payload))),
        _ = membership.interrupted() => Err(Fault::Teardown),
    };

    if let Err(fault) = outcome {
        group.uncaught_fault(unit, fault);
    }
    on_exit(unit);
    tracing::debug!(%unit, "Unit exited");
    drop(membership);
}
