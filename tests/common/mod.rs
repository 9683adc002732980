#![allow(dead_code)]

use std::sync::Arc;

pub use buildcoord_test_utils::builders::{self, chain, force, no_force, node};
pub use buildcoord_test_utils::drivers::{InstantDriver, ManualDriver};
pub use buildcoord_test_utils::recording::RecordingListener;
pub use buildcoord_test_utils::{init_tracing, wait_until, with_timeout};

use buildcoord::engine::{BuildCoordinator, EngineOptions, InMemoryDatastore};
use buildcoord::notify::Scope;

pub type Coordinator<D> = BuildCoordinator<Arc<D>, Arc<InMemoryDatastore>>;

/// Coordinator wired to `driver`, an in-memory datastore and a listener
/// recording every event.
pub fn coordinator<D>(
    driver: &Arc<D>,
    options: EngineOptions,
) -> (Coordinator<D>, Arc<InMemoryDatastore>, Arc<RecordingListener>)
where
    D: buildcoord::exec::BuildDriver,
{
    init_tracing();
    let datastore = Arc::new(InMemoryDatastore::new());
    let coordinator = BuildCoordinator::new(Arc::clone(driver), Arc::clone(&datastore), options);
    let events = RecordingListener::new("all");
    coordinator.dispatcher().subscribe(Scope::All, events.clone());
    (coordinator, datastore, events)
}
