//! Scenario tests exercising the renderer end to end.

use crate::example_topologies::ExampleTopology;
use crate::inventory::InMemoryInventory;
use crate::render::RspRenderer;
use crate::scheduler::SchedulerKind;
use crate::store::MemoryStore;
use crate::RendererConfig;
use lazy_static::lazy_static;
use std::sync::Arc;


lazy_static! {
    /// One configuration per scheduler kind.
    static ref EVERY_SCHEDULER: Vec<RendererConfig> =
        SchedulerKind::ALL.iter().map(|k| RendererConfig::default().with_scheduler(*k)).collect();
}

fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

/// Renderer over a fresh inventory of `T` and an empty store.
fn setup<T: ExampleTopology>(config: RendererConfig) -> (Arc<MemoryStore>, RspRenderer) {
    setup_with(Arc::new(T::inventory()), config)
}

/// Renderer over `inventory` and an empty store.
fn setup_with(inventory: Arc<InMemoryInventory>, config: RendererConfig) -> (Arc<MemoryStore>, RspRenderer) {
    init_logging();
    let store = Arc::new(MemoryStore::new());
    let renderer = RspRenderer::new(inventory, store.clone(), config).unwrap().with_seed(7);
    (store, renderer)
}
