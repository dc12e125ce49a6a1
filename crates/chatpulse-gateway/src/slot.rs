//! Process-wide, resettable holder of the active [`ClientGateway`].

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::info;

use chatpulse_browser::ClientLauncher;

use crate::gateway::{ClientGateway, GatewayOptions};

type Factory = Box<dyn Fn() -> Arc<ClientGateway> + Send + Sync>;

/// Lazily creates at most one gateway at a time.
pub struct GatewaySlot {
    factory: Factory,
    current: Mutex<Option<Arc<ClientGateway>>>,
}

impl GatewaySlot {
    pub fn new(factory: impl Fn() -> Arc<ClientGateway> + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            current: Mutex::new(None),
        }
    }

    /// A slot whose gateways start sessions through `launcher`.
    pub fn with_launcher(launcher: Arc<dyn ClientLauncher>, options: GatewayOptions) -> Self {
        Self::new(move || ClientGateway::start(launcher.clone(), options.clone()))
    }

    /// The active gateway, creating one if none exists.
    ///
    /// Creation happens under the slot lock, so concurrent first callers
    /// share a single gateway.
    pub fn get(&self) -> Arc<ClientGateway> {
        self.current
            .lock()
            .get_or_insert_with(|| {
                info!("Creating client gateway");
                #[cfg(feature = "metrics")]
                crate::metrics::record_gateway_created();
                (self.factory)()
            })
            .clone()
    }

    /// The active gateway, if one has been created.
    pub fn current(&self) -> Option<Arc<ClientGateway>> {
        self.current.lock().clone()
    }

    /// Drop the active gateway. The next [`get`](Self::get) starts a fresh
    /// session in `Initializing`.
    pub fn reset(&self) {
        let previous = self.current.lock().take();
        if let Some(gateway) = previous {
            gateway.shutdown();
            info!("Client gateway reset");
        }
    }
}

static GLOBAL: OnceLock<GatewaySlot> = OnceLock::new();

/// Install the process-wide slot. Fails, handing the slot back, when one is
/// already installed.
pub fn install_global(slot: GatewaySlot) -> Result<(), GatewaySlot> {
    GLOBAL.set(slot)
}

pub fn global() -> Option<&'static GatewaySlot> {
    GLOBAL.get()
}

/// The process-wide gateway, if a slot is installed.
pub fn instance() -> Option<Arc<ClientGateway>> {
    global().map(GatewaySlot::get)
}

/// Reset the process-wide gateway, if any.
pub fn reset_instance() {
    if let Some(slot) = global() {
        slot.reset();
    }
}
