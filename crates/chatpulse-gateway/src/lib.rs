//! Gateway in front of the messaging automation client.
//!
//! [`gateway::ClientGateway`] tracks the client lifecycle and answers reads
//! with a [`GatewayResult`]; [`slot::GatewaySlot`] keeps one gateway per
//! process and lets callers reset it. The HTTP surface lives in [`server`].

pub mod actions;
pub mod gateway;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod server;
pub mod slot;
pub mod state;

#[cfg(test)]
mod testing;

pub use gateway::{ClientGateway, ClientState, GatewayOptions, GatewayResult};
pub use server::{router, start_server};
pub use slot::GatewaySlot;
pub use state::AppState;
