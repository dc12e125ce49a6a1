//! Automation client for the messaging platform.
//!
//! [`client`] defines the capability the gateway consumes. The real
//! implementation drives WhatsApp Web in Chrome/Chromium over CDP and
//! requires the `browser` feature flag.

pub mod client;
pub mod scripts;

#[cfg(feature = "browser")]
pub mod web;

pub use client::{AutomationClient, ClientEvent, ClientLauncher, ClientSession, EventReceiver, EventSender};

#[cfg(feature = "browser")]
pub use web::WebClientLauncher;
