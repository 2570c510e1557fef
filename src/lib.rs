//! # ddcbrightnessd
//!
//! A Linux daemon for controlling external monitor brightness over DDC/CI
//! by driving the `ddcutil` command line tool.
//!
//! ## Features
//!
//! - **Async Architecture**: Built on Tokio for high performance
//! - **Event-Driven**: Modular services communicate via EventBus
//! - **Debounced Writes**: Per-bus pacing protects display firmware from
//!   slider-drag bursts
//! - **Display Discovery**: Concurrent probing with power-state gating
//!   and prioritized VCP code fallback
//! - **D-Bus Interface**: System integration and external control
//! - **Hot Reload**: Configuration changes without restart
//!
//! ## Architecture
//!
//! The daemon uses a provider-based dependency injection system with:
//! - [`SystemCoordinator`](coordinator::SystemCoordinator) - Main lifecycle manager
//! - [`EventBus`](event::EventBus) - Inter-service communication
//! - [`Session`](session::Session) - Shared display and write-path state
//! - Service providers for modular functionality
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ddcbrightnessd::{application::Application, config::ConfigManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config_manager = Arc::new(ConfigManager::load_or_default(None).await?);
//!     Application::builder()
//!         .with_config_manager(config_manager)
//!         .build()
//!         .await?
//!         .run()
//!         .await
//! }
//! ```

pub mod application;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod display;
pub mod event;
pub mod interface;
pub mod prober;
pub mod providers;
pub mod reload;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod task_manager;
