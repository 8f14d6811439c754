//! ChamberView Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam that lets the ChamberView playback
//! core run against a **Production** environment (tokio + HTTP) or a
//! **Simulation** environment (virtual clock + in-memory server).
//!
//! # Core Concept
//!
//! Everything the playback core needs from the outside world goes through
//! two traits:
//! - Time and tasks (`now()`, `sleep()`, `spawn()`) via [`ViewerContext`]
//! - The simulation server (`init_info`, `simulation_state`, chamber
//!   artifacts, control requests) via [`SimulationService`]
//!
//! # Example
//!
//! ```ignore
//! use chamberview_env::{ViewerContext, SimulationService};
//!
//! async fn fetch_loop<Ctx: ViewerContext, Svc: SimulationService>(
//!     ctx: &Ctx,
//!     svc: &Svc,
//! ) {
//!     let mut since = 0;
//!     loop {
//!         if let Ok(steps) = svc.simulation_state(since).await {
//!             since = steps.last().map_or(since, |s| s.num_steps_taken);
//!         }
//!         ctx.sleep(Duration::from_millis(300)).await;
//!     }
//! }
//! ```

mod context;
mod service;
mod types;
mod error;
mod tokio_impl;
mod http;

pub use context::ViewerContext;
pub use service::{SimulationService, ServiceController};
pub use types::{BallPosition, ChamberId, ChamberTable, InitInfo, SimulationStep, UserInfo};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use http::HttpService;
