//! ChamberView Deterministic Playback Harness
//!
//! Runs the real ChamberView playback pipeline against an in-process ball
//! machine under a virtual clock, so jitter, outages and relayout races can
//! be replayed exactly from a seed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       ScenarioRunner                         │
//! │  ┌───────────────────────────────────────────────────────┐   │
//! │  │ SimContext (virtual clock, seeded RNG streams)        │   │
//! │  └───────────────────────────────────────────────────────┘   │
//! │        │ fetch / deliver                     │ relayout      │
//! │  ┌─────▼──────┐   steps + delay   ┌──────────▼──────────┐    │
//! │  │ SimService │──────────────────►│ Player + Relayout-  │    │
//! │  │ (Oracle)   │◄──────────────────│ Worker (wasmtime)   │    │
//! │  └────────────┘   PUT / artifact  └─────────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use chamberview_sim::{ScenarioRunner, SimConfig};
//! use chamberview_sim::scenarios::ScenarioId;
//!
//! let runner = ScenarioRunner::new(SimConfig { seed: 7, ..Default::default() });
//! let result = runner.run(ScenarioId::Stall);
//! assert!(result.passed);
//! ```

mod context;
mod oracle;
mod runner;
mod service;
pub mod scenarios;

pub use context::SimContext;
pub use oracle::{Oracle, SimBall};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner, SimConfig, SimError};
pub use service::{SimService, SimServiceController, CHAMBER_WAT};
