//! # switchyard-ui-common
//!
//! Shared services for switchyard front ends.
//!
//! ## Architecture
//!
//! ```text
//! switchyard-cli ──► GameService ──► Menu ──► Game ──► Environment
//!                         │
//!                         └──► JobTracker (blocking runs, cancellation)
//! ```
//!
//! ## Core Components
//!
//! - [`GameService`]: owns the loaded game, its menu, jobs and configuration
//! - [`Menu`]: cascading substation / element kind / element / busbar selection
//! - [`ActionLog`]: injected sink holding the rendered pending action
//! - [`JobTracker`]: background runs with progress channels and cancellation
//! - [`SwitchyardConfig`]: configuration from `~/.switchyard/config.toml`
//!
//! ## Usage
//!
//! ```ignore
//! use switchyard_ui_common::GameService;
//!
//! let service = GameService::new()?;
//! service.load_scenario("scenarios/demo.yaml")?;
//! service.select_line_to(SubstationId::new(4))?;
//! service.select_busbar(Busbar::new(2))?;
//! println!("{}", service.action_log().contents());
//!
//! let handle = service.submit()?;
//! let result = handle.result.await?;
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod jobs;
pub mod menu;
pub mod service;

pub use config::{DisplayConfig, GameConfig, ScenarioConfig, SwitchyardConfig};
pub use error::{Error, Result};
pub use events::{JobEvent, MenuEvent, RunKind};
pub use jobs::{JobHandle, JobId, JobResult, JobTracker, Progress};
pub use menu::{element_options, ActionLog, ElementOption, Menu, MenuState, Stage};
pub use service::{BoxedEnvironment, GameService, Session};
