//! downtime: maintenance-mode middleware for axum applications.
//!
//! While the [`MaintenanceSwitch`] is on, requests from clients outside the
//! allow-list receive a substitute response produced by the configured
//! [`mode::Mode`]: a static file (`Output`), a rendered template (`View`), a
//! redirect (`Redirect`) or a registered function (`Callback`).

pub mod access;
pub mod config;
pub mod error;
pub mod middleware;
pub mod mode;
pub mod render;
pub mod server;
pub mod switch;
pub mod upstream;

pub use config::{GatewayConfig, MaintenanceConfig, ModeConfig, ModeOptions, ViewOptions};
pub use error::MaintenanceError;
pub use middleware::{maintenance_layer, protect, Maintenance, MaintenanceBuilder};
pub use render::{FileRenderer, RenderError, Renderer, ViewData, ViewSpec};
pub use switch::MaintenanceSwitch;
