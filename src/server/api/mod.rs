pub mod channel_controller;
pub mod health_controller;
pub mod metrics_controller;
pub mod relay_controller;
pub mod visit_controller;
pub mod watch_controller;
