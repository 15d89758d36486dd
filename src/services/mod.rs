pub mod actuator;
pub mod browser;
pub mod handlers;
pub mod navigator;
pub mod queue;
pub mod queue_client;
