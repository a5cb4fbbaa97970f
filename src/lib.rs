pub mod configuration;
pub mod control_plane;
pub mod error;
pub mod naming;
pub mod provisioner;
pub mod telemetry;
