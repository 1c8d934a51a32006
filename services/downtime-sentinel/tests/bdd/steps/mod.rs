//! BDD step definitions for the downtime sentinel service

pub mod alerting_steps;
pub mod control_plane_steps;
pub mod heuristic_steps;
