//! Session pipeline: ordered bring-up and the output lifecycle.

pub mod bringup;
pub mod controller;
pub mod health;
pub mod state;
