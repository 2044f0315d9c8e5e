//! The courier service: configuration, simulated channels and the
//! controller that wires the dispatcher to the HTTP API

pub mod channels;
pub mod controller;
