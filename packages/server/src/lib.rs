//! Relay server for length-prefixed TCP chat.
//!
//! Many client connections exchange records through this relay. Besides plain
//! broadcast it supports direct (sender + one target) and excluded (everyone
//! but one name) delivery, keeps a bounded history and replays the part of it
//! each newly joined connection is entitled to see.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod config;
