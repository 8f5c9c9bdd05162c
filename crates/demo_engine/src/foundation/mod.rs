//! Foundation module - logging and frame timing shared by the whole framework

pub mod logging;
pub mod time;
