pub mod config;
pub mod constants;
pub mod logs_fmt;
