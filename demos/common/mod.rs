#![allow(dead_code)]

pub mod effects;
pub mod stderr_log;
