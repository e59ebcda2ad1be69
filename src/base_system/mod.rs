#![allow(dead_code)]

pub mod config;
pub mod context;
pub mod logging;
pub mod paths;
pub mod retry;
