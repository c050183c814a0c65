pub mod ir;
pub mod metadata;
pub mod fusion;
pub mod config;
pub mod bundle;
pub mod samples;
pub mod logging;
