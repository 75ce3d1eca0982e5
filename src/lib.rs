pub mod classify;
pub mod config;
pub mod console;
pub mod dry_run;
pub mod engine;
pub mod estimate;
pub mod events;
pub mod host;
pub mod keyboard;
pub mod macros;
pub mod policy;
pub mod sim;
pub mod text;
pub mod timing;
