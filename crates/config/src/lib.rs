//! Configuration loading for the sidekick agent runtime.
//!
//! Config file: `sidekick.toml`, searched in `./` then `~/.config/sidekick/`.
//! Every field has a default, so a missing config file is not an error.

pub mod loader;
pub mod schema;

pub use {
    loader::{discover_and_load, load_from_path},
    schema::{AgentSection, SidekickConfig, ToolsSection},
};
