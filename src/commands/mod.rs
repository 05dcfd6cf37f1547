// ABOUTME: Command implementations for the CLI
// ABOUTME: Exports the watch and checkpoint commands

pub mod checkpoint;
pub mod watch;

pub use watch::watch;
