pub mod debouncer;
pub mod filter;
pub mod orchestrator;
pub mod outcome;
pub mod rename_engine;
pub mod watcher;
