//! Built-in tool pack (spec §3 Tool Definition, §8 supplemented builtin pack)

mod glob;
mod grep;
mod list_directory;
mod read_file;
mod read_only_bash;
mod run_command;
mod spawn_agent;
mod write_file;

pub use glob::GlobTool;
pub use grep::GrepTool;
pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use read_only_bash::ReadOnlyBashTool;
pub use run_command::RunCommandTool;
pub use spawn_agent::SpawnAgentTool;
pub use write_file::WriteFileTool;
