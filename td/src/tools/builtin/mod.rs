//! Built-in tools for Ralph loops and exploration

mod complete_task;
mod edit_file;
mod explore;
mod fetch;
mod glob;
mod grep;
mod list_directory;
mod query;
mod read_file;
mod read_only_bash;
mod run_command;
mod search;
mod share;
mod todo;
mod tree;
mod write_file;

pub use complete_task::CompleteTaskTool;
pub use edit_file::EditFileTool;
pub use explore::ExploreTool;
pub use fetch::FetchTool;
pub use glob::GlobTool;
pub use grep::GrepTool;
pub use list_directory::ListDirectoryTool;
pub use query::QueryTool;
pub use read_file::ReadFileTool;
pub use read_only_bash::ReadOnlyBashTool;
pub use run_command::RunCommandTool;
pub use search::SearchTool;
pub use share::ShareTool;
pub use todo::TodoTool;
pub use tree::TreeTool;
pub use write_file::WriteFileTool;
