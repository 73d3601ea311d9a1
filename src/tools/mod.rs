//! Tool execution: the executor capability and in-process tools.

pub mod arguments;
pub mod executor;
pub mod set;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use executor::ToolExecutor;
pub use set::ToolSet;
pub use tool::{AgentTool, Tool};
pub use types::{AgentToolParameters, ParameterBuilder};
