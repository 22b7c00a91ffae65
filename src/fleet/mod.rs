mod dispatcher;

pub use dispatcher::{ToolDispatcher, DEFAULT_FLEET_TIMEOUT_SECS};
