//! State machines for crawl tasks and capture sessions
//!
//! # Components
//!
//! - `TaskStatus`: lifecycle of a task in the crawl queue (pending, processing, processed)
//! - `SessionState`: lifecycle of one capture session, from tab creation to tab close

mod session_state;
mod task_status;

// Re-export main types
pub use session_state::SessionState;
pub use task_status::TaskStatus;
