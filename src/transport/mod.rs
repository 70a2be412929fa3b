//! Console transport for server processes.
//!
//! Servers are driven over their standard streams: commands go in on stdin as
//! text lines and every line they print is fed to the output parser.
mod stdio;

pub use stdio::{StdioConsole, spawn_line_reader};
