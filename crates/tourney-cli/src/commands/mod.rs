pub mod common;
pub mod completions;
pub mod list;
pub mod portal;
pub mod pull;
pub mod push;
pub mod runs;
