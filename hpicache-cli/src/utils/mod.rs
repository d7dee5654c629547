pub mod size;

pub use size::{format_bytes, parse_max_size};
