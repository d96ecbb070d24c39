mod params;
mod paths;

pub use params::parse_headers;
pub use paths::{OutputPaths, output_paths};
