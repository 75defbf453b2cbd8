pub mod confidence;
pub mod filename_parser;
pub mod models;

pub use filename_parser::{extract_release_group, extract_year, parse, parse_confidence};
pub use models::{LibraryHint, ParsedKind, ParsedName};
