//! Domain primitives shared by agents, tools, storage and the CLI.

pub mod category;
pub mod entity;
pub mod text;

pub use category::ToolCategory;
pub use entity::{extract_companies, extract_entities, extract_sectors};
pub use text::{excerpt, significant_words, truncate_graphemes};
