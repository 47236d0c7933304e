//! Outline text → node tree.
//!
//! Parses the small structured-text subset Atomizer decomposes: `#` headings,
//! paragraphs, and indented `-`/`*` lists. Also converts flat JSON records
//! into that outline form so they can be decomposed the same way.

mod parser;
mod record;

pub use parser::{parse, parse_lines};
pub use record::{parse_record, record_to_markdown};
