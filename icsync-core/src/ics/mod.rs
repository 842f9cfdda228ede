//! Feed text parsing.
//!
//! Reads RFC 5545 text tolerantly: broken events are skipped and reported
//! instead of failing the feed.

mod lexer;
mod parse;
pub mod values;

pub use lexer::{ContentLine, LogicalLine, parse_content_line, physical_lines, unfold};
pub use parse::{FeedParser, ParsedFeed};
