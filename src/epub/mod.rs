//! EPUB container, package and navigation parsing.

mod parser;

pub use parser::{parse_container_xml, parse_ncx, parse_opf, strip_bom};
