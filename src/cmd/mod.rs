//! Command-line entry points.

pub mod normalize;
pub mod ocr;
pub mod render;
pub mod schema;
pub mod split;
