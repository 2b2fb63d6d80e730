//! Request filter module
//!
//! Classifies registry requests and rejects manifest pushes whose tag
//! violates the project's policy with `406 Not Acceptable`.

pub mod classifier;
pub mod middleware;

pub use classifier::{TagRequest, classify, classify_path, decode_path};
pub use middleware::{TagFilter, tag_check};
