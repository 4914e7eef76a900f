pub mod content_hash;
pub mod html_to_text;
pub mod simhash;
pub mod validate;

pub use content_hash::content_hash;
pub use html_to_text::html_to_text;
pub use simhash::{bands, hamming_distance, simhash};
pub use validate::{is_garbage, validate};
