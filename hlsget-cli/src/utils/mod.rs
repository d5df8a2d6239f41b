mod files;
mod headers;
pub mod progress;
mod prompt;

// Export utility functions
pub use self::files::{default_output_name, validate_output};
pub use self::headers::parse_headers;
pub use self::prompt::{await_choice, prompt_variant_in_background};
