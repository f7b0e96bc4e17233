pub mod utils;
pub mod verdict;

pub use utils::{copy_files, require_dir, require_file, sanitize_identifier, PathError};
pub use verdict::Verdict;
