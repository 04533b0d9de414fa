//! Artifact storage: run directories and captured screenshots

pub mod run_dirs;
pub mod screenshot;

pub use run_dirs::{
    StorageError, create_entity_dir, create_run_dir, run_dir_name, sanitize_name,
};
pub use screenshot::{save_screenshot, screenshot_file_name};
