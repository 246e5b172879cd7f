pub mod item;
pub mod store;

pub use item::{PromptItem, ResponseItem, fingerprint};
pub use store::{WorkItemStore, sanitize_file_stem, target_id_from_path};
