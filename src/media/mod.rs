pub mod preprocess;
pub mod temp_store;

pub use preprocess::{preprocess_image, PreparedImage};
pub use temp_store::{TempFileStore, TempMediaFile};
