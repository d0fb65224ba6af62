//! HTTP request handlers organized by functionality

pub mod convert;
pub mod error;
pub mod range;
pub mod search;
pub mod sessions;
pub mod settings;
pub mod streaming;

// Re-export handler functions
pub use convert::convert_torrent;
pub use error::ApiError;
pub use search::{search_jackett, search_prowlarr, test_jackett, test_prowlarr, test_proxy};
pub use sessions::{add_content, delete_session, list_files, list_sessions};
pub use settings::{get_settings, save_jackett, save_prowlarr, save_proxy};
pub use streaming::stream_file;
