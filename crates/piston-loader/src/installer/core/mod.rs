pub mod archive;
pub mod downloader;
pub mod http;
pub mod integrity;
pub mod library;
pub mod traits;
