pub mod config;
pub mod multipart;
pub mod proxy;

pub use config::ProxyConfig;
pub use multipart::{parse_multipart, ParsedMultipart, UploadedFile};
pub use proxy::{router, ProxyError, ProxyState};
