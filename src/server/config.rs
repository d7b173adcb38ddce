use super::RequestsLoggingLevel;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    pub frontend_dir_path: Option<String>,
    /// Token required for upload and delete endpoints. When unset, audio
    /// administration is disabled entirely.
    pub admin_token: Option<String>,
    /// Read size used when chunking audio responses.
    pub chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3000,
            frontend_dir_path: None,
            admin_token: None,
            chunk_size: 64 * 1024,
        }
    }
}
