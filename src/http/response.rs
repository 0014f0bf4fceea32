use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub request_id: String,
    pub status: String,
    pub duration_ms: u128,
    pub size_bytes: usize,
    pub headers: String,
    pub body: String,
    pub downloaded_to: Option<PathBuf>,
}
