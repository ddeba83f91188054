use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct UploadReceipt {
    pub size: usize,
    pub sha256: String,
}
