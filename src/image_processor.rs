use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Public URLs of the two renditions produced by the image processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedImage {
    /// Re-hosted copy of the original image.
    pub original_url: Option<String>,
    /// Display-ready BMP sized for the embedded panel.
    pub display_url: Option<String>,
}

/// Collaborator that converts an aircraft photo for the display device and
/// uploads both renditions to object storage. The conversion and upload
/// pipeline lives outside this crate; only the contract is consumed here.
#[async_trait]
pub trait ImageProcessor: Send + Sync {
    async fn process(&self, image_url: &str, registration: &str) -> Result<ProcessedImage>;
}
