//! Image uploads (avatars, course thumbnails, blog images) to the public media bucket.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use base64::Engine;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use crate::error::{AppError, Result};
use crate::session::Session;

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024; // 10MB

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadImageRequest {
    /// Base64 payload, optionally as a `data:` URL
    pub file_data: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadImageResponse {
    pub image_id: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Public object hosting.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Stores the object and returns its public URL.
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;
}

pub struct S3MediaHost {
    client: S3Client,
    bucket: String,
    public_base_url: String,
}

impl S3MediaHost {
    pub fn new(client: S3Client, bucket: impl Into<String>, public_base_url: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            public_base_url: public_base_url.into(),
        }
    }
}

#[async_trait]
impl MediaHost for S3MediaHost {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await?;
        Ok(format!("{}/{}", self.public_base_url, key))
    }
}

fn content_type_for(format: ImageFormat) -> Option<(&'static str, &'static str)> {
    match format {
        ImageFormat::Png => Some(("image/png", "png")),
        ImageFormat::Jpeg => Some(("image/jpeg", "jpg")),
        ImageFormat::Gif => Some(("image/gif", "gif")),
        ImageFormat::WebP => Some(("image/webp", "webp")),
        _ => None,
    }
}

fn decode_payload(file_data: &str) -> Result<Vec<u8>> {
    let encoded = match file_data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => file_data,
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| AppError::validation(format!("Failed to decode base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(AppError::validation("image is empty"));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(AppError::validation(format!(
            "image is {} bytes, limit is {}",
            bytes.len(),
            MAX_IMAGE_BYTES
        )));
    }
    Ok(bytes)
}

/// Sniff the real format from the bytes and read dimensions from the header.
fn inspect(bytes: &[u8]) -> Result<(&'static str, &'static str, u32, u32)> {
    let format = image::guess_format(bytes)
        .map_err(|_| AppError::validation("file is not a recognised image"))?;
    let (content_type, ext) = content_type_for(format)
        .ok_or_else(|| AppError::validation(format!("{:?} images are not accepted", format)))?;
    let (width, height) = image::io::Reader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|e| AppError::validation(format!("Failed to read image: {}", e)))?;
    Ok((content_type, ext, width, height))
}

/// Upload key: `uploads/{user_id}/{image_id}.{ext}`
pub async fn upload_image(
    media: &dyn MediaHost,
    session: &Session,
    req: UploadImageRequest,
) -> Result<UploadImageResponse> {
    let bytes = decode_payload(&req.file_data)?;
    let (content_type, ext, width, height) = inspect(&bytes)?;

    let image_id = uuid::Uuid::new_v4().to_string();
    let key = format!("uploads/{}/{}.{}", session.user_id, image_id, ext);
    let size = bytes.len();
    let url = media.put_object(&key, bytes, content_type).await?;

    tracing::info!(user_id = %session.user_id, key, size, width, height, "Image uploaded");
    Ok(UploadImageResponse {
        image_id,
        url,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn png_base64(width: u32, height: u32) -> String {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        base64::engine::general_purpose::STANDARD.encode(buf.into_inner())
    }

    #[tokio::test]
    async fn png_goes_under_the_users_prefix() {
        let mut media = MockMediaHost::new();
        media
            .expect_put_object()
            .withf(|key, bytes, content_type| {
                key.starts_with("uploads/u1/") && key.ends_with(".png") && !bytes.is_empty() && content_type == "image/png"
            })
            .times(1)
            .returning(|key, _, _| Ok(format!("https://media.example/{}", key)));

        let resp = upload_image(
            &media,
            &Session::new("u1", Role::Student),
            UploadImageRequest {
                file_data: format!("data:image/png;base64,{}", png_base64(3, 2)),
            },
        )
        .await
        .unwrap();

        assert_eq!((resp.width, resp.height), (3, 2));
        assert!(resp.url.ends_with(&format!("{}.png", resp.image_id)));
    }

    #[tokio::test]
    async fn non_images_never_reach_the_bucket() {
        let media = MockMediaHost::new();
        let session = Session::new("u1", Role::Student);
        for payload in [
            "not base64!!".to_string(),
            base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.4 fake"),
            String::new(),
        ] {
            let err = upload_image(&media, &session, UploadImageRequest { file_data: payload })
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let big = base64::engine::general_purpose::STANDARD.encode(vec![0u8; MAX_IMAGE_BYTES + 1]);
        assert!(matches!(decode_payload(&big), Err(AppError::Validation(_))));
    }
}
