//! Image encoding: file on disk → [`ImageAsset`] → base64 data URI.
//!
//! Vision APIs accept images as base64 data URIs embedded in the JSON request
//! body. The MIME type in the URI has to match the real image format, so it is
//! taken from the file's magic bytes, never from its extension: a PNG saved as
//! `scan.jpg` is still sent as `image/png`.

use crate::error::Img2XlsxError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, ImageReader};
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Image formats the vision model accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Webp,
}

impl ImageKind {
    /// MIME type used in the data URI.
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Webp => "image/webp",
        }
    }

    fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(ImageKind::Png),
            ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            ImageFormat::WebP => Some(ImageKind::Webp),
            _ => None,
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            ImageKind::Png => ImageFormat::Png,
            ImageKind::Jpeg => ImageFormat::Jpeg,
            ImageKind::Webp => ImageFormat::WebP,
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpeg",
            ImageKind::Webp => "webp",
        })
    }
}

/// Raw image bytes with their detected format.
///
/// Held only long enough to build the data URI.
#[derive(Clone)]
pub struct ImageAsset {
    pub bytes: Vec<u8>,
    pub kind: ImageKind,
}

impl fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAsset")
            .field("kind", &self.kind)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImageAsset {
    /// Detect the format of in-memory image bytes.
    ///
    /// `path` is only used for error messages.
    pub fn from_bytes(bytes: Vec<u8>, path: &Path) -> Result<Self, Img2XlsxError> {
        let format = image::guess_format(&bytes).map_err(|_| Img2XlsxError::UnrecognizedFormat {
            path: path.to_path_buf(),
            magic: bytes.iter().take(8).copied().collect(),
        })?;

        let kind = ImageKind::from_format(format).ok_or_else(|| Img2XlsxError::UnsupportedFormat {
            path: path.to_path_buf(),
            format: format.extensions_str().first().copied().unwrap_or("unknown").to_string(),
        })?;

        // The signature matched; make sure the header actually decodes.
        let (width, height) = ImageReader::with_format(Cursor::new(&bytes), kind.image_format())
            .into_dimensions()
            .map_err(|e| Img2XlsxError::UnreadableImage {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        debug!("Detected {} image {}x{} ({} bytes)", kind, width, height, bytes.len());

        Ok(Self { bytes, kind })
    }

    /// `data:image/<mime>;base64,<payload>`
    pub fn to_data_uri(&self) -> String {
        let b64 = STANDARD.encode(&self.bytes);
        debug!("Encoded image → {} bytes base64", b64.len());
        format!("data:{};base64,{}", self.kind.mime_type(), b64)
    }
}

/// Read an image from disk and detect its format.
pub async fn encode_image(path: &Path) -> Result<ImageAsset, Img2XlsxError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Img2XlsxError::UnreadableImage {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    ImageAsset::from_bytes(bytes, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn sample(format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, Rgb([200, 30, 30])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format)
            .expect("encode should succeed");
        buf
    }

    fn data_uri_for(format: ImageFormat) -> String {
        ImageAsset::from_bytes(sample(format), Path::new("table"))
            .expect("supported format")
            .to_data_uri()
    }

    #[test]
    fn png_data_uri() {
        assert!(data_uri_for(ImageFormat::Png).starts_with("data:image/png;base64,"));
    }

    #[test]
    fn jpeg_data_uri() {
        assert!(data_uri_for(ImageFormat::Jpeg).starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn webp_data_uri() {
        assert!(data_uri_for(ImageFormat::WebP).starts_with("data:image/webp;base64,"));
    }

    #[test]
    fn payload_decodes_to_input_bytes() {
        let bytes = sample(ImageFormat::Png);
        let uri = ImageAsset::from_bytes(bytes.clone(), Path::new("t.png"))
            .unwrap()
            .to_data_uri();
        let payload = uri.split_once(',').unwrap().1;
        assert_eq!(STANDARD.decode(payload).unwrap(), bytes);
    }

    #[test]
    fn bmp_is_unsupported() {
        // 14-byte file header + start of a BITMAPINFOHEADER
        let mut bmp = b"BM".to_vec();
        bmp.extend_from_slice(&[0u8; 52]);
        let err = ImageAsset::from_bytes(bmp, Path::new("scan.bmp")).unwrap_err();
        match err {
            Img2XlsxError::UnsupportedFormat { format, .. } => assert_eq!(format, "bmp"),
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn gif_is_unsupported() {
        let err = ImageAsset::from_bytes(b"GIF89a\x01\x00\x01\x00".to_vec(), Path::new("a.gif"))
            .unwrap_err();
        assert!(matches!(err, Img2XlsxError::UnsupportedFormat { .. }));
    }

    #[test]
    fn text_is_unrecognized() {
        let err = ImageAsset::from_bytes(b"| Name | Age |".to_vec(), Path::new("t.png")).unwrap_err();
        assert!(matches!(err, Img2XlsxError::UnrecognizedFormat { .. }));
    }

    #[test]
    fn truncated_png_is_unreadable() {
        let err = ImageAsset::from_bytes(b"\x89PNG\r\n\x1a\n".to_vec(), Path::new("t.png"))
            .unwrap_err();
        assert!(matches!(err, Img2XlsxError::UnreadableImage { .. }));
    }

    #[test]
    fn extension_is_ignored() {
        let asset = ImageAsset::from_bytes(sample(ImageFormat::Png), Path::new("photo.jpg")).unwrap();
        assert_eq!(asset.kind, ImageKind::Png);
    }

    #[tokio::test]
    async fn missing_file_is_unreadable() {
        let err = encode_image(Path::new("/definitely/not/here.png")).await.unwrap_err();
        assert!(matches!(err, Img2XlsxError::UnreadableImage { .. }));
    }
}
