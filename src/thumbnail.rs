use eframe::egui::ColorImage;
use tracing::warn;

/// Downloads and decodes the preview image of a resolved video.
pub fn fetch_thumbnail(url: &str) -> Option<ColorImage> {
    // Blocking GET; a missing preview is not worth surfacing to the user
    let bytes = match reqwest::blocking::get(url).and_then(|r| r.error_for_status()?.bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(%url, error = %e, "thumbnail fetch failed");
            return None;
        }
    };
    decode_thumbnail(&bytes)
}

/// Decodes any format the `image` crate understands into an egui image.
pub fn decode_thumbnail(bytes: &[u8]) -> Option<ColorImage> {
    let img = match image::load_from_memory(bytes) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            warn!(error = %e, "thumbnail decode failed");
            return None;
        }
    };
    let size = [img.width() as usize, img.height() as usize];
    Some(ColorImage::from_rgba_unmultiplied(size, &img))
}
