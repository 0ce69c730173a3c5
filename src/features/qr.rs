use crate::error::QrError;
use base64::Engine;
use image::{codecs::png::PngEncoder, ColorType, ImageBuffer, ImageEncoder, Luma};
use qrcode::{Color, EcLevel, QrCode};
use rand::distributions::Uniform;
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Light modules around the symbol.
const QUIET_ZONE_MODULES: u32 = 1;
const TOKEN_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `<unix millis>-<9 base36 chars>`, opaque to everyone but the lookup.
pub fn generate_token() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let mut rng = rand::thread_rng();
    let pick = Uniform::from(0..BASE36.len());
    let suffix: String = (0..TOKEN_SUFFIX_LEN)
        .map(|_| BASE36[rng.sample(pick)] as char)
        .collect();
    format!("{millis}-{suffix}")
}

pub fn validation_url(base: &str, token: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), token)
}

/// Black-on-white PNG with square modules, scaled down to at most
/// `size_px` (never below one pixel per module).
pub fn render_qr_png(text: &str, size_px: u32) -> Result<Vec<u8>, QrError> {
    let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::M)
        .map_err(|e| QrError::Encode(e.to_string()))?;
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let total = modules + 2 * QUIET_ZONE_MODULES;
    let scale = (size_px / total.max(1)).max(1);
    let side = total * scale;

    let img = ImageBuffer::<Luma<u8>, Vec<u8>>::from_fn(side, side, |x, y| {
        let mx = (x / scale) as i64 - QUIET_ZONE_MODULES as i64;
        let my = (y / scale) as i64 - QUIET_ZONE_MODULES as i64;
        let inside = mx >= 0 && my >= 0 && mx < modules as i64 && my < modules as i64;
        let dark = inside
            && matches!(
                colors.get((my as u32 * modules + mx as u32) as usize),
                Some(Color::Dark)
            );
        if dark {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    });

    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(&img, img.width(), img.height(), ColorType::L8)
        .map_err(|e| QrError::Png(e.to_string()))?;
    Ok(buf)
}

pub fn png_data_url(png: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_has_millis_and_base36_suffix() {
        let token = generate_token();
        let (millis, suffix) = token.split_once('-').expect("dash separator");
        assert!(millis.parse::<u128>().is_ok());
        assert_eq!(suffix.len(), TOKEN_SUFFIX_LEN);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_ne!(generate_token(), token);
    }

    #[test]
    fn validation_url_joins_without_double_slash() {
        assert_eq!(
            validation_url("https://sign.example/validate/", "abc"),
            "https://sign.example/validate/abc"
        );
    }

    #[test]
    fn qr_png_decodes_as_square_grayscale() {
        let png = render_qr_png("https://sign.example/validate/123-abc", 200).unwrap();
        let img = image::load_from_memory_with_format(&png, image::ImageFormat::Png)
            .unwrap()
            .to_luma8();
        assert_eq!(img.width(), img.height());
        assert!(img.width() <= 200);
        // Quiet zone is light, the finder pattern corner is dark.
        let scale = img.width() / (QrCode::new(b"https://sign.example/validate/123-abc")
            .unwrap()
            .width() as u32
            + 2);
        assert_eq!(img.get_pixel(0, 0).0[0], 255);
        assert_eq!(img.get_pixel(scale, scale).0[0], 0);
    }

    #[test]
    fn oversized_text_is_an_encode_error() {
        let long = "x".repeat(5000);
        assert!(matches!(render_qr_png(&long, 200), Err(QrError::Encode(_))));
    }

    #[test]
    fn data_url_prefix() {
        assert!(png_data_url(&[1, 2, 3]).starts_with("data:image/png;base64,AQID"));
    }
}
