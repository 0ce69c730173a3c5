use crate::error::WorkflowError;
use crate::features::requests::{RequestStatus, SignatureMethod};
use crate::state::AppState;
use rust_i18n::t;

pub fn update_locale(state: &mut AppState, locale_str: &str) {
    let normalized = normalize_locale(locale_str);
    state.locale = normalized.to_string();
    rust_i18n::set_locale(normalized);
}

fn normalize_locale(locale_str: &str) -> &'static str {
    let trimmed = locale_str.trim();
    if trimmed.is_empty() {
        return "en";
    }

    // rust-i18n looks up compiled locales by name (e.g. "en", "id"), so normalize
    // incoming BCP-47 tags like "id-ID" / "en_US" down to a supported language.
    let lower = trimmed.to_ascii_lowercase().replace('_', "-");
    let lang = lower.split('-').next().unwrap_or("en");

    match lang {
        // "in" is the legacy ISO code Android still reports for Indonesian.
        "id" | "in" => "id",
        _ => "en",
    }
}

pub fn method_label(method: SignatureMethod) -> String {
    match method {
        SignatureMethod::QrValidated => t!("method.qr_validated"),
        SignatureMethod::ImageOverlay => t!("method.image_overlay"),
        SignatureMethod::PhysicalWetInk => t!("method.physical_wet_ink"),
    }
    .into_owned()
}

pub fn status_label(status: RequestStatus) -> String {
    match status {
        RequestStatus::Pending => t!("status_label.pending"),
        RequestStatus::Approved => t!("status_label.approved"),
        RequestStatus::Rejected => t!("status_label.rejected"),
        RequestStatus::Signed => t!("status_label.signed"),
    }
    .into_owned()
}

/// One line per failed operation: localized headline plus the raw code and
/// detail for support.
pub fn error_message(err: &WorkflowError) -> String {
    let headline = match err.code() {
        "pdf_load_failed" => t!("errors.pdf_load_failed"),
        "image_decode_failed" => t!("errors.image_decode_failed"),
        "fetch_failed" => t!("errors.fetch_failed"),
        "image_embed_failed" => t!("errors.image_embed_failed"),
        "qr_render_failed" => t!("errors.qr_render_failed"),
        "persistence_failed" => t!("errors.persistence_failed"),
        "request_not_found" => t!("errors.request_not_found"),
        "invalid_transition" => t!("errors.invalid_transition"),
        _ => t!("errors.invalid_input"),
    };
    format!("{headline} ({err})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OverlayError;

    #[test]
    fn locale_tags_collapse_to_supported_languages() {
        assert_eq!(normalize_locale("id-ID"), "id");
        assert_eq!(normalize_locale("in_ID"), "id");
        assert_eq!(normalize_locale("en_US"), "en");
        assert_eq!(normalize_locale("fr-FR"), "en");
        assert_eq!(normalize_locale("  "), "en");
    }

    #[test]
    fn error_message_keeps_code() {
        let msg = error_message(&WorkflowError::from(OverlayError::Fetch("timeout".into())));
        assert!(msg.contains("fetch_failed:timeout"), "{msg}");
    }
}
