use rust_i18n::t;
use serde_json::Value;

use crate::features::workflow::Workflow;
use crate::i18n::{error_message, method_label, status_label};
use crate::state::{AppState, Screen, ValidationOutcome};
use crate::ui::{
    maybe_push_back, push_banners, to_value, Button as UiButton, Card as UiCard,
    Column as UiColumn, Text as UiText, TextInput as UiTextInput,
};

/// Accepts a bare token or the full validation URL a QR scanner hands over.
pub fn token_from_input(input: &str) -> &str {
    let trimmed = input.trim().trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((_, token)) if trimmed.contains("://") => token,
        _ => trimmed,
    }
}

pub fn handle_validate_screen(state: &mut AppState) {
    state.push_screen(Screen::Validate);
    state.validation = None;
}

pub fn handle_validate(state: &mut AppState, workflow: &Workflow, input: Option<&str>) {
    state.push_screen(Screen::Validate);
    let token = token_from_input(input.unwrap_or_default()).to_string();
    state.validation = match workflow.validate(&token) {
        Ok(Some(request)) => Some(ValidationOutcome::Valid { request }),
        Ok(None) => Some(ValidationOutcome::NotFound { token }),
        Err(e) => {
            state.last_error = Some(error_message(&e));
            None
        }
    };
}

pub fn render_validation_screen(state: &AppState) -> Value {
    let mut children = vec![
        to_value(UiText::new(&t!("validate.title")).size(20.0)),
        to_value(UiText::new(&t!("validate.intro")).size(14.0)),
    ];
    push_banners(&mut children, state);

    let hint = t!("validate.token_hint");
    children.push(to_value(
        UiTextInput::new("validation_token")
            .hint(&hint)
            .single_line(true),
    ));
    children.push(to_value(
        UiButton::new(&t!("validate.check"), "validate").id("validate_btn"),
    ));

    match &state.validation {
        Some(ValidationOutcome::Valid { request }) => {
            let mut body = vec![
                to_value(
                    UiText::new(&t!("validate.valid"))
                        .size(16.0)
                        .content_description("validation_valid"),
                ),
                to_value(UiText::new(&request.document_name).size(14.0)),
                to_value(UiText::new(&request.email).size(13.0)),
                to_value(UiText::new(&method_label(request.method)).size(12.0)),
                to_value(
                    UiText::new(&t!(
                        "status.row_status",
                        status = status_label(request.status)
                    ))
                    .size(12.0),
                ),
            ];
            if let Some(at) = request.approved_at {
                body.push(to_value(
                    UiText::new(&t!(
                        "validate.approved_at",
                        at = at.format("%Y-%m-%d %H:%M UTC")
                    ))
                    .size(12.0),
                ));
            }
            if let Some(at) = request.signed_at {
                body.push(to_value(
                    UiText::new(&t!("validate.signed_at", at = at.format("%Y-%m-%d %H:%M UTC")))
                        .size(12.0),
                ));
            }
            children.push(to_value(UiCard::new(body).padding(12)));
        }
        Some(ValidationOutcome::NotFound { token }) => {
            children.push(to_value(
                UiText::new(&t!("validate.invalid", token = token))
                    .size(14.0)
                    .content_description("validation_invalid"),
            ));
        }
        None => {}
    }

    maybe_push_back(&mut children, state);
    to_value(UiColumn::new(children).padding(20))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_taken_from_scanned_url() {
        assert_eq!(
            token_from_input("https://sign.example/validate/1700000000000-abc123xyz"),
            "1700000000000-abc123xyz"
        );
        assert_eq!(token_from_input(" 1700-abc "), "1700-abc");
        assert_eq!(token_from_input("http://h/validate/tok/"), "tok");
    }
}
