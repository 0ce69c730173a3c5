use std::collections::HashMap;

use rust_i18n::t;
use serde_json::Value;

use crate::features::requests::SignatureMethod;
use crate::features::workflow::Workflow;
use crate::i18n::{error_message, method_label, status_label};
use crate::state::{AppState, Screen};
use crate::ui::{
    maybe_push_back, push_banners, to_value, Button as UiButton, Card as UiCard,
    Column as UiColumn, Image as UiImage, Text as UiText, TextInput as UiTextInput,
};

const METHODS: [SignatureMethod; 3] = [
    SignatureMethod::QrValidated,
    SignatureMethod::ImageOverlay,
    SignatureMethod::PhysicalWetInk,
];

fn binding<'a>(bindings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    bindings
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Text inputs echo their values back with every command; keep them so the
/// form survives a failed submission.
fn remember_form(state: &mut AppState, bindings: &HashMap<String, String>) {
    if let Some(email) = binding(bindings, "email") {
        state.submission.email = Some(email.to_string());
    }
    if let Some(name) = binding(bindings, "document_name") {
        state.submission.document_name = Some(name.to_string());
    }
    if let Some(message) = binding(bindings, "message") {
        state.submission.message = Some(message.to_string());
    }
    if let Some(method) = binding(bindings, "method").and_then(|m| m.parse().ok()) {
        state.submission.method = method;
    }
}

pub fn handle_submit_screen(state: &mut AppState) {
    state.push_screen(Screen::Submit);
    state.submission.last_submitted = None;
}

pub fn handle_method_select(state: &mut AppState, target: Option<&str>) {
    match target.map(str::parse::<SignatureMethod>) {
        Some(Ok(method)) => state.submission.method = method,
        Some(Err(e)) => state.last_error = Some(e),
        None => state.last_error = Some("missing_method".into()),
    }
}

/// `file_name` is the picked file's name, used when the form leaves the
/// document name empty.
pub fn handle_submit(
    state: &mut AppState,
    workflow: &Workflow,
    bindings: &HashMap<String, String>,
    pdf_bytes: &[u8],
    file_name: Option<&str>,
) {
    remember_form(state, bindings);
    let email = state.submission.email.clone().unwrap_or_default();
    let document_name = state
        .submission
        .document_name
        .clone()
        .or_else(|| file_name.map(str::to_string))
        .unwrap_or_default();

    match workflow.submit(
        &email,
        &document_name,
        pdf_bytes,
        state.submission.method,
        state.submission.message.as_deref(),
    ) {
        Ok(request) => {
            state.last_notice = Some(t!("submit.done", id = request.id).into_owned());
            state.submission.document_name = None;
            state.submission.message = None;
            state.submission.last_submitted = Some(request);
        }
        Err(e) => state.last_error = Some(error_message(&e)),
    }
    state.push_screen(Screen::Submit);
}

pub fn render_submit_screen(state: &AppState) -> Value {
    let sub = &state.submission;
    let mut children = vec![
        to_value(UiText::new(&t!("submit.title")).size(20.0)),
        to_value(UiText::new(&t!("submit.intro")).size(14.0)),
    ];
    push_banners(&mut children, state);

    let email_hint = t!("submit.email_hint");
    let mut email = UiTextInput::new("email").hint(&email_hint).single_line(true);
    if let Some(v) = &sub.email {
        email = email.text(v);
    }
    children.push(to_value(email));

    let name_hint = t!("submit.name_hint");
    let mut name = UiTextInput::new("document_name")
        .hint(&name_hint)
        .single_line(true);
    if let Some(v) = &sub.document_name {
        name = name.text(v);
    }
    children.push(to_value(name));

    let message_hint = t!("submit.message_hint");
    let mut message = UiTextInput::new("message").hint(&message_hint);
    if let Some(v) = &sub.message {
        message = message.text(v);
    }
    children.push(to_value(message));

    let selected = method_label(sub.method);
    children.push(to_value(
        UiText::new(&t!("submit.method_selected", method = selected)).size(14.0),
    ));
    let labels: Vec<(SignatureMethod, String)> =
        METHODS.iter().map(|m| (*m, method_label(*m))).collect();
    let method_buttons: Vec<Value> = labels
        .iter()
        .map(|(method, label)| {
            to_value(
                UiButton::new(label, "submit_method")
                    .target(method.as_str())
                    .id(method.as_str())
                    .enabled(*method != sub.method),
            )
        })
        .collect();
    children.push(to_value(UiColumn::new(method_buttons)));

    children.push(to_value(
        UiButton::new(&t!("submit.pick_and_send"), "submit")
            .id("submit_btn")
            .requires_file_picker(true)
            .content_description("Pick a PDF and submit it for signing"),
    ));

    if let Some(req) = &sub.last_submitted {
        let status = status_label(req.status);
        let body = vec![
            to_value(UiText::new(&req.document_name).size(14.0)),
            to_value(UiText::new(&t!("status.row_status", status = status)).size(12.0)),
            to_value(UiText::new(&req.id).size(11.0).content_description("request_id")),
        ];
        children.push(to_value(
            UiCard::new(body).title(&t!("submit.receipt")).padding(12),
        ));
    }

    maybe_push_back(&mut children, state);
    to_value(UiColumn::new(children).padding(20))
}

pub fn handle_status_screen(state: &mut AppState) {
    state.push_screen(Screen::Status);
}

pub fn handle_status_lookup(
    state: &mut AppState,
    workflow: &Workflow,
    bindings: &HashMap<String, String>,
) {
    let email = binding(bindings, "status_email")
        .map(str::to_string)
        .or_else(|| state.status.email.clone())
        .unwrap_or_default();
    state.status.email = Some(email.clone()).filter(|e| !e.is_empty());
    match workflow.lookup_by_email(&email) {
        Ok(results) => state.status.results = Some(results),
        Err(e) => {
            state.status.results = None;
            state.last_error = Some(error_message(&e));
        }
    }
    state.push_screen(Screen::Status);
}

pub fn render_status_screen(state: &AppState) -> Value {
    let mut children = vec![
        to_value(UiText::new(&t!("status.title")).size(20.0)),
        to_value(UiText::new(&t!("status.intro")).size(14.0)),
    ];
    push_banners(&mut children, state);

    let hint = t!("submit.email_hint");
    let mut input = UiTextInput::new("status_email").hint(&hint).single_line(true);
    if let Some(email) = &state.status.email {
        input = input.text(email);
    }
    children.push(to_value(input));
    children.push(to_value(
        UiButton::new(&t!("status.lookup"), "status_lookup").id("status_lookup_btn"),
    ));

    match &state.status.results {
        Some(results) if results.is_empty() => {
            children.push(to_value(UiText::new(&t!("status.none")).size(13.0)));
        }
        Some(results) => {
            for req in results {
                let status = status_label(req.status);
                let method = method_label(req.method);
                let mut body = vec![
                    to_value(UiText::new(&t!("status.row_status", status = status)).size(13.0)),
                    to_value(UiText::new(&method).size(12.0)),
                    to_value(
                        UiText::new(&t!(
                            "status.submitted_at",
                            at = req.created_at.format("%Y-%m-%d %H:%M UTC")
                        ))
                        .size(11.0),
                    ),
                ];
                if let Some(reason) = &req.rejection_reason {
                    body.push(to_value(
                        UiText::new(&t!("status.reason", reason = reason)).size(12.0),
                    ));
                }
                body.push(to_value(
                    UiText::new(&t!("status.original_doc", uri = req.document_ref))
                        .size(12.0)
                        .content_description("original_document"),
                ));
                if let Some(uri) = &req.signed_document_ref {
                    body.push(to_value(
                        UiText::new(&t!("status.signed_doc", uri = uri))
                            .size(12.0)
                            .content_description("signed_document"),
                    ));
                }
                if let Some(qr) = &req.overlay_image_ref {
                    body.push(to_value(UiText::new(&t!("status.qr_code")).size(12.0)));
                    body.push(to_value(
                        UiImage::new(qr).size_dp(160).content_description("qr_code"),
                    ));
                }
                if let Some(token) = &req.validation_token {
                    body.push(to_value(
                        UiButton::new(&t!("status.verify"), "validate")
                            .target(token)
                            .id("status_verify_btn"),
                    ));
                }
                children.push(to_value(
                    UiCard::new(body).title(&req.document_name).padding(12),
                ));
            }
        }
        None => {}
    }

    maybe_push_back(&mut children, state);
    to_value(UiColumn::new(children).padding(20))
}
