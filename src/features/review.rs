//! Admin review: approve or reject pending requests, then hand approved
//! ones to placement (QR / image) or wet-ink completion.

use std::collections::HashMap;

use rust_i18n::t;
use serde_json::Value;

use crate::features::requests::{SignatureMethod, SignatureRequest};
use crate::features::workflow::Workflow;
use crate::i18n::{error_message, method_label, status_label};
use crate::state::{AppState, Screen};
use crate::ui::{
    maybe_push_back, push_banners, to_value, Button as UiButton, Card as UiCard,
    Column as UiColumn, Text as UiText, TextInput as UiTextInput,
};

pub fn refresh_review(state: &mut AppState, workflow: &Workflow) {
    match workflow.list_for_review() {
        Ok(buckets) => state.review = Some(buckets),
        Err(e) => state.last_error = Some(error_message(&e)),
    }
}

pub fn handle_review_screen(state: &mut AppState, workflow: &Workflow) {
    state.push_screen(Screen::Review);
    refresh_review(state, workflow);
}

pub fn handle_approve(state: &mut AppState, workflow: &Workflow, id: Option<&str>) {
    let Some(id) = id else {
        state.last_error = Some("missing_request_id".into());
        return;
    };
    match workflow.approve(id) {
        Ok(req) => {
            state.last_notice =
                Some(t!("review.approved_notice", name = req.document_name).into_owned())
        }
        Err(e) => state.last_error = Some(error_message(&e)),
    }
    refresh_review(state, workflow);
}

pub fn handle_reject(
    state: &mut AppState,
    workflow: &Workflow,
    id: Option<&str>,
    bindings: &HashMap<String, String>,
) {
    let Some(id) = id else {
        state.last_error = Some("missing_request_id".into());
        return;
    };
    let reason = bindings
        .get(&format!("reason_{id}"))
        .or_else(|| bindings.get("rejection_reason"))
        .map(String::as_str)
        .unwrap_or_default();
    match workflow.reject(id, reason) {
        Ok(req) => {
            state.last_notice =
                Some(t!("review.rejected_notice", name = req.document_name).into_owned())
        }
        Err(e) => state.last_error = Some(error_message(&e)),
    }
    refresh_review(state, workflow);
}

pub fn handle_wet_ink_upload(
    state: &mut AppState,
    workflow: &Workflow,
    id: Option<&str>,
    scanned_pdf: &[u8],
) {
    let Some(id) = id else {
        state.last_error = Some("missing_request_id".into());
        return;
    };
    match workflow.complete_wet_ink(id, scanned_pdf) {
        Ok(req) => {
            state.last_notice =
                Some(t!("review.wet_ink_done", name = req.document_name).into_owned())
        }
        Err(e) => state.last_error = Some(error_message(&e)),
    }
    refresh_review(state, workflow);
}

fn request_summary(req: &SignatureRequest) -> Vec<Value> {
    let mut body = vec![
        to_value(UiText::new(&req.email).size(13.0)),
        to_value(UiText::new(&method_label(req.method)).size(12.0)),
        to_value(
            UiText::new(&t!("status.row_status", status = status_label(req.status))).size(12.0),
        ),
    ];
    if let Some(message) = &req.message {
        body.push(to_value(UiText::new(message).size(12.0)));
    }
    if let Some(reason) = &req.rejection_reason {
        body.push(to_value(
            UiText::new(&t!("status.reason", reason = reason)).size(12.0),
        ));
    }
    body
}

fn pending_card(req: &SignatureRequest) -> Value {
    let mut body = request_summary(req);
    let reason_key = format!("reason_{}", req.id);
    let hint = t!("review.reason_hint");
    body.push(to_value(
        UiTextInput::new(&reason_key).hint(&hint).single_line(true),
    ));
    body.push(to_value(
        UiButton::new(&t!("review.approve"), "review_approve").target(&req.id),
    ));
    body.push(to_value(
        UiButton::new(&t!("review.reject"), "review_reject").target(&req.id),
    ));
    to_value(UiCard::new(body).title(&req.document_name).padding(12))
}

fn approved_card(req: &SignatureRequest) -> Value {
    let mut body = request_summary(req);
    if req.method == SignatureMethod::PhysicalWetInk {
        body.push(to_value(
            UiButton::new(&t!("review.upload_scan"), "wet_ink_upload")
                .target(&req.id)
                .requires_file_picker(true),
        ));
    } else {
        body.push(to_value(
            UiButton::new(&t!("review.place"), "placement_open").target(&req.id),
        ));
    }
    to_value(UiCard::new(body).title(&req.document_name).padding(12))
}

fn closed_card(req: &SignatureRequest) -> Value {
    to_value(UiCard::new(request_summary(req)).title(&req.document_name).padding(12))
}

fn push_section(
    children: &mut Vec<Value>,
    title: &str,
    requests: &[SignatureRequest],
    card: fn(&SignatureRequest) -> Value,
) {
    children.push(to_value(
        UiText::new(&format!("{title} ({})", requests.len())).size(16.0),
    ));
    if requests.is_empty() {
        children.push(to_value(UiText::new(&t!("review.empty")).size(12.0)));
    }
    children.extend(requests.iter().map(card));
}

pub fn render_review_screen(state: &AppState) -> Value {
    let mut children = vec![to_value(UiText::new(&t!("review.title")).size(20.0))];
    push_banners(&mut children, state);
    children.push(to_value(
        UiButton::new(&t!("review.refresh"), "review_screen").id("review_refresh_btn"),
    ));

    let Some(buckets) = &state.review else {
        maybe_push_back(&mut children, state);
        return to_value(UiColumn::new(children).padding(20));
    };

    push_section(&mut children, &t!("review.pending"), &buckets.pending, pending_card);
    push_section(&mut children, &t!("review.approved"), &buckets.approved, approved_card);
    push_section(&mut children, &t!("review.other"), &buckets.other, closed_card);

    maybe_push_back(&mut children, state);
    to_value(UiColumn::new(children).padding(20))
}
