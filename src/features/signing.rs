use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use rust_i18n::t;
use serde_json::{json, Value};

use crate::error::WorkflowError;
use crate::features::compositor::{self, ImageKind, ImageSource, PageInfo};
use crate::features::geometry::{Point, Size};
use crate::features::placement::{Interaction, PlacementSession};
use crate::features::requests::{RequestStatus, SignatureMethod, SignatureRequest};
use crate::features::workflow::Workflow;
use crate::i18n::{error_message, method_label};
use crate::state::{AppState, Screen};
use crate::ui::{
    maybe_push_back, push_banners, to_value, Button as UiButton, Column as UiColumn,
    Image as UiImage, PlacementCanvas, Progress as UiProgress, Text as UiText,
};

/// Everything the worker needs, captured when the commit is enqueued so
/// later pointer events cannot change what gets stamped.
#[derive(Debug, Clone)]
pub struct CommitJob {
    pub request_id: String,
    pub session: PlacementSession,
    pub page_index: usize,
    pub signature: Option<ImageSource>,
}

impl CommitJob {
    pub fn run(&self, workflow: &Workflow) -> Result<SignatureRequest, WorkflowError> {
        workflow.commit_overlay(
            &self.request_id,
            &self.session,
            self.page_index,
            self.signature.as_ref(),
        )
    }
}

fn load_page(
    workflow: &Workflow,
    request: &SignatureRequest,
    page_index: usize,
) -> Result<PageInfo, WorkflowError> {
    let pdf = workflow.document_bytes(request)?;
    Ok(compositor::page_dimensions(&pdf, page_index)?)
}

pub fn handle_placement_open(state: &mut AppState, workflow: &Workflow, id: Option<&str>) {
    let Some(id) = id else {
        state.last_error = Some("missing_request_id".into());
        return;
    };
    let opened = workflow.get(id).and_then(|request| {
        if request.status != RequestStatus::Approved {
            return Err(WorkflowError::InvalidTransition {
                action: "placement_open",
                status: request.status.to_string(),
            });
        }
        if !request.method.uses_overlay() {
            return Err(WorkflowError::InvalidInput(format!(
                "method_not_overlay:{}",
                request.method
            )));
        }
        let info = load_page(workflow, &request, 0)?;
        Ok((request, info))
    });

    match opened {
        Ok((request, info)) => {
            state.placement.reset();
            state.placement.page_count = info.page_count;
            state.placement.page_size = Some(info.size());
            state.placement.request = Some(request);
            state.push_screen(Screen::Placement);
        }
        Err(e) => state.last_error = Some(error_message(&e)),
    }
}

pub fn handle_viewport(state: &mut AppState, width: f64, height: f64) {
    let viewport = Size::new(width, height);
    if !viewport.is_usable() {
        state.last_error = Some(format!("invalid_viewport:{width}x{height}"));
        return;
    }
    state.placement.session = Some(match state.placement.session {
        Some(session) => session.resize_viewport(viewport),
        None => PlacementSession::new(viewport),
    });
}

pub fn handle_page_change(state: &mut AppState, workflow: &Workflow, page_index: usize) {
    let Some(request) = state.placement.request.clone() else {
        state.last_error = Some("no_placement_session".into());
        return;
    };
    if page_index >= state.placement.page_count {
        state.last_error = Some(format!(
            "page_out_of_range:{page_index}/{}",
            state.placement.page_count
        ));
        return;
    }
    match load_page(workflow, &request, page_index) {
        Ok(info) => {
            state.placement.page_index = page_index;
            state.placement.page_size = Some(info.size());
            // Fresh box on the new page; the host keeps its render size.
            if let Some(session) = state.placement.session {
                state.placement.session = Some(PlacementSession::new(session.viewport));
            }
        }
        Err(e) => state.last_error = Some(error_message(&e)),
    }
}

pub fn handle_page_step(state: &mut AppState, workflow: &Workflow, forward: bool) {
    let current = state.placement.page_index;
    let target = if forward {
        current + 1
    } else {
        match current.checked_sub(1) {
            Some(prev) => prev,
            None => return,
        }
    };
    handle_page_change(state, workflow, target);
}

pub fn handle_pointer_down(state: &mut AppState, x: f64, y: f64) {
    if let Some(session) = state.placement.session {
        state.placement.session = Some(session.pointer_down(Point::new(x, y)));
    }
}

pub fn handle_pointer_move(state: &mut AppState, x: f64, y: f64) {
    if let Some(session) = state.placement.session {
        state.placement.session = Some(session.pointer_move(Point::new(x, y)));
    }
}

pub fn handle_pointer_up(state: &mut AppState) {
    if let Some(session) = state.placement.session {
        state.placement.session = Some(session.pointer_up());
    }
}

/// Signature pad output (bare base64 PNG) or any accepted image reference.
/// Returns false and leaves the stored signature alone when it does not parse.
pub fn handle_signature_set(state: &mut AppState, reference: &str) -> bool {
    match ImageSource::parse(reference) {
        Ok(_) => {
            state.placement.signature = Some(reference.trim().to_string());
            true
        }
        Err(e) => {
            state.last_error = Some(error_message(&e.into()));
            false
        }
    }
}

/// Picked image file, kept inline as a `data:` URL.
pub fn handle_signature_file(state: &mut AppState, bytes: &[u8], file_name: Option<&str>) {
    if bytes.is_empty() {
        state.last_error = Some("empty_signature_file".into());
        return;
    }
    let encoded = B64.encode(bytes);
    let reference = match file_name.and_then(ImageKind::from_extension) {
        Some(ImageKind::Png) => format!("data:image/png;base64,{encoded}"),
        Some(ImageKind::Jpeg) => format!("data:image/jpeg;base64,{encoded}"),
        None => encoded,
    };
    state.placement.signature = Some(reference);
}

pub fn handle_signature_clear(state: &mut AppState) {
    state.placement.signature = None;
}

/// Snapshots the session for the worker. Refused while a commit for this
/// session is already running.
pub fn prepare_commit(state: &mut AppState) -> Result<CommitJob, String> {
    let placement = &state.placement;
    if placement.commit_in_flight {
        return Err(t!("placement.busy").into_owned());
    }
    let request = placement
        .request
        .as_ref()
        .ok_or_else(|| "no_placement_session".to_string())?;
    let session = placement
        .session
        .ok_or_else(|| t!("placement.waiting_viewport").into_owned())?;
    let signature = match request.method {
        SignatureMethod::ImageOverlay => {
            let reference = placement
                .signature
                .as_deref()
                .ok_or_else(|| t!("placement.signature_missing").into_owned())?;
            Some(ImageSource::parse(reference).map_err(|e| error_message(&e.into()))?)
        }
        _ => None,
    };

    let job = CommitJob {
        request_id: request.id.clone(),
        session: session.pointer_up(),
        page_index: placement.page_index,
        signature,
    };
    state.placement.commit_in_flight = true;
    Ok(job)
}

/// Returns whether the request ended up signed.
pub fn apply_commit_result(
    state: &mut AppState,
    request_id: &str,
    result: Result<SignatureRequest, String>,
) -> bool {
    let same_session = state.placement.request_id() == Some(request_id);
    if same_session {
        state.placement.commit_in_flight = false;
    }
    match result {
        Ok(request) => {
            state.last_error = None;
            state.last_notice =
                Some(t!("placement.signed", name = request.document_name).into_owned());
            if same_session {
                state.placement.reset();
                if state.current_screen() == Screen::Placement {
                    state.pop_screen();
                }
            }
            true
        }
        Err(message) => {
            state.last_error = Some(message);
            false
        }
    }
}

fn interaction_label(session: &PlacementSession) -> &'static str {
    match session.interaction {
        Interaction::Idle => "idle",
        Interaction::Dragging { .. } => "dragging",
        Interaction::Resizing { .. } => "resizing",
    }
}

pub fn render_placement_screen(state: &AppState) -> Value {
    let placement = &state.placement;
    let mut children = vec![to_value(UiText::new(&t!("placement.title")).size(20.0))];
    push_banners(&mut children, state);

    let Some(request) = &placement.request else {
        children.push(to_value(UiText::new(&t!("placement.none")).size(14.0)));
        maybe_push_back(&mut children, state);
        return to_value(UiColumn::new(children).padding(20));
    };

    children.push(to_value(
        UiText::new(&format!(
            "{} · {}",
            request.document_name,
            method_label(request.method)
        ))
        .size(14.0),
    ));
    children.push(to_value(
        UiText::new(&t!(
            "placement.page",
            page = placement.page_index + 1,
            count = placement.page_count
        ))
        .size(12.0),
    ));
    if placement.page_count > 1 {
        children.push(to_value(UiColumn::new(vec![
            to_value(
                UiButton::new(&t!("placement.prev"), "placement_page_prev")
                    .enabled(placement.page_index > 0),
            ),
            to_value(
                UiButton::new(&t!("placement.next"), "placement_page_next")
                    .enabled(placement.page_index + 1 < placement.page_count),
            ),
        ])));
    }

    let overlay = match request.method {
        SignatureMethod::QrValidated => request.overlay_image_ref.as_deref(),
        _ => placement.signature.as_deref(),
    };
    let mut canvas =
        PlacementCanvas::new(&request.document_ref, placement.page_index, placement.page_count);
    if let Some(page) = placement.page_size {
        canvas = canvas.page_size(page);
    }
    if let Some(session) = &placement.session {
        canvas = canvas
            .rect(session.rect, session.handle_rect())
            .viewport(session.viewport)
            .interaction(interaction_label(session));
    }
    if let Some(src) = overlay {
        canvas = canvas.overlay_source(src);
    }
    children.push(to_value(canvas));
    if placement.session.is_none() {
        children.push(to_value(
            UiText::new(&t!("placement.waiting_viewport")).size(12.0),
        ));
    }

    if request.method == SignatureMethod::ImageOverlay {
        children.push(to_value(UiText::new(&t!("placement.signature_title")).size(16.0)));
        children.push(json!({
            "type": "SignaturePad",
            "bind_key": "signature_base64",
            "height_dp": 200,
            "content_description": "Signature drawing area"
        }));
        children.push(to_value(
            UiButton::new(&t!("placement.signature_load"), "placement_signature_load")
                .requires_file_picker(true),
        ));
        children.push(to_value(UiButton::new(
            &t!("placement.signature_clear"),
            "placement_signature_clear",
        )));
        if let Some(sig) = &placement.signature {
            children.push(to_value(
                UiText::new(&t!("placement.signature_ready")).size(12.0),
            ));
            if sig.starts_with("data:") {
                children.push(to_value(
                    UiImage::new(sig)
                        .size_dp(96)
                        .content_description("signature_preview"),
                ));
            }
        }
    }

    if placement.commit_in_flight {
        children.push(to_value(UiProgress::new().text(&t!("placement.committing"))));
    }
    children.push(to_value(
        UiButton::new(&t!("placement.commit"), "placement_commit")
            .id("placement_commit_btn")
            .enabled(placement.session.is_some() && !placement.commit_in_flight),
    ));

    maybe_push_back(&mut children, state);
    to_value(UiColumn::new(children).padding(20))
}
