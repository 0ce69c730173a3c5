use serde::Serialize;
use serde_json::{json, Value};

use crate::features::geometry::{Rect, Size};
use crate::state::AppState;

#[derive(Serialize)]
pub struct Text<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_description: Option<&'a str>,
}

impl<'a> Text<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            kind: "Text",
            text,
            size: None,
            content_description: None,
        }
    }

    pub fn size(mut self, size: f64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn content_description(mut self, cd: &'a str) -> Self {
        self.content_description = Some(cd);
        self
    }
}

#[derive(Serialize)]
pub struct Button<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: &'a str,
    pub action: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<&'a str>,
    /// Echoed back by the host as `target` when the button is pressed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_file_picker: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_description: Option<&'a str>,
}

impl<'a> Button<'a> {
    pub fn new(text: &'a str, action: &'a str) -> Self {
        Self {
            kind: "Button",
            text,
            action,
            id: None,
            target: None,
            requires_file_picker: None,
            enabled: None,
            content_description: None,
        }
    }

    pub fn id(mut self, id: &'a str) -> Self {
        self.id = Some(id);
        self
    }

    pub fn target(mut self, target: &'a str) -> Self {
        self.target = Some(target);
        self
    }

    pub fn requires_file_picker(mut self, needs: bool) -> Self {
        self.requires_file_picker = Some(needs);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn content_description(mut self, cd: &'a str) -> Self {
        self.content_description = Some(cd);
        self
    }
}

#[derive(Serialize)]
pub struct Column<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding: Option<u32>,
    pub children: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_description: Option<&'a str>,
}

impl<'a> Column<'a> {
    pub fn new(children: Vec<Value>) -> Self {
        Self {
            kind: "Column",
            padding: None,
            children,
            content_description: None,
        }
    }

    pub fn padding(mut self, padding: u32) -> Self {
        self.padding = Some(padding);
        self
    }

    pub fn content_description(mut self, cd: &'a str) -> Self {
        self.content_description = Some(cd);
        self
    }
}

#[derive(Serialize)]
pub struct Card<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding: Option<u32>,
    pub children: Vec<Value>,
}

impl<'a> Card<'a> {
    pub fn new(children: Vec<Value>) -> Self {
        Self {
            kind: "Card",
            title: None,
            padding: None,
            children,
        }
    }

    pub fn title(mut self, title: &'a str) -> Self {
        self.title = Some(title);
        self
    }

    pub fn padding(mut self, padding: u32) -> Self {
        self.padding = Some(padding);
        self
    }
}

#[derive(Serialize)]
pub struct TextInput<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub bind_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_line: Option<bool>,
}

impl<'a> TextInput<'a> {
    pub fn new(bind_key: &'a str) -> Self {
        Self {
            kind: "TextInput",
            bind_key,
            text: None,
            hint: None,
            single_line: None,
        }
    }

    pub fn text(mut self, text: &'a str) -> Self {
        self.text = Some(text);
        self
    }

    pub fn hint(mut self, hint: &'a str) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn single_line(mut self, single: bool) -> Self {
        self.single_line = Some(single);
        self
    }
}

#[derive(Serialize)]
pub struct Image<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// `data:` URL or `file://` URL.
    pub source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_dp: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_description: Option<&'a str>,
}

impl<'a> Image<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            kind: "Image",
            source,
            size_dp: None,
            content_description: None,
        }
    }

    pub fn size_dp(mut self, size: u32) -> Self {
        self.size_dp = Some(size);
        self
    }

    pub fn content_description(mut self, cd: &'a str) -> Self {
        self.content_description = Some(cd);
        self
    }
}

#[derive(Serialize)]
pub struct Progress<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<&'a str>,
}

impl<'a> Progress<'a> {
    pub fn new() -> Self {
        Self {
            kind: "Progress",
            text: None,
        }
    }

    pub fn text(mut self, text: &'a str) -> Self {
        self.text = Some(text);
        self
    }
}

/// Page preview with the draggable overlay box. The host renders the page
/// at whatever size fits, reports it with `placement_viewport` and forwards
/// pointer events as `pointer_down` / `pointer_move` / `pointer_up`.
#[derive(Serialize)]
pub struct PlacementCanvas<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub source_uri: &'a str,
    pub page_index: usize,
    pub page_count: usize,
    pub rect: Rect,
    pub handle_rect: Rect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Size>,
    /// Page size in points, so the host can render at the page aspect ratio.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<Size>,
    pub interaction: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_source: Option<&'a str>,
}

impl<'a> PlacementCanvas<'a> {
    pub fn new(source_uri: &'a str, page_index: usize, page_count: usize) -> Self {
        Self {
            kind: "PlacementCanvas",
            source_uri,
            page_index,
            page_count,
            rect: Rect::new(0.0, 0.0, 0.0, 0.0),
            handle_rect: Rect::new(0.0, 0.0, 0.0, 0.0),
            viewport: None,
            page_size: None,
            interaction: "idle",
            overlay_source: None,
        }
    }

    pub fn rect(mut self, rect: Rect, handle: Rect) -> Self {
        self.rect = rect;
        self.handle_rect = handle;
        self
    }

    pub fn viewport(mut self, viewport: Size) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn page_size(mut self, page: Size) -> Self {
        self.page_size = Some(page);
        self
    }

    pub fn interaction(mut self, interaction: &'static str) -> Self {
        self.interaction = interaction;
        self
    }

    pub fn overlay_source(mut self, source: &'a str) -> Self {
        self.overlay_source = Some(source);
        self
    }
}

/// Serializes a builder; the builders only hold strings, numbers and
/// already-built values, so this cannot fail in practice.
pub fn to_value<T: Serialize>(widget: T) -> Value {
    serde_json::to_value(widget).unwrap_or(Value::Null)
}

pub fn maybe_push_back(children: &mut Vec<Value>, state: &AppState) {
    if state.nav_depth() > 1 {
        children.push(json!({
            "type": "Button",
            "text": rust_i18n::t!("common.back"),
            "action": "back"
        }));
    }
}

/// Error and notice banners shared by every screen.
pub fn push_banners(children: &mut Vec<Value>, state: &AppState) {
    if let Some(err) = &state.last_error {
        children.push(to_value(
            Text::new(err).size(13.0).content_description("error_banner"),
        ));
    }
    if let Some(notice) = &state.last_notice {
        children.push(to_value(
            Text::new(notice).size(13.0).content_description("notice_banner"),
        ));
    }
}
