#[cfg(test)]
mod tests {
    use crate::features::geometry::{Rect, Size};
    use crate::ui::{to_value, Button, PlacementCanvas, TextInput};

    #[test]
    fn button_carries_target_for_row_actions() {
        let val = to_value(
            Button::new("Approve", "review_approve")
                .target("req-1")
                .id("approve_req-1"),
        );
        assert_eq!(val.get("type").and_then(|v| v.as_str()), Some("Button"));
        assert_eq!(val.get("target").and_then(|v| v.as_str()), Some("req-1"));
        assert!(val.get("requires_file_picker").is_none());
    }

    #[test]
    fn text_input_serializes_bind_key_and_hint() {
        let val = to_value(TextInput::new("email").hint("you@example.com").single_line(true));
        assert_eq!(val.get("bind_key").and_then(|v| v.as_str()), Some("email"));
        assert_eq!(val.get("hint").and_then(|v| v.as_str()), Some("you@example.com"));
        assert_eq!(val.get("single_line").and_then(|v| v.as_bool()), Some(true));
        assert!(val.get("text").is_none());
    }

    #[test]
    fn placement_canvas_exposes_rect_and_handle() {
        let val = to_value(
            PlacementCanvas::new("file:///tmp/a.pdf", 1, 3)
                .rect(
                    Rect::new(100.0, 100.0, 100.0, 100.0),
                    Rect::new(184.0, 184.0, 16.0, 16.0),
                )
                .viewport(Size::new(600.0, 800.0))
                .interaction("dragging"),
        );
        assert_eq!(val["type"], "PlacementCanvas");
        assert_eq!(val["page_index"], 1);
        assert_eq!(val["rect"]["width"].as_f64(), Some(100.0));
        assert_eq!(val["handle_rect"]["x"].as_f64(), Some(184.0));
        assert_eq!(val["viewport"]["height"].as_f64(), Some(800.0));
        assert_eq!(val["interaction"], "dragging");
    }
}
