pub mod compositor;
pub mod geometry;
pub mod placement;
pub mod qr;
pub mod requests;
pub mod review;
pub mod signing;
pub mod store;
pub mod submission;
pub mod validation;
pub mod workflow;

use crate::state::AppState;
use serde_json::Value;

/// A feature entry for the home menu.
pub struct Feature {
    pub id: &'static str,
    pub category: Category,
    pub action: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    Requester,
    Admin,
}

pub fn feature_catalog() -> Vec<Feature> {
    vec![
        Feature {
            id: "submit",
            category: Category::Requester,
            action: "submit_screen",
        },
        Feature {
            id: "status",
            category: Category::Requester,
            action: "status_screen",
        },
        Feature {
            id: "validate",
            category: Category::Requester,
            action: "validate_screen",
        },
        Feature {
            id: "review",
            category: Category::Admin,
            action: "review_screen",
        },
    ]
}

fn feature_name(id: &str) -> String {
    match id {
        "submit" => rust_i18n::t!("home.submit"),
        "status" => rust_i18n::t!("home.status"),
        "validate" => rust_i18n::t!("home.validate"),
        _ => rust_i18n::t!("home.review"),
    }
    .into_owned()
}

/// Render the home screen using a catalog of features.
pub fn render_menu(state: &AppState, catalog: &[Feature]) -> Value {
    use crate::ui::{push_banners, to_value, Button as UiButton, Card as UiCard, Text as UiText};
    use std::collections::BTreeMap;

    let mut children = vec![
        to_value(UiText::new(&rust_i18n::t!("home.title")).size(22.0)),
        to_value(UiText::new(&rust_i18n::t!("home.subtitle")).size(14.0)),
    ];
    push_banners(&mut children, state);

    let mut grouped: BTreeMap<Category, Vec<&Feature>> = BTreeMap::new();
    for feature in catalog.iter() {
        grouped.entry(feature.category).or_default().push(feature);
    }

    for (category, feats) in grouped {
        let title = match category {
            Category::Requester => rust_i18n::t!("home.requester"),
            Category::Admin => rust_i18n::t!("home.admin"),
        };
        let names: Vec<String> = feats.iter().map(|f| feature_name(f.id)).collect();
        let buttons: Vec<Value> = feats
            .iter()
            .zip(names.iter())
            .map(|(f, name)| to_value(UiButton::new(name, f.action).id(f.id)))
            .collect();
        children.push(to_value(UiCard::new(buttons).title(&title).padding(12)));
    }

    to_value(crate::ui::Column::new(children).padding(20))
}
