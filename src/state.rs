use crate::features::geometry::Size;
use crate::features::placement::PlacementSession;
use crate::features::requests::{SignatureMethod, SignatureRequest};
use crate::features::workflow::ReviewBuckets;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Screen {
    Home,
    Submit,
    Status,
    Review,
    Placement,
    Validate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionState {
    pub method: SignatureMethod,
    pub email: Option<String>,
    pub document_name: Option<String>,
    pub message: Option<String>,
    pub last_submitted: Option<SignatureRequest>,
}

impl SubmissionState {
    pub const fn new() -> Self {
        Self {
            method: SignatureMethod::QrValidated,
            email: None,
            document_name: None,
            message: None,
            last_submitted: None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusState {
    pub email: Option<String>,
    /// `None` until a lookup ran.
    pub results: Option<Vec<SignatureRequest>>,
}

impl StatusState {
    pub const fn new() -> Self {
        Self {
            email: None,
            results: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementState {
    pub request: Option<SignatureRequest>,
    pub page_index: usize,
    pub page_count: usize,
    pub page_size: Option<Size>,
    /// Starts once the host has reported how large it draws the page.
    pub session: Option<PlacementSession>,
    /// Image reference (`data:` URL or bare base64) for image-overlay requests.
    pub signature: Option<String>,
    pub commit_in_flight: bool,
}

impl PlacementState {
    pub const fn new() -> Self {
        Self {
            request: None,
            page_index: 0,
            page_count: 0,
            page_size: None,
            session: None,
            signature: None,
            commit_in_flight: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request.as_ref().map(|r| r.id.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Valid { request: SignatureRequest },
    NotFound { token: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppState {
    pub nav_stack: Vec<Screen>,
    /// Empty means the default locale.
    pub locale: String,
    pub last_error: Option<String>,
    pub last_notice: Option<String>,
    pub submission: SubmissionState,
    pub status: StatusState,
    pub review: Option<ReviewBuckets>,
    pub placement: PlacementState,
    pub validation: Option<ValidationOutcome>,
}

impl AppState {
    // const so it can be used in static initialization
    pub const fn new() -> Self {
        Self {
            nav_stack: Vec::new(),
            locale: String::new(),
            last_error: None,
            last_notice: None,
            submission: SubmissionState::new(),
            status: StatusState::new(),
            review: None,
            placement: PlacementState::new(),
            validation: None,
        }
    }

    pub fn ensure_navigation(&mut self) {
        if self.nav_stack.is_empty() {
            self.nav_stack.push(Screen::Home);
        }
    }

    pub fn current_screen(&self) -> Screen {
        self.nav_stack.last().copied().unwrap_or(Screen::Home)
    }

    pub fn nav_depth(&self) -> usize {
        let depth = self.nav_stack.len();
        if depth == 0 {
            1
        } else {
            depth
        }
    }

    /// Re-entering the screen on top does not stack a duplicate.
    pub fn push_screen(&mut self, screen: Screen) {
        self.ensure_navigation();
        if self.current_screen() != screen {
            self.nav_stack.push(screen);
        }
    }

    pub fn pop_screen(&mut self) {
        self.ensure_navigation();
        if self.nav_stack.len() > 1 {
            self.nav_stack.pop();
        }
    }

    pub fn reset_navigation(&mut self) {
        self.nav_stack.clear();
        self.nav_stack.push(Screen::Home);
    }

    pub fn clear_banners(&mut self) {
        self.last_error = None;
        self.last_notice = None;
    }

    pub fn reset_runtime(&mut self) {
        self.clear_banners();
        self.submission.reset();
        self.status = StatusState::new();
        self.review = None;
        self.placement.reset();
        self.validation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_never_empties() {
        let mut state = AppState::new();
        state.pop_screen();
        assert_eq!(state.current_screen(), Screen::Home);
        state.push_screen(Screen::Review);
        state.push_screen(Screen::Review);
        assert_eq!(state.nav_depth(), 2);
        state.pop_screen();
        state.pop_screen();
        assert_eq!(state.nav_stack, vec![Screen::Home]);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut state = AppState::new();
        state.push_screen(Screen::Status);
        state.status.email = Some("a@b.c".into());
        state.placement.page_index = 2;
        let json = serde_json::to_string(&state).unwrap();
        let restored: AppState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.nav_stack, state.nav_stack);
        assert_eq!(restored.status, state.status);
        assert_eq!(restored.placement.page_index, 2);
    }
}
