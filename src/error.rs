use thiserror::Error;

/// Failures of the overlay pipeline: loading the PDF, getting the image
/// bytes, decoding them and wiring the result into the page.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OverlayError {
    /// Malformed or unreadable PDF, or a page index outside the document.
    #[error("pdf_load_failed:{0}")]
    Load(String),

    /// Image bytes are neither PNG nor JPEG.
    #[error("image_decode_failed:{0}")]
    Decode(String),

    /// A remote image or PDF could not be read.
    #[error("fetch_failed:{0}")]
    Fetch(String),

    /// The image decoded fine but the page object graph would not take it.
    #[error("image_embed_failed:{0}")]
    Embed(String),
}

impl OverlayError {
    pub fn code(&self) -> &'static str {
        match self {
            OverlayError::Load(_) => "pdf_load_failed",
            OverlayError::Decode(_) => "image_decode_failed",
            OverlayError::Fetch(_) => "fetch_failed",
            OverlayError::Embed(_) => "image_embed_failed",
        }
    }
}

/// Failures while rendering the validation QR code on approval.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QrError {
    /// The validation URL does not fit in a QR symbol.
    #[error("qr_encode_failed:{0}")]
    Encode(String),

    #[error("qr_png_failed:{0}")]
    Png(String),
}

/// Errors surfaced by the request workflow around the compositor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error("qr_render_failed:{0}")]
    Qr(#[from] QrError),

    /// Upload or record update failed.
    #[error("persistence_failed:{0}")]
    Persistence(String),

    #[error("request_not_found:{0}")]
    NotFound(String),

    #[error("invalid_transition:{action} not allowed while {status}")]
    InvalidTransition {
        action: &'static str,
        status: String,
    },

    #[error("invalid_input:{0}")]
    InvalidInput(String),
}

impl WorkflowError {
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Overlay(inner) => inner.code(),
            WorkflowError::Qr(_) => "qr_render_failed",
            WorkflowError::Persistence(_) => "persistence_failed",
            WorkflowError::NotFound(_) => "request_not_found",
            WorkflowError::InvalidTransition { .. } => "invalid_transition",
            WorkflowError::InvalidInput(_) => "invalid_input",
        }
    }

    pub fn is_fetch(&self) -> bool {
        matches!(self, WorkflowError::Overlay(OverlayError::Fetch(_)))
    }
}

impl From<sqlite::Error> for WorkflowError {
    fn from(err: sqlite::Error) -> Self {
        WorkflowError::Persistence(err.to_string())
    }
}
