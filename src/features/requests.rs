use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureMethod {
    #[serde(alias = "e-ttd")]
    QrValidated,
    ImageOverlay,
    PhysicalWetInk,
}

impl SignatureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureMethod::QrValidated => "qr-validated",
            SignatureMethod::ImageOverlay => "image-overlay",
            SignatureMethod::PhysicalWetInk => "physical-wet-ink",
        }
    }

    /// Whether signing composites an image onto the document.
    pub fn uses_overlay(&self) -> bool {
        !matches!(self, SignatureMethod::PhysicalWetInk)
    }
}

impl FromStr for SignatureMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qr-validated" | "e-ttd" => Ok(SignatureMethod::QrValidated),
            "image-overlay" => Ok(SignatureMethod::ImageOverlay),
            "physical-wet-ink" => Ok(SignatureMethod::PhysicalWetInk),
            other => Err(format!("unknown_signature_method:{other}")),
        }
    }
}

impl fmt::Display for SignatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Signed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Signed => "signed",
        }
    }

    pub fn is_approved_or_later(&self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::Signed)
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            "signed" => Ok(RequestStatus::Signed),
            other => Err(format!("unknown_status:{other}")),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureRequest {
    pub id: String,
    pub email: String,
    pub document_name: String,
    pub document_ref: String,
    pub method: SignatureMethod,
    pub status: RequestStatus,
    pub message: Option<String>,
    pub rejection_reason: Option<String>,
    pub validation_token: Option<String>,
    pub overlay_image_ref: Option<String>,
    pub signed_document_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
    pub validated_at: Option<DateTime<Utc>>,
}

impl SignatureRequest {
    pub fn new_pending(
        email: &str,
        document_name: &str,
        document_ref: &str,
        method: SignatureMethod,
        message: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            document_name: document_name.to_string(),
            document_ref: document_ref.to_string(),
            method,
            status: RequestStatus::Pending,
            message,
            rejection_reason: None,
            validation_token: None,
            overlay_image_ref: None,
            signed_document_ref: None,
            created_at: Utc::now(),
            approved_at: None,
            rejected_at: None,
            signed_at: None,
            validated_at: None,
        }
    }

    /// Token and overlay only for QR requests that made it past review;
    /// a signed document only once signed.
    pub fn invariants_hold(&self) -> bool {
        let qr_ready =
            self.method == SignatureMethod::QrValidated && self.status.is_approved_or_later();
        let token_ok = if qr_ready {
            self.validation_token.is_some() && self.overlay_image_ref.is_some()
        } else {
            self.validation_token.is_none() && self.overlay_image_ref.is_none()
        };
        let signed_ok = (self.status == RequestStatus::Signed) == self.signed_document_ref.is_some();
        token_ok && signed_ok
    }
}

/// Column changes for `RequestStore::update`; `None` leaves a column alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestUpdate {
    pub status: Option<RequestStatus>,
    pub rejection_reason: Option<String>,
    pub validation_token: Option<String>,
    pub overlay_image_ref: Option<String>,
    pub signed_document_ref: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
    pub validated_at: Option<DateTime<Utc>>,
}

impl RequestUpdate {
    pub fn is_empty(&self) -> bool {
        *self == RequestUpdate::default()
    }

    pub fn apply_to(&self, request: &mut SignatureRequest) {
        if let Some(status) = self.status {
            request.status = status;
        }
        if let Some(v) = &self.rejection_reason {
            request.rejection_reason = Some(v.clone());
        }
        if let Some(v) = &self.validation_token {
            request.validation_token = Some(v.clone());
        }
        if let Some(v) = &self.overlay_image_ref {
            request.overlay_image_ref = Some(v.clone());
        }
        if let Some(v) = &self.signed_document_ref {
            request.signed_document_ref = Some(v.clone());
        }
        if self.approved_at.is_some() {
            request.approved_at = self.approved_at;
        }
        if self.rejected_at.is_some() {
            request.rejected_at = self.rejected_at;
        }
        if self.signed_at.is_some() {
            request.signed_at = self.signed_at;
        }
        if self.validated_at.is_some() {
            request.validated_at = self.validated_at;
        }
    }
}
