//! Request lifecycle around the compositor: submission, review, signing and
//! validation. Every operation reads the record, checks the transition and
//! writes the record last, so a failure anywhere earlier leaves it as it was.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{OverlayError, WorkflowError};
use crate::features::compositor::{self, ImageSource};
use crate::features::geometry::to_pdf_space;
use crate::features::placement::PlacementSession;
use crate::features::qr;
use crate::features::requests::{
    RequestStatus, RequestUpdate, SignatureMethod, SignatureRequest,
};
use crate::features::store::{BlobStore, FsBlobStore, RequestStore, SqliteRequestStore};

/// Admin review list split the way the review screen shows it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewBuckets {
    pub pending: Vec<SignatureRequest>,
    pub approved: Vec<SignatureRequest>,
    pub other: Vec<SignatureRequest>,
}

pub struct Workflow {
    config: Config,
    blobs: Box<dyn BlobStore>,
    requests: Box<dyn RequestStore>,
}

/// Runs `op`, and once more if the first attempt failed to fetch.
fn with_fetch_retry<T>(
    what: &str,
    mut op: impl FnMut() -> Result<T, OverlayError>,
) -> Result<T, OverlayError> {
    match op() {
        Err(OverlayError::Fetch(reason)) => {
            log::warn!("{what}: fetch failed ({reason}), retrying once");
            op()
        }
        other => other,
    }
}

fn require_status(
    request: &SignatureRequest,
    expected: RequestStatus,
    action: &'static str,
) -> Result<(), WorkflowError> {
    if request.status == expected {
        Ok(())
    } else {
        Err(WorkflowError::InvalidTransition {
            action,
            status: request.status.to_string(),
        })
    }
}

fn non_empty(value: &str, field: &str) -> Result<String, WorkflowError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(WorkflowError::InvalidInput(format!("{field}_required")))
    } else {
        Ok(trimmed.to_string())
    }
}

impl Workflow {
    pub fn new(config: Config, blobs: Box<dyn BlobStore>, requests: Box<dyn RequestStore>) -> Self {
        Self {
            config,
            blobs,
            requests,
        }
    }

    /// Filesystem blobs and a SQLite database under `config.data_dir`.
    pub fn open(config: Config) -> Result<Self, WorkflowError> {
        let blobs = FsBlobStore::open(
            config.blob_dir(),
            std::time::Duration::from_secs(config.fetch_timeout_secs),
        )?;
        let requests = SqliteRequestStore::open(&config.database_path())?;
        log::info!("workflow opened at {}", config.data_dir.display());
        Ok(Self::new(config, Box::new(blobs), Box::new(requests)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn get(&self, id: &str) -> Result<SignatureRequest, WorkflowError> {
        self.requests
            .get(id)?
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))
    }

    /// Original document bytes, with the single fetch retry.
    pub fn document_bytes(&self, request: &SignatureRequest) -> Result<Vec<u8>, WorkflowError> {
        Ok(with_fetch_retry("document", || {
            self.blobs.get(&request.document_ref)
        })?)
    }

    pub fn submit(
        &self,
        email: &str,
        document_name: &str,
        pdf_bytes: &[u8],
        method: SignatureMethod,
        message: Option<&str>,
    ) -> Result<SignatureRequest, WorkflowError> {
        let email = non_empty(email, "email")?;
        if !email.contains('@') {
            return Err(WorkflowError::InvalidInput(format!("invalid_email:{email}")));
        }
        let document_name = non_empty(document_name, "document_name")?;
        let info = compositor::page_dimensions(pdf_bytes, 0)?;

        let document_ref = self.blobs.put(pdf_bytes, "application/pdf")?;
        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        let request =
            SignatureRequest::new_pending(&email, &document_name, &document_ref, method, message);
        self.requests.insert(&request)?;
        log::info!(
            "request {} submitted by {} ({}, {} pages)",
            request.id,
            request.email,
            method,
            info.page_count
        );
        Ok(request)
    }

    /// QR requests get their validation token and QR image here.
    pub fn approve(&self, id: &str) -> Result<SignatureRequest, WorkflowError> {
        let mut request = self.get(id)?;
        require_status(&request, RequestStatus::Pending, "approve")?;

        let mut update = RequestUpdate {
            status: Some(RequestStatus::Approved),
            approved_at: Some(Utc::now()),
            ..RequestUpdate::default()
        };
        if request.method == SignatureMethod::QrValidated {
            let token = qr::generate_token();
            let url = qr::validation_url(&self.config.validation_base_url, &token);
            let png = qr::render_qr_png(&url, self.config.qr_size_px)?;
            update.validation_token = Some(token);
            update.overlay_image_ref = Some(qr::png_data_url(&png));
        }
        self.requests.update(id, &update)?;
        update.apply_to(&mut request);
        log::info!("request {id} approved");
        Ok(request)
    }

    pub fn reject(&self, id: &str, reason: &str) -> Result<SignatureRequest, WorkflowError> {
        let reason = non_empty(reason, "rejection_reason")?;
        let mut request = self.get(id)?;
        require_status(&request, RequestStatus::Pending, "reject")?;

        let update = RequestUpdate {
            status: Some(RequestStatus::Rejected),
            rejection_reason: Some(reason),
            rejected_at: Some(Utc::now()),
            ..RequestUpdate::default()
        };
        self.requests.update(id, &update)?;
        update.apply_to(&mut request);
        log::info!("request {id} rejected");
        Ok(request)
    }

    pub fn lookup_by_email(&self, email: &str) -> Result<Vec<SignatureRequest>, WorkflowError> {
        let email = non_empty(email, "email")?;
        self.requests.find_by_email(&email)
    }

    pub fn list_for_review(&self) -> Result<ReviewBuckets, WorkflowError> {
        let mut buckets = ReviewBuckets::default();
        for request in self.requests.list_all()? {
            match request.status {
                RequestStatus::Pending => buckets.pending.push(request),
                RequestStatus::Approved => buckets.approved.push(request),
                _ => buckets.other.push(request),
            }
        }
        Ok(buckets)
    }

    /// Stamps the overlay where the session placed it and marks the request
    /// signed. `signature` is the uploaded image for `image-overlay`
    /// requests; QR requests use their stored QR image.
    pub fn commit_overlay(
        &self,
        id: &str,
        placement: &PlacementSession,
        page_index: usize,
        signature: Option<&ImageSource>,
    ) -> Result<SignatureRequest, WorkflowError> {
        let mut request = self.get(id)?;
        require_status(&request, RequestStatus::Approved, "commit_overlay")?;

        let source = match request.method {
            SignatureMethod::QrValidated => {
                let data_url = request
                    .overlay_image_ref
                    .as_deref()
                    .ok_or_else(|| WorkflowError::InvalidInput("overlay_image_missing".into()))?;
                ImageSource::parse(data_url)?
            }
            SignatureMethod::ImageOverlay => signature
                .cloned()
                .ok_or_else(|| WorkflowError::InvalidInput("signature_image_required".into()))?,
            SignatureMethod::PhysicalWetInk => {
                return Err(WorkflowError::InvalidInput(format!(
                    "method_not_overlay:{}",
                    request.method
                )))
            }
        };

        let pdf = self.document_bytes(&request)?;
        let info = compositor::page_dimensions(&pdf, page_index)?;
        let rect = to_pdf_space(placement.rect, placement.viewport, info.size());
        log::debug!(
            "request {id}: viewer {:?} in {:?} -> pdf {:?} on page {page_index}",
            placement.rect,
            placement.viewport,
            rect
        );
        let signed = with_fetch_retry("overlay image", || {
            compositor::apply(&pdf, &source, rect, page_index, &*self.blobs)
        })?;

        let signed_ref = self.blobs.put(&signed, "application/pdf")?;
        let update = RequestUpdate {
            status: Some(RequestStatus::Signed),
            signed_document_ref: Some(signed_ref),
            signed_at: Some(Utc::now()),
            ..RequestUpdate::default()
        };
        self.requests.update(id, &update)?;
        update.apply_to(&mut request);
        log::info!("request {id} signed with {}", request.method);
        Ok(request)
    }

    /// Wet-ink requests are signed on paper; the scan becomes the signed
    /// document.
    pub fn complete_wet_ink(
        &self,
        id: &str,
        scanned_pdf: &[u8],
    ) -> Result<SignatureRequest, WorkflowError> {
        let mut request = self.get(id)?;
        require_status(&request, RequestStatus::Approved, "complete_wet_ink")?;
        if request.method != SignatureMethod::PhysicalWetInk {
            return Err(WorkflowError::InvalidInput(format!(
                "method_not_wet_ink:{}",
                request.method
            )));
        }
        compositor::page_dimensions(scanned_pdf, 0)?;

        let signed_ref = self.blobs.put(scanned_pdf, "application/pdf")?;
        let update = RequestUpdate {
            status: Some(RequestStatus::Signed),
            signed_document_ref: Some(signed_ref),
            signed_at: Some(Utc::now()),
            ..RequestUpdate::default()
        };
        self.requests.update(id, &update)?;
        update.apply_to(&mut request);
        log::info!("request {id} completed with wet-ink scan");
        Ok(request)
    }

    /// `None` for unknown tokens and for requests no longer approved.
    pub fn validate(&self, token: &str) -> Result<Option<SignatureRequest>, WorkflowError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }
        let Some(mut request) = self.requests.find_by_token(token)? else {
            log::info!("validation of unknown token");
            return Ok(None);
        };
        if !request.status.is_approved_or_later() {
            return Ok(None);
        }
        if request.validated_at.is_none() {
            let update = RequestUpdate {
                validated_at: Some(Utc::now()),
                ..RequestUpdate::default()
            };
            self.requests.update(&request.id, &update)?;
            update.apply_to(&mut request);
        }
        Ok(Some(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::compositor::test_fixtures::{pdf_with_pages, png};
    use crate::features::geometry::{Rect, Size};
    use base64::Engine;
    use lopdf::Document;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn workflow() -> (TempDir, Workflow) {
        let dir = tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            validation_base_url: "https://sign.example/validate".into(),
            qr_size_px: 120,
            fetch_timeout_secs: 1,
        };
        let wf = Workflow::open(config).unwrap();
        (dir, wf)
    }

    fn placement() -> PlacementSession {
        PlacementSession::with_rect(Size::new(595.0, 842.0), Rect::new(50.0, 50.0, 100.0, 100.0))
    }

    fn png_source() -> ImageSource {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png(10, 10, 255));
        ImageSource::parse(&format!("data:image/png;base64,{encoded}")).unwrap()
    }

    #[test]
    fn submit_validates_input_and_stores_pending() {
        let (_dir, wf) = workflow();
        let pdf = pdf_with_pages(1);
        assert!(matches!(
            wf.submit("nobody", "a.pdf", &pdf, SignatureMethod::QrValidated, None),
            Err(WorkflowError::InvalidInput(_))
        ));
        assert!(matches!(
            wf.submit("a@b.c", "a.pdf", b"nope", SignatureMethod::QrValidated, None),
            Err(WorkflowError::Overlay(OverlayError::Load(_)))
        ));

        let req = wf
            .submit(" a@b.c ", "a.pdf", &pdf, SignatureMethod::QrValidated, Some("  "))
            .unwrap();
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(req.email, "a@b.c");
        assert!(req.message.is_none());
        assert_eq!(wf.document_bytes(&req).unwrap(), pdf);
        assert_eq!(wf.get(&req.id).unwrap(), req);
    }

    #[test]
    fn approve_issues_token_only_for_qr() {
        let (_dir, wf) = workflow();
        let pdf = pdf_with_pages(1);
        let qr_req = wf.submit("a@b.c", "a.pdf", &pdf, SignatureMethod::QrValidated, None).unwrap();
        let img_req = wf.submit("a@b.c", "b.pdf", &pdf, SignatureMethod::ImageOverlay, None).unwrap();

        let approved = wf.approve(&qr_req.id).unwrap();
        assert!(approved.validation_token.is_some());
        assert!(approved
            .overlay_image_ref
            .as_deref()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert!(approved.invariants_hold());
        assert_eq!(wf.get(&qr_req.id).unwrap(), approved);

        let approved = wf.approve(&img_req.id).unwrap();
        assert!(approved.validation_token.is_none());
        assert!(approved.invariants_hold());

        let err = wf.approve(&qr_req.id).unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
        assert!(matches!(wf.approve("missing"), Err(WorkflowError::NotFound(_))));
    }

    #[test]
    fn reject_needs_reason_and_pending() {
        let (_dir, wf) = workflow();
        let req = wf
            .submit("a@b.c", "a.pdf", &pdf_with_pages(1), SignatureMethod::ImageOverlay, None)
            .unwrap();
        assert!(matches!(wf.reject(&req.id, "  "), Err(WorkflowError::InvalidInput(_))));
        let rejected = wf.reject(&req.id, "wrong file").unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("wrong file"));
        assert!(rejected.rejected_at.is_some());
        assert!(matches!(
            wf.approve(&req.id),
            Err(WorkflowError::InvalidTransition { action: "approve", .. })
        ));
    }

    #[test]
    fn qr_commit_signs_and_validation_stamps_once() {
        let (_dir, wf) = workflow();
        let pdf = pdf_with_pages(2);
        let req = wf.submit("a@b.c", "a.pdf", &pdf, SignatureMethod::QrValidated, None).unwrap();
        assert!(matches!(
            wf.commit_overlay(&req.id, &placement(), 0, None),
            Err(WorkflowError::InvalidTransition { .. })
        ));
        let approved = wf.approve(&req.id).unwrap();
        let token = approved.validation_token.clone().unwrap();

        let signed = wf.commit_overlay(&req.id, &placement(), 1, None).unwrap();
        assert_eq!(signed.status, RequestStatus::Signed);
        assert!(signed.invariants_hold());
        let bytes = wf.blobs.get(signed.signed_document_ref.as_deref().unwrap()).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
        let page_id = *doc.get_pages().get(&2).unwrap();
        let content = String::from_utf8(doc.get_page_content(page_id).unwrap()).unwrap();
        // Viewer (50,50,100,100) at 1:1 flips to y = 842 - 50 - 100.
        assert!(content.contains("q 100 0 0 100 50 692 cm"), "{content}");

        let first = wf.validate(&token).unwrap().unwrap();
        let stamped = first.validated_at.unwrap();
        let again = wf.validate(&token).unwrap().unwrap();
        assert_eq!(again.validated_at, Some(stamped));
        assert!(wf.validate("0-unknown").unwrap().is_none());
        assert!(wf.validate("").unwrap().is_none());
    }

    #[test]
    fn image_overlay_commit_needs_signature() {
        let (_dir, wf) = workflow();
        let req = wf
            .submit("a@b.c", "a.pdf", &pdf_with_pages(1), SignatureMethod::ImageOverlay, None)
            .unwrap();
        wf.approve(&req.id).unwrap();
        assert!(matches!(
            wf.commit_overlay(&req.id, &placement(), 0, None),
            Err(WorkflowError::InvalidInput(_))
        ));
        let signed = wf.commit_overlay(&req.id, &placement(), 0, Some(&png_source())).unwrap();
        assert_eq!(signed.status, RequestStatus::Signed);
        assert!(signed.validation_token.is_none());
    }

    #[test]
    fn failed_composite_leaves_record_untouched() {
        let (_dir, wf) = workflow();
        let req = wf
            .submit("a@b.c", "a.pdf", &pdf_with_pages(1), SignatureMethod::ImageOverlay, None)
            .unwrap();
        let approved = wf.approve(&req.id).unwrap();
        let garbage = ImageSource::Inline { hint: None, bytes: b"not an image".to_vec() };

        let err = wf.commit_overlay(&req.id, &placement(), 0, Some(&garbage)).unwrap_err();
        assert_eq!(err.code(), "image_decode_failed");
        let err = wf.commit_overlay(&req.id, &placement(), 5, Some(&png_source())).unwrap_err();
        assert_eq!(err.code(), "pdf_load_failed");
        assert_eq!(wf.get(&req.id).unwrap(), approved);
    }

    #[test]
    fn wet_ink_completes_with_scan_only() {
        let (_dir, wf) = workflow();
        let req = wf
            .submit("a@b.c", "a.pdf", &pdf_with_pages(1), SignatureMethod::PhysicalWetInk, None)
            .unwrap();
        wf.approve(&req.id).unwrap();
        assert!(matches!(
            wf.commit_overlay(&req.id, &placement(), 0, Some(&png_source())),
            Err(WorkflowError::InvalidInput(_))
        ));
        assert!(matches!(
            wf.complete_wet_ink(&req.id, b"scan.jpg"),
            Err(WorkflowError::Overlay(OverlayError::Load(_)))
        ));
        let signed = wf.complete_wet_ink(&req.id, &pdf_with_pages(3)).unwrap();
        assert_eq!(signed.status, RequestStatus::Signed);
        assert!(signed.signed_document_ref.is_some());
        assert!(matches!(
            wf.complete_wet_ink(&req.id, &pdf_with_pages(1)),
            Err(WorkflowError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn review_buckets_and_email_lookup() {
        let (_dir, wf) = workflow();
        let pdf = pdf_with_pages(1);
        let a = wf.submit("x@y.z", "a.pdf", &pdf, SignatureMethod::QrValidated, None).unwrap();
        let b = wf.submit("X@Y.Z", "b.pdf", &pdf, SignatureMethod::ImageOverlay, None).unwrap();
        let c = wf.submit("q@y.z", "c.pdf", &pdf, SignatureMethod::ImageOverlay, None).unwrap();
        wf.approve(&a.id).unwrap();
        wf.reject(&c.id, "no").unwrap();

        let buckets = wf.list_for_review().unwrap();
        assert_eq!(buckets.pending.len(), 1);
        assert_eq!(buckets.pending[0].id, b.id);
        assert_eq!(buckets.approved[0].id, a.id);
        assert_eq!(buckets.other[0].id, c.id);
        assert_eq!(wf.lookup_by_email("x@Y.z").unwrap().len(), 2);
        assert!(wf.lookup_by_email(" ").is_err());
    }

    /// Fails the next `failures_left` reads, limited to URLs ending in
    /// `only_suffix` when set.
    struct FlakyBlobs {
        inner: FsBlobStore,
        failures_left: Arc<AtomicUsize>,
        only_suffix: Option<&'static str>,
    }

    fn flaky_workflow(
        dir: &TempDir,
        only_suffix: Option<&'static str>,
    ) -> (Arc<AtomicUsize>, Workflow) {
        let failures = Arc::new(AtomicUsize::new(0));
        let blobs = FlakyBlobs {
            inner: FsBlobStore::open(dir.path().join("blobs"), std::time::Duration::from_secs(1))
                .unwrap(),
            failures_left: failures.clone(),
            only_suffix,
        };
        let wf = Workflow::new(
            Config {
                data_dir: dir.path().to_path_buf(),
                ..Config::default()
            },
            Box::new(blobs),
            Box::new(SqliteRequestStore::in_memory().unwrap()),
        );
        (failures, wf)
    }

    impl BlobStore for FlakyBlobs {
        fn put(&self, bytes: &[u8], content_type: &str) -> Result<String, WorkflowError> {
            self.inner.put(bytes, content_type)
        }

        fn get(&self, url: &str) -> Result<Vec<u8>, OverlayError> {
            let targeted = self.only_suffix.map_or(true, |suffix| url.ends_with(suffix));
            if targeted
                && self
                    .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(OverlayError::Fetch("connection reset".into()));
            }
            self.inner.get(url)
        }
    }

    #[test]
    fn document_fetch_is_retried_once() {
        let dir = tempdir().unwrap();
        let (failures, wf) = flaky_workflow(&dir, None);
        let req = wf
            .submit("a@b.c", "a.pdf", &pdf_with_pages(1), SignatureMethod::QrValidated, None)
            .unwrap();
        let approved = wf.approve(&req.id).unwrap();

        failures.store(2, Ordering::SeqCst);
        let err = wf.commit_overlay(&req.id, &placement(), 0, None).unwrap_err();
        assert!(err.is_fetch());
        assert_eq!(wf.get(&req.id).unwrap(), approved);

        failures.store(1, Ordering::SeqCst);
        let signed = wf.commit_overlay(&req.id, &placement(), 0, None).unwrap();
        assert_eq!(signed.status, RequestStatus::Signed);
    }

    #[test]
    fn remote_signature_fetch_is_retried_once() {
        let dir = tempdir().unwrap();
        let (failures, wf) = flaky_workflow(&dir, Some(".png"));
        let req = wf
            .submit("a@b.c", "a.pdf", &pdf_with_pages(1), SignatureMethod::ImageOverlay, None)
            .unwrap();
        let approved = wf.approve(&req.id).unwrap();
        let sig_url = wf.blobs.put(&png(10, 10, 255), "image/png").unwrap();
        let source = ImageSource::parse(&sig_url).unwrap();
        assert!(source.is_remote());

        failures.store(2, Ordering::SeqCst);
        let err = wf
            .commit_overlay(&req.id, &placement(), 0, Some(&source))
            .unwrap_err();
        assert_eq!(err.code(), "fetch_failed");
        assert_eq!(failures.load(Ordering::SeqCst), 0);
        assert_eq!(wf.get(&req.id).unwrap(), approved);

        failures.store(1, Ordering::SeqCst);
        let signed = wf
            .commit_overlay(&req.id, &placement(), 0, Some(&source))
            .unwrap();
        assert_eq!(signed.status, RequestStatus::Signed);
        assert_eq!(failures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unencodable_qr_keeps_request_pending() {
        let dir = tempdir().unwrap();
        let wf = Workflow::open(Config {
            data_dir: dir.path().to_path_buf(),
            validation_base_url: format!("https://sign.example/{}", "v".repeat(4000)),
            qr_size_px: 120,
            fetch_timeout_secs: 1,
        })
        .unwrap();
        let req = wf
            .submit("a@b.c", "a.pdf", &pdf_with_pages(1), SignatureMethod::QrValidated, None)
            .unwrap();

        let err = wf.approve(&req.id).unwrap_err();
        assert_eq!(err.code(), "qr_render_failed");
        assert_eq!(wf.get(&req.id).unwrap(), req);
    }
}
