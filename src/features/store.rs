//! Capability seams to the backend: blobs (documents, signature images) and
//! request records.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlite::{ConnectionThreadSafe, State, Statement};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::parse_file_uri_path;
use crate::error::{OverlayError, WorkflowError};
use crate::features::requests::{RequestUpdate, SignatureRequest};

pub trait BlobStore: Send + Sync {
    fn put(&self, bytes: &[u8], content_type: &str) -> Result<String, WorkflowError>;
    fn get(&self, url: &str) -> Result<Vec<u8>, OverlayError>;
}

pub trait RequestStore: Send + Sync {
    fn insert(&self, request: &SignatureRequest) -> Result<(), WorkflowError>;
    fn get(&self, id: &str) -> Result<Option<SignatureRequest>, WorkflowError>;
    fn update(&self, id: &str, fields: &RequestUpdate) -> Result<(), WorkflowError>;
    /// Newest first.
    fn list_all(&self) -> Result<Vec<SignatureRequest>, WorkflowError>;
    /// Case-insensitive, newest first.
    fn find_by_email(&self, email: &str) -> Result<Vec<SignatureRequest>, WorkflowError>;
    fn find_by_token(&self, token: &str) -> Result<Option<SignatureRequest>, WorkflowError>;
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "application/pdf" => "pdf",
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        _ => "bin",
    }
}

/// Blobs as files under one directory, addressed by `file://` URLs.
/// `http(s)` URLs are fetched, so records may also point at hosted files.
pub struct FsBlobStore {
    root: PathBuf,
    http: reqwest::blocking::Client,
}

impl FsBlobStore {
    pub fn open(root: PathBuf, fetch_timeout: Duration) -> Result<Self, WorkflowError> {
        fs::create_dir_all(&root)
            .map_err(|e| WorkflowError::Persistence(format!("blob_dir_create_failed:{e}")))?;
        let http = reqwest::blocking::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| WorkflowError::Persistence(format!("http_client_failed:{e}")))?;
        Ok(Self { root, http })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn fetch_remote(&self, url: &str) -> Result<Vec<u8>, OverlayError> {
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|e| OverlayError::Fetch(format!("{url}:{e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(OverlayError::Fetch(format!("{url}:http_{}", status.as_u16())));
        }
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| OverlayError::Fetch(format!("{url}:{e}")))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, bytes: &[u8], content_type: &str) -> Result<String, WorkflowError> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let name = format!(
            "{millis}-{}.{}",
            uuid::Uuid::new_v4().simple(),
            extension_for(content_type)
        );
        let target = self.root.join(name);

        // Written to a temp file first so a reader never sees half a blob.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)
            .map_err(|e| WorkflowError::Persistence(format!("blob_tmp_failed:{e}")))?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.flush())
            .map_err(|e| WorkflowError::Persistence(format!("blob_write_failed:{e}")))?;
        tmp.persist(&target)
            .map_err(|e| WorkflowError::Persistence(format!("blob_persist_failed:{e}")))?;

        log::debug!("stored {} bytes as {}", bytes.len(), target.display());
        Ok(format!("file://{}", target.display()))
    }

    fn get(&self, url: &str) -> Result<Vec<u8>, OverlayError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return self.fetch_remote(url);
        }
        let path = parse_file_uri_path(url)
            .ok_or_else(|| OverlayError::Fetch(format!("unsupported_blob_url:{url}")))?;
        fs::read(&path).map_err(|e| OverlayError::Fetch(format!("{}:{e}", path.display())))
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS signature_requests (
    id TEXT PRIMARY KEY NOT NULL,
    email TEXT NOT NULL,
    document_name TEXT NOT NULL,
    document_ref TEXT NOT NULL,
    method TEXT NOT NULL,
    status TEXT NOT NULL,
    message TEXT,
    rejection_reason TEXT,
    validation_token TEXT UNIQUE,
    overlay_image_ref TEXT,
    signed_document_ref TEXT,
    created_at TEXT NOT NULL,
    approved_at TEXT,
    rejected_at TEXT,
    signed_at TEXT,
    validated_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_requests_email ON signature_requests (lower(email));
";

const COLUMNS: &str = "id, email, document_name, document_ref, method, status, message, \
rejection_reason, validation_token, overlay_image_ref, signed_document_ref, created_at, \
approved_at, rejected_at, signed_at, validated_at";

fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, WorkflowError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| WorkflowError::Persistence(format!("bad_timestamp:{raw}:{e}")))
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, WorkflowError> {
    raw.as_deref().map(parse_ts).transpose()
}

fn read_row(stmt: &Statement) -> Result<SignatureRequest, WorkflowError> {
    let method: String = stmt.read("method")?;
    let status: String = stmt.read("status")?;
    let created_at: String = stmt.read("created_at")?;
    Ok(SignatureRequest {
        id: stmt.read("id")?,
        email: stmt.read("email")?,
        document_name: stmt.read("document_name")?,
        document_ref: stmt.read("document_ref")?,
        method: method.parse().map_err(WorkflowError::Persistence)?,
        status: status.parse().map_err(WorkflowError::Persistence)?,
        message: stmt.read("message")?,
        rejection_reason: stmt.read("rejection_reason")?,
        validation_token: stmt.read("validation_token")?,
        overlay_image_ref: stmt.read("overlay_image_ref")?,
        signed_document_ref: stmt.read("signed_document_ref")?,
        created_at: parse_ts(&created_at)?,
        approved_at: parse_opt_ts(stmt.read("approved_at")?)?,
        rejected_at: parse_opt_ts(stmt.read("rejected_at")?)?,
        signed_at: parse_opt_ts(stmt.read("signed_at")?)?,
        validated_at: parse_opt_ts(stmt.read("validated_at")?)?,
    })
}

fn collect_rows(mut stmt: Statement) -> Result<Vec<SignatureRequest>, WorkflowError> {
    let mut out = Vec::new();
    while let State::Row = stmt.next()? {
        out.push(read_row(&stmt)?);
    }
    Ok(out)
}

pub struct SqliteRequestStore {
    conn: Mutex<ConnectionThreadSafe>,
}

impl SqliteRequestStore {
    pub fn open(path: &std::path::Path) -> Result<Self, WorkflowError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| WorkflowError::Persistence(format!("db_dir_create_failed:{e}")))?;
        }
        Self::init(sqlite::Connection::open_thread_safe(path)?)
    }

    pub fn in_memory() -> Result<Self, WorkflowError> {
        Self::init(sqlite::Connection::open_thread_safe(":memory:")?)
    }

    fn init(conn: ConnectionThreadSafe) -> Result<Self, WorkflowError> {
        conn.execute(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, ConnectionThreadSafe> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl RequestStore for SqliteRequestStore {
    fn insert(&self, r: &SignatureRequest) -> Result<(), WorkflowError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(format!(
            "INSERT INTO signature_requests ({COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))?;
        let created_at = ts(&r.created_at);
        let approved_at = r.approved_at.as_ref().map(ts);
        let rejected_at = r.rejected_at.as_ref().map(ts);
        let signed_at = r.signed_at.as_ref().map(ts);
        let validated_at = r.validated_at.as_ref().map(ts);
        stmt.bind((1, r.id.as_str()))?;
        stmt.bind((2, r.email.as_str()))?;
        stmt.bind((3, r.document_name.as_str()))?;
        stmt.bind((4, r.document_ref.as_str()))?;
        stmt.bind((5, r.method.as_str()))?;
        stmt.bind((6, r.status.as_str()))?;
        stmt.bind((7, r.message.as_deref()))?;
        stmt.bind((8, r.rejection_reason.as_deref()))?;
        stmt.bind((9, r.validation_token.as_deref()))?;
        stmt.bind((10, r.overlay_image_ref.as_deref()))?;
        stmt.bind((11, r.signed_document_ref.as_deref()))?;
        stmt.bind((12, created_at.as_str()))?;
        stmt.bind((13, approved_at.as_deref()))?;
        stmt.bind((14, rejected_at.as_deref()))?;
        stmt.bind((15, signed_at.as_deref()))?;
        stmt.bind((16, validated_at.as_deref()))?;
        while let State::Row = stmt.next()? {}
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<SignatureRequest>, WorkflowError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare(format!("SELECT {COLUMNS} FROM signature_requests WHERE id = ?"))?;
        stmt.bind((1, id))?;
        Ok(collect_rows(stmt)?.into_iter().next())
    }

    fn update(&self, id: &str, fields: &RequestUpdate) -> Result<(), WorkflowError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut columns: Vec<&'static str> = Vec::new();
        let mut values: Vec<String> = Vec::new();
        let mut push = |column: &'static str, value: Option<String>| {
            if let Some(v) = value {
                columns.push(column);
                values.push(v);
            }
        };
        push("status", fields.status.map(|s| s.as_str().to_string()));
        push("rejection_reason", fields.rejection_reason.clone());
        push("validation_token", fields.validation_token.clone());
        push("overlay_image_ref", fields.overlay_image_ref.clone());
        push("signed_document_ref", fields.signed_document_ref.clone());
        push("approved_at", fields.approved_at.as_ref().map(ts));
        push("rejected_at", fields.rejected_at.as_ref().map(ts));
        push("signed_at", fields.signed_at.as_ref().map(ts));
        push("validated_at", fields.validated_at.as_ref().map(ts));

        let assignments = columns
            .iter()
            .map(|c| format!("{c} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let conn = self.conn();
        let mut stmt = conn.prepare(format!(
            "UPDATE signature_requests SET {assignments} WHERE id = ?"
        ))?;
        for (idx, value) in values.iter().enumerate() {
            stmt.bind((idx + 1, value.as_str()))?;
        }
        stmt.bind((values.len() + 1, id))?;
        while let State::Row = stmt.next()? {}
        drop(stmt);

        if conn.change_count() == 0 {
            return Err(WorkflowError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<SignatureRequest>, WorkflowError> {
        let conn = self.conn();
        let stmt = conn.prepare(format!(
            "SELECT {COLUMNS} FROM signature_requests ORDER BY created_at DESC, rowid DESC"
        ))?;
        collect_rows(stmt)
    }

    fn find_by_email(&self, email: &str) -> Result<Vec<SignatureRequest>, WorkflowError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(format!(
            "SELECT {COLUMNS} FROM signature_requests WHERE lower(email) = lower(?) \
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        stmt.bind((1, email.trim()))?;
        collect_rows(stmt)
    }

    fn find_by_token(&self, token: &str) -> Result<Option<SignatureRequest>, WorkflowError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(format!(
            "SELECT {COLUMNS} FROM signature_requests WHERE validation_token = ?"
        ))?;
        stmt.bind((1, token))?;
        Ok(collect_rows(stmt)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::requests::{RequestStatus, SignatureMethod};
    use tempfile::tempdir;

    fn request(email: &str) -> SignatureRequest {
        SignatureRequest::new_pending(
            email,
            "contract.pdf",
            "file:///tmp/contract.pdf",
            SignatureMethod::QrValidated,
            Some("before friday".into()),
        )
    }

    #[test]
    fn blob_put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::open(dir.path().join("blobs"), Duration::from_secs(1)).unwrap();
        let url = store.put(b"%PDF-1.5 body", "application/pdf").unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with(".pdf"));
        assert_eq!(store.get(&url).unwrap(), b"%PDF-1.5 body");
    }

    #[test]
    fn blob_get_missing_is_fetch_error() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::open(dir.path().to_path_buf(), Duration::from_secs(1)).unwrap();
        let missing = format!("file://{}/nope.pdf", dir.path().display());
        assert!(matches!(store.get(&missing), Err(OverlayError::Fetch(_))));
        assert!(matches!(store.get("ftp://x"), Err(OverlayError::Fetch(_))));
    }

    #[test]
    fn insert_get_and_update() {
        let store = SqliteRequestStore::in_memory().unwrap();
        let req = request("Someone@Example.com");
        store.insert(&req).unwrap();

        let loaded = store.get(&req.id).unwrap().expect("row exists");
        assert_eq!(loaded.email, "Someone@Example.com");
        assert_eq!(loaded.message.as_deref(), Some("before friday"));
        assert_eq!(loaded.status, RequestStatus::Pending);
        assert_eq!(loaded.created_at, req.created_at);

        let now = Utc::now();
        store
            .update(
                &req.id,
                &RequestUpdate {
                    status: Some(RequestStatus::Approved),
                    validation_token: Some("123-abc".into()),
                    overlay_image_ref: Some("data:image/png;base64,AA==".into()),
                    approved_at: Some(now),
                    ..RequestUpdate::default()
                },
            )
            .unwrap();
        let loaded = store.find_by_token("123-abc").unwrap().expect("token lookup");
        assert_eq!(loaded.status, RequestStatus::Approved);
        assert!(loaded.approved_at.is_some());
        assert!(store.find_by_token("nope").unwrap().is_none());
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let store = SqliteRequestStore::in_memory().unwrap();
        let err = store
            .update(
                "missing",
                &RequestUpdate {
                    status: Some(RequestStatus::Rejected),
                    ..RequestUpdate::default()
                },
            )
            .unwrap_err();
        assert_eq!(err, WorkflowError::NotFound("missing".into()));
    }

    #[test]
    fn email_lookup_is_case_insensitive_and_newest_first() {
        let dir = tempdir().unwrap();
        let store = SqliteRequestStore::open(&dir.path().join("db/requests.sqlite")).unwrap();
        let mut older = request("a@example.com");
        older.created_at = Utc::now() - chrono::Duration::hours(1);
        let newer = request("A@Example.com");
        store.insert(&older).unwrap();
        store.insert(&newer).unwrap();
        store.insert(&request("b@example.com")).unwrap();

        let found = store.find_by_email("  a@EXAMPLE.com ").unwrap();
        let ids: Vec<&str> = found.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);
        assert_eq!(store.list_all().unwrap().len(), 3);
    }
}
