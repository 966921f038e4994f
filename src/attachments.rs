use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;

use crate::chat::AttachmentMeta;
use crate::logger;

const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png"];
const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const ALLOWED_DOCUMENT_TYPES: &[&str] = &["application/pdf"];
const ALLOWED_DOCUMENT_EXTENSIONS: &[&str] = &["pdf"];

/// A user-selected file before it enters the batch.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Local, transient representation of a selected file pending send.
/// Never persisted; its display handle (if any) is owned by the manager.
#[derive(Debug, Clone)]
pub struct AttachmentPreview {
    pub id: String,
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    /// Display handle created by the preview store. Present for images
    /// only; must be released exactly once.
    pub url: Option<String>,
}

/// The attachment descriptor plus payload handed to the controller at
/// send time. The meta is a copy, decoupled from the preview lifecycle.
#[derive(Debug, Clone)]
pub struct OutgoingAttachment {
    pub meta: AttachmentMeta,
    pub bytes: Vec<u8>,
}

/// Creates and releases local display handles for image previews. The
/// implementation must refuse to release handles it did not create, so a
/// server-provided URL can never be revoked by mistake.
pub trait PreviewStore: Send + Sync {
    fn create(&self, name: &str, bytes: &[u8]) -> Result<String>;
    fn release(&self, url: &str);
}

/// Writes preview files under `~/.consulta/previews` and tracks every
/// handle it handed out in a ledger, giving exactly-once release.
pub struct FsPreviewStore {
    dir: PathBuf,
    ledger: Mutex<HashSet<String>>,
}

impl FsPreviewStore {
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("could not find home directory"))?;
        Self::at_dir(home.join(".consulta").join("previews"))
    }

    pub fn at_dir(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            ledger: Mutex::new(HashSet::new()),
        })
    }
}

impl PreviewStore for FsPreviewStore {
    fn create(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let file_name = format!("{}-{}", Utc::now().timestamp_millis(), name);
        let path = self.dir.join(&file_name);
        fs::write(&path, bytes)?;
        let url = path.to_string_lossy().into_owned();
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.insert(url.clone());
        }
        Ok(url)
    }

    fn release(&self, url: &str) {
        let owned = match self.ledger.lock() {
            Ok(mut ledger) => ledger.remove(url),
            Err(_) => false,
        };
        // Not in the ledger means either already released or never ours.
        if owned {
            let _ = fs::remove_file(url);
        }
    }
}

/// Owns the pending attachment batches for the composer. Images and
/// documents are kept apart; at most one attachment accompanies an
/// outgoing message, image batch first.
pub struct AttachmentManager {
    store: Arc<dyn PreviewStore>,
    images: Vec<AttachmentPreview>,
    documents: Vec<AttachmentPreview>,
}

impl AttachmentManager {
    pub fn new(store: Arc<dyn PreviewStore>) -> Self {
        Self {
            store,
            images: Vec::new(),
            documents: Vec::new(),
        }
    }

    pub fn images(&self) -> &[AttachmentPreview] {
        &self.images
    }

    pub fn documents(&self) -> &[AttachmentPreview] {
        &self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.documents.is_empty()
    }

    /// Filters to JPEG/PNG (MIME first, extension fallback), creating one
    /// display handle per accepted file. Anything else is dropped without
    /// a preview; invalid files never enter the batch.
    pub fn select_images(&mut self, files: Vec<LocalFile>) -> Vec<AttachmentPreview> {
        let batch_stamp = Utc::now().timestamp_millis();
        let mut accepted = Vec::new();

        for (index, file) in files.into_iter().enumerate() {
            if !type_allowed(&file, ALLOWED_IMAGE_TYPES, ALLOWED_IMAGE_EXTENSIONS) {
                continue;
            }
            let url = match self.store.create(&file.name, &file.bytes) {
                Ok(url) => url,
                Err(e) => {
                    logger::warn(&format!("preview handle for {} failed: {}", file.name, e));
                    continue;
                }
            };
            let preview = AttachmentPreview {
                id: preview_id(&file.name, batch_stamp, index),
                content_type: effective_type(&file, "image/png"),
                name: file.name,
                bytes: file.bytes,
                url: Some(url),
            };
            accepted.push(preview.clone());
            self.images.push(preview);
        }

        accepted
    }

    /// Same selection pattern for documents (PDF), without a display
    /// handle.
    pub fn select_documents(&mut self, files: Vec<LocalFile>) -> Vec<AttachmentPreview> {
        let batch_stamp = Utc::now().timestamp_millis();
        let mut accepted = Vec::new();

        for (index, file) in files.into_iter().enumerate() {
            if !type_allowed(&file, ALLOWED_DOCUMENT_TYPES, ALLOWED_DOCUMENT_EXTENSIONS) {
                continue;
            }
            let preview = AttachmentPreview {
                id: preview_id(&file.name, batch_stamp, index),
                content_type: effective_type(&file, "application/pdf"),
                name: file.name,
                bytes: file.bytes,
                url: None,
            };
            accepted.push(preview.clone());
            self.documents.push(preview);
        }

        accepted
    }

    /// Removes one preview and releases its handle. Already-removed ids
    /// are a no-op; there is no double release.
    pub fn remove(&mut self, id: &str) {
        if let Some(pos) = self.images.iter().position(|p| p.id == id) {
            let preview = self.images.remove(pos);
            if let Some(url) = preview.url {
                self.store.release(&url);
            }
            return;
        }
        if let Some(pos) = self.documents.iter().position(|p| p.id == id) {
            self.documents.remove(pos);
        }
    }

    /// Releases every handle and empties both batches. Called after a
    /// successful send and on teardown.
    pub fn clear_batch(&mut self) {
        for preview in self.images.drain(..) {
            if let Some(url) = preview.url {
                self.store.release(&url);
            }
        }
        self.documents.clear();
    }

    /// The single attachment that would accompany the next message: first
    /// image if any, otherwise first document. The returned meta is a
    /// copy; the preview and its handle stay in the batch until
    /// `clear_batch`.
    pub fn first_outgoing(&self) -> Option<OutgoingAttachment> {
        let preview = self.images.first().or_else(|| self.documents.first())?;
        Some(OutgoingAttachment {
            meta: AttachmentMeta {
                name: preview.name.clone(),
                content_type: preview.content_type.clone(),
                size: preview.bytes.len() as u64,
                url: preview.url.clone(),
            },
            bytes: preview.bytes.clone(),
        })
    }
}

impl Drop for AttachmentManager {
    fn drop(&mut self) {
        self.clear_batch();
    }
}

fn preview_id(name: &str, batch_stamp: i64, index: usize) -> String {
    format!("{}-{}-{}", name, batch_stamp, index)
}

fn type_allowed(file: &LocalFile, mime_types: &[&str], extensions: &[&str]) -> bool {
    if let Some(content_type) = &file.content_type {
        if mime_types.iter().any(|t| t.eq_ignore_ascii_case(content_type)) {
            return true;
        }
    }
    // Extension fallback for files selected without a MIME type.
    file.name
        .rsplit('.')
        .next()
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn effective_type(file: &LocalFile, fallback: &str) -> String {
    match &file.content_type {
        Some(content_type) => content_type.clone(),
        None => match file.name.rsplit('.').next() {
            Some(ext) if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") => {
                "image/jpeg".to_string()
            }
            Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png".to_string(),
            Some(ext) if ext.eq_ignore_ascii_case("pdf") => "application/pdf".to_string(),
            _ => fallback.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory preview store counting create/release calls.
    struct RecordingStore {
        created: AtomicUsize,
        released: AtomicUsize,
        ledger: Mutex<HashSet<String>>,
    }

    impl RecordingStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                created: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
                ledger: Mutex::new(HashSet::new()),
            })
        }
    }

    impl PreviewStore for RecordingStore {
        fn create(&self, name: &str, _bytes: &[u8]) -> Result<String> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            let url = format!("preview://{}-{}", name, n);
            self.ledger.lock().unwrap().insert(url.clone());
            Ok(url)
        }

        fn release(&self, url: &str) {
            if self.ledger.lock().unwrap().remove(url) {
                self.released.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn png(name: &str) -> LocalFile {
        LocalFile {
            name: name.to_string(),
            content_type: Some("image/png".to_string()),
            bytes: vec![1, 2, 3],
        }
    }

    #[test]
    fn select_then_remove_releases_exactly_once() {
        let store = RecordingStore::new();
        let mut manager = AttachmentManager::new(store.clone());

        let accepted = manager.select_images(vec![png("fileA.png")]);
        assert_eq!(accepted.len(), 1);
        assert!(accepted[0].url.is_some());
        assert_eq!(store.created.load(Ordering::SeqCst), 1);

        let id = accepted[0].id.clone();
        manager.remove(&id);
        assert!(manager.images().is_empty());
        assert_eq!(store.released.load(Ordering::SeqCst), 1);

        // Second remove is a no-op, no double release.
        manager.remove(&id);
        assert_eq!(store.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disallowed_files_are_dropped_silently() {
        let store = RecordingStore::new();
        let mut manager = AttachmentManager::new(store.clone());

        let accepted = manager.select_images(vec![
            png("ok.png"),
            LocalFile {
                name: "virus.exe".to_string(),
                content_type: Some("application/octet-stream".to_string()),
                bytes: vec![0],
            },
            LocalFile {
                name: "notes.gif".to_string(),
                content_type: None,
                bytes: vec![0],
            },
        ]);

        assert_eq!(accepted.len(), 1);
        assert_eq!(manager.images().len(), 1);
        assert_eq!(store.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn extension_fallback_accepts_untyped_jpeg() {
        let store = RecordingStore::new();
        let mut manager = AttachmentManager::new(store);

        let accepted = manager.select_images(vec![LocalFile {
            name: "radiografia.JPEG".to_string(),
            content_type: None,
            bytes: vec![9],
        }]);

        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].content_type, "image/jpeg");
    }

    #[test]
    fn documents_get_no_display_handle() {
        let store = RecordingStore::new();
        let mut manager = AttachmentManager::new(store.clone());

        let accepted = manager.select_documents(vec![LocalFile {
            name: "informe.pdf".to_string(),
            content_type: Some("application/pdf".to_string()),
            bytes: vec![5; 10],
        }]);

        assert_eq!(accepted.len(), 1);
        assert!(accepted[0].url.is_none());
        assert_eq!(store.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn image_takes_precedence_over_document() {
        let store = RecordingStore::new();
        let mut manager = AttachmentManager::new(store);

        manager.select_documents(vec![LocalFile {
            name: "informe.pdf".to_string(),
            content_type: Some("application/pdf".to_string()),
            bytes: vec![1],
        }]);
        manager.select_images(vec![png("foto.png")]);

        let outgoing = manager.first_outgoing().unwrap();
        assert_eq!(outgoing.meta.name, "foto.png");
        assert_eq!(outgoing.meta.size, 3);
    }

    #[test]
    fn clear_batch_releases_everything() {
        let store = RecordingStore::new();
        let mut manager = AttachmentManager::new(store.clone());

        manager.select_images(vec![png("a.png"), png("b.png")]);
        manager.select_documents(vec![LocalFile {
            name: "c.pdf".to_string(),
            content_type: None,
            bytes: vec![1],
        }]);

        manager.clear_batch();
        assert!(manager.is_empty());
        assert_eq!(store.released.load(Ordering::SeqCst), 2);

        // Drop after an explicit clear must not release again.
        drop(manager);
        assert_eq!(store.released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn batch_ids_are_distinct_for_same_name() {
        let store = RecordingStore::new();
        let mut manager = AttachmentManager::new(store);

        let accepted = manager.select_images(vec![png("same.png"), png("same.png")]);
        assert_eq!(accepted.len(), 2);
        assert_ne!(accepted[0].id, accepted[1].id);
    }

    #[test]
    fn fs_store_refuses_foreign_urls() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPreviewStore::at_dir(dir.path().to_path_buf()).unwrap();

        let url = store.create("x.png", &[1, 2]).unwrap();
        assert!(std::path::Path::new(&url).exists());

        // A server URL was never created by this store; releasing it is
        // a no-op.
        store.release("https://server.example/files/x.png");

        store.release(&url);
        assert!(!std::path::Path::new(&url).exists());
    }
}
