//! File attachment detection on mapped records.

use archivesync_types::MessageRecord;

/// Inspects a freshly mapped record before it is merged.
pub trait AttachmentProcessor: Send + Sync {
    fn process(&self, record: &mut MessageRecord);
}

/// Leaves records untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAttachments;

impl AttachmentProcessor for NoAttachments {
    fn process(&self, _record: &mut MessageRecord) {}
}

/// Marks records whose whole body is a link to a file with a known extension.
#[derive(Debug, Clone)]
pub struct LinkAttachmentDetector {
    extensions: Vec<String>,
}

const DEFAULT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "mp4", "webm", "mp3", "ogg", "m4a", "pdf", "zip",
];

impl LinkAttachmentDetector {
    pub fn new(extensions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.into().to_lowercase())
                .collect(),
        }
    }

    fn file_link<'a>(&self, text: &'a str) -> Option<&'a str> {
        let text = text.trim();
        if text.contains(char::is_whitespace) {
            return None;
        }
        if !(text.starts_with("https://") || text.starts_with("http://")) {
            return None;
        }
        let path = text.split(['?', '#']).next().unwrap_or(text);
        let (_, ext) = path.rsplit_once('.')?;
        let ext = ext.to_lowercase();
        self.extensions.iter().any(|e| *e == ext).then_some(text)
    }
}

impl Default for LinkAttachmentDetector {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().copied())
    }
}

impl AttachmentProcessor for LinkAttachmentDetector {
    fn process(&self, record: &mut MessageRecord) {
        if let Some(url) = self.file_link(&record.text) {
            record.attachment_url = Some(url.to_string());
        }
    }
}
