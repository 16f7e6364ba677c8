//! View-model for the browser client.
//!
//! The client is pure presentation; the only behavior worth pinning down is
//! how it derives what to render: display names from URLs, preview kinds
//! from extensions, and the search-filtered file list. That logic lives
//! here, detached from any rendering.

use crate::models::record::DriveRecord;

/// What a file preview should render as, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewKind {
    Image,
    Video,
    Document,
    Generic,
}

impl PreviewKind {
    pub fn classify(file_name: &str) -> Self {
        let extension = file_name
            .rsplit('.')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        match extension.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" => PreviewKind::Image,
            "mp4" | "webm" | "avi" | "mov" => PreviewKind::Video,
            "pdf" | "doc" | "docx" | "txt" => PreviewKind::Document,
            _ => PreviewKind::Generic,
        }
    }
}

/// Display name for a stored file: the last path segment of its URL.
pub fn display_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Client-side state: the fetched file list, the pending selection, the
/// coarse upload progress, the last error, and the free-text search term.
#[derive(Debug, Default, Clone)]
pub struct DriveView {
    entries: Vec<DriveRecord>,
    selected: Vec<String>,
    uploading: bool,
    progress: u8,
    error: Option<String>,
    search_term: String,
}

impl DriveView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the file list wholesale with freshly fetched server state;
    /// new records are never merged in optimistically.
    pub fn set_entries(&mut self, entries: Vec<DriveRecord>) {
        self.entries = entries;
    }

    pub fn entries(&self) -> &[DriveRecord] {
        &self.entries
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
    }

    /// Files chosen in the picker but not yet uploaded.
    pub fn select_files(&mut self, names: Vec<String>) {
        self.selected = names;
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn begin_upload(&mut self) {
        self.uploading = true;
        self.progress = 0;
        self.error = None;
    }

    pub fn set_progress(&mut self, percent: u8) {
        self.progress = percent.min(100);
    }

    /// Upload finished; the caller re-fetches the list and hands it in.
    pub fn complete_upload(&mut self, entries: Vec<DriveRecord>) {
        self.uploading = false;
        self.progress = 100;
        self.selected.clear();
        self.entries = entries;
    }

    pub fn fail_upload(&mut self, message: impl Into<String>) {
        self.uploading = false;
        self.error = Some(message.into());
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// The server's error message, surfaced verbatim.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Case-insensitive substring match of the search term against each
    /// file's display name. An empty term matches everything.
    pub fn filtered(&self) -> Vec<&DriveRecord> {
        let term = self.search_term.to_lowercase();
        self.entries
            .iter()
            .filter(|record| display_name(&record.url).to_lowercase().contains(&term))
            .collect()
    }
}
