//! Open-document state.
//!
//! Every open or change produces a new [`DocumentSnapshot`] with a
//! server-assigned revision. Revisions increase strictly across the whole
//! store, so a revision never repeats even after a document is closed and
//! reopened. The entity index is built lazily once per revision.

use std::cell::OnceCell;
use std::collections::HashMap;
use std::path::PathBuf;

use blockyard_core::{DocumentSnapshot, EntityIndex, Vocabulary};

/// One open document at its latest revision.
#[derive(Debug)]
pub struct OpenDocument {
    /// File system path for this document.
    pub path: PathBuf,
    /// Editor-reported version number.
    pub version: i32,
    /// Directory holding the root marker, if one was found.
    pub root: Option<PathBuf>,
    snapshot: DocumentSnapshot,
    index: OnceCell<EntityIndex>,
}

impl OpenDocument {
    pub fn snapshot(&self) -> &DocumentSnapshot {
        &self.snapshot
    }

    pub fn revision(&self) -> u64 {
        self.snapshot.revision()
    }
}

#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: HashMap<String, OpenDocument>,
    vocabulary: Vocabulary,
    last_revision: u64,
}

impl DocumentStore {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self {
            vocabulary,
            ..Default::default()
        }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    fn next_revision(&mut self) -> u64 {
        self.last_revision += 1;
        self.last_revision
    }

    /// Track a newly opened document and return its revision.
    pub fn open(
        &mut self,
        uri: &str,
        path: PathBuf,
        version: i32,
        text: &str,
        root: Option<PathBuf>,
    ) -> u64 {
        let revision = self.next_revision();
        self.documents.insert(
            uri.to_owned(),
            OpenDocument {
                path,
                version,
                root,
                snapshot: DocumentSnapshot::new(text, revision),
                index: OnceCell::new(),
            },
        );
        revision
    }

    /// Replace the content of an open document. `None` if it is not open.
    pub fn change(&mut self, uri: &str, version: i32, text: &str) -> Option<u64> {
        if !self.documents.contains_key(uri) {
            return None;
        }
        let revision = self.next_revision();
        let doc = self.documents.get_mut(uri)?;
        doc.version = version;
        doc.snapshot = DocumentSnapshot::new(text, revision);
        doc.index = OnceCell::new();
        Some(revision)
    }

    /// Stop tracking a document, dropping its cached index.
    pub fn close(&mut self, uri: &str) -> Option<OpenDocument> {
        self.documents.remove(uri)
    }

    pub fn get(&self, uri: &str) -> Option<&OpenDocument> {
        self.documents.get(uri)
    }

    /// The entity index for the document's current revision.
    pub fn index(&self, uri: &str) -> Option<&EntityIndex> {
        let doc = self.documents.get(uri)?;
        Some(
            doc.index
                .get_or_init(|| EntityIndex::build_with(&doc.snapshot, &self.vocabulary)),
        )
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
