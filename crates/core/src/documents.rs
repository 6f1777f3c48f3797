//! Context-document lookup.

use async_trait::async_trait;
use pl_protocol::document_models::ContextDocument;
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Document store unavailable: {0}")]
    Unavailable(String),
}

/// Resolves document ids to full bodies.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// `Ok(None)` when no document has this id.
    async fn get(&self, id: &str) -> Result<Option<ContextDocument>, DocumentError>;
}

/// Document store backed by a map, typically filled from `.promptline/documents/`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    documents: HashMap<String, ContextDocument>,
}

impl InMemoryDocumentStore {
    pub fn new(documents: Vec<ContextDocument>) -> Self {
        Self {
            documents: documents
                .into_iter()
                .map(|doc| (doc.id.clone(), doc))
                .collect(),
        }
    }

    pub fn insert(&mut self, document: ContextDocument) {
        self.documents.insert(document.id.clone(), document);
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, id: &str) -> Result<Option<ContextDocument>, DocumentError> {
        Ok(self.documents.get(id).cloned())
    }
}

/// Look up each id in order, omitting documents that are missing or whose
/// lookup fails.
pub async fn resolve_documents(store: &dyn DocumentStore, ids: &[String]) -> Vec<ContextDocument> {
    let mut documents = Vec::with_capacity(ids.len());

    for id in ids {
        match store.get(id).await {
            Ok(Some(doc)) => documents.push(doc),
            Ok(None) => warn!(document_id = %id, "context document not found, omitting"),
            Err(e) => warn!(document_id = %id, error = %e, "context document unavailable, omitting"),
        }
    }

    documents
}
