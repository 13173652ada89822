#![forbid(unsafe_code)]

use crm_contracts::documents::{CollectionId, DatabaseId};
use crm_contracts::pagination::{PageRequest, PageResponse};
use crm_engines::document_store::{Document, DocumentQuery, DocumentStore, DocumentStoreError};

/// Maps a page cursor onto limit/offset queries against one collection.
#[derive(Debug)]
pub struct CollectionPageFetcher<'a, S: ?Sized> {
    store: &'a S,
    database_id: DatabaseId,
    collection_id: CollectionId,
    filters: Vec<DocumentQuery>,
}

impl<'a, S> CollectionPageFetcher<'a, S>
where
    S: DocumentStore + ?Sized,
{
    pub fn new(store: &'a S, database_id: DatabaseId, collection_id: CollectionId) -> Self {
        Self {
            store,
            database_id,
            collection_id,
            filters: Vec::new(),
        }
    }

    pub fn with_equal(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(DocumentQuery::equal(attribute, value));
        self
    }

    pub fn collection_id(&self) -> &CollectionId {
        &self.collection_id
    }

    pub fn fetch_page(
        &self,
        request: PageRequest,
    ) -> Result<PageResponse<Document>, DocumentStoreError> {
        let mut queries = self.filters.clone();
        queries.push(DocumentQuery::Limit(request.page_size));
        queries.push(DocumentQuery::Offset(request.offset()));
        let list = self
            .store
            .list_documents(&self.database_id, &self.collection_id, &queries)?;
        Ok(PageResponse {
            data: list.documents,
            total: list.total,
        })
    }
}
