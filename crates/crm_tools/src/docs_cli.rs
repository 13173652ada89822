#![forbid(unsafe_code)]

use crm_contracts::documents::CollectionId;
use crm_contracts::pagination::MAX_PAGE_SIZE;
use crm_engines::document_store::DocumentStore;
use crm_os::access_gate::AccessGate;
use crm_os::collection_pages::CollectionPageFetcher;
use crm_os::pagination::PaginatedQueryController;
use crm_storage::KeyValueStore;

pub const DOCS_USAGE: &str = "usage: crm docs <collection_id> [page] [page_size]";

/// Prints one JSON document per line followed by a page footer.
pub fn execute_docs_command<S, P>(
    gate: &AccessGate<S, P>,
    collection_id: Option<&str>,
    page: Option<&str>,
    page_size: Option<&str>,
    default_page_size: u32,
) -> Result<String, String>
where
    S: DocumentStore,
    P: KeyValueStore,
{
    if !gate.is_authorized() {
        return Err("access gate is locked. run: crm gate verify".to_string());
    }
    let collection_id = collection_id.ok_or_else(|| DOCS_USAGE.to_string())?;
    let collection_id = CollectionId::new(collection_id).map_err(|e| e.to_string())?;
    let page = match page {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("invalid page: {raw}"))?,
        None => 1,
    };
    let page_size = match page_size {
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|v| (1..=MAX_PAGE_SIZE).contains(v))
            .ok_or_else(|| format!("invalid page_size: {raw}. expected 1..={MAX_PAGE_SIZE}"))?,
        None => default_page_size,
    };

    let mut pager = PaginatedQueryController::new(page_size).map_err(|e| e.to_string())?;
    let fetcher = CollectionPageFetcher::new(
        gate.document_store(),
        gate.config().database_id.clone(),
        collection_id,
    );
    let result = pager
        .fetch_page_at(page, |r| fetcher.fetch_page(r))
        .map_err(|e| e.to_string())?;

    let mut lines = Vec::with_capacity(result.data.len() + 1);
    for doc in &result.data {
        lines.push(serde_json::to_string(doc).map_err(|e| e.to_string())?);
    }
    lines.push(format!(
        "page {}/{} (total {})",
        result.pagination.current_page, result.pagination.total_pages, result.pagination.total_items
    ));
    Ok(lines.join("\n"))
}
