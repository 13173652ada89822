#![forbid(unsafe_code)]

use std::env;

use crm_contracts::pagination::{
    total_pages_for, validate_page_size, PageRequest, PageResponse, PaginatedResult,
    PaginationState, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
use crm_contracts::ContractViolation;

pub fn default_page_size_from_env() -> u32 {
    env::var("CRM_DEFAULT_PAGE_SIZE")
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| (1..=MAX_PAGE_SIZE).contains(v))
        .unwrap_or(DEFAULT_PAGE_SIZE)
}

/// Page cursor over an arbitrary fetch function.
///
/// `total_pages` is always derived from the last total observed under the
/// *current* page size, so navigation never clamps against a page count
/// computed for a different size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginatedQueryController {
    current_page: u32,
    page_size: u32,
    last_total: Option<u64>,
}

impl PaginatedQueryController {
    pub fn new(page_size: u32) -> Result<Self, ContractViolation> {
        validate_page_size("paginated_query_controller.page_size", page_size)?;
        Ok(Self {
            current_page: 1,
            page_size,
            last_total: None,
        })
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn total_pages(&self) -> u32 {
        self.last_total
            .map(|total| total_pages_for(total, self.page_size))
            .unwrap_or(1)
    }

    pub fn state(&self) -> PaginationState {
        PaginationState {
            current_page: self.current_page,
            page_size: self.page_size,
            total_items: self.last_total.unwrap_or(0),
            total_pages: self.total_pages(),
        }
    }

    /// Whether any page total has been observed yet.
    pub fn has_result(&self) -> bool {
        self.last_total.is_some()
    }

    pub fn request(&self) -> PageRequest {
        PageRequest {
            page: self.current_page,
            page_size: self.page_size,
        }
    }

    /// Runs `fetcher` for the current cursor. Its error is returned untouched.
    pub fn fetch<T, E, F>(&mut self, mut fetcher: F) -> Result<PaginatedResult<T>, E>
    where
        F: FnMut(PageRequest) -> Result<PageResponse<T>, E>,
    {
        let request = self.request();
        let response = fetcher(request)?;
        Ok(self.apply(request, response))
    }

    /// Jumps to `page` and fetches it. Without a known total the first page
    /// is fetched once so the jump clamps against real bounds.
    pub fn fetch_page_at<T, E, F>(
        &mut self,
        page: i64,
        mut fetcher: F,
    ) -> Result<PaginatedResult<T>, E>
    where
        F: FnMut(PageRequest) -> Result<PageResponse<T>, E>,
    {
        if !self.has_result() {
            let first = self.fetch(&mut fetcher)?;
            if page <= 1 {
                return Ok(first);
            }
        }
        self.go_to_page(page);
        self.fetch(fetcher)
    }

    /// Folds a response for `request` into the cursor.
    ///
    /// A response requested under a different page size is returned to the
    /// caller but leaves the remembered total alone.
    pub fn apply<T>(
        &mut self,
        request: PageRequest,
        response: PageResponse<T>,
    ) -> PaginatedResult<T> {
        let page_size = request.page_size.max(1);
        let total_pages = total_pages_for(response.total, page_size);
        if page_size == self.page_size {
            self.last_total = Some(response.total);
            self.current_page = self.current_page.clamp(1, self.total_pages());
        } else {
            tracing::debug!(
                requested_page_size = page_size,
                current_page_size = self.page_size,
                "discarding stale page total"
            );
        }
        PaginatedResult {
            data: response.data,
            pagination: PaginationState {
                current_page: request.page.clamp(1, total_pages),
                page_size,
                total_items: response.total,
                total_pages,
            },
        }
    }

    pub fn go_to_page(&mut self, page: i64) {
        let last = i64::from(self.total_pages());
        self.current_page = page.clamp(1, last) as u32;
    }

    pub fn next_page(&mut self) {
        if self.current_page < self.total_pages() {
            self.current_page += 1;
        }
    }

    pub fn prev_page(&mut self) {
        if self.current_page > 1 {
            self.current_page -= 1;
        }
    }

    pub fn set_page_size(&mut self, page_size: u32) -> Result<(), ContractViolation> {
        validate_page_size("paginated_query_controller.page_size", page_size)?;
        self.page_size = page_size;
        self.current_page = 1;
        Ok(())
    }
}
