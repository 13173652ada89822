#![forbid(unsafe_code)]

use crate::{ContractViolation, Validate};

pub const DEFAULT_PAGE_SIZE: u32 = 25;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Cursor snapshot handed to a page fetch function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn v1(page: u32, page_size: u32) -> Result<Self, ContractViolation> {
        let r = Self { page, page_size };
        r.validate()?;
        Ok(r)
    }

    /// Zero-based index of the first item on this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

impl Validate for PageRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.page == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "page_request.page",
                reason: "must be >= 1",
            });
        }
        validate_page_size("page_request.page_size", self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PageResponse<T> {
    pub data: Vec<T>,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PaginationState {
    pub current_page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl PaginationState {
    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.current_page > 1
    }
}

impl Validate for PaginationState {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_page_size("pagination_state.page_size", self.page_size)?;
        if self.total_pages != total_pages_for(self.total_items, self.page_size) {
            return Err(ContractViolation::InvalidValue {
                field: "pagination_state.total_pages",
                reason: "must equal max(ceil(total_items / page_size), 1)",
            });
        }
        if self.current_page == 0 || self.current_page > self.total_pages {
            return Err(ContractViolation::InvalidRange {
                field: "pagination_state.current_page",
                min: 1.0,
                max: self.total_pages as f64,
                got: self.current_page as f64,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PaginatedResult<T> {
    pub data: Vec<T>,
    pub pagination: PaginationState,
}

/// `max(ceil(total / page_size), 1)`; an empty set still has one page.
pub fn total_pages_for(total: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 1;
    }
    let pages = total.div_ceil(u64::from(page_size)).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

pub fn validate_page_size(field: &'static str, page_size: u32) -> Result<(), ContractViolation> {
    if page_size == 0 {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be > 0",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_page_01_total_pages_never_zero() {
        assert_eq!(total_pages_for(0, 10), 1);
        assert_eq!(total_pages_for(1, 10), 1);
        assert_eq!(total_pages_for(10, 10), 1);
        assert_eq!(total_pages_for(11, 10), 2);
        assert_eq!(total_pages_for(95, 10), 10);
    }

    #[test]
    fn at_page_02_total_pages_matches_ceil_for_sampled_inputs() {
        for total in 0u64..250 {
            for size in 1u32..17 {
                let expected = ((total as f64) / (size as f64)).ceil().max(1.0) as u32;
                assert_eq!(total_pages_for(total, size), expected, "total={total} size={size}");
            }
        }
    }

    #[test]
    fn at_page_03_request_offset_and_validation() {
        assert_eq!(PageRequest::v1(3, 25).unwrap().offset(), 50);
        assert!(PageRequest::v1(0, 25).is_err());
        assert!(PageRequest::v1(1, 0).is_err());
    }

    #[test]
    fn at_page_04_state_validation_catches_out_of_range_cursor() {
        let state = PaginationState {
            current_page: 11,
            page_size: 10,
            total_items: 95,
            total_pages: 10,
        };
        assert!(state.validate().is_err());
        let ok = PaginationState {
            current_page: 10,
            ..state
        };
        assert!(ok.validate().is_ok());
        assert!(!ok.has_next());
        assert!(ok.has_prev());
    }
}
