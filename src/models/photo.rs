use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One uploaded image. `embedded` flips to true once its embedding result arrives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Photo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub path: String,
    pub upload_at: i64,
    pub batch_id: Uuid,
    pub embedded: bool,
}

impl Photo {
    /// Build a photo record for a file already written to `path`.
    pub fn new(
        user_id: Uuid,
        batch_id: Uuid,
        name: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            path: path.into(),
            upload_at: Utc::now().timestamp(),
            batch_id,
            embedded: false,
        }
    }
}

/// Query parameters for `GET /api/photos`.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

pub const DEFAULT_PAGE_LIMIT: i64 = 21;
pub const MAX_PAGE_LIMIT: i64 = 100;

impl PageParams {
    /// Unparseable or non-positive values fall back to page 1 / limit 21.
    /// Larger limits are capped at `MAX_PAGE_LIMIT`.
    pub fn resolve(&self) -> (i64, i64) {
        let page = self
            .page
            .as_deref()
            .and_then(|p| p.parse::<i64>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1);
        let limit = self
            .limit
            .as_deref()
            .and_then(|l| l.parse::<i64>().ok())
            .filter(|l| *l >= 1)
            .map_or(DEFAULT_PAGE_LIMIT, |l| l.min(MAX_PAGE_LIMIT));
        (page, limit)
    }
}

/// Paginated envelope shared by listing and search responses.
#[derive(Debug, Serialize)]
pub struct PhotoPage<T> {
    pub page: i64,
    pub limit: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub photos: Vec<T>,
    pub total: i64,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
}

impl<T> PhotoPage<T> {
    pub fn new(page: i64, limit: i64, photos: Vec<T>, total: i64) -> Self {
        let total_pages = if limit > 0 && total > 0 {
            total / limit + i64::from(total % limit != 0)
        } else {
            0
        };
        Self {
            page,
            limit,
            query: None,
            photos,
            total,
            total_pages,
        }
    }

    /// Search results come back as a single page.
    pub fn single(query: String, photos: Vec<T>) -> Self {
        let count = photos.len() as i64;
        Self {
            page: 1,
            limit: count,
            query: Some(query),
            photos,
            total: count,
            total_pages: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_params_defaults() {
        let params = PageParams::default();
        assert_eq!(params.resolve(), (1, 21));
    }

    #[test]
    fn test_page_params_invalid_values_fall_back() {
        let params = PageParams {
            page: Some("0".into()),
            limit: Some("abc".into()),
        };
        assert_eq!(params.resolve(), (1, 21));
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let page: PhotoPage<u8> = PhotoPage::new(1, 21, vec![], 43);
        assert_eq!(page.total_pages, 3);
        let empty: PhotoPage<u8> = PhotoPage::new(1, 21, vec![], 0);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn test_page_params_cap_huge_limit() {
        let params = PageParams {
            page: Some("2".into()),
            limit: Some(i64::MAX.to_string()),
        };
        assert_eq!(params.resolve(), (2, MAX_PAGE_LIMIT));
    }

    #[test]
    fn test_total_pages_never_overflows() {
        let page: PhotoPage<u8> = PhotoPage::new(1, i64::MAX, vec![], 2);
        assert_eq!(page.total_pages, 1);
        let full: PhotoPage<u8> = PhotoPage::new(1, 1, vec![], i64::MAX);
        assert_eq!(full.total_pages, i64::MAX);
    }
}
