use serde::Serialize;

use crate::constants::MAX_PAGE;

use super::form::Form;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Reads `page` (1-based) and `limit`; missing or invalid values use the defaults.
    pub fn from_form(form: &Form, default_limit: i64) -> Self {
        let page = match form.get_number::<i64>("page") {
            Ok(Some(page)) if page >= 1 => page.min(MAX_PAGE),
            _ => 1,
        };
        let limit = match form.get_number::<i64>("limit") {
            Ok(Some(limit)) if limit >= 1 => limit,
            _ => default_limit,
        };

        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Serialize, Debug)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> PageContext<T> {
    pub fn from_rows(rows: Vec<T>, total_rows: i64, request: PageRequest, base_url: &str) -> Self {
        let link = |page: i64| format!("{base_url}?page={page}&limit={}", request.limit);

        let next = (request.page.saturating_mul(request.limit) < total_rows)
            .then(|| link(request.page + 1));
        let previous = (request.page > 1).then(|| link(request.page - 1));

        Self {
            count: total_rows,
            next,
            previous,
            results: rows,
        }
    }

    pub fn with_results<U>(self, results: Vec<U>) -> PageContext<U> {
        PageContext {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results,
        }
    }
}
