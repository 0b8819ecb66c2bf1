use std::cmp::Ordering as CmpOrdering;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::{Actor, ActorId};
use crate::domain::request::{Request, Stage};
use crate::errors::{ApplicationError, DomainError};

pub const DEFAULT_PAGE_SIZE: u32 = 7;
pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLimits {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self { default_page_size: DEFAULT_PAGE_SIZE, max_page_size: MAX_PAGE_SIZE }
    }
}

/// Sort keys accepted by the `ordering` query parameter; a leading `-` means descending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ordering {
    #[default]
    CreatedDesc,
    CreatedAsc,
    ProcessedDesc,
    ProcessedAsc,
}

impl Ordering {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "-created_at" => Some(Self::CreatedDesc),
            "created_at" => Some(Self::CreatedAsc),
            "-processed_at" => Some(Self::ProcessedDesc),
            "processed_at" => Some(Self::ProcessedAsc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatedDesc => "-created_at",
            Self::CreatedAsc => "created_at",
            Self::ProcessedDesc => "-processed_at",
            Self::ProcessedAsc => "processed_at",
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedDesc | Self::CreatedAsc => "created_at",
            Self::ProcessedDesc | Self::ProcessedAsc => "processed_at",
        }
    }

    pub fn is_descending(&self) -> bool {
        matches!(self, Self::CreatedDesc | Self::ProcessedDesc)
    }

    /// Total order over requests. Ties fall back to the id in the same direction,
    /// and a missing `processed_at` sorts below any present one.
    pub fn compare(&self, left: &Request, right: &Request) -> CmpOrdering {
        let primary = match self {
            Self::CreatedDesc | Self::CreatedAsc => left.created_at.cmp(&right.created_at),
            Self::ProcessedDesc | Self::ProcessedAsc => left.processed_at.cmp(&right.processed_at),
        }
        .then_with(|| left.id.cmp(&right.id));

        if self.is_descending() {
            primary.reverse()
        } else {
            primary
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilter {
    #[serde(default)]
    pub stages: Vec<Stage>,
    /// Case-insensitive substring of the requester's name or id.
    #[serde(default)]
    pub requester: Option<String>,
    /// Exact requester id; used by the `mine` queue.
    #[serde(default)]
    pub requester_id: Option<ActorId>,
    #[serde(default)]
    pub created_from: Option<NaiveDate>,
    #[serde(default)]
    pub created_to: Option<NaiveDate>,
    #[serde(default)]
    pub ordering: Ordering,
}

impl RequestFilter {
    pub fn validate(&self) -> Result<(), DomainError> {
        if let (Some(from), Some(to)) = (self.created_from, self.created_to) {
            if from > to {
                return Err(DomainError::Validation(format!(
                    "start date {from} is after end date {to}"
                )));
            }
        }
        Ok(())
    }

    pub fn requester_needle(&self) -> Option<String> {
        self.requester
            .as_deref()
            .map(str::trim)
            .filter(|needle| !needle.is_empty())
            .map(str::to_lowercase)
    }

    /// Inclusive start and exclusive end instants for the date range.
    pub fn created_bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let lower = self.created_from.and_then(start_of_day);
        let upper = self
            .created_to
            .and_then(|day| day.checked_add_days(Days::new(1)))
            .and_then(start_of_day);
        (lower, upper)
    }

    pub fn matches(&self, request: &Request) -> bool {
        if !self.stages.is_empty() && !self.stages.contains(&request.stage) {
            return false;
        }
        if let Some(requester_id) = &self.requester_id {
            if &request.requester.id != requester_id {
                return false;
            }
        }
        if let Some(needle) = self.requester_needle() {
            let in_name = request.requester.name.to_lowercase().contains(&needle);
            let in_id = request.requester.id.0.to_lowercase().contains(&needle);
            if !in_name && !in_id {
                return false;
            }
        }
        let (lower, upper) = self.created_bounds();
        if lower.is_some_and(|lower| request.created_at < lower) {
            return false;
        }
        if upper.is_some_and(|upper| request.created_at >= upper) {
            return false;
        }
        true
    }
}

fn start_of_day(day: NaiveDate) -> Option<DateTime<Utc>> {
    day.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Pages are 1-based. Oversized page sizes are clamped to the configured maximum.
    pub fn new(
        page: Option<u32>,
        page_size: Option<u32>,
        limits: PageLimits,
    ) -> Result<Self, DomainError> {
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(DomainError::Validation("page numbers start at 1".to_string()));
        }
        let page_size = page_size.unwrap_or(limits.default_page_size);
        if page_size == 0 {
            return Err(DomainError::Validation("page_size must be positive".to_string()));
        }
        Ok(Self { page, page_size: page_size.min(limits.max_page_size) })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

pub fn total_pages(count: u64, page_size: u32) -> u32 {
    let size = u64::from(page_size.max(1));
    let pages = count.div_ceil(size).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub total_pages: u32,
    pub count: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    /// Wraps one page of results; a page past the last one is `NotFound`.
    pub fn assemble(
        results: Vec<T>,
        count: u64,
        request: PageRequest,
    ) -> Result<Self, ApplicationError> {
        let total_pages = total_pages(count, request.page_size);
        if request.page > total_pages {
            return Err(ApplicationError::NotFound(format!(
                "page {} is beyond the last page {total_pages}",
                request.page
            )));
        }
        Ok(Self { results, total_pages, count, page: request.page, page_size: request.page_size })
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            results: self.results.into_iter().map(f).collect(),
            total_pages: self.total_pages,
            count: self.count,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

/// Filters, sorts and slices an in-memory snapshot the same way the SQL read
/// model does. Returns the page rows and the total match count.
pub fn select_page<'a>(
    requests: impl IntoIterator<Item = &'a Request>,
    filter: &RequestFilter,
    page: PageRequest,
) -> (Vec<Request>, u64) {
    let mut matching = requests
        .into_iter()
        .filter(|request| filter.matches(request))
        .cloned()
        .collect::<Vec<_>>();
    matching.sort_by(|left, right| filter.ordering.compare(left, right));

    let count = matching.len() as u64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let results = matching.into_iter().skip(offset).take(page.page_size as usize).collect();
    (results, count)
}

pub fn paginate<'a>(
    requests: impl IntoIterator<Item = &'a Request>,
    filter: &RequestFilter,
    page: PageRequest,
) -> Result<Page<Request>, ApplicationError> {
    filter.validate()?;
    let (results, count) = select_page(requests, filter, page);
    Page::assemble(results, count, page)
}

/// Named role queues that pre-fill a filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Queue {
    Pending,
    Approved,
    Drafted,
    History,
    Mine,
}

impl Queue {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "drafted" | "draft" => Some(Self::Drafted),
            "history" => Some(Self::History),
            "mine" => Some(Self::Mine),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Drafted => "drafted",
            Self::History => "history",
            Self::Mine => "mine",
        }
    }

    /// Narrows `base` to this queue. Caller-provided search and date filters are kept.
    pub fn apply(&self, actor: &Actor, mut base: RequestFilter) -> RequestFilter {
        match self {
            Self::Pending => base.stages = vec![Stage::Submitted],
            Self::Approved => base.stages = vec![Stage::Approved],
            Self::Drafted => base.stages = vec![Stage::Drafted],
            Self::History => {
                base.stages = Stage::ALL
                    .into_iter()
                    .filter(|stage| *stage != Stage::Submitted)
                    .collect();
            }
            Self::Mine => base.requester_id = Some(actor.id.clone()),
        }
        base
    }
}
