use serde::{Deserialize, Serialize};
use serde_json::Value;
use structopt::StructOpt;

use crate::utilities::dictandlist::Metadata;

/// Page size used when none is given.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// A dataset search against `package_search`.
///
/// The query is in Solr syntax. Results are fetched page by page until `rows`
/// datasets were returned or HDX runs out of matches.
#[derive(Debug, Clone, Serialize, Deserialize, StructOpt, PartialEq)]
#[structopt(about = "Search datasets on HDX")]
pub struct SearchQuery {
    /// The search query string, in Solr syntax.
    #[structopt(short = "q", long = "query", default_value = "*:*")]
    pub q: String,

    /// Filter query to narrow down results.
    #[structopt(long = "filter")]
    pub fq: Option<String>,

    /// Sorting of results, e.g. `metadata_modified desc`.
    #[structopt(long)]
    pub sort: Option<String>,

    /// Number of matching datasets to return. All when not given.
    #[structopt(long)]
    pub rows: Option<u32>,

    /// Offset of the first dataset to return.
    #[structopt(long)]
    pub start: Option<u32>,

    /// Number of datasets requested per call.
    #[structopt(long, default_value = "1000")]
    pub page_size: u32,
}

impl Default for SearchQuery {
    fn default() -> Self {
        SearchQuery {
            q: "*:*".to_string(),
            fq: None,
            sort: None,
            rows: None,
            start: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SearchQuery {
    pub fn new(q: &str) -> Self {
        SearchQuery {
            q: q.to_string(),
            ..Default::default()
        }
    }

    /// Sort order sent when none was given.
    ///
    /// Searches spanning several pages sort by creation so paging is stable.
    pub fn effective_sort(&self) -> String {
        match &self.sort {
            Some(sort) => sort.clone(),
            None if self.total_rows() > self.page_size() as u64 => {
                "metadata_created asc".to_string()
            }
            None => "relevance asc, metadata_modified desc".to_string(),
        }
    }

    pub fn total_rows(&self) -> u64 {
        self.rows.map(u64::from).unwrap_or(u64::from(u32::MAX))
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.max(1)
    }

    /// Payload of the `page`-th call.
    ///
    /// # Returns
    ///
    /// The payload and the number of rows it requests, or `None` once all
    /// requested rows are covered.
    pub fn to_payload(&self, page: u64) -> Option<(Metadata, u64)> {
        let page_size = u64::from(self.page_size());
        let offset = page * page_size;
        let total_rows = self.total_rows();
        if offset >= total_rows {
            return None;
        }
        let rows = (total_rows - offset).min(page_size);

        let mut payload = Metadata::new();
        payload.insert("q".to_string(), Value::String(self.q.clone()));
        if let Some(fq) = &self.fq {
            payload.insert("fq".to_string(), Value::String(fq.clone()));
        }
        payload.insert("sort".to_string(), Value::String(self.effective_sort()));
        payload.insert(
            "start".to_string(),
            Value::from(u64::from(self.start.unwrap_or(0)) + offset),
        );
        payload.insert("rows".to_string(), Value::from(rows));

        Some((payload, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_payload_pages() {
        // Arrange
        let query = SearchQuery {
            rows: Some(5),
            start: Some(10),
            page_size: 2,
            fq: Some("organization:ocha".to_string()),
            ..SearchQuery::new("name:acled")
        };

        // Act
        let pages: Vec<(Metadata, u64)> = (0..).map_while(|page| query.to_payload(page)).collect();

        // Assert
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].0["start"], 10);
        assert_eq!(pages[2].0["start"], 14);
        assert_eq!(pages[2].1, 1);
        assert_eq!(pages[0].0["fq"], "organization:ocha");
        assert_eq!(pages[0].0["sort"], "metadata_created asc");
    }

    #[test]
    fn test_default_sort_for_single_page() {
        let query = SearchQuery {
            rows: Some(10),
            ..SearchQuery::default()
        };

        assert_eq!(query.effective_sort(), "relevance asc, metadata_modified desc");
        assert_eq!(SearchQuery::default().effective_sort(), "metadata_created asc");
    }
}
