use serde::Serialize;
use std::cmp::Ordering;

use crate::model::{ClashFilter, ClashQuery, ClashRecord, SortKey, SortOrder, SortSpec};

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClashPage {
    pub clashes: Vec<ClashRecord>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

/// Returns the records matching `filter`, ordered by `sort`.
///
/// Ties on the sort key fall back to severity (high first) and then to the
/// identifier, so the order is total and pages are stable across calls.
#[must_use]
pub fn filter_and_sort<'a>(
    records: &'a [ClashRecord],
    filter: &ClashFilter,
    sort: SortSpec,
) -> Vec<&'a ClashRecord> {
    let mut matched: Vec<&ClashRecord> = records.iter().filter(|r| filter.matches(r)).collect();
    matched.sort_by(|a, b| compare(a, b, sort));
    matched
}

/// Filters, sorts and slices `records` according to `query`.
///
/// A page past the end yields an empty `clashes` list, not an error.
#[must_use]
pub fn query_clashes(records: &[ClashRecord], query: &ClashQuery) -> ClashPage {
    let matched = filter_and_sort(records, &query.filter, query.sort);
    let total = matched.len();
    let page_size = query.page.page_size();
    let (start, end) = query.page.bounds(total);

    ClashPage {
        clashes: matched[start..end].iter().map(|r| (*r).clone()).collect(),
        total,
        page: query.page.page(),
        page_size,
        total_pages: total.div_ceil(page_size),
    }
}

fn compare(a: &ClashRecord, b: &ClashRecord, sort: SortSpec) -> Ordering {
    let primary = match sort.key {
        SortKey::Severity => a.severity.cmp(&b.severity),
        SortKey::Status => a.status.cmp(&b.status),
        SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    };
    let primary = match sort.order {
        SortOrder::Asc => primary,
        SortOrder::Desc => primary.reverse(),
    };

    primary
        .then_with(|| b.severity.cmp(&a.severity))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::clash::fixtures::record;
    use crate::model::{PageRequest, Severity, Status};
    use crate::source::mock::generate_mock_clashes;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn mock() -> Vec<ClashRecord> {
        generate_mock_clashes(100, 42, chrono::Utc::now())
    }

    fn query(filter: ClashFilter, sort: SortSpec, page: usize, size: usize) -> ClashQuery {
        ClashQuery {
            filter,
            sort,
            page: PageRequest::new(page, size, 200).unwrap(),
        }
    }

    #[test]
    fn every_returned_record_matches_the_filter() {
        let records = mock();
        let filters = [
            ClashFilter {
                severities: vec![Severity::High, Severity::Low],
                ..ClashFilter::default()
            },
            ClashFilter {
                statuses: vec![Status::Resolved],
                discipline: Some("mep".to_string()),
                ..ClashFilter::default()
            },
            ClashFilter {
                level: Some("L01".to_string()),
                statuses: vec![Status::Open],
                ..ClashFilter::default()
            },
        ];

        for filter in filters {
            let expected = records.iter().filter(|r| filter.matches(r)).count();
            let page = query_clashes(&records, &query(filter.clone(), SortSpec::default(), 1, 200));
            assert_eq!(page.total, expected);
            assert!(page.clashes.iter().all(|r| filter.matches(r)));
        }
    }

    #[test]
    fn pages_cover_the_filtered_set_exactly_once() {
        let records = mock();
        let sort = SortSpec {
            key: SortKey::UpdatedAt,
            order: SortOrder::Desc,
        };
        let full = filter_and_sort(&records, &ClashFilter::default(), sort);

        let mut collected = Vec::new();
        let mut page = 1;
        loop {
            let result = query_clashes(&records, &query(ClashFilter::default(), sort, page, 7));
            if result.clashes.is_empty() {
                break;
            }
            collected.extend(result.clashes.into_iter().map(|r| r.id));
            page += 1;
        }

        let expected: Vec<String> = full.iter().map(|r| r.id.clone()).collect();
        assert_eq!(collected, expected);
        assert_eq!(page - 1, 100_usize.div_ceil(7));
    }

    #[test]
    fn high_severity_filter_fits_one_page_of_fifty() {
        let records = mock();
        let filter = ClashFilter {
            severities: vec![Severity::High],
            ..ClashFilter::default()
        };

        let first = query_clashes(&records, &query(filter.clone(), SortSpec::default(), 1, 50));
        assert_eq!(first.total, 20);
        assert_eq!(first.clashes.len(), 20);
        assert_eq!(first.total_pages, 1);

        let second = query_clashes(&records, &query(filter, SortSpec::default(), 2, 50));
        assert!(second.clashes.is_empty());
        assert_eq!(second.total, 20);
    }

    #[test]
    fn severity_desc_lists_high_first_with_id_tie_break() {
        let records = vec![
            record("c3", Severity::Low, Status::Open),
            record("c2", Severity::High, Status::Open),
            record("c1", Severity::High, Status::Open),
            record("c4", Severity::Medium, Status::Open),
        ];
        let page = query_clashes(&records, &query(ClashFilter::default(), SortSpec::default(), 1, 10));
        let ids: Vec<&str> = page.clashes.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c4", "c3"]);
    }

    #[test]
    fn tie_break_does_not_flip_with_sort_order() {
        let records = vec![
            record("b", Severity::Low, Status::Open),
            record("a", Severity::High, Status::Open),
            record("c", Severity::High, Status::Resolved),
        ];

        for order in [SortOrder::Asc, SortOrder::Desc] {
            let sort = SortSpec {
                key: SortKey::Status,
                order,
            };
            let ids: Vec<&str> = filter_and_sort(&records, &ClashFilter::default(), sort)
                .iter()
                .map(|r| r.id.as_str())
                .collect();
            match order {
                SortOrder::Asc => assert_eq!(ids, vec!["a", "b", "c"]),
                SortOrder::Desc => assert_eq!(ids, vec!["c", "a", "b"]),
            }
        }
    }

    #[test]
    fn created_at_ascending_puts_oldest_first() {
        let mut old = record("z", Severity::Low, Status::Open);
        old.created_at -= Duration::days(3);
        let new = record("a", Severity::Low, Status::Open);
        let records = vec![new, old];
        let sort = SortSpec {
            key: SortKey::CreatedAt,
            order: SortOrder::Asc,
        };
        let sorted = filter_and_sort(&records, &ClashFilter::default(), sort);
        assert_eq!(sorted[0].id, "z");
    }

    #[test]
    fn empty_input_gives_empty_page() {
        let page = query_clashes(&[], &ClashQuery::default());
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 0);
        assert!(page.clashes.is_empty());
    }
}
