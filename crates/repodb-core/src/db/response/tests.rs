use crate::{
    db::{
        query::order::{OrderDirection, SortKey},
        response::{
            BulkMutationResult, PageRequest, PageResult, PageTotal, PagingError, QueryResult,
            ResponseError,
        },
    },
    error::Error,
    model::{Row, RowDecodeError},
};

fn rows(n: i64) -> Vec<Row> {
    (1..=n).map(|i| Row::new().with("id", i)).collect()
}

//
// PageRequest
//

#[test]
fn page_request_rejects_invalid_input() {
    assert_eq!(
        PageRequest::of(0, 0),
        Err(PagingError::InvalidPageSize { size: 0 })
    );
    assert_eq!(
        PageRequest::of(0, -3),
        Err(PagingError::InvalidPageSize { size: -3 })
    );
    assert_eq!(
        PageRequest::of(-1, 10),
        Err(PagingError::InvalidPageIndex { index: -1 })
    );
    assert_eq!(
        PageRequest::of_one_indexed(0, 10),
        Err(PagingError::InvalidPageIndex { index: 0 })
    );
}

#[test]
fn one_indexed_numbers_shift_to_zero_based() {
    let request = PageRequest::of_one_indexed(2, 3).expect("valid request");

    assert_eq!(request.page_index(), 1);
    assert_eq!(request.page_size(), 3);
    assert_eq!(request.offset(), 3);
}

#[test]
fn navigation_keeps_size_and_sort() {
    let request = PageRequest::of(1, 5)
        .expect("valid request")
        .sorted_by(SortKey::desc("age"));

    let next = request.next();
    assert_eq!(next.page_index(), 2);
    assert_eq!(next.sort(), request.sort());
    assert_eq!(request.previous().map(|r| r.page_index()), Some(0));
    assert_eq!(request.first().previous(), None);
}

#[test]
fn clamping_caps_page_size() {
    let request = PageRequest::of(0, 5000).expect("valid request");

    assert_eq!(request.clone().clamped(2000).page_size(), 2000);
    assert_eq!(request.clamped(0).page_size(), 1);
}

#[test]
fn page_request_deserializes_through_validation() {
    let request: PageRequest = serde_json::from_str(
        r#"{"page_index":1,"page_size":3,"sort":[{"field":"age","direction":"Desc"}]}"#,
    )
    .expect("valid json");

    assert_eq!(request.page_index(), 1);
    assert_eq!(
        request.sort(),
        [SortKey {
            field: "age".into(),
            direction: OrderDirection::Desc,
        }]
    );
    assert_eq!(request.tie_breaker(), None);

    assert!(serde_json::from_str::<PageRequest>(r#"{"page_index":0,"page_size":0}"#).is_err());
    assert!(serde_json::from_str::<PageRequest>(r#"{"page_index":-1,"page_size":3}"#).is_err());
    assert!(
        serde_json::from_str::<PageRequest>(r#"{"page_index":0,"page_size":3,"pageSize":3}"#)
            .is_err()
    );
}

//
// PageResult
//

#[test]
fn counted_pages_derive_navigation_from_total() {
    let first = PageResult::counted(rows(3), PageRequest::of(0, 3).expect("request"), 7);

    assert_eq!(first.total_elements(), Some(7));
    assert_eq!(first.total_pages(), Some(3));
    assert!(first.is_first());
    assert!(first.has_next());
    assert!(!first.has_previous());
    assert_eq!(first.next_request().map(|r| r.page_index()), Some(1));

    let last = PageResult::counted(rows(1), PageRequest::of(2, 3).expect("request"), 7);
    assert!(last.is_last());
    assert!(last.has_previous());
    assert_eq!(last.next_request(), None);
    assert_eq!(last.number_of_elements(), 1);
}

#[test]
fn counted_total_never_trails_observed_rows() {
    let page = PageResult::counted(rows(3), PageRequest::of(1, 3).expect("request"), 2);

    assert_eq!(page.total(), PageTotal::Counted(6));
    assert_eq!(page.total_pages(), Some(2));
}

#[test]
fn empty_total_has_zero_pages() {
    let page = PageResult::<Row>::counted(Vec::new(), PageRequest::of(0, 10).expect("request"), 0);

    assert_eq!(page.total_pages(), Some(0));
    assert!(page.is_empty());
    assert!(page.is_last());
}

#[test]
fn probed_pages_only_know_whether_more_exist() {
    let page = PageResult::probed(rows(3), PageRequest::of(0, 3).expect("request"), true);

    assert_eq!(page.total_elements(), None);
    assert_eq!(page.total_pages(), None);
    assert!(page.has_next());
    assert!(
        !PageResult::probed(rows(1), PageRequest::of(1, 3).expect("request"), false).has_next()
    );
}

#[test]
fn map_keeps_paging_metadata() {
    let page = PageResult::counted(rows(2), PageRequest::of(0, 2).expect("request"), 5);
    let ids = page.map(|row| row.require_i64("id").unwrap_or_default());

    assert_eq!(ids.content(), [1, 2]);
    assert_eq!(ids.total_elements(), Some(5));
    assert_eq!(ids.page_size(), 2);
}

//
// QueryResult
//

#[test]
fn typed_accessors_match_their_shapes() {
    let single = QueryResult::Single(Some(Row::new().with("id", 1)));
    assert_eq!(single.rows().len(), 1);
    assert_eq!(
        single.into_single::<Row>().expect("single"),
        Some(Row::new().with("id", 1))
    );

    assert_eq!(
        QueryResult::Optional(None).into_single::<Row>().expect("optional"),
        None
    );
    assert_eq!(QueryResult::Count(4).into_count().expect("count"), 4);
    assert!(QueryResult::Exists(true).into_exists().expect("exists"));

    let mutation = BulkMutationResult {
        affected_rows: 3,
        cache_invalidated: true,
    };
    assert_eq!(
        QueryResult::Mutation(mutation).into_mutation().expect("mutation"),
        mutation
    );
}

#[test]
fn pages_read_as_lists() {
    let page = PageResult::counted(rows(2), PageRequest::of(0, 2).expect("request"), 2);
    let ids: Vec<i64> = QueryResult::Page(page)
        .into_list::<Row>()
        .expect("list")
        .iter()
        .map(|row| row.require_i64("id").unwrap_or_default())
        .collect();

    assert_eq!(ids, [1, 2]);
}

#[test]
fn wrong_accessor_reports_shape_mismatch() {
    let err = QueryResult::List(rows(2))
        .into_count()
        .expect_err("list is not a count");

    assert!(matches!(
        err,
        Error::Response(ResponseError::ShapeMismatch {
            expected: "count",
            found: "list",
        })
    ));
    assert!(QueryResult::Count(1).into_page::<Row>().is_err());
}

#[test]
fn scalar_decode_failures_surface_as_decode_errors() {
    let err = QueryResult::List(vec![Row::new().with("id", 1).with("age", 2)])
        .into_list::<i64>()
        .expect_err("two columns");

    assert!(matches!(
        err,
        Error::Decode(RowDecodeError::NotScalar { columns: 2 })
    ));
}
