//! Query composition for filtered, paginated listings.
//!
//! A [`QueryFilter`] is built from a [`PageRequest`] against a static
//! [`TableSpec`]. The same predicate feeds both the row query and the count
//! query, so `total` always describes the filtered set. All user-supplied
//! values travel in a single bound `$filter` object; only identifiers from
//! the table description and escaped metadata keys are spliced into the
//! statement text.

use cohort_core::error::{CohortError, CohortResult};
use cohort_core::models::metadata::Metadata;
use cohort_core::page::{Direction, Page, PageRequest};
use serde_json::{Map, Value};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;

use crate::error::{DbError, check};

/// Describes how a table is filtered and sorted.
#[derive(Debug)]
pub(crate) struct TableSpec {
    pub table: &'static str,
    /// Expression yielding the identifier matched by id-set filters.
    pub id_expr: &'static str,
    pub default_order: &'static str,
    pub sortable: &'static [&'static str],
    pub name_field: Option<&'static str>,
    pub metadata_field: Option<&'static str>,
    pub owner_field: Option<&'static str>,
    pub org_field: Option<&'static str>,
}

/// Predicate, ordering and pagination for one listing.
#[derive(Debug, Clone)]
pub(crate) struct QueryFilter {
    table: &'static str,
    predicates: Vec<String>,
    params: Map<String, Value>,
    order: &'static str,
    dir: Direction,
    limit: u64,
    offset: u64,
    empty: bool,
}

impl QueryFilter {
    pub fn compose(spec: &'static TableSpec, page: &PageRequest) -> CohortResult<Self> {
        let order = match page.order.as_deref() {
            None | Some("") => spec.default_order,
            Some(requested) => spec
                .sortable
                .iter()
                .copied()
                .find(|field| *field == requested)
                .ok_or_else(|| {
                    CohortError::malformed(format!(
                        "cannot sort {} by {requested}",
                        spec.table
                    ))
                })?,
        };

        let mut filter = Self {
            table: spec.table,
            predicates: Vec::new(),
            params: Map::new(),
            order,
            dir: page.dir.unwrap_or_default(),
            limit: page.limit,
            offset: page.offset,
            empty: false,
        };

        if let Some(ids) = &page.ids {
            if ids.is_empty() {
                filter.empty = true;
            }
            let ids = Value::from(ids.clone());
            filter = filter.and_param(&format!("{} IN $filter.ids", spec.id_expr), "ids", ids);
        }

        if let Some(name) = &page.name {
            let field = supported(spec, spec.name_field, "name")?;
            filter = filter.and_param(
                &format!("string::contains(string::lowercase({field}), $filter.name)"),
                "name",
                Value::from(name.to_lowercase()),
            );
        }

        if let Some(owner_id) = &page.owner_id {
            let field = supported(spec, spec.owner_field, "owner")?;
            filter = filter.and_param(
                &format!("{field} = $filter.owner_id"),
                "owner_id",
                Value::from(owner_id.as_str()),
            );
        }

        if let Some(org_id) = &page.org_id {
            let field = supported(spec, spec.org_field, "organization")?;
            filter = filter.and_param(
                &format!("{field} = $filter.org_id"),
                "org_id",
                Value::from(org_id.as_str()),
            );
        }

        if let Some(metadata) = &page.metadata {
            let field = supported(spec, spec.metadata_field, "metadata")?;
            let document = Metadata::try_from(metadata.clone())?;
            filter.contains(field, document.as_map())?;
        }

        Ok(filter)
    }

    /// Add a predicate that references `$filter.{key}`.
    pub fn and_param(mut self, predicate: &str, key: &str, value: Value) -> Self {
        self.params.insert(key.to_owned(), value);
        self.predicates.push(predicate.to_owned());
        self
    }

    /// Bind `$filter.{key}` for a predicate added separately.
    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_owned(), value);
        self
    }

    /// True when the request can match nothing; callers skip the store.
    pub fn is_empty_set(&self) -> bool {
        self.empty
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn params(&self) -> Value {
        Value::Object(self.params.clone())
    }

    pub fn where_clause(&self) -> String {
        if self.predicates.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.predicates.join(" AND "))
        }
    }

    pub fn count_sql(&self) -> String {
        format!(
            "SELECT count() AS total FROM {}{} GROUP ALL",
            self.table,
            self.where_clause()
        )
    }

    pub fn select_sql(&self, projection: &str) -> String {
        let mut sql = format!(
            "SELECT {projection} FROM {}{} ORDER BY {} {}",
            self.table,
            self.where_clause(),
            self.order,
            self.dir.as_sql()
        );
        if self.order != "id" {
            sql.push_str(", id ASC");
        }
        if self.limit > 0 {
            sql.push_str(&format!(" LIMIT {}", self.limit));
        }
        if self.offset > 0 {
            sql.push_str(&format!(" START {}", self.offset));
        }
        sql
    }

    /// Containment predicates: every leaf of `document` must be present
    /// at the same path under `path`.
    fn contains(&mut self, path: &str, document: &Map<String, Value>) -> CohortResult<()> {
        for (key, value) in document {
            if key.is_empty() || key.contains('`') || key.contains('\\') {
                return Err(CohortError::malformed(format!(
                    "metadata key {key:?} cannot be used in a filter"
                )));
            }
            let path = format!("{path}.`{key}`");
            match value {
                Value::Object(inner) if !inner.is_empty() => self.contains(&path, inner)?,
                Value::Object(_) => self.predicates.push(format!("type::is::object({path})")),
                Value::Array(_) => {
                    let param = self.metadata_param(value.clone());
                    self.predicates.push(format!("{path} CONTAINSALL {param}"));
                }
                _ => {
                    let param = self.metadata_param(value.clone());
                    self.predicates.push(format!("{path} = {param}"));
                }
            }
        }
        Ok(())
    }

    fn metadata_param(&mut self, value: Value) -> String {
        let key = format!("m{}", self.params.len());
        self.params.insert(key.clone(), value);
        format!("$filter.{key}")
    }
}

fn supported(
    spec: &TableSpec,
    field: Option<&'static str>,
    what: &str,
) -> CohortResult<&'static str> {
    field.ok_or_else(|| {
        CohortError::malformed(format!("{} cannot be filtered by {what}", spec.table))
    })
}

#[derive(Debug, SurrealValue)]
pub(crate) struct CountRow {
    pub total: u64,
}

/// Run the count and row queries of `filter` and map each row.
pub(crate) async fn fetch_page<C, R, T>(
    db: &Surreal<C>,
    filter: &QueryFilter,
    projection: &str,
    map: fn(R) -> Result<T, DbError>,
) -> Result<Page<T>, DbError>
where
    C: Connection,
    R: SurrealValue,
{
    if filter.is_empty_set() {
        return Ok(Page::empty(filter.offset(), filter.limit()));
    }

    let query = format!("{}; {};", filter.count_sql(), filter.select_sql(projection));
    let response = db.query(query).bind(("filter", filter.params())).await?;
    let mut response = check(response)?;

    let counts: Vec<CountRow> = response.take(0)?;
    let total = counts.first().map(|r| r.total).unwrap_or(0);
    let rows: Vec<R> = response.take(1)?;
    let items = rows.into_iter().map(map).collect::<Result<Vec<_>, _>>()?;

    Ok(Page {
        items,
        total,
        offset: filter.offset(),
        limit: filter.limit(),
    })
}

/// Wrap statements in a single store-managed transaction. Any failing
/// statement cancels the whole block.
///
/// `BEGIN` takes result slot 0, so the first wrapped statement answers at
/// index 1.
pub(crate) fn transaction(statements: &str) -> String {
    format!("BEGIN TRANSACTION;\n{statements}\nCOMMIT TRANSACTION;")
}

/// JSON array of strings, for binding id lists.
pub(crate) fn string_array(values: &[String]) -> Value {
    Value::from(values.to_vec())
}

#[cfg(test)]
mod tests {
    use cohort_core::error::ErrorKind;
    use serde_json::json;

    use super::*;

    static ITEMS: TableSpec = TableSpec {
        table: "items",
        id_expr: "meta::id(id)",
        default_order: "id",
        sortable: &["id", "name", "created_at"],
        name_field: Some("name"),
        metadata_field: Some("metadata"),
        owner_field: Some("owner_id"),
        org_field: Some("org_id"),
    };

    static LINKS: TableSpec = TableSpec {
        table: "links",
        id_expr: "member_id",
        default_order: "member_id",
        sortable: &["member_id"],
        name_field: None,
        metadata_field: None,
        owner_field: None,
        org_field: None,
    };

    #[test]
    fn defaults_are_canonical() {
        let filter = QueryFilter::compose(&ITEMS, &PageRequest::default()).unwrap();
        assert_eq!(
            filter.select_sql("*"),
            "SELECT * FROM items ORDER BY id ASC"
        );
        assert_eq!(filter.count_sql(), "SELECT count() AS total FROM items GROUP ALL");
        assert!(!filter.is_empty_set());
    }

    #[test]
    fn count_and_select_share_the_predicate() {
        let page = PageRequest {
            name: Some("Fleet".into()),
            org_id: Some("o1".into()),
            order: Some("name".into()),
            dir: Some(Direction::Desc),
            limit: 10,
            offset: 20,
            ..Default::default()
        };
        let filter = QueryFilter::compose(&ITEMS, &page).unwrap();
        let predicate = filter.where_clause();

        assert!(filter.count_sql().contains(&predicate));
        assert_eq!(
            filter.select_sql("*"),
            format!("SELECT * FROM items{predicate} ORDER BY name DESC, id ASC LIMIT 10 START 20")
        );
        assert_eq!(filter.params()["name"], json!("fleet"));
        assert_eq!(filter.params()["org_id"], json!("o1"));
    }

    #[test]
    fn empty_id_set_short_circuits() {
        let page = PageRequest {
            ids: Some(Vec::new()),
            ..Default::default()
        };
        let filter = QueryFilter::compose(&ITEMS, &page).unwrap();
        assert!(filter.is_empty_set());
    }

    #[test]
    fn metadata_filter_becomes_path_predicates() {
        let page = PageRequest {
            metadata: Some(json!({
                "region": "eu",
                "rack": { "row": 3 },
                "tags": ["gpu"],
            })),
            ..Default::default()
        };
        let filter = QueryFilter::compose(&ITEMS, &page).unwrap();
        let clause = filter.where_clause();

        assert!(clause.contains("metadata.`region` = $filter.m"));
        assert!(clause.contains("metadata.`rack`.`row` = $filter.m"));
        assert!(clause.contains("metadata.`tags` CONTAINSALL $filter.m"));
        assert_eq!(filter.params().as_object().unwrap().len(), 3);
    }

    #[test]
    fn empty_nested_metadata_requires_an_object() {
        let page = PageRequest {
            metadata: Some(json!({ "rack": {} })),
            ..Default::default()
        };
        let filter = QueryFilter::compose(&ITEMS, &page).unwrap();
        assert_eq!(
            filter.where_clause(),
            " WHERE type::is::object(metadata.`rack`)"
        );
        assert!(filter.params().as_object().unwrap().is_empty());
    }

    #[test]
    fn malformed_requests_are_rejected() {
        let bad_sort = PageRequest {
            order: Some("password".into()),
            ..Default::default()
        };
        let bad_metadata = PageRequest {
            metadata: Some(json!(["not", "an", "object"])),
            ..Default::default()
        };
        let bad_key = PageRequest {
            metadata: Some(json!({ "a`b": 1 })),
            ..Default::default()
        };
        let unsupported = PageRequest {
            name: Some("x".into()),
            ..Default::default()
        };

        for (spec, page) in [
            (&ITEMS, bad_sort),
            (&ITEMS, bad_metadata),
            (&ITEMS, bad_key),
            (&LINKS, unsupported),
        ] {
            let err = QueryFilter::compose(spec, &page).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedEntity);
        }
    }

    #[test]
    fn extra_predicates_are_bound() {
        let filter = QueryFilter::compose(&LINKS, &PageRequest::default())
            .unwrap()
            .and_param("group_id = $filter.group_id", "group_id", json!("g1"));
        assert_eq!(filter.where_clause(), " WHERE group_id = $filter.group_id");
        assert_eq!(
            filter.select_sql("*"),
            "SELECT * FROM links WHERE group_id = $filter.group_id ORDER BY member_id ASC, id ASC"
        );
    }
}
