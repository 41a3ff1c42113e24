//! Endpoint resolution and field-level request validation.
//!
//! Turns an endpoint name plus raw request input (query string, JSON body)
//! into typed values the content store can execute: a `ContentQuery` for
//! reads, a coerced data object for writes, and the projection that decides
//! which fields a response may contain.

use serde_json::{Map, Value};

use crate::error::AppError;
use crate::models::{
    content::{ContentFilter, ContentQuery, ContentSearch, ContentSort, SortDirection},
    endpoint::Endpoint,
    field::Field,
};
use crate::repositories::Repositories;

/// Query parameters with a fixed meaning; every other key is a filter.
pub const RESERVED_PARAMS: [&str; 5] = ["page", "per_page", "sort", "fields", "search"];

/// An enabled endpoint with its fields in creation order.
#[derive(Debug, Clone)]
pub struct ResolvedEndpoint {
    pub endpoint: Endpoint,
    pub fields: Vec<Field>,
}

impl ResolvedEndpoint {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.field_name == name)
    }

    /// `(public name, storage key)` for every field visible in responses.
    pub fn visible_projection(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .filter(|f| f.show_in_response)
            .map(|f| (f.field_name.clone(), f.storage_key().to_string()))
            .collect()
    }
}

/// Look up an endpoint by name. Unknown and disabled endpoints are both `NotFound`.
pub async fn resolve(repos: &Repositories, name: &str) -> Result<ResolvedEndpoint, AppError> {
    let endpoint = repos
        .endpoints
        .find_by_name(name)
        .await?
        .filter(|e| e.enabled)
        .ok_or_else(|| AppError::NotFound("Endpoint".to_string()))?;

    let fields = repos.fields.list_for_endpoint(endpoint.id).await?;

    Ok(ResolvedEndpoint { endpoint, fields })
}

/// Raw read parameters split out of a query string, not yet validated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestShape {
    pub filters: Vec<(String, String)>,
    /// Sort keys; a leading `-` means descending
    pub sort: Vec<String>,
    /// Explicit projection; `None` means every visible field
    pub fields: Option<Vec<String>>,
    pub search: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
}

impl RequestShape {
    /// Parse a raw (still percent-encoded) query string.
    ///
    /// `sort` and `fields` are comma separated lists. Empty values are
    /// treated as absent.
    pub fn from_query(raw: Option<&str>) -> Self {
        let mut shape = RequestShape::default();
        let Some(raw) = raw else {
            return shape;
        };

        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            let value = value.trim();
            match key.as_ref() {
                "page" => shape.page = non_empty(value),
                "per_page" => shape.per_page = non_empty(value),
                "search" => shape.search = non_empty(value),
                "sort" => shape.sort.extend(split_list(value)),
                "fields" => {
                    let list = split_list(value);
                    if !list.is_empty() {
                        shape.fields.get_or_insert_with(Vec::new).extend(list);
                    }
                }
                _ => shape.filters.push((key.into_owned(), value.to_string())),
            }
        }
        shape
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.per_page))
    }
}

/// Validate `page` (≥ 1, default 1) and `per_page` (`1..=max_per_page`).
pub fn paginate(
    page: Option<&str>,
    per_page: Option<&str>,
    default_per_page: u32,
    max_per_page: u32,
) -> Result<Pagination, AppError> {
    let page = match page {
        None => 1,
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| AppError::validation("page", "must be a positive integer"))?,
    };

    let per_page = match per_page {
        None => default_per_page.clamp(1, max_per_page.max(1)),
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|n| (1..=max_per_page).contains(n))
            .ok_or_else(|| {
                AppError::validation("per_page", format!("must be between 1 and {max_per_page}"))
            })?,
    };

    Ok(Pagination { page, per_page })
}

/// A read request that passed field-level validation.
#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    pub query: ContentQuery,
    /// `(public name, storage key)` pairs the response may contain
    pub projection: Vec<(String, String)>,
    pub pagination: Pagination,
}

/// Check filters, sort keys, projection and search against field flags.
///
/// # Errors
///
/// `Validation` naming the offending field when:
/// - a filter key is unknown or not filterable, or its value fails coercion
/// - a sort key is unknown or not sortable
/// - a projected field is unknown or hidden
/// - a search term is given but no field is searchable (`search`)
pub fn validate_request_shape(
    resolved: &ResolvedEndpoint,
    shape: &RequestShape,
    pagination: Pagination,
) -> Result<ValidatedQuery, AppError> {
    let mut filters = Vec::with_capacity(shape.filters.len());
    for (name, raw) in &shape.filters {
        let field = resolved
            .field(name)
            .filter(|f| f.is_filterable)
            .ok_or_else(|| AppError::validation(name.as_str(), "is not filterable"))?;
        filters.push(ContentFilter {
            key: field.storage_key().to_string(),
            field_type: field.field_type,
            value: field.field_type.coerce_str(name, raw)?,
        });
    }

    let mut sort = Vec::with_capacity(shape.sort.len());
    for raw in &shape.sort {
        let (name, direction) = match raw.strip_prefix('-') {
            Some(name) => (name, SortDirection::Desc),
            None => (raw.as_str(), SortDirection::Asc),
        };
        let field = resolved
            .field(name)
            .filter(|f| f.is_sortable)
            .ok_or_else(|| AppError::validation(name, "is not sortable"))?;
        sort.push(ContentSort {
            key: field.storage_key().to_string(),
            field_type: field.field_type,
            direction,
        });
    }

    let projection = project_fields(resolved, shape.fields.as_deref())?;

    let search = match &shape.search {
        None => None,
        Some(term) => {
            let keys: Vec<String> = resolved
                .fields
                .iter()
                .filter(|f| f.is_searchable)
                .map(|f| f.storage_key().to_string())
                .collect();
            if keys.is_empty() {
                return Err(AppError::validation(
                    "search",
                    "this endpoint has no searchable fields",
                ));
            }
            Some(ContentSearch {
                term: term.clone(),
                keys,
            })
        }
    };

    Ok(ValidatedQuery {
        query: ContentQuery {
            post_type: resolved.endpoint.post_type.clone(),
            filters,
            search,
            sort,
            limit: pagination.per_page,
            offset: pagination.offset(),
        },
        projection,
        pagination,
    })
}

/// Resolve an explicit projection, or every visible field when none is given.
pub fn project_fields(
    resolved: &ResolvedEndpoint,
    requested: Option<&[String]>,
) -> Result<Vec<(String, String)>, AppError> {
    let Some(requested) = requested else {
        return Ok(resolved.visible_projection());
    };

    let mut projection: Vec<(String, String)> = Vec::with_capacity(requested.len());
    for name in requested {
        // `id` is always returned
        if name == "id" || projection.iter().any(|(n, _)| n == name) {
            continue;
        }
        let field = resolved
            .field(name)
            .filter(|f| f.show_in_response)
            .ok_or_else(|| AppError::validation(name.as_str(), "is not available in responses"))?;
        projection.push((field.field_name.clone(), field.storage_key().to_string()));
    }
    Ok(projection)
}

/// Validate and coerce a create/update body into a storage data object.
///
/// `partial` is set for PATCH: required fields may be absent. On create and
/// full update every required field must be present and non-null. An `id`
/// key in the body is ignored; the path decides which item is written.
pub fn validate_write(
    resolved: &ResolvedEndpoint,
    body: &Value,
    partial: bool,
) -> Result<Value, AppError> {
    let object = body
        .as_object()
        .ok_or_else(|| AppError::validation("body", "must be a JSON object"))?;

    let mut data = Map::new();
    for (name, value) in object {
        if name == "id" {
            continue;
        }
        let field = resolved
            .field(name)
            .ok_or_else(|| AppError::validation(name.as_str(), "is not a field of this endpoint"))?;

        let stored = if value.is_null() {
            if field.is_required {
                return Err(AppError::validation(name.as_str(), "is required"));
            }
            Value::Null
        } else {
            field.field_type.coerce_json(name, value)?
        };
        data.insert(field.storage_key().to_string(), stored);
    }

    if !partial {
        if let Some(missing) = resolved
            .fields
            .iter()
            .find(|f| f.is_required && !object.contains_key(&f.field_name))
        {
            return Err(AppError::validation(
                missing.field_name.as_str(),
                "is required",
            ));
        }
    }

    Ok(Value::Object(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::endpoint::NewEndpoint;
    use crate::models::field::{FieldType, NewField};
    use serde_json::json;

    async fn articles(repos: &Repositories) -> ResolvedEndpoint {
        let endpoint = repos
            .endpoints
            .insert(NewEndpoint {
                name: "articles".to_string(),
                description: None,
                post_type: "post".to_string(),
                enabled: true,
                require_api_key: true,
                rate_limit_per_minute: None,
                documentation: None,
            })
            .await
            .unwrap();

        let field = |name: &str, field_type: FieldType| NewField {
            endpoint_id: endpoint.id,
            field_name: name.to_string(),
            field_type,
            field_label: None,
            is_required: false,
            is_searchable: false,
            is_sortable: false,
            is_filterable: false,
            show_in_response: true,
            meta_key: None,
        };

        for new_field in [
            NewField {
                is_required: true,
                is_sortable: true,
                is_searchable: true,
                ..field("title", FieldType::String)
            },
            NewField {
                is_filterable: true,
                is_sortable: true,
                meta_key: Some("_views".to_string()),
                ..field("views", FieldType::Integer)
            },
            NewField {
                is_filterable: true,
                ..field("published", FieldType::Boolean)
            },
            NewField {
                show_in_response: false,
                ..field("secret", FieldType::String)
            },
        ] {
            repos.fields.insert(new_field).await.unwrap();
        }

        resolve(repos, "articles").await.unwrap()
    }

    fn default_page() -> Pagination {
        Pagination {
            page: 1,
            per_page: 10,
        }
    }

    #[tokio::test]
    async fn unknown_and_disabled_endpoints_are_not_found() {
        let repos = Repositories::in_memory();
        let resolved = articles(&repos).await;

        assert!(matches!(
            resolve(&repos, "nope").await,
            Err(AppError::NotFound(_))
        ));

        repos
            .endpoints
            .update(
                resolved.endpoint.id,
                crate::models::endpoint::UpdateEndpointRequest {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            resolve(&repos, "articles").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn filtering_requires_filterable_but_sorting_does_not() {
        let repos = Repositories::in_memory();
        let resolved = articles(&repos).await;

        let shape = RequestShape::from_query(Some("title=x"));
        let err = validate_request_shape(&resolved, &shape, default_page()).unwrap_err();
        assert!(matches!(err, AppError::Validation { field, .. } if field == "title"));

        let shape = RequestShape::from_query(Some("sort=-title,views"));
        let validated = validate_request_shape(&resolved, &shape, default_page()).unwrap();
        assert_eq!(validated.query.sort.len(), 2);
        assert_eq!(validated.query.sort[0].direction, SortDirection::Desc);
        assert_eq!(validated.query.sort[1].key, "_views");
    }

    #[tokio::test]
    async fn filter_values_are_coerced_or_rejected() {
        let repos = Repositories::in_memory();
        let resolved = articles(&repos).await;

        let shape = RequestShape::from_query(Some("views=12&published=YES"));
        let validated = validate_request_shape(&resolved, &shape, default_page()).unwrap();
        assert_eq!(validated.query.filters[0].value, json!(12));
        assert_eq!(validated.query.filters[1].value, json!(true));

        let shape = RequestShape::from_query(Some("views=twelve"));
        let err = validate_request_shape(&resolved, &shape, default_page()).unwrap_err();
        assert!(matches!(err, AppError::Validation { field, .. } if field == "views"));
    }

    #[tokio::test]
    async fn hidden_fields_never_project() {
        let repos = Repositories::in_memory();
        let resolved = articles(&repos).await;

        let validated =
            validate_request_shape(&resolved, &RequestShape::default(), default_page()).unwrap();
        let names: Vec<&str> = validated.projection.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["title", "views", "published"]);

        let shape = RequestShape::from_query(Some("fields=title,secret"));
        let err = validate_request_shape(&resolved, &shape, default_page()).unwrap_err();
        assert!(matches!(err, AppError::Validation { field, .. } if field == "secret"));

        let shape = RequestShape::from_query(Some("fields=id,title,title"));
        let validated = validate_request_shape(&resolved, &shape, default_page()).unwrap();
        assert_eq!(validated.projection, vec![("title".to_string(), "title".to_string())]);
    }

    #[tokio::test]
    async fn search_needs_a_searchable_field() {
        let repos = Repositories::in_memory();
        let mut resolved = articles(&repos).await;

        let shape = RequestShape::from_query(Some("search=rust"));
        let validated = validate_request_shape(&resolved, &shape, default_page()).unwrap();
        assert_eq!(validated.query.search.unwrap().keys, vec!["title"]);

        for field in &mut resolved.fields {
            field.is_searchable = false;
        }
        let err = validate_request_shape(&resolved, &shape, default_page()).unwrap_err();
        assert!(matches!(err, AppError::Validation { field, .. } if field == "search"));
    }

    #[test]
    fn query_strings_are_split_into_reserved_and_filters() {
        let shape =
            RequestShape::from_query(Some("page=2&per_page=5&sort=a,-b&fields=&search=hi%20there&x=1"));

        assert_eq!(shape.page.as_deref(), Some("2"));
        assert_eq!(shape.per_page.as_deref(), Some("5"));
        assert_eq!(shape.sort, vec!["a", "-b"]);
        assert_eq!(shape.fields, None);
        assert_eq!(shape.search.as_deref(), Some("hi there"));
        assert_eq!(shape.filters, vec![("x".to_string(), "1".to_string())]);
    }

    #[test]
    fn pagination_bounds() {
        assert_eq!(
            paginate(None, None, 10, 100).unwrap(),
            Pagination {
                page: 1,
                per_page: 10
            }
        );
        assert_eq!(paginate(Some("3"), Some("100"), 10, 100).unwrap().offset(), 200);

        for (page, per_page, field) in [
            (Some("0"), None, "page"),
            (Some("-1"), None, "page"),
            (None, Some("0"), "per_page"),
            (None, Some("101"), "per_page"),
            (None, Some("ten"), "per_page"),
        ] {
            let err = paginate(page, per_page, 10, 100).unwrap_err();
            assert!(matches!(err, AppError::Validation { field: f, .. } if f == field));
        }

        let p = Pagination {
            page: 1,
            per_page: 10,
        };
        assert_eq!(p.total_pages(0), 0);
        assert_eq!(p.total_pages(21), 3);
    }

    #[tokio::test]
    async fn writes_are_coerced_to_storage_keys() {
        let repos = Repositories::in_memory();
        let resolved = articles(&repos).await;

        let data = validate_write(
            &resolved,
            &json!({"id": 9, "title": "Hi", "views": "7", "published": null}),
            false,
        )
        .unwrap();
        assert_eq!(data, json!({"title": "Hi", "_views": 7, "published": null}));
    }

    #[tokio::test]
    async fn writes_reject_bad_bodies() {
        let repos = Repositories::in_memory();
        let resolved = articles(&repos).await;

        let cases = [
            (json!({"views": 1}), false, "title"),
            (json!({"title": null}), true, "title"),
            (json!({"title": "a", "bogus": 1}), false, "bogus"),
            (json!({"title": "a", "views": 1.5}), false, "views"),
            (json!([1, 2]), false, "body"),
        ];
        for (body, partial, expected) in cases {
            let err = validate_write(&resolved, &body, partial).unwrap_err();
            assert!(
                matches!(&err, AppError::Validation { field, .. } if field == expected),
                "{body} -> {err:?}"
            );
        }

        // PATCH may omit required fields
        assert!(validate_write(&resolved, &json!({"views": 2}), true).is_ok());
    }
}
