//! Entity handlers: list, read, create, update, soft delete, restore, dependents.
//! Every handler goes through the lifecycle gate; none of them touches the store directly.

use crate::case::{to_camel_case, to_snake_case};
use crate::error::AppError;
use crate::extractors::ActingUser;
use crate::model::{Catalog, EntityKind};
use crate::record::{Filter, ListQuery, Visibility};
use crate::response::{records, success_many, success_one, success_one_ok};
use crate::service::RequestValidator;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

const SUBSTRING_PREFIX: &str = "q_";

fn parse_kind(segment: &str) -> Result<EntityKind, AppError> {
    EntityKind::from_path(segment).ok_or_else(|| AppError::UnknownEntity(segment.to_string()))
}

fn parse_id(id_str: &str) -> Result<i64, AppError> {
    id_str
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid id '{}'", id_str)))
}

fn body_to_map(value: Value) -> Result<Map<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

fn parse_visibility(raw: Option<&str>) -> Result<Visibility, AppError> {
    match raw {
        None => Ok(Visibility::Active),
        Some(s) => Visibility::parse(s)
            .ok_or_else(|| AppError::BadRequest(format!("include must be active, archived or all, got '{}'", s))),
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u32, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("{} must be a non-negative integer", key)))
}

/// Turn query-string pairs into a [`ListQuery`]. Keys may be camelCase or snake_case;
/// `q_<field>` asks for a case-insensitive substring match.
fn list_query(catalog: &Catalog, kind: EntityKind, params: &[(String, String)]) -> Result<ListQuery, AppError> {
    let entity = catalog
        .entity(kind)
        .ok_or_else(|| AppError::UnknownEntity(kind.to_string()))?;
    let mut query = ListQuery::with_visibility(parse_visibility(
        params.iter().find(|(k, _)| k == "include").map(|(_, v)| v.as_str()),
    )?);
    for (k, v) in params {
        match k.as_str() {
            "include" => {}
            "limit" => query.limit = Some(parse_number(k, v)?),
            "offset" => query.offset = Some(parse_number(k, v)?),
            _ => {
                if let Some(field) = k.strip_prefix(SUBSTRING_PREFIX) {
                    query = query.filter(Filter::Contains(to_snake_case(field), v.clone()));
                    continue;
                }
                let column = to_snake_case(k);
                let field = entity.field(&column).ok_or_else(|| {
                    AppError::Validation(format!("unknown filter field '{}' for {}", k, kind))
                })?;
                let value = RequestValidator::filter_value(entity, field, v)?;
                query = query.filter(Filter::Eq(column, value));
            }
        }
    }
    Ok(query)
}

pub async fn list(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&path_segment)?;
    let query = list_query(&state.catalog, kind, &params)?;
    let rows = state.lifecycle().list(kind, &query).await?;
    Ok(records(&rows))
}

pub async fn read(
    State(state): State<AppState>,
    Path((path_segment, id)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&path_segment)?;
    let id = parse_id(&id)?;
    let visibility = parse_visibility(params.iter().find(|(k, _)| k == "include").map(|(_, v)| v.as_str()))?;
    let record = state.lifecycle().get(kind, id, visibility).await?;
    Ok(success_one_ok(record.to_api_json()))
}

pub async fn create(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&path_segment)?;
    let record = state.lifecycle().create(kind, body_to_map(body)?).await?;
    Ok(success_one(record.to_api_json()))
}

pub async fn update(
    State(state): State<AppState>,
    Path((path_segment, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&path_segment)?;
    let id = parse_id(&id)?;
    let record = state.lifecycle().update(kind, id, body_to_map(body)?).await?;
    Ok(success_one_ok(record.to_api_json()))
}

/// Soft delete. Returns the archived record.
pub async fn delete(
    State(state): State<AppState>,
    Path((path_segment, id)): Path<(String, String)>,
    ActingUser(actor): ActingUser,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&path_segment)?;
    let id = parse_id(&id)?;
    let record = state.lifecycle().soft_delete(kind, id, actor).await?;
    Ok(success_one_ok(record.to_api_json()))
}

pub async fn restore(
    State(state): State<AppState>,
    Path((path_segment, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&path_segment)?;
    let id = parse_id(&id)?;
    let record = state.lifecycle().restore(kind, id).await?;
    Ok(success_one_ok(record.to_api_json()))
}

/// The user recorded as `deletedBy`, or `null` when unset or no longer present.
pub async fn deleted_by(
    State(state): State<AppState>,
    Path((path_segment, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&path_segment)?;
    let id = parse_id(&id)?;
    let user = state.lifecycle().deleted_by_user(kind, id).await?;
    Ok(success_one_ok(user.map(|u| u.to_api_json()).unwrap_or(Value::Null)))
}

pub async fn dependents(
    State(state): State<AppState>,
    Path((path_segment, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&path_segment)?;
    let id = parse_id(&id)?;
    let groups = state.lifecycle().dependents(kind, id).await?;
    let data: Vec<Value> = groups
        .iter()
        .map(|g| {
            json!({
                "entity": g.relation.from.table(),
                "column": to_camel_case(&g.relation.column),
                "role": g.relation.role,
                "count": g.records.len(),
                "records": g.records.iter().map(|r| r.to_api_json()).collect::<Vec<_>>(),
            })
        })
        .collect();
    Ok(success_many(data))
}
