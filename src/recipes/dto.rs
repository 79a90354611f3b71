use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use serde::Deserialize;

use crate::{
    error::{ApiError, FieldErrors},
    recipes::repo_types::RecipeFilter,
};

/// `:id` segment of a recipe URL. Anything that is not an id cannot name a
/// recipe, so it is rejected as 404 rather than 400.
#[derive(Debug, Clone, Copy)]
pub struct RecipeId(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for RecipeId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::NotFound)?;
        raw.parse().map(RecipeId).map_err(|_| ApiError::NotFound)
    }
}

/// `?tags=1,2&ingredients=3` on the recipe list.
#[derive(Debug, Default, Deserialize)]
pub struct RecipeQuery {
    pub tags: Option<String>,
    pub ingredients: Option<String>,
}

fn parse_id_list(errors: &mut FieldErrors, field: &str, raw: Option<&str>) -> Option<Vec<i64>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse::<i64>() {
            Ok(id) => ids.push(id),
            Err(_) => {
                errors.add(field, format!("\"{part}\" is not a valid id."));
                return None;
            }
        }
    }
    Some(ids)
}

impl TryFrom<RecipeQuery> for RecipeFilter {
    type Error = ApiError;

    fn try_from(q: RecipeQuery) -> Result<Self, Self::Error> {
        let mut errors = FieldErrors::new();
        let tags = parse_id_list(&mut errors, "tags", q.tags.as_deref());
        let ingredients = parse_id_list(&mut errors, "ingredients", q.ingredients.as_deref());
        errors.into_result()?;
        Ok(RecipeFilter { tags, ingredients })
    }
}
