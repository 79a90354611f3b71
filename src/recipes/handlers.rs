use axum::{
    extract::{Query, State},
    http::{header, HeaderName, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, ApiJson},
    recipes::{
        dto::{RecipeId, RecipeQuery},
        repo_types::{CatalogItem, CatalogKind, Recipe, RecipeFilter},
        serializers::{
            decode_item, decode_recipe, encode_detail, CatalogItemPayload, RecipeDetail,
            RecipePayload,
        },
    },
    state::AppState,
};

pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/recipe/tags", get(list_tags).post(create_tag))
        .route(
            "/recipe/ingredients",
            get(list_ingredients).post(create_ingredient),
        )
}

pub fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/recipe/recipes", get(list_recipes).post(create_recipe))
        .route(
            "/recipe/recipes/:id",
            get(get_recipe)
                .put(update_recipe)
                .patch(partial_update_recipe)
                .delete(delete_recipe),
        )
}

// --- tags & ingredients ---

async fn list_items(
    state: &AppState,
    user_id: uuid::Uuid,
    kind: CatalogKind,
) -> Result<Json<Vec<CatalogItem>>, ApiError> {
    let items = state.catalog.list_items(kind, user_id).await?;
    Ok(Json(items))
}

async fn create_item(
    state: &AppState,
    user_id: uuid::Uuid,
    kind: CatalogKind,
    payload: CatalogItemPayload,
) -> Result<(StatusCode, Json<CatalogItem>), ApiError> {
    let name = decode_item(payload)?;
    let item = state.catalog.create_item(kind, user_id, &name).await?;
    info!(%user_id, id = item.id, kind = ?kind, "catalog item created");
    Ok((StatusCode::CREATED, Json(item)))
}

#[instrument(skip(state))]
pub async fn list_tags(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<CatalogItem>>, ApiError> {
    list_items(&state, user_id, CatalogKind::Tag).await
}

#[instrument(skip(state, payload))]
pub async fn create_tag(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<CatalogItemPayload>,
) -> Result<(StatusCode, Json<CatalogItem>), ApiError> {
    create_item(&state, user_id, CatalogKind::Tag, payload).await
}

#[instrument(skip(state))]
pub async fn list_ingredients(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<CatalogItem>>, ApiError> {
    list_items(&state, user_id, CatalogKind::Ingredient).await
}

#[instrument(skip(state, payload))]
pub async fn create_ingredient(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<CatalogItemPayload>,
) -> Result<(StatusCode, Json<CatalogItem>), ApiError> {
    create_item(&state, user_id, CatalogKind::Ingredient, payload).await
}

// --- recipes ---

#[instrument(skip(state))]
pub async fn list_recipes(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<RecipeQuery>,
) -> Result<Json<Vec<Recipe>>, ApiError> {
    let filter = RecipeFilter::try_from(query)?;
    let recipes = state.catalog.list_recipes(user_id, &filter).await?;
    Ok(Json(recipes))
}

#[instrument(skip(state, payload))]
pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<RecipePayload>,
) -> Result<(StatusCode, [(HeaderName, String); 1], Json<Recipe>), ApiError> {
    let fields = decode_recipe(state.catalog.as_ref(), user_id, payload, None).await?;
    let recipe = state.catalog.create_recipe(user_id, &fields).await?;
    info!(%user_id, recipe_id = recipe.id, "recipe created");
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/recipe/recipes/{}", recipe.id))],
        Json(recipe),
    ))
}

async fn owned_recipe(state: &AppState, user_id: uuid::Uuid, id: i64) -> Result<Recipe, ApiError> {
    state
        .catalog
        .get_recipe(user_id, id)
        .await?
        .ok_or(ApiError::NotFound)
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    RecipeId(id): RecipeId,
) -> Result<Json<RecipeDetail>, ApiError> {
    let recipe = owned_recipe(&state, user_id, id).await?;
    let detail = encode_detail(state.catalog.as_ref(), recipe).await?;
    Ok(Json(detail))
}

#[instrument(skip(state, payload))]
pub async fn update_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    RecipeId(id): RecipeId,
    ApiJson(payload): ApiJson<RecipePayload>,
) -> Result<Json<Recipe>, ApiError> {
    owned_recipe(&state, user_id, id).await?;
    let fields = decode_recipe(state.catalog.as_ref(), user_id, payload, None).await?;
    let recipe = state
        .catalog
        .update_recipe(user_id, id, &fields)
        .await?
        .ok_or(ApiError::NotFound)?;
    info!(%user_id, recipe_id = id, "recipe replaced");
    Ok(Json(recipe))
}

#[instrument(skip(state, payload))]
pub async fn partial_update_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    RecipeId(id): RecipeId,
    ApiJson(payload): ApiJson<RecipePayload>,
) -> Result<Json<Recipe>, ApiError> {
    let current = owned_recipe(&state, user_id, id).await?;
    let fields = decode_recipe(state.catalog.as_ref(), user_id, payload, Some(&current)).await?;
    let recipe = state
        .catalog
        .update_recipe(user_id, id, &fields)
        .await?
        .ok_or(ApiError::NotFound)?;
    info!(%user_id, recipe_id = id, "recipe updated");
    Ok(Json(recipe))
}

#[instrument(skip(state))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    RecipeId(id): RecipeId,
) -> Result<StatusCode, ApiError> {
    if !state.catalog.delete_recipe(user_id, id).await? {
        return Err(ApiError::NotFound);
    }
    info!(%user_id, recipe_id = id, "recipe deleted");
    Ok(StatusCode::NO_CONTENT)
}
