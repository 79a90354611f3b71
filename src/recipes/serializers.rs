//! Wire representations of the catalog entities.
//!
//! Tags and ingredients are flat `{id, name}` objects whose `id` is
//! read-only. Recipes have two forms: the write form (also used for lists)
//! carries `ingredients`/`tags` as id lists that must reference existing rows
//! owned by the caller, and the detail form nests the referenced objects.
//! Both forms go through the same decoder.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::{ApiError, FieldErrors},
    recipes::{
        repo::CatalogStore,
        repo_types::{CatalogKind, Ingredient, Recipe, RecipeFields, Tag},
    },
    validation::{
        max_length_message, present, raw_text, required_text, MAX_TEXT_LEN, NULL, REQUIRED,
    },
};

pub const PRICE_MAX_DIGITS: u32 = 5;
pub const PRICE_DECIMAL_PLACES: u32 = 2;

/// Input for a tag or ingredient. An `id` in the body is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogItemPayload {
    #[serde(default, deserialize_with = "present")]
    pub name: Option<Value>,
}

/// Returns the validated name.
pub fn decode_item(payload: CatalogItemPayload) -> Result<String, ApiError> {
    let mut errors = FieldErrors::new();
    let name = required_text(&mut errors, "name", payload.name.as_ref(), MAX_TEXT_LEN);
    match name {
        Some(name) => Ok(name),
        None => Err(ApiError::Validation(errors)),
    }
}

/// Recipe input. Every field is checked by [`decode_recipe`] so that type
/// mismatches and `null` come back as field errors.
#[derive(Debug, Default, Deserialize)]
pub struct RecipePayload {
    #[serde(default, deserialize_with = "present")]
    pub title: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub time_minutes: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub price: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub link: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub ingredients: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub tags: Option<Value>,
}

/// Read form of a recipe with relations expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeDetail {
    pub id: i64,
    pub title: String,
    pub ingredients: Vec<Ingredient>,
    pub tags: Vec<Tag>,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn parse_minutes(value: &Value) -> Result<i32, String> {
    let n = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| "A valid integer is required.".to_string())?;

    if n < 0 {
        return Err("Ensure this value is greater than or equal to 0.".into());
    }
    i32::try_from(n).map_err(|_| format!("Ensure this value is less than or equal to {}.", i32::MAX))
}

/// Total digits and decimal places of `d`, counted the way they are written.
fn precision(d: &Decimal) -> (u32, u32) {
    let mantissa_digits = d.mantissa().unsigned_abs().to_string().len() as u32;
    let decimals = d.scale();
    (mantissa_digits.max(decimals), decimals)
}

fn parse_price(value: &Value) -> Result<Decimal, String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return Err("A valid number is required.".into()),
    };
    let mut price = Decimal::from_str(&text).map_err(|_| "A valid number is required.".to_string())?;

    let (digits, decimals) = precision(&price);
    if digits > PRICE_MAX_DIGITS {
        return Err(format!(
            "Ensure that there are no more than {PRICE_MAX_DIGITS} digits in total."
        ));
    }
    if decimals > PRICE_DECIMAL_PLACES {
        return Err(format!(
            "Ensure that there are no more than {PRICE_DECIMAL_PLACES} decimal places."
        ));
    }
    let whole = PRICE_MAX_DIGITS - PRICE_DECIMAL_PLACES;
    if digits - decimals > whole {
        return Err(format!(
            "Ensure that there are no more than {whole} digits before the decimal point."
        ));
    }
    price.rescale(PRICE_DECIMAL_PLACES);
    Ok(price)
}

/// Sorted, de-duplicated primary keys.
fn parse_ids(value: &Value) -> Result<Vec<i64>, Vec<String>> {
    let Value::Array(items) = value else {
        return Err(vec![format!(
            "Expected a list of items but got type \"{}\".",
            json_type(value)
        )]);
    };
    let mut ids = Vec::with_capacity(items.len());
    let mut errors = Vec::new();
    for item in items {
        let id = match item {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        match id {
            Some(id) => ids.push(id),
            None => errors.push(format!(
                "Incorrect type. Expected pk value, received {}.",
                json_type(item)
            )),
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

/// Resolve a field that is either supplied, inherited from `current` on a
/// partial update, or missing.
fn resolve<T>(
    errors: &mut FieldErrors,
    field: &str,
    supplied: Option<&Value>,
    current: Option<T>,
    parse: impl FnOnce(&Value) -> Result<T, String>,
) -> Option<T> {
    match (supplied, current) {
        (Some(Value::Null), _) => {
            errors.add(field, NULL);
            None
        }
        (Some(v), _) => match parse(v) {
            Ok(t) => Some(t),
            Err(msg) => {
                errors.add(field, msg);
                None
            }
        },
        (None, Some(t)) => Some(t),
        (None, None) => {
            errors.add(field, REQUIRED);
            None
        }
    }
}

async fn check_references(
    store: &dyn CatalogStore,
    user_id: Uuid,
    kind: CatalogKind,
    ids: &[i64],
    errors: &mut FieldErrors,
) -> anyhow::Result<()> {
    let found = store.items_by_ids(kind, user_id, ids).await?;
    for id in ids {
        if !found.iter().any(|item| item.id == *id) {
            errors.add(
                kind.field(),
                format!("Invalid pk \"{id}\" - object does not exist."),
            );
        }
    }
    Ok(())
}

/// Validate a recipe body into writable fields.
///
/// With `current` set, the body is a partial update: omitted fields keep the
/// stored value. Every error found is reported together.
pub async fn decode_recipe(
    store: &dyn CatalogStore,
    user_id: Uuid,
    payload: RecipePayload,
    current: Option<&Recipe>,
) -> Result<RecipeFields, ApiError> {
    let mut errors = FieldErrors::new();

    let title = match (payload.title.as_ref(), current) {
        (None, Some(c)) => Some(c.title.clone()),
        (title, _) => required_text(&mut errors, "title", title, MAX_TEXT_LEN),
    };
    let time_minutes = resolve(
        &mut errors,
        "time_minutes",
        payload.time_minutes.as_ref(),
        current.map(|c| c.time_minutes),
        parse_minutes,
    );
    let price = resolve(
        &mut errors,
        "price",
        payload.price.as_ref(),
        current.map(|c| c.price),
        parse_price,
    );

    let link = match payload.link.as_ref() {
        Some(value) => raw_text(&mut errors, "link", value).map(|link| {
            let link = link.trim().to_string();
            if link.chars().count() > MAX_TEXT_LEN {
                errors.add("link", max_length_message(MAX_TEXT_LEN));
            }
            link
        }),
        None => Some(current.map(|c| c.link.clone()).unwrap_or_default()),
    };

    let mut relations = Vec::with_capacity(2);
    for (kind, supplied, existing) in [
        (
            CatalogKind::Ingredient,
            payload.ingredients.as_ref(),
            current.map(|c| c.ingredients.clone()),
        ),
        (
            CatalogKind::Tag,
            payload.tags.as_ref(),
            current.map(|c| c.tags.clone()),
        ),
    ] {
        let ids = match (supplied, existing) {
            (Some(Value::Null), _) => {
                errors.add(kind.field(), NULL);
                None
            }
            (Some(v), _) => match parse_ids(v) {
                Ok(ids) => {
                    check_references(store, user_id, kind, &ids, &mut errors).await?;
                    Some(ids)
                }
                Err(msgs) => {
                    for msg in msgs {
                        errors.add(kind.field(), msg);
                    }
                    None
                }
            },
            (None, Some(ids)) => Some(ids),
            (None, None) => {
                errors.add(kind.field(), REQUIRED);
                None
            }
        };
        relations.push(ids);
    }
    let tags = relations.pop().flatten();
    let ingredients = relations.pop().flatten();

    let (Some(title), Some(time_minutes), Some(price), Some(link), Some(ingredients), Some(tags)) =
        (title, time_minutes, price, link, ingredients, tags)
    else {
        return Err(ApiError::Validation(errors));
    };
    errors.into_result()?;
    Ok(RecipeFields {
        title,
        time_minutes,
        price,
        link,
        ingredients,
        tags,
    })
}

/// Expand a recipe's relations into nested objects.
pub async fn encode_detail(
    store: &dyn CatalogStore,
    recipe: Recipe,
) -> anyhow::Result<RecipeDetail> {
    let ingredients = store
        .items_by_ids(CatalogKind::Ingredient, recipe.user_id, &recipe.ingredients)
        .await?;
    let tags = store
        .items_by_ids(CatalogKind::Tag, recipe.user_id, &recipe.tags)
        .await?;
    Ok(RecipeDetail {
        id: recipe.id,
        title: recipe.title,
        ingredients,
        tags,
        time_minutes: recipe.time_minutes,
        price: recipe.price,
        link: recipe.link,
    })
}
