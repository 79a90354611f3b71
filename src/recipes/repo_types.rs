use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// The two flat catalog entities. They share one shape and differ only in
/// where they are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Tag,
    Ingredient,
}

impl CatalogKind {
    pub(crate) fn table(self) -> &'static str {
        match self {
            CatalogKind::Tag => "tags",
            CatalogKind::Ingredient => "ingredients",
        }
    }

    /// Join table linking recipes to this kind, and its foreign key column.
    pub(crate) fn link(self) -> (&'static str, &'static str) {
        match self {
            CatalogKind::Tag => ("recipe_tags", "tag_id"),
            CatalogKind::Ingredient => ("recipe_ingredients", "ingredient_id"),
        }
    }

    /// Name of the recipe field that references this kind.
    pub fn field(self) -> &'static str {
        match self {
            CatalogKind::Tag => "tags",
            CatalogKind::Ingredient => "ingredients",
        }
    }
}

/// A tag or ingredient row. Serializes as `{id, name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct CatalogItem {
    pub id: i64,
    #[serde(skip)]
    pub user_id: Uuid,
    pub name: String,
}

pub type Tag = CatalogItem;
pub type Ingredient = CatalogItem;

/// Recipe with its relations as id sets. Serializes as the write form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipe {
    pub id: i64,
    #[serde(skip)]
    pub user_id: Uuid,
    pub title: String,
    pub ingredients: Vec<i64>,
    pub tags: Vec<i64>,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
}

/// Scalar columns of a recipe row.
#[derive(Debug, Clone, FromRow)]
pub struct RecipeRow {
    pub id: i64,
    pub user_id: Uuid,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
}

impl RecipeRow {
    pub fn into_recipe(self, ingredients: Vec<i64>, tags: Vec<i64>) -> Recipe {
        Recipe {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            ingredients,
            tags,
            time_minutes: self.time_minutes,
            price: self.price,
            link: self.link,
        }
    }
}

/// Validated recipe input, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeFields {
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
    pub ingredients: Vec<i64>,
    pub tags: Vec<i64>,
}

impl From<&Recipe> for RecipeFields {
    fn from(r: &Recipe) -> Self {
        Self {
            title: r.title.clone(),
            time_minutes: r.time_minutes,
            price: r.price,
            link: r.link.clone(),
            ingredients: r.ingredients.clone(),
            tags: r.tags.clone(),
        }
    }
}

/// Recipe list filter: a recipe matches when it references at least one of
/// the given ids for every filter that is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub tags: Option<Vec<i64>>,
    pub ingredients: Option<Vec<i64>>,
}

impl RecipeFilter {
    pub fn matches(&self, recipe: &Recipe) -> bool {
        let hit = |wanted: &Option<Vec<i64>>, have: &[i64]| match wanted {
            None => true,
            Some(ids) => ids.iter().any(|id| have.contains(id)),
        };
        hit(&self.tags, &recipe.tags) && hit(&self.ingredients, &recipe.ingredients)
    }
}
