use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::recipes::repo_types::{
    CatalogItem, CatalogKind, Recipe, RecipeFields, RecipeFilter, RecipeRow,
};

/// Persistence for tags, ingredients and recipes. Every call is scoped to
/// the owning user.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Items owned by `user_id`, ordered by name descending.
    async fn list_items(&self, kind: CatalogKind, user_id: Uuid)
        -> anyhow::Result<Vec<CatalogItem>>;

    async fn create_item(
        &self,
        kind: CatalogKind,
        user_id: Uuid,
        name: &str,
    ) -> anyhow::Result<CatalogItem>;

    /// The subset of `ids` that exist and belong to `user_id`, ordered by id.
    async fn items_by_ids(
        &self,
        kind: CatalogKind,
        user_id: Uuid,
        ids: &[i64],
    ) -> anyhow::Result<Vec<CatalogItem>>;

    /// Recipes owned by `user_id`, newest first.
    async fn list_recipes(
        &self,
        user_id: Uuid,
        filter: &RecipeFilter,
    ) -> anyhow::Result<Vec<Recipe>>;

    async fn get_recipe(&self, user_id: Uuid, id: i64) -> anyhow::Result<Option<Recipe>>;

    async fn create_recipe(&self, user_id: Uuid, fields: &RecipeFields) -> anyhow::Result<Recipe>;

    /// Overwrite every field of a recipe. `None` if it does not exist for this user.
    async fn update_recipe(
        &self,
        user_id: Uuid,
        id: i64,
        fields: &RecipeFields,
    ) -> anyhow::Result<Option<Recipe>>;

    /// `false` if nothing was deleted.
    async fn delete_recipe(&self, user_id: Uuid, id: i64) -> anyhow::Result<bool>;
}

/// PostgreSQL-backed catalog store.
#[derive(Clone)]
pub struct PgCatalogStore {
    db: PgPool,
}

impl PgCatalogStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn load_links(
        &self,
        kind: CatalogKind,
        recipe_ids: &[i64],
    ) -> anyhow::Result<HashMap<i64, Vec<i64>>> {
        let (table, column) = kind.link();
        let sql = format!(
            "SELECT recipe_id, {column} FROM {table} WHERE recipe_id = ANY($1) ORDER BY {column}"
        );
        let rows = sqlx::query_as::<_, (i64, i64)>(&sql)
            .bind(recipe_ids)
            .fetch_all(&self.db)
            .await
            .with_context(|| format!("load {table}"))?;

        let mut links: HashMap<i64, Vec<i64>> = HashMap::new();
        for (recipe_id, item_id) in rows {
            links.entry(recipe_id).or_default().push(item_id);
        }
        Ok(links)
    }

    async fn attach_links(&self, rows: Vec<RecipeRow>) -> anyhow::Result<Vec<Recipe>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut ingredients = self.load_links(CatalogKind::Ingredient, &ids).await?;
        let mut tags = self.load_links(CatalogKind::Tag, &ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let i = ingredients.remove(&row.id).unwrap_or_default();
                let t = tags.remove(&row.id).unwrap_or_default();
                row.into_recipe(i, t)
            })
            .collect())
    }
}

/// Replace the relation set of one kind for a recipe inside `tx`.
async fn replace_links(
    tx: &mut Transaction<'_, Postgres>,
    kind: CatalogKind,
    recipe_id: i64,
    ids: &[i64],
) -> anyhow::Result<()> {
    let (table, column) = kind.link();
    sqlx::query(&format!("DELETE FROM {table} WHERE recipe_id = $1"))
        .bind(recipe_id)
        .execute(&mut **tx)
        .await
        .with_context(|| format!("clear {table}"))?;

    if !ids.is_empty() {
        sqlx::query(&format!(
            "INSERT INTO {table} (recipe_id, {column}) SELECT $1, UNNEST($2::BIGINT[])"
        ))
        .bind(recipe_id)
        .bind(ids)
        .execute(&mut **tx)
        .await
        .with_context(|| format!("insert {table}"))?;
    }
    Ok(())
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn list_items(
        &self,
        kind: CatalogKind,
        user_id: Uuid,
    ) -> anyhow::Result<Vec<CatalogItem>> {
        let sql = format!(
            "SELECT id, user_id, name FROM {} WHERE user_id = $1 ORDER BY name DESC, id DESC",
            kind.table()
        );
        let rows = sqlx::query_as::<_, CatalogItem>(&sql)
            .bind(user_id)
            .fetch_all(&self.db)
            .await
            .with_context(|| format!("list {}", kind.table()))?;
        Ok(rows)
    }

    async fn create_item(
        &self,
        kind: CatalogKind,
        user_id: Uuid,
        name: &str,
    ) -> anyhow::Result<CatalogItem> {
        let sql = format!(
            "INSERT INTO {} (user_id, name) VALUES ($1, $2) RETURNING id, user_id, name",
            kind.table()
        );
        let item = sqlx::query_as::<_, CatalogItem>(&sql)
            .bind(user_id)
            .bind(name)
            .fetch_one(&self.db)
            .await
            .with_context(|| format!("insert into {}", kind.table()))?;
        Ok(item)
    }

    async fn items_by_ids(
        &self,
        kind: CatalogKind,
        user_id: Uuid,
        ids: &[i64],
    ) -> anyhow::Result<Vec<CatalogItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, user_id, name FROM {} WHERE user_id = $1 AND id = ANY($2) ORDER BY id",
            kind.table()
        );
        let rows = sqlx::query_as::<_, CatalogItem>(&sql)
            .bind(user_id)
            .bind(ids)
            .fetch_all(&self.db)
            .await
            .with_context(|| format!("lookup {}", kind.table()))?;
        Ok(rows)
    }

    async fn list_recipes(
        &self,
        user_id: Uuid,
        filter: &RecipeFilter,
    ) -> anyhow::Result<Vec<Recipe>> {
        let rows = sqlx::query_as::<_, RecipeRow>(
            r#"
            SELECT r.id, r.user_id, r.title, r.time_minutes, r.price, r.link
              FROM recipes r
             WHERE r.user_id = $1
               AND ($2::BIGINT[] IS NULL OR EXISTS (
                    SELECT 1 FROM recipe_tags rt
                     WHERE rt.recipe_id = r.id AND rt.tag_id = ANY($2)))
               AND ($3::BIGINT[] IS NULL OR EXISTS (
                    SELECT 1 FROM recipe_ingredients ri
                     WHERE ri.recipe_id = r.id AND ri.ingredient_id = ANY($3)))
             ORDER BY r.id DESC
            "#,
        )
        .bind(user_id)
        .bind(filter.tags.as_deref())
        .bind(filter.ingredients.as_deref())
        .fetch_all(&self.db)
        .await
        .context("list recipes")?;

        self.attach_links(rows).await
    }

    async fn get_recipe(&self, user_id: Uuid, id: i64) -> anyhow::Result<Option<Recipe>> {
        let row = sqlx::query_as::<_, RecipeRow>(
            r#"
            SELECT id, user_id, title, time_minutes, price, link
              FROM recipes
             WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("get recipe")?;

        match row {
            Some(row) => Ok(self.attach_links(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn create_recipe(&self, user_id: Uuid, fields: &RecipeFields) -> anyhow::Result<Recipe> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let row = sqlx::query_as::<_, RecipeRow>(
            r#"
            INSERT INTO recipes (user_id, title, time_minutes, price, link)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, title, time_minutes, price, link
            "#,
        )
        .bind(user_id)
        .bind(&fields.title)
        .bind(fields.time_minutes)
        .bind(fields.price)
        .bind(&fields.link)
        .fetch_one(&mut *tx)
        .await
        .context("insert recipe")?;

        replace_links(&mut tx, CatalogKind::Ingredient, row.id, &fields.ingredients).await?;
        replace_links(&mut tx, CatalogKind::Tag, row.id, &fields.tags).await?;
        tx.commit().await.context("commit tx")?;

        Ok(row.into_recipe(fields.ingredients.clone(), fields.tags.clone()))
    }

    async fn update_recipe(
        &self,
        user_id: Uuid,
        id: i64,
        fields: &RecipeFields,
    ) -> anyhow::Result<Option<Recipe>> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let row = sqlx::query_as::<_, RecipeRow>(
            r#"
            UPDATE recipes
               SET title = $3, time_minutes = $4, price = $5, link = $6
             WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, title, time_minutes, price, link
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&fields.title)
        .bind(fields.time_minutes)
        .bind(fields.price)
        .bind(&fields.link)
        .fetch_optional(&mut *tx)
        .await
        .context("update recipe")?;

        let Some(row) = row else {
            return Ok(None);
        };
        replace_links(&mut tx, CatalogKind::Ingredient, row.id, &fields.ingredients).await?;
        replace_links(&mut tx, CatalogKind::Tag, row.id, &fields.tags).await?;
        tx.commit().await.context("commit tx")?;

        Ok(Some(
            row.into_recipe(fields.ingredients.clone(), fields.tags.clone()),
        ))
    }

    async fn delete_recipe(&self, user_id: Uuid, id: i64) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM recipes WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("delete recipe")?;
        Ok(res.rows_affected() > 0)
    }
}
