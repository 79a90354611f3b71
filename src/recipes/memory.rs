use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::repo::CatalogStore;
use super::repo_types::{CatalogItem, CatalogKind, Recipe, RecipeFields, RecipeFilter};

#[derive(Default)]
struct Tables {
    next_id: i64,
    tags: BTreeMap<i64, CatalogItem>,
    ingredients: BTreeMap<i64, CatalogItem>,
    recipes: BTreeMap<i64, Recipe>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn items(&self, kind: CatalogKind) -> &BTreeMap<i64, CatalogItem> {
        match kind {
            CatalogKind::Tag => &self.tags,
            CatalogKind::Ingredient => &self.ingredients,
        }
    }

    fn items_mut(&mut self, kind: CatalogKind) -> &mut BTreeMap<i64, CatalogItem> {
        match kind {
            CatalogKind::Tag => &mut self.tags,
            CatalogKind::Ingredient => &mut self.ingredients,
        }
    }
}

/// In-memory catalog store, used by tests and when no database is configured.
#[derive(Default)]
pub struct MemoryCatalogStore {
    tables: Mutex<Tables>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> anyhow::Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow::anyhow!("catalog store lock poisoned"))
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn list_items(
        &self,
        kind: CatalogKind,
        user_id: Uuid,
    ) -> anyhow::Result<Vec<CatalogItem>> {
        let tables = self.tables()?;
        let mut items: Vec<CatalogItem> = tables
            .items(kind)
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.name.cmp(&a.name).then(b.id.cmp(&a.id)));
        Ok(items)
    }

    async fn create_item(
        &self,
        kind: CatalogKind,
        user_id: Uuid,
        name: &str,
    ) -> anyhow::Result<CatalogItem> {
        let mut tables = self.tables()?;
        let item = CatalogItem {
            id: tables.next_id(),
            user_id,
            name: name.to_string(),
        };
        tables.items_mut(kind).insert(item.id, item.clone());
        Ok(item)
    }

    async fn items_by_ids(
        &self,
        kind: CatalogKind,
        user_id: Uuid,
        ids: &[i64],
    ) -> anyhow::Result<Vec<CatalogItem>> {
        let tables = self.tables()?;
        Ok(tables
            .items(kind)
            .values()
            .filter(|i| i.user_id == user_id && ids.contains(&i.id))
            .cloned()
            .collect())
    }

    async fn list_recipes(
        &self,
        user_id: Uuid,
        filter: &RecipeFilter,
    ) -> anyhow::Result<Vec<Recipe>> {
        let tables = self.tables()?;
        Ok(tables
            .recipes
            .values()
            .rev()
            .filter(|r| r.user_id == user_id && filter.matches(r))
            .cloned()
            .collect())
    }

    async fn get_recipe(&self, user_id: Uuid, id: i64) -> anyhow::Result<Option<Recipe>> {
        let tables = self.tables()?;
        Ok(tables
            .recipes
            .get(&id)
            .filter(|r| r.user_id == user_id)
            .cloned())
    }

    async fn create_recipe(&self, user_id: Uuid, fields: &RecipeFields) -> anyhow::Result<Recipe> {
        let mut tables = self.tables()?;
        let recipe = Recipe {
            id: tables.next_id(),
            user_id,
            title: fields.title.clone(),
            ingredients: fields.ingredients.clone(),
            tags: fields.tags.clone(),
            time_minutes: fields.time_minutes,
            price: fields.price,
            link: fields.link.clone(),
        };
        tables.recipes.insert(recipe.id, recipe.clone());
        Ok(recipe)
    }

    async fn update_recipe(
        &self,
        user_id: Uuid,
        id: i64,
        fields: &RecipeFields,
    ) -> anyhow::Result<Option<Recipe>> {
        let mut tables = self.tables()?;
        let Some(recipe) = tables
            .recipes
            .get_mut(&id)
            .filter(|r| r.user_id == user_id)
        else {
            return Ok(None);
        };
        recipe.title = fields.title.clone();
        recipe.time_minutes = fields.time_minutes;
        recipe.price = fields.price;
        recipe.link = fields.link.clone();
        recipe.ingredients = fields.ingredients.clone();
        recipe.tags = fields.tags.clone();
        Ok(Some(recipe.clone()))
    }

    async fn delete_recipe(&self, user_id: Uuid, id: i64) -> anyhow::Result<bool> {
        let mut tables = self.tables()?;
        let owned = tables
            .recipes
            .get(&id)
            .is_some_and(|r| r.user_id == user_id);
        if owned {
            tables.recipes.remove(&id);
        }
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn fields(tags: Vec<i64>) -> RecipeFields {
        RecipeFields {
            title: "Soup".into(),
            time_minutes: 10,
            price: Decimal::new(500, 2),
            link: String::new(),
            ingredients: vec![],
            tags,
        }
    }

    #[tokio::test]
    async fn items_are_scoped_to_owner_and_sorted() {
        let store = MemoryCatalogStore::new();
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        store.create_item(CatalogKind::Tag, me, "Dessert").await.unwrap();
        store.create_item(CatalogKind::Tag, me, "Vegan").await.unwrap();
        store.create_item(CatalogKind::Tag, other, "Fruity").await.unwrap();

        let names: Vec<String> = store
            .list_items(CatalogKind::Tag, me)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["Vegan", "Dessert"]);
        assert!(store
            .list_items(CatalogKind::Ingredient, me)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn recipes_of_other_users_are_invisible() {
        let store = MemoryCatalogStore::new();
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let recipe = store.create_recipe(other, &fields(vec![])).await.unwrap();

        assert!(store.get_recipe(me, recipe.id).await.unwrap().is_none());
        assert!(store
            .update_recipe(me, recipe.id, &fields(vec![]))
            .await
            .unwrap()
            .is_none());
        assert!(!store.delete_recipe(me, recipe.id).await.unwrap());
        assert!(store.delete_recipe(other, recipe.id).await.unwrap());
    }

    #[tokio::test]
    async fn list_recipes_newest_first_and_filtered() {
        let store = MemoryCatalogStore::new();
        let me = Uuid::new_v4();
        let first = store.create_recipe(me, &fields(vec![1])).await.unwrap();
        let second = store.create_recipe(me, &fields(vec![2])).await.unwrap();

        let all = store
            .list_recipes(me, &RecipeFilter::default())
            .await
            .unwrap();
        assert_eq!(
            all.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );

        let filtered = store
            .list_recipes(
                me,
                &RecipeFilter {
                    tags: Some(vec![1]),
                    ingredients: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(filtered, vec![first]);
    }
}
