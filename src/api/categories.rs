use crate::api::client::ApiClient;
use crate::api::models::{Category, CategoryCreate, CategoryUpdate, CategoryWithStats, Pagination};
use crate::error::ClientResult;
use crate::validation;

/// Category CRUD
#[derive(Clone)]
pub struct CategoriesApi {
    client: ApiClient,
}

impl CategoriesApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, page: &Pagination) -> ClientResult<Vec<Category>> {
        self.client.get_with("/categories/", page).await
    }

    pub async fn get(&self, id: &str) -> ClientResult<Category> {
        self.client.get(&format!("/categories/{}", id)).await
    }

    pub async fn create(&self, category: &CategoryCreate) -> ClientResult<Category> {
        validation::validate_category_create(category)?;
        self.client.post("/categories/", category).await
    }

    pub async fn update(&self, id: &str, update: &CategoryUpdate) -> ClientResult<Category> {
        validation::validate_category_update(update)?;
        self.client.put(&format!("/categories/{}", id), update).await
    }

    pub async fn delete(&self, id: &str) -> ClientResult<()> {
        self.client.delete(&format!("/categories/{}", id)).await
    }

    /// Categories with transaction counts and totals
    pub async fn with_stats(&self) -> ClientResult<Vec<CategoryWithStats>> {
        self.client.get("/categories/with-stats").await
    }
}
