use crate::api::client::ApiClient;
use crate::api::models::{
    Budget, BudgetAlert, BudgetCreate, BudgetProgress, BudgetProgressFilters, BudgetUpdate,
    Pagination,
};
use crate::error::ClientResult;
use crate::validation;

/// Budget CRUD, progress and alerts
#[derive(Clone)]
pub struct BudgetsApi {
    client: ApiClient,
}

impl BudgetsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, page: &Pagination) -> ClientResult<Vec<Budget>> {
        self.client.get_with("/budgets/", page).await
    }

    pub async fn get(&self, id: &str) -> ClientResult<Budget> {
        self.client.get(&format!("/budgets/{}", id)).await
    }

    pub async fn create(&self, budget: &BudgetCreate) -> ClientResult<Budget> {
        validation::validate_budget_create(budget)?;
        self.client.post("/budgets/", budget).await
    }

    pub async fn update(&self, id: &str, update: &BudgetUpdate) -> ClientResult<Budget> {
        validation::validate_budget_update(update)?;
        self.client.put(&format!("/budgets/{}", id), update).await
    }

    pub async fn delete(&self, id: &str) -> ClientResult<()> {
        self.client.delete(&format!("/budgets/{}", id)).await
    }

    pub async fn progress(&self, filters: &BudgetProgressFilters) -> ClientResult<Vec<BudgetProgress>> {
        self.client.get_with("/budgets/progress", filters).await
    }

    /// Budgets whose period covers today
    pub async fn active(&self) -> ClientResult<Vec<Budget>> {
        self.client.get("/budgets/active").await
    }

    /// Over-budget warnings
    pub async fn alerts(&self) -> ClientResult<Vec<BudgetAlert>> {
        self.client.get("/budgets/alerts").await
    }
}
