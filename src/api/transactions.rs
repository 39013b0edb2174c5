use serde::Serialize;
use tracing::debug;

use crate::api::client::ApiClient;
use crate::api::models::{
    CategorySpending, DateRange, MonthlySpending, Transaction, TransactionCreate,
    TransactionFilters, TransactionStats, TransactionUpdate,
};
use crate::error::ClientResult;
use crate::validation;

#[derive(Serialize)]
struct YearQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    year: Option<i32>,
}

/// Transaction CRUD and spending analytics
#[derive(Clone)]
pub struct TransactionsApi {
    client: ApiClient,
}

impl TransactionsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, filters: &TransactionFilters) -> ClientResult<Vec<Transaction>> {
        let transactions: Vec<Transaction> =
            self.client.get_with("/transactions/", filters).await?;
        debug!(count = transactions.len(), "Fetched transactions");
        Ok(transactions)
    }

    pub async fn get(&self, id: &str) -> ClientResult<Transaction> {
        self.client.get(&format!("/transactions/{}", id)).await
    }

    pub async fn create(&self, transaction: &TransactionCreate) -> ClientResult<Transaction> {
        validation::validate_transaction_create(transaction)?;
        self.client.post("/transactions/", transaction).await
    }

    pub async fn update(&self, id: &str, update: &TransactionUpdate) -> ClientResult<Transaction> {
        validation::validate_transaction_update(update)?;
        self.client.put(&format!("/transactions/{}", id), update).await
    }

    pub async fn delete(&self, id: &str) -> ClientResult<()> {
        self.client.delete(&format!("/transactions/{}", id)).await
    }

    /// Income, expense and net totals over an optional window
    pub async fn stats(&self, range: &DateRange) -> ClientResult<TransactionStats> {
        self.client.get_with("/transactions/stats", range).await
    }

    pub async fn spending_by_category(&self, range: &DateRange) -> ClientResult<Vec<CategorySpending>> {
        self.client
            .get_with("/transactions/spending-by-category", range)
            .await
    }

    /// Month-by-month totals, for the current year when `year` is `None`
    pub async fn monthly_spending(&self, year: Option<i32>) -> ClientResult<Vec<MonthlySpending>> {
        self.client
            .get_with("/transactions/monthly-spending", &YearQuery { year })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http_client::mock::MockHttpClient;
    use crate::api::models::TransactionType;
    use crate::auth::storage::TokenStore;
    use crate::error::ClientError;
    use http::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn api(http: &MockHttpClient) -> TransactionsApi {
        let client =
            ApiClient::new(Arc::new(http.clone()), "https://api.test", TokenStore::in_memory())
                .unwrap();
        TransactionsApi::new(client)
    }

    #[tokio::test]
    async fn test_list_sends_filters_as_query() {
        let http = MockHttpClient::new();
        http.mock_json(Method::GET, "https://api.test/transactions/", 200, &json!([]))
            .unwrap();

        let filters = TransactionFilters {
            limit: Some(5),
            transaction_type: Some(TransactionType::Expense),
            ..Default::default()
        };
        let transactions = api(&http).list(&filters).await.unwrap();

        assert!(transactions.is_empty());
        assert_eq!(
            http.get_requests()[0].url,
            "https://api.test/transactions/?limit=5&transaction_type=expense"
        );
    }

    #[tokio::test]
    async fn test_monthly_spending_omits_missing_year() {
        let http = MockHttpClient::new();
        http.mock_json(
            Method::GET,
            "https://api.test/transactions/monthly-spending",
            200,
            &json!([{"month": "2024-01", "income": "10", "expenses": "4", "net": "6"}]),
        )
        .unwrap();

        let api = api(&http);
        let months = api.monthly_spending(None).await.unwrap();
        assert_eq!(months[0].net, "6");
        api.monthly_spending(Some(2023)).await.unwrap();

        let urls: Vec<String> = http.get_requests().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://api.test/transactions/monthly-spending".to_string(),
                "https://api.test/transactions/monthly-spending?year=2023".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_create_rejects_bad_amount_locally() {
        let http = MockHttpClient::new();
        let result = api(&http)
            .create(&TransactionCreate {
                amount: "-5".into(),
                description: "Refund".into(),
                transaction_type: TransactionType::Income,
                transaction_date: "2024-03-01".into(),
                category_id: "c1".into(),
            })
            .await;

        assert!(matches!(result, Err(ClientError::Validation(_))));
        assert!(http.get_requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_transaction_is_not_found() {
        let http = MockHttpClient::new();
        http.mock_error(Method::GET, "https://api.test/transactions/t9", 404, "Transaction not found");

        let err = api(&http).get("t9").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "Transaction not found");
    }
}
