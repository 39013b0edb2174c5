//! Budget tracker REST API: transport pipeline, token refresh and typed
//! endpoint groups.

pub mod auth;
pub mod budgets;
pub mod categories;
pub mod client;
pub mod models;
pub mod refresh;
pub mod transactions;

pub use auth::AuthApi;
pub use budgets::BudgetsApi;
pub use categories::CategoriesApi;
pub use client::ApiClient;
pub use refresh::RefreshCoordinator;
pub use transactions::TransactionsApi;
