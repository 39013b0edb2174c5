//! Client-side checks applied before a request leaves the process.

use chrono::NaiveDate;

use crate::api::models::{
    BudgetCreate, BudgetUpdate, CategoryCreate, CategoryUpdate, TransactionCreate,
    TransactionUpdate, UserCreate, UserLogin, UserUpdate,
};
use crate::error::{ClientError, ClientResult};

/// Largest amount the API accepts
const MAX_AMOUNT: f64 = 999_999_999.99;
const MAX_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 500;

fn invalid(message: impl Into<String>) -> ClientError {
    ClientError::Validation(message.into())
}

/// `local@domain.tld` with no whitespace and a single `@`
pub fn validate_email(email: &str) -> ClientResult<()> {
    let valid = !email.chars().any(char::is_whitespace)
        && match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain
                        .rsplit_once('.')
                        .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
            }
            None => false,
        };

    if valid {
        Ok(())
    } else {
        Err(invalid("Please enter a valid email address"))
    }
}

/// At least 8 characters with an uppercase letter, a lowercase letter and a digit
pub fn validate_password(password: &str) -> ClientResult<()> {
    if password.chars().count() < 8 {
        return Err(invalid("Password must be at least 8 characters"));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(invalid("Password must contain at least one uppercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(invalid("Password must contain at least one lowercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(invalid("Password must contain at least one number"));
    }
    Ok(())
}

fn validate_full_name(full_name: &str) -> ClientResult<()> {
    if full_name.trim().chars().count() < 2 {
        return Err(invalid("Full name must be at least 2 characters"));
    }
    Ok(())
}

/// Positive decimal, at most two fraction digits, within the API maximum
pub fn validate_amount(amount: &str, label: &str) -> ClientResult<()> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(invalid(format!("{} is required", label)));
    }

    match amount.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => {
            if value > MAX_AMOUNT {
                return Err(invalid(format!("{} cannot exceed 999,999,999.99", label)));
            }
        }
        _ => return Err(invalid(format!("{} must be a positive number", label))),
    }

    let decimals = amount.split_once('.').map_or(0, |(_, fraction)| fraction.len());
    if decimals > 2 {
        return Err(invalid(format!(
            "{} cannot have more than 2 decimal places",
            label
        )));
    }
    Ok(())
}

fn validate_name(name: &str, label: &str) -> ClientResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(invalid(format!("{} is required", label)));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(invalid(format!("{} cannot exceed 100 characters", label)));
    }
    Ok(())
}

fn validate_description(description: &str, required: bool) -> ClientResult<()> {
    if required && description.trim().is_empty() {
        return Err(invalid("Description is required"));
    }
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(invalid("Description cannot exceed 500 characters"));
    }
    Ok(())
}

fn validate_required(value: &str, message: &str) -> ClientResult<()> {
    if value.trim().is_empty() {
        return Err(invalid(message));
    }
    Ok(())
}

/// `#RRGGBB`
pub fn validate_color(color: &str) -> ClientResult<()> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        Err(invalid("Color must be a valid hex color code"))
    }
}

fn parse_date(value: &str) -> ClientResult<NaiveDate> {
    // Accept plain dates and the date part of ISO timestamps
    let date_part = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| invalid(format!("Invalid date '{}'", value)))
}

pub fn validate_login(credentials: &UserLogin) -> ClientResult<()> {
    validate_email(&credentials.email)?;
    validate_required(&credentials.password, "Password is required")
}

pub fn validate_registration(user: &UserCreate) -> ClientResult<()> {
    validate_email(&user.email)?;
    validate_full_name(&user.full_name)?;
    validate_password(&user.password)
}

pub fn validate_user_update(update: &UserUpdate) -> ClientResult<()> {
    if let Some(email) = &update.email {
        validate_email(email)?;
    }
    if let Some(full_name) = &update.full_name {
        validate_full_name(full_name)?;
    }
    if let Some(password) = &update.password {
        validate_password(password)?;
    }
    Ok(())
}

pub fn validate_transaction_create(transaction: &TransactionCreate) -> ClientResult<()> {
    validate_amount(&transaction.amount, "Amount")?;
    validate_description(&transaction.description, true)?;
    validate_required(&transaction.transaction_date, "Transaction date is required")?;
    validate_required(&transaction.category_id, "Category is required")
}

pub fn validate_transaction_update(update: &TransactionUpdate) -> ClientResult<()> {
    if let Some(amount) = &update.amount {
        validate_amount(amount, "Amount")?;
    }
    if let Some(description) = &update.description {
        validate_description(description, true)?;
    }
    if let Some(date) = &update.transaction_date {
        validate_required(date, "Transaction date is required")?;
    }
    if let Some(category_id) = &update.category_id {
        validate_required(category_id, "Category is required")?;
    }
    Ok(())
}

pub fn validate_category_create(category: &CategoryCreate) -> ClientResult<()> {
    validate_name(&category.name, "Category name")?;
    if let Some(description) = &category.description {
        validate_description(description, false)?;
    }
    if let Some(color) = &category.color {
        validate_color(color)?;
    }
    Ok(())
}

pub fn validate_category_update(update: &CategoryUpdate) -> ClientResult<()> {
    if let Some(name) = &update.name {
        validate_name(name, "Category name")?;
    }
    if let Some(description) = &update.description {
        validate_description(description, false)?;
    }
    if let Some(color) = &update.color {
        validate_color(color)?;
    }
    Ok(())
}

pub fn validate_budget_create(budget: &BudgetCreate) -> ClientResult<()> {
    validate_name(&budget.name, "Budget name")?;
    validate_amount(&budget.amount, "Budget amount")?;
    validate_required(&budget.category_id, "Category is required")?;
    validate_required(&budget.start_date, "Start date is required")?;
    validate_required(&budget.end_date, "End date is required")?;

    if parse_date(&budget.end_date)? <= parse_date(&budget.start_date)? {
        return Err(invalid("End date must be after start date"));
    }
    Ok(())
}

pub fn validate_budget_update(update: &BudgetUpdate) -> ClientResult<()> {
    if let Some(name) = &update.name {
        validate_name(name, "Budget name")?;
    }
    if let Some(amount) = &update.amount {
        validate_amount(amount, "Budget amount")?;
    }
    if let Some(category_id) = &update.category_id {
        validate_required(category_id, "Category is required")?;
    }
    Ok(())
}
