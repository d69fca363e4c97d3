//! Typed parameters for each banking operation
//!
//! Required string fields default to empty when absent so that validation,
//! not deserialization, reports them. Nothing here touches the network.

use crate::error::GatewayError;
use crate::models::{CardType, FilterOperation, SortDirection};
use crate::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn default_view() -> String {
    "owner".to_string()
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(GatewayError::validation(format!("{} is required", field)));
    }
    Ok(())
}

/// Identifiers are interpolated into URL paths.
fn require_id(field: &str, value: &str) -> Result<()> {
    require(field, value)?;
    if value.contains(['/', '?', '#']) || value.chars().any(char::is_whitespace) {
        return Err(GatewayError::validation(format!(
            "{} contains characters that are not allowed in an identifier",
            field
        )));
    }
    Ok(())
}

fn check_date(field: &str, value: Option<&str>) -> Result<()> {
    if let Some(raw) = value {
        NaiveDateTime::parse_from_str(raw, DATE_FORMAT).map_err(|_| {
            GatewayError::validation(format!(
                "{} must use the format yyyy-MM-ddTHH:mm:ss.SSSZ (got '{}')",
                field, raw
            ))
        })?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BankParams {
    #[serde(default)]
    pub bank_id: String,
}

impl BankParams {
    pub fn new(bank_id: impl Into<String>) -> Self {
        Self { bank_id: bank_id.into() }
    }
}

impl Validate for BankParams {
    fn validate(&self) -> Result<()> {
        require_id("bank_id", &self.bank_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserParams {
    #[serde(default)]
    pub user_id: String,
}

impl Validate for UserParams {
    fn validate(&self) -> Result<()> {
        require_id("user_id", &self.user_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AccountsHeldParams {
    #[serde(default)]
    pub user_id: String,
    /// Comma-separated account types, e.g. `330,CURRENT+PLUS`.
    #[serde(default)]
    pub account_type_filter: Option<String>,
    #[serde(default, alias = "filter_operation")]
    pub account_type_filter_operation: Option<String>,
}

impl AccountsHeldParams {
    pub fn filter_operation(&self) -> Result<Option<FilterOperation>> {
        self.account_type_filter_operation
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<FilterOperation>())
            .transpose()
    }
}

impl Validate for AccountsHeldParams {
    fn validate(&self) -> Result<()> {
        require_id("user_id", &self.user_id)?;
        self.filter_operation()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AccountParams {
    #[serde(default)]
    pub bank_id: String,
    #[serde(default)]
    pub account_id: String,
}

impl AccountParams {
    pub fn new(bank_id: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            bank_id: bank_id.into(),
            account_id: account_id.into(),
        }
    }
}

impl Validate for AccountParams {
    fn validate(&self) -> Result<()> {
        require_id("bank_id", &self.bank_id)?;
        require_id("account_id", &self.account_id)
    }
}

/// An account seen through a view (`owner` unless stated otherwise).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewParams {
    #[serde(default)]
    pub bank_id: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default = "default_view")]
    pub view_id: String,
}

impl ViewParams {
    pub fn new(bank_id: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            bank_id: bank_id.into(),
            account_id: account_id.into(),
            view_id: default_view(),
        }
    }
}

impl Validate for ViewParams {
    fn validate(&self) -> Result<()> {
        require_id("bank_id", &self.bank_id)?;
        require_id("account_id", &self.account_id)?;
        require_id("view_id", &self.view_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionsParams {
    #[serde(default)]
    pub bank_id: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default = "default_view")]
    pub view_id: String,
    /// Page size; the configured default applies when absent.
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub sort_direction: Option<String>,
    #[serde(default)]
    pub from_date: Option<String>,
    #[serde(default)]
    pub to_date: Option<String>,
}

impl TransactionsParams {
    pub fn new(bank_id: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            bank_id: bank_id.into(),
            account_id: account_id.into(),
            view_id: default_view(),
            limit: None,
            offset: None,
            sort_direction: None,
            from_date: None,
            to_date: None,
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort(&self) -> Result<SortDirection> {
        match self.sort_direction.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.parse(),
            _ => Ok(SortDirection::default()),
        }
    }
}

impl Validate for TransactionsParams {
    fn validate(&self) -> Result<()> {
        require_id("bank_id", &self.bank_id)?;
        require_id("account_id", &self.account_id)?;
        require_id("view_id", &self.view_id)?;
        if matches!(self.limit, Some(limit) if limit <= 0) {
            return Err(GatewayError::validation("limit must be greater than 0"));
        }
        if matches!(self.offset, Some(offset) if offset < 0) {
            return Err(GatewayError::validation("offset must be >= 0"));
        }
        self.sort()?;
        check_date("from_date", self.from_date.as_deref())?;
        check_date("to_date", self.to_date.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CreateCardParams {
    #[serde(default)]
    pub bank_id: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub card_type: String,
    #[serde(default)]
    pub name_on_card: String,
}

impl CreateCardParams {
    pub fn card_type(&self) -> Result<CardType> {
        self.card_type.parse()
    }
}

impl Validate for CreateCardParams {
    fn validate(&self) -> Result<()> {
        require_id("bank_id", &self.bank_id)?;
        require_id("account_id", &self.account_id)?;
        require("card_type", &self.card_type)?;
        self.card_type()?;
        require("name_on_card", &self.name_on_card)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionParams {
    #[serde(default)]
    pub bank_id: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default = "default_view")]
    pub view_id: String,
}

impl Validate for TransactionParams {
    fn validate(&self) -> Result<()> {
        require_id("bank_id", &self.bank_id)?;
        require_id("account_id", &self.account_id)?;
        require_id("transaction_id", &self.transaction_id)?;
        require_id("view_id", &self.view_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NarrativeParams {
    #[serde(flatten)]
    pub transaction: TransactionParams,
    #[serde(default)]
    pub narrative: String,
}

impl Validate for NarrativeParams {
    fn validate(&self) -> Result<()> {
        self.transaction.validate()?;
        require("narrative", &self.narrative)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagParams {
    #[serde(flatten)]
    pub transaction: TransactionParams,
    #[serde(default)]
    pub tag: String,
}

impl Validate for TagParams {
    fn validate(&self) -> Result<()> {
        self.transaction.validate()?;
        require("tag", &self.tag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentParams {
    #[serde(default)]
    pub bank_id: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub to_account_id: String,
    /// Decimal amount as a string, e.g. `"12.50"`.
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_view")]
    pub view_id: String,
}

impl Validate for PaymentParams {
    fn validate(&self) -> Result<()> {
        require_id("bank_id", &self.bank_id)?;
        require_id("account_id", &self.account_id)?;
        require_id("to_account_id", &self.to_account_id)?;
        require_id("view_id", &self.view_id)?;
        require("amount", &self.amount)?;
        match self.amount.trim().parse::<f64>() {
            Ok(amount) if amount.is_finite() && amount > 0.0 => {}
            _ => {
                return Err(GatewayError::validation(format!(
                    "amount must be a positive decimal (got '{}')",
                    self.amount
                )))
            }
        }
        require("currency", &self.currency)?;
        let currency = self.currency.trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(GatewayError::validation(format!(
                "currency must be a 3-letter code (got '{}')",
                self.currency
            )));
        }
        Ok(())
    }
}
