//! Banking operations against the platform's REST API
//!
//! Each operation validates its parameters, borrows a token from the
//! session manager, issues one upstream call and extracts the records it
//! returns. Errors are propagated as typed `GatewayError`s; turning them into
//! envelopes happens one layer up.

pub mod params;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::models::{OperationOutput, OperationRequest};
use crate::session::SessionManager;
use crate::transport::{HttpRequest, Transport};
use crate::Result;
use chrono::Utc;
use params::{
    AccountParams, AccountsHeldParams, BankParams, CreateCardParams, NarrativeParams,
    PaymentParams, TagParams, TransactionParams, TransactionsParams, UserParams, Validate,
    ViewParams,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Client for the fixed catalog of banking operations
pub struct BankingClient {
    transport: Arc<dyn Transport>,
    sessions: SessionManager,
    api_prefix: String,
    default_page_size: u32,
}

impl BankingClient {
    pub fn new(config: &GatewayConfig, transport: Arc<dyn Transport>) -> Self {
        let sessions = SessionManager::new(
            transport.clone(),
            config.credentials.clone(),
            config.token_lifetime,
        );

        Self {
            transport,
            sessions,
            api_prefix: config.api_prefix(),
            default_page_size: config.default_page_size,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Dispatch a request to its operation.
    pub async fn execute(&self, request: &OperationRequest) -> Result<OperationOutput> {
        Ok(match request {
            OperationRequest::ListBanks => OperationOutput::List(self.list_banks().await?),
            OperationRequest::AccountsAtBank(p) => {
                OperationOutput::List(self.accounts_at_bank(p).await?)
            }
            OperationRequest::AccountsHeldByUser(p) => {
                OperationOutput::List(self.accounts_held_by_user(p).await?)
            }
            OperationRequest::CheckAvailableFunds(p) => {
                OperationOutput::Record(self.check_available_funds(p).await?)
            }
            OperationRequest::AccountTransactions(p) => {
                OperationOutput::List(self.account_transactions(p).await?)
            }
            OperationRequest::AccountCards(p) => OperationOutput::List(self.account_cards(p).await?),
            OperationRequest::CreateCard(p) => OperationOutput::Record(self.create_card(p).await?),
            OperationRequest::CurrentUser => OperationOutput::Record(self.current_user().await?),
            OperationRequest::UserById(p) => OperationOutput::Record(self.user_by_id(p).await?),
            OperationRequest::AccountDetails(p) => {
                OperationOutput::Record(self.account_details(p).await?)
            }
            OperationRequest::TransactionDetails(p) => {
                OperationOutput::Record(self.transaction_details(p).await?)
            }
            OperationRequest::AddTransactionNarrative(p) => {
                OperationOutput::Record(self.add_transaction_narrative(p).await?)
            }
            OperationRequest::AddTransactionTag(p) => {
                OperationOutput::Record(self.add_transaction_tag(p).await?)
            }
            OperationRequest::Counterparties(p) => {
                OperationOutput::List(self.counterparties(p).await?)
            }
            OperationRequest::CreatePaymentRequest(p) => {
                OperationOutput::Record(self.create_payment_request(p).await?)
            }
        })
    }

    // =============================
    // Catalog
    // =============================

    pub async fn list_banks(&self) -> Result<Vec<Value>> {
        let body = self.call(HttpRequest::get(self.path("/banks"))).await?;
        let banks = extract_list(body, "banks")?;
        info!(count = banks.len(), "Retrieved banks");
        Ok(banks)
    }

    pub async fn accounts_at_bank(&self, params: &BankParams) -> Result<Vec<Value>> {
        params.validate()?;
        let path = self.path(&format!("/banks/{}/accounts", params.bank_id));
        let accounts = extract_list(self.call(HttpRequest::get(path)).await?, "accounts")?;
        info!(bank_id = %params.bank_id, count = accounts.len(), "Retrieved accounts at bank");
        Ok(accounts)
    }

    pub async fn accounts_held_by_user(&self, params: &AccountsHeldParams) -> Result<Vec<Value>> {
        params.validate()?;
        let mut request = HttpRequest::get(self.path(&format!("/users/{}/accounts-held", params.user_id)));
        if let Some(filter) = params.account_type_filter.as_deref().filter(|f| !f.trim().is_empty()) {
            request = request.query("account_type_filter", filter);
        }
        if let Some(operation) = params.filter_operation()? {
            request = request.query("account_type_filter_operation", operation.as_str());
        }

        let accounts = extract_list(self.call(request).await?, "accounts")?;
        info!(user_id = %params.user_id, count = accounts.len(), "Retrieved accounts held by user");
        Ok(accounts)
    }

    pub async fn check_available_funds(&self, params: &AccountParams) -> Result<Value> {
        params.validate()?;
        let path = self.path(&format!(
            "/banks/{}/accounts/{}/balances",
            params.bank_id, params.account_id
        ));
        let balances = extract_list(self.call(HttpRequest::get(path)).await?, "balances")?;

        let balance = balances.into_iter().next().ok_or_else(|| GatewayError::Upstream {
            status: None,
            message: format!("Could not retrieve balance for account {}", params.account_id),
        })?;

        let amount = balance_amount(&balance)?;
        let currency = balance
            .get("currency")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();

        info!(account_id = %params.account_id, "Retrieved balance");
        Ok(json!({
            "has_funds": amount > 0.0,
            "balance": balance,
            "currency": currency,
        }))
    }

    pub async fn account_transactions(&self, params: &TransactionsParams) -> Result<Vec<Value>> {
        params.validate()?;
        let limit = params.limit.unwrap_or(i64::from(self.default_page_size));
        let offset = params.offset.unwrap_or(0);

        let path = self.path(&format!(
            "/banks/{}/accounts/{}/{}/transactions",
            params.bank_id, params.account_id, params.view_id
        ));
        let mut request = HttpRequest::get(path)
            .query("limit", limit)
            .query("offset", offset)
            .query("sort_direction", params.sort()?.as_str());
        if let Some(from) = params.from_date.as_deref() {
            request = request.query("from_date", from);
        }
        if let Some(to) = params.to_date.as_deref() {
            request = request.query("to_date", to);
        }

        let mut transactions = extract_list(self.call(request).await?, "transactions")?;
        // The sandbox does not always honour the limit parameter.
        transactions.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

        info!(
            account_id = %params.account_id,
            count = transactions.len(),
            limit,
            "Retrieved transactions"
        );
        Ok(transactions)
    }

    pub async fn account_cards(&self, params: &AccountParams) -> Result<Vec<Value>> {
        params.validate()?;
        let path = self.path(&format!(
            "/banks/{}/accounts/{}/cards",
            params.bank_id, params.account_id
        ));
        let cards = extract_list(self.call(HttpRequest::get(path)).await?, "cards")?;
        info!(account_id = %params.account_id, count = cards.len(), "Retrieved cards");
        Ok(cards)
    }

    pub async fn create_card(&self, params: &CreateCardParams) -> Result<Value> {
        params.validate()?;
        let card_type = params.card_type()?;
        let now = Utc::now();

        let body = json!({
            "card_type": card_type.as_str(),
            "name_on_card": params.name_on_card,
            "issue_number": "1",
            "serial_number": now.timestamp().to_string(),
            "valid_from_date": now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "expires_date": (now + chrono::Duration::days(4 * 365)).format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "enabled": true,
            "technology": "chip_and_pin",
            "networks": ["visa"],
            "allows": ["credit", "debit"],
        });

        let path = self.path(&format!(
            "/banks/{}/accounts/{}/cards",
            params.bank_id, params.account_id
        ));
        let card = self.call(HttpRequest::post(path).json(body)).await?;
        info!(account_id = %params.account_id, card_type = card_type.as_str(), "Created card");
        Ok(card)
    }

    pub async fn current_user(&self) -> Result<Value> {
        let user = self.call(HttpRequest::get(self.path("/users/current"))).await?;
        info!("Retrieved current user information");
        Ok(user)
    }

    pub async fn user_by_id(&self, params: &UserParams) -> Result<Value> {
        params.validate()?;
        let user = self
            .call(HttpRequest::get(self.path(&format!("/users/{}", params.user_id))))
            .await?;
        info!(user_id = %params.user_id, "Retrieved user information");
        Ok(user)
    }

    pub async fn account_details(&self, params: &ViewParams) -> Result<Value> {
        params.validate()?;
        let path = self.path(&format!(
            "/banks/{}/accounts/{}/{}/account",
            params.bank_id, params.account_id, params.view_id
        ));
        let account = self.call(HttpRequest::get(path)).await?;
        info!(account_id = %params.account_id, "Retrieved account details");
        Ok(account)
    }

    pub async fn transaction_details(&self, params: &TransactionParams) -> Result<Value> {
        params.validate()?;
        let path = self.path(&format!(
            "{}/transaction",
            transaction_path(params)
        ));
        let transaction = self.call(HttpRequest::get(path)).await?;
        info!(transaction_id = %params.transaction_id, "Retrieved transaction details");
        Ok(transaction)
    }

    pub async fn add_transaction_narrative(&self, params: &NarrativeParams) -> Result<Value> {
        params.validate()?;
        let path = self.path(&format!(
            "{}/metadata/narrative",
            transaction_path(&params.transaction)
        ));
        let result = self
            .call(HttpRequest::post(path).json(json!({ "narrative": params.narrative })))
            .await?;
        info!(transaction_id = %params.transaction.transaction_id, "Added narrative to transaction");
        Ok(result)
    }

    pub async fn add_transaction_tag(&self, params: &TagParams) -> Result<Value> {
        params.validate()?;
        let path = self.path(&format!(
            "{}/metadata/tags",
            transaction_path(&params.transaction)
        ));
        let result = self
            .call(HttpRequest::post(path).json(json!({ "value": params.tag })))
            .await?;
        info!(transaction_id = %params.transaction.transaction_id, "Added tag to transaction");
        Ok(result)
    }

    pub async fn counterparties(&self, params: &ViewParams) -> Result<Vec<Value>> {
        params.validate()?;
        let path = self.path(&format!(
            "/banks/{}/accounts/{}/{}/counterparties",
            params.bank_id, params.account_id, params.view_id
        ));
        let counterparties = extract_list(self.call(HttpRequest::get(path)).await?, "counterparties")?;
        info!(account_id = %params.account_id, count = counterparties.len(), "Retrieved counterparties");
        Ok(counterparties)
    }

    pub async fn create_payment_request(&self, params: &PaymentParams) -> Result<Value> {
        params.validate()?;
        let body = json!({
            "to": {
                "bank_id": params.bank_id,
                "account_id": params.to_account_id,
            },
            "value": {
                "currency": params.currency.trim().to_uppercase(),
                "amount": params.amount.trim(),
            },
            "description": params.description.clone().unwrap_or_default(),
            "charge_policy": "SHARED",
        });

        let path = self.path(&format!(
            "/banks/{}/accounts/{}/{}/transaction-request-types/ACCOUNT/transaction-requests",
            params.bank_id, params.account_id, params.view_id
        ));
        let result = self.call(HttpRequest::post(path).json(body)).await?;
        info!(
            account_id = %params.account_id,
            to_account_id = %params.to_account_id,
            "Created payment request"
        );
        Ok(result)
    }

    // =============================
    // Plumbing
    // =============================

    fn path(&self, suffix: &str) -> String {
        format!("{}{}", self.api_prefix, suffix)
    }

    /// Authenticated call. A 401 means the platform dropped our token before
    /// the client-side window closed: discard it and retry once.
    async fn call(&self, request: HttpRequest) -> Result<Value> {
        let token = self.sessions.get_valid_token().await?;

        match self.transport.send(authorized(request.clone(), &token)).await {
            Err(err) if err.is_unauthorized() => {
                warn!(path = %request.path, "Token rejected by platform, re-authenticating");
                self.sessions.invalidate_token(&token).await;
                let token = self.sessions.get_valid_token().await?;
                Ok(self.transport.send(authorized(request, &token)).await?.body)
            }
            Err(err) => {
                warn!(path = %request.path, error = %err, "Banking call failed");
                Err(err)
            }
            Ok(response) => Ok(response.body),
        }
    }
}

fn authorized(request: HttpRequest, token: &str) -> HttpRequest {
    request.header("Authorization", format!("DirectLogin token=\"{}\"", token))
}

fn transaction_path(params: &TransactionParams) -> String {
    format!(
        "/banks/{}/accounts/{}/{}/transactions/{}",
        params.bank_id, params.account_id, params.view_id, params.transaction_id
    )
}

/// Numeric amount of a balance entry. An absent amount counts as zero; one
/// that is present but not a number is a malformed payload.
fn balance_amount(balance: &Value) -> Result<f64> {
    let parsed = match balance.get("amount") {
        None | Some(Value::Null) => return Ok(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => None,
    };

    parsed.filter(|a| a.is_finite()).ok_or_else(|| GatewayError::Upstream {
        status: None,
        message: format!("Malformed balance amount: {}", balance["amount"]),
    })
}

/// The platform returns lists either bare or wrapped as `{"<key>": [...]}`.
fn extract_list(body: Value, key: &str) -> Result<Vec<Value>> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(_) => Err(GatewayError::Upstream {
                status: None,
                message: format!("Expected '{}' to be a list", key),
            }),
        },
        _ => Err(GatewayError::Upstream {
            status: None,
            message: format!("Unexpected response shape for '{}'", key),
        }),
    }
}
