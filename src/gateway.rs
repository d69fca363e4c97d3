//! Tool surface of the banking gateway
//!
//! One entry point per catalog operation. Every entry point returns a
//! `ResponseEnvelope`; nothing here returns `Err`.

use crate::banking::params::{
    AccountParams, AccountsHeldParams, BankParams, CreateCardParams, TransactionsParams,
};
use crate::banking::BankingClient;
use crate::config::{CredentialMode, GatewayConfig};
use crate::envelope::{normalize, ResponseEnvelope};
use crate::models::OperationRequest;
use crate::session::SessionStatus;
use crate::transport::{HttpTransport, Transport};
use crate::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub struct BankingGateway {
    client: Arc<BankingClient>,
    credential_mode: CredentialMode,
}

impl BankingGateway {
    pub fn new(config: &GatewayConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            client: Arc::new(BankingClient::new(config, transport)),
            credential_mode: config.credential_mode,
        }
    }

    /// Gateway backed by the real HTTP transport.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.base_url, config.request_timeout)?;
        info!(
            base_url = %config.base_url,
            api_version = %config.api_version,
            credential_mode = %config.credential_mode,
            "Banking gateway configured"
        );
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn credential_mode(&self) -> CredentialMode {
        self.credential_mode
    }

    pub async fn session_status(&self) -> SessionStatus {
        self.client.sessions().status().await
    }

    /// Invoke an operation by tool name with raw JSON arguments.
    pub async fn invoke_tool(&self, tool_name: &str, arguments: Value) -> ResponseEnvelope {
        match OperationRequest::parse(tool_name, arguments) {
            Ok(request) => self.invoke(request).await,
            Err(err) => ResponseEnvelope::failure(&err),
        }
    }

    pub async fn invoke(&self, request: OperationRequest) -> ResponseEnvelope {
        let operation = request.operation();
        let span = info_span!("tool_call", tool = %operation, request_id = %Uuid::new_v4());
        let client = self.client.clone();

        normalize(
            operation,
            async move { client.execute(&request).await }.instrument(span.clone()),
        )
        .instrument(span)
        .await
    }

    // =============================
    // Typed entry points
    // =============================

    pub async fn list_banks(&self) -> ResponseEnvelope {
        self.invoke(OperationRequest::ListBanks).await
    }

    pub async fn accounts_at_bank(&self, bank_id: &str) -> ResponseEnvelope {
        self.invoke(OperationRequest::AccountsAtBank(BankParams::new(bank_id)))
            .await
    }

    pub async fn accounts_held_by_user(
        &self,
        user_id: &str,
        account_type_filter: Option<&str>,
        filter_operation: Option<&str>,
    ) -> ResponseEnvelope {
        self.invoke(OperationRequest::AccountsHeldByUser(AccountsHeldParams {
            user_id: user_id.to_string(),
            account_type_filter: account_type_filter.map(str::to_string),
            account_type_filter_operation: filter_operation.map(str::to_string),
        }))
        .await
    }

    pub async fn check_available_funds(&self, bank_id: &str, account_id: &str) -> ResponseEnvelope {
        self.invoke(OperationRequest::CheckAvailableFunds(AccountParams::new(
            bank_id, account_id,
        )))
        .await
    }

    pub async fn account_transactions(
        &self,
        bank_id: &str,
        account_id: &str,
        limit: Option<i64>,
    ) -> ResponseEnvelope {
        let mut params = TransactionsParams::new(bank_id, account_id);
        params.limit = limit;
        self.invoke(OperationRequest::AccountTransactions(params)).await
    }

    pub async fn account_cards(&self, bank_id: &str, account_id: &str) -> ResponseEnvelope {
        self.invoke(OperationRequest::AccountCards(AccountParams::new(
            bank_id, account_id,
        )))
        .await
    }

    pub async fn create_card(
        &self,
        bank_id: &str,
        account_id: &str,
        card_type: &str,
        name_on_card: &str,
    ) -> ResponseEnvelope {
        self.invoke(OperationRequest::CreateCard(CreateCardParams {
            bank_id: bank_id.to_string(),
            account_id: account_id.to_string(),
            card_type: card_type.to_string(),
            name_on_card: name_on_card.to_string(),
        }))
        .await
    }

    pub async fn current_user(&self) -> ResponseEnvelope {
        self.invoke(OperationRequest::CurrentUser).await
    }
}
