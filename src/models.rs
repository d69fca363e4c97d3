//! Core data models for the banking gateway

use crate::banking::params::{
    AccountParams, AccountsHeldParams, BankParams, CreateCardParams, NarrativeParams,
    PaymentParams, TagParams, TransactionParams, TransactionsParams, UserParams, ViewParams,
};
use crate::error::GatewayError;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CardType {
    Credit,
    Debit,
}

impl CardType {
    pub const SUPPORTED: [CardType; 2] = [CardType::Credit, CardType::Debit];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Credit => "Credit",
            CardType::Debit => "Debit",
        }
    }
}

impl FromStr for CardType {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::SUPPORTED
            .into_iter()
            .find(|card| card.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                GatewayError::validation(format!(
                    "card_type must be one of 'Credit', 'Debit' (got '{}')",
                    s
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterOperation {
    Include,
    Exclude,
}

impl FilterOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperation::Include => "INCLUDE",
            FilterOperation::Exclude => "EXCLUDE",
        }
    }
}

impl FromStr for FilterOperation {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "INCLUDE" => Ok(FilterOperation::Include),
            "EXCLUDE" => Ok(FilterOperation::Exclude),
            _ => Err(GatewayError::validation(
                "account_type_filter_operation must be 'INCLUDE' or 'EXCLUDE'",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            _ => Err(GatewayError::validation("sort_direction must be 'ASC' or 'DESC'")),
        }
    }
}

//
// ================= Operation catalog =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ListBanks,
    AccountsAtBank,
    AccountsHeldByUser,
    CheckAvailableFunds,
    AccountTransactions,
    AccountCards,
    CreateCard,
    CurrentUser,
    UserById,
    AccountDetails,
    TransactionDetails,
    AddTransactionNarrative,
    AddTransactionTag,
    Counterparties,
    CreatePaymentRequest,
}

impl Operation {
    pub const ALL: [Operation; 15] = [
        Operation::ListBanks,
        Operation::AccountsAtBank,
        Operation::AccountsHeldByUser,
        Operation::CheckAvailableFunds,
        Operation::AccountTransactions,
        Operation::AccountCards,
        Operation::CreateCard,
        Operation::CurrentUser,
        Operation::UserById,
        Operation::AccountDetails,
        Operation::TransactionDetails,
        Operation::AddTransactionNarrative,
        Operation::AddTransactionTag,
        Operation::Counterparties,
        Operation::CreatePaymentRequest,
    ];

    /// Name under which the operation is exposed as a tool.
    pub fn tool_name(&self) -> &'static str {
        match self {
            Operation::ListBanks => "get_banks",
            Operation::AccountsAtBank => "accounts_at_bank",
            Operation::AccountsHeldByUser => "get_accounts_held_by_user",
            Operation::CheckAvailableFunds => "check_available_funds",
            Operation::AccountTransactions => "get_account_transactions",
            Operation::AccountCards => "get_account_cards",
            Operation::CreateCard => "create_card",
            Operation::CurrentUser => "get_current_user",
            Operation::UserById => "get_user_by_id",
            Operation::AccountDetails => "get_account_details",
            Operation::TransactionDetails => "get_transaction_details",
            Operation::AddTransactionNarrative => "add_transaction_narrative",
            Operation::AddTransactionTag => "add_transaction_tag",
            Operation::Counterparties => "get_counterparties",
            Operation::CreatePaymentRequest => "create_payment_request",
        }
    }

    pub fn from_tool_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.tool_name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Operation::ListBanks => "Get the list of available banks.",
            Operation::AccountsAtBank => "Get the accounts at a bank.",
            Operation::AccountsHeldByUser => {
                "Get accounts held by a user, optionally filtered by account type (INCLUDE or EXCLUDE)."
            }
            Operation::CheckAvailableFunds => {
                "Check whether an account has funds by reading its balance."
            }
            Operation::AccountTransactions => {
                "Get transactions for an account, newest first by default, paginated by limit/offset."
            }
            Operation::AccountCards => "Get cards associated with an account.",
            Operation::CreateCard => "Create a Credit or Debit card for an account.",
            Operation::CurrentUser => "Get the authenticated user's profile.",
            Operation::UserById => "Get user information by user ID.",
            Operation::AccountDetails => {
                "Get detailed account information including balance, type and metadata."
            }
            Operation::TransactionDetails => {
                "Get detailed transaction information including metadata, narrative and tags."
            }
            Operation::AddTransactionNarrative => "Add a narrative (description) to a transaction.",
            Operation::AddTransactionTag => "Add a tag to a transaction.",
            Operation::Counterparties => {
                "Get counterparties (people or organizations transacted with) for an account."
            }
            Operation::CreatePaymentRequest => {
                "Create a payment request transferring money to another account at the same bank."
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tool_name())
    }
}

//
// ================= Requests =================
//

/// One invocation of a catalog operation with its typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationRequest {
    ListBanks,
    AccountsAtBank(BankParams),
    AccountsHeldByUser(AccountsHeldParams),
    CheckAvailableFunds(AccountParams),
    AccountTransactions(TransactionsParams),
    AccountCards(AccountParams),
    CreateCard(CreateCardParams),
    CurrentUser,
    UserById(UserParams),
    AccountDetails(ViewParams),
    TransactionDetails(TransactionParams),
    AddTransactionNarrative(NarrativeParams),
    AddTransactionTag(TagParams),
    Counterparties(ViewParams),
    CreatePaymentRequest(PaymentParams),
}

impl OperationRequest {
    /// Decode tool arguments for the named operation.
    ///
    /// Missing arguments decode to empty values and are rejected later by
    /// validation, so every missing field gets the same message shape.
    pub fn parse(tool_name: &str, arguments: Value) -> Result<Self> {
        let operation = Operation::from_tool_name(tool_name)
            .ok_or_else(|| GatewayError::validation(format!("Unknown operation: {}", tool_name)))?;

        let args = match arguments {
            Value::Null => Value::Object(Map::new()),
            Value::Object(_) => arguments,
            _ => return Err(GatewayError::validation("arguments must be a JSON object")),
        };

        Ok(match operation {
            Operation::ListBanks => OperationRequest::ListBanks,
            Operation::AccountsAtBank => OperationRequest::AccountsAtBank(decode(args)?),
            Operation::AccountsHeldByUser => OperationRequest::AccountsHeldByUser(decode(args)?),
            Operation::CheckAvailableFunds => OperationRequest::CheckAvailableFunds(decode(args)?),
            Operation::AccountTransactions => OperationRequest::AccountTransactions(decode(args)?),
            Operation::AccountCards => OperationRequest::AccountCards(decode(args)?),
            Operation::CreateCard => OperationRequest::CreateCard(decode(args)?),
            Operation::CurrentUser => OperationRequest::CurrentUser,
            Operation::UserById => OperationRequest::UserById(decode(args)?),
            Operation::AccountDetails => OperationRequest::AccountDetails(decode(args)?),
            Operation::TransactionDetails => OperationRequest::TransactionDetails(decode(args)?),
            Operation::AddTransactionNarrative => {
                OperationRequest::AddTransactionNarrative(decode(args)?)
            }
            Operation::AddTransactionTag => OperationRequest::AddTransactionTag(decode(args)?),
            Operation::Counterparties => OperationRequest::Counterparties(decode(args)?),
            Operation::CreatePaymentRequest => {
                OperationRequest::CreatePaymentRequest(decode(args)?)
            }
        })
    }

    pub fn operation(&self) -> Operation {
        match self {
            OperationRequest::ListBanks => Operation::ListBanks,
            OperationRequest::AccountsAtBank(_) => Operation::AccountsAtBank,
            OperationRequest::AccountsHeldByUser(_) => Operation::AccountsHeldByUser,
            OperationRequest::CheckAvailableFunds(_) => Operation::CheckAvailableFunds,
            OperationRequest::AccountTransactions(_) => Operation::AccountTransactions,
            OperationRequest::AccountCards(_) => Operation::AccountCards,
            OperationRequest::CreateCard(_) => Operation::CreateCard,
            OperationRequest::CurrentUser => Operation::CurrentUser,
            OperationRequest::UserById(_) => Operation::UserById,
            OperationRequest::AccountDetails(_) => Operation::AccountDetails,
            OperationRequest::TransactionDetails(_) => Operation::TransactionDetails,
            OperationRequest::AddTransactionNarrative(_) => Operation::AddTransactionNarrative,
            OperationRequest::AddTransactionTag(_) => Operation::AddTransactionTag,
            OperationRequest::Counterparties(_) => Operation::Counterparties,
            OperationRequest::CreatePaymentRequest(_) => Operation::CreatePaymentRequest,
        }
    }
}

fn decode<T: DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| GatewayError::validation(format!("Invalid arguments: {}", e)))
}

//
// ================= Results =================
//

/// What an operation produced: a list of records or one record.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    List(Vec<Value>),
    Record(Value),
}

impl OperationOutput {
    pub fn count(&self) -> usize {
        match self {
            OperationOutput::List(items) => items.len(),
            OperationOutput::Record(_) => 1,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            OperationOutput::List(items) => Value::Array(items),
            OperationOutput::Record(Value::Null) => Value::Object(Map::new()),
            OperationOutput::Record(record) => record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_tool_name(op.tool_name()), Some(op));
        }
        assert_eq!(Operation::from_tool_name("transfer_everything"), None);
    }

    #[test]
    fn test_card_type_parsing() {
        assert_eq!("credit".parse::<CardType>().unwrap(), CardType::Credit);
        assert_eq!(" Debit ".parse::<CardType>().unwrap(), CardType::Debit);
        assert!(matches!(
            "Platinum".parse::<CardType>(),
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_request_with_typed_params() {
        let request = OperationRequest::parse(
            "get_account_transactions",
            json!({"bank_id": "b1", "account_id": "a1", "limit": 5}),
        )
        .unwrap();

        match request {
            OperationRequest::AccountTransactions(params) => {
                assert_eq!(params.bank_id, "b1");
                assert_eq!(params.limit, Some(5));
                assert_eq!(params.view_id, "owner");
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_operation_and_bad_shapes() {
        assert!(matches!(
            OperationRequest::parse("drop_tables", json!({})),
            Err(GatewayError::Validation(_))
        ));
        assert!(matches!(
            OperationRequest::parse("accounts_at_bank", json!(["b1"])),
            Err(GatewayError::Validation(_))
        ));
        assert!(matches!(
            OperationRequest::parse("get_account_transactions", json!({"limit": "five"})),
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn test_null_arguments_are_an_empty_object() {
        assert_eq!(
            OperationRequest::parse("get_banks", Value::Null).unwrap(),
            OperationRequest::ListBanks
        );
        let request = OperationRequest::parse("accounts_at_bank", Value::Null).unwrap();
        assert_eq!(request.operation(), Operation::AccountsAtBank);
    }

    #[test]
    fn test_output_counts() {
        assert_eq!(OperationOutput::List(vec![json!(1), json!(2)]).count(), 2);
        assert_eq!(OperationOutput::Record(json!({"id": "x"})).count(), 1);
        assert_eq!(OperationOutput::Record(Value::Null).into_value(), json!({}));
    }
}
