//! Tool trait and registry
//!
//! Each catalog operation is exposed as one named tool with a JSON input
//! schema. Tools never fail: the result of `execute` is always an envelope.

use crate::envelope::ResponseEnvelope;
use crate::gateway::BankingGateway;
use crate::models::{CardType, Operation};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, arguments: Value) -> ResponseEnvelope;
}

/// Advertised shape of a tool, as listed to clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool names in registration order.
    pub fn list(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A catalog operation bound to the shared gateway.
pub struct BankingTool {
    operation: Operation,
    gateway: Arc<BankingGateway>,
}

impl BankingTool {
    pub fn new(operation: Operation, gateway: Arc<BankingGateway>) -> Self {
        Self { operation, gateway }
    }
}

#[async_trait::async_trait]
impl Tool for BankingTool {
    fn name(&self) -> &'static str {
        self.operation.tool_name()
    }

    fn description(&self) -> &'static str {
        self.operation.description()
    }

    fn input_schema(&self) -> Value {
        input_schema(self.operation)
    }

    async fn execute(&self, arguments: Value) -> ResponseEnvelope {
        self.gateway.invoke_tool(self.name(), arguments).await
    }
}

fn string(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn object(properties: Vec<(&str, Value)>, required: &[&str]) -> Value {
    let properties: Map<String, Value> = properties
        .into_iter()
        .map(|(name, schema)| (name.to_string(), schema))
        .collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn bank_id() -> (&'static str, Value) {
    ("bank_id", string("The bank identifier, e.g. gh.29.uk"))
}

fn account_id() -> (&'static str, Value) {
    ("account_id", string("The account identifier"))
}

fn view_id() -> (&'static str, Value) {
    ("view_id", string("The view to read through (default: owner)"))
}

fn transaction_id() -> (&'static str, Value) {
    ("transaction_id", string("The transaction identifier"))
}

/// JSON schema of the arguments each operation accepts.
pub fn input_schema(operation: Operation) -> Value {
    match operation {
        Operation::ListBanks | Operation::CurrentUser => object(vec![], &[]),
        Operation::AccountsAtBank => object(vec![bank_id()], &["bank_id"]),
        Operation::AccountsHeldByUser => object(
            vec![
                ("user_id", string("The user identifier")),
                (
                    "account_type_filter",
                    string("Comma-separated account types to filter on"),
                ),
                (
                    "account_type_filter_operation",
                    json!({ "type": "string", "enum": ["INCLUDE", "EXCLUDE"] }),
                ),
            ],
            &["user_id"],
        ),
        Operation::CheckAvailableFunds | Operation::AccountCards => {
            object(vec![bank_id(), account_id()], &["bank_id", "account_id"])
        }
        Operation::AccountTransactions => object(
            vec![
                bank_id(),
                account_id(),
                view_id(),
                (
                    "limit",
                    json!({ "type": "integer", "minimum": 1, "description": "Maximum number of transactions (default: 50)" }),
                ),
                ("offset", json!({ "type": "integer", "minimum": 0 })),
                (
                    "sort_direction",
                    json!({ "type": "string", "enum": ["ASC", "DESC"] }),
                ),
                ("from_date", string("Start date, yyyy-MM-ddTHH:mm:ss.SSSZ")),
                ("to_date", string("End date, yyyy-MM-ddTHH:mm:ss.SSSZ")),
            ],
            &["bank_id", "account_id"],
        ),
        Operation::CreateCard => object(
            vec![
                bank_id(),
                account_id(),
                (
                    "card_type",
                    json!({
                        "type": "string",
                        "enum": CardType::SUPPORTED.map(|card| card.as_str()),
                    }),
                ),
                ("name_on_card", string("Name printed on the card")),
            ],
            &["bank_id", "account_id", "card_type", "name_on_card"],
        ),
        Operation::UserById => object(
            vec![("user_id", string("The user identifier"))],
            &["user_id"],
        ),
        Operation::AccountDetails | Operation::Counterparties => object(
            vec![bank_id(), account_id(), view_id()],
            &["bank_id", "account_id"],
        ),
        Operation::TransactionDetails => object(
            vec![bank_id(), account_id(), transaction_id(), view_id()],
            &["bank_id", "account_id", "transaction_id"],
        ),
        Operation::AddTransactionNarrative => object(
            vec![
                bank_id(),
                account_id(),
                transaction_id(),
                view_id(),
                ("narrative", string("Free-text narrative to attach")),
            ],
            &["bank_id", "account_id", "transaction_id", "narrative"],
        ),
        Operation::AddTransactionTag => object(
            vec![
                bank_id(),
                account_id(),
                transaction_id(),
                view_id(),
                ("tag", string("Tag value to attach")),
            ],
            &["bank_id", "account_id", "transaction_id", "tag"],
        ),
        Operation::CreatePaymentRequest => object(
            vec![
                bank_id(),
                account_id(),
                view_id(),
                ("to_account_id", string("Destination account at the same bank")),
                ("amount", string("Decimal amount, e.g. 12.50")),
                ("currency", string("ISO 4217 currency code, e.g. EUR")),
                ("description", string("Payment description")),
            ],
            &["bank_id", "account_id", "to_account_id", "amount", "currency"],
        ),
    }
}

/// Create a registry with one tool per catalog operation.
pub fn create_default_registry(gateway: Arc<BankingGateway>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for operation in Operation::ALL {
        registry.register(Arc::new(BankingTool::new(operation, gateway.clone())));
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::error::ErrorKind;
    use crate::testing::ScriptedTransport;

    fn registry(transport: &Arc<ScriptedTransport>) -> ToolRegistry {
        let gateway = BankingGateway::new(&GatewayConfig::sandbox(), transport.clone());
        create_default_registry(Arc::new(gateway))
    }

    #[test]
    fn test_registry_covers_catalog_in_order() {
        let transport = Arc::new(ScriptedTransport::always(json!([])));
        let registry = registry(&transport);

        assert_eq!(registry.len(), Operation::ALL.len());
        assert_eq!(registry.list()[0], "get_banks");
        for operation in Operation::ALL {
            assert!(registry.get(operation.tool_name()).is_some());
        }
        assert!(registry.get("transfer_everything").is_none());
    }

    #[test]
    fn test_schemas_list_required_fields() {
        for operation in Operation::ALL {
            let schema = input_schema(operation);
            assert_eq!(schema["type"], json!("object"));
            let properties = schema["properties"].as_object().unwrap();
            for required in schema["required"].as_array().unwrap() {
                assert!(properties.contains_key(required.as_str().unwrap()));
            }
        }

        let card = input_schema(Operation::CreateCard);
        assert_eq!(card["properties"]["card_type"]["enum"], json!(["Credit", "Debit"]));
    }

    #[test]
    fn test_definitions_serialize_camel_case() {
        let transport = Arc::new(ScriptedTransport::always(json!([])));
        let definitions = registry(&transport).definitions();
        let value = serde_json::to_value(&definitions[1]).unwrap();

        assert_eq!(value["name"], json!("accounts_at_bank"));
        assert!(value["inputSchema"]["properties"].get("bank_id").is_some());
    }

    #[tokio::test]
    async fn test_tool_execute_returns_envelope() {
        let transport = Arc::new(ScriptedTransport::always(json!({"banks": [{"id": "b1"}]})));
        let registry = registry(&transport);

        let banks = registry.get("get_banks").unwrap().execute(json!({})).await;
        assert!(banks.success);
        assert_eq!(banks.count, Some(1));

        let invalid = registry
            .get("accounts_at_bank")
            .unwrap()
            .execute(json!({"bank_id": 42}))
            .await;
        assert!(!invalid.success);
        assert_eq!(invalid.error_kind, Some(ErrorKind::ValidationError));
    }

    #[test]
    fn test_tool_execute_from_sync_context() {
        let transport = Arc::new(ScriptedTransport::always(json!({"user_id": "u1"})));
        let registry = registry(&transport);
        let tool = registry.get("get_current_user").unwrap();

        let envelope = tokio_test::block_on(tool.execute(Value::Null));
        assert!(envelope.success);
        assert_eq!(envelope.data["user_id"], json!("u1"));
        assert_eq!(envelope.count, Some(1));
    }
}
