use async_trait::async_trait;
use flowcore::{ConfigMap, NodeContext, NodeError, NodeHandler, NodeOutput, NodeType, Value};

/// Parsed form of a `condition` config value.
///
/// Accepted forms: a bool, `"true"`/`"false"`, a bare input key (truthiness),
/// or `key == literal` / `key != literal` where the literal is a quoted
/// string, number, bool or `null`.
#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Literal(bool),
    Truthy(String),
    Equals(String, Value),
    NotEquals(String, Value),
}

impl Condition {
    fn parse(raw: &Value) -> Result<Self, NodeError> {
        let expr = match raw {
            Value::Bool(b) => return Ok(Condition::Literal(*b)),
            Value::String(s) => s.trim(),
            other => {
                return Err(NodeError::InvalidConfig(format!(
                    "condition must be a bool or an expression, got {:?}",
                    other
                )))
            }
        };

        if let Some((key, literal)) = expr.split_once("!=") {
            return Ok(Condition::NotEquals(parse_key(key)?, parse_literal(literal)));
        }
        if let Some((key, literal)) = expr.split_once("==") {
            return Ok(Condition::Equals(parse_key(key)?, parse_literal(literal)));
        }
        match expr {
            "true" => Ok(Condition::Literal(true)),
            "false" => Ok(Condition::Literal(false)),
            key => Ok(Condition::Truthy(parse_key(key)?)),
        }
    }

    fn evaluate(&self, inputs: &ConfigMap) -> bool {
        let lookup = |key: &str| inputs.get(key).cloned().unwrap_or_default();
        match self {
            Condition::Literal(b) => *b,
            Condition::Truthy(key) => lookup(key).is_truthy(),
            Condition::Equals(key, expected) => lookup(key) == *expected,
            Condition::NotEquals(key, expected) => lookup(key) != *expected,
        }
    }
}

fn parse_key(key: &str) -> Result<String, NodeError> {
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(NodeError::InvalidConfig(format!(
            "invalid condition operand: '{}'",
            key
        )));
    }
    Ok(key.to_string())
}

fn parse_literal(raw: &str) -> Value {
    let raw = raw.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = raw.strip_prefix(quote).and_then(|r| r.strip_suffix(quote)) {
            return Value::from(inner);
        }
    }
    match raw {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match raw.parse::<i64>() {
            Ok(n) => Value::Integer(n),
            Err(_) => raw
                .parse::<f64>()
                .map(Value::Number)
                .unwrap_or_else(|_| Value::from(raw)),
        },
    }
}

/// Evaluates `condition` against its inputs and emits `result`, alongside the
/// inputs themselves.
pub struct ConditionHandler;

#[async_trait]
impl NodeHandler for ConditionHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Condition
    }

    fn description(&self) -> &str {
        "Evaluates an expression over its inputs"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let condition = Condition::parse(ctx.require_config("condition")?)?;
        let result = condition.evaluate(&ctx.inputs);
        tracing::debug!(node_id = %ctx.node_id, ?condition, result, "Condition evaluated");

        let mut outputs = ctx.inputs;
        outputs.insert("result".to_string(), Value::Bool(result));
        Ok(NodeOutput::from_outputs(outputs))
    }

    fn validate_config(&self, config: &ConfigMap) -> Result<(), NodeError> {
        let raw = config
            .get("condition")
            .ok_or_else(|| NodeError::InvalidConfig("missing config: condition".to_string()))?;
        Condition::parse(raw).map(|_| ())
    }
}
