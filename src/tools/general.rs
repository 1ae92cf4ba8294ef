//! General-purpose tools.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{HiveError, Result};
use crate::message::ToolOutcome;
use crate::tool::{Tool, ToolContext};

pub struct CalculatorTool;

fn number_arg(args: &[Value], index: usize, tool: &str) -> Result<f64> {
    args.get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| HiveError::Protocol(format!("{tool}: argument {index} must be a number")))
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform basic arithmetic. Arguments: [operation (add|subtract|multiply|divide), a, b]"
    }

    async fn run(&self, args: Vec<Value>, _ctx: &ToolContext) -> Result<ToolOutcome> {
        let operation = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| HiveError::Protocol("calculator: missing operation".into()))?
            .to_ascii_lowercase();
        let a = number_arg(&args, 1, "calculator")?;
        let b = number_arg(&args, 2, "calculator")?;

        let result = match operation.as_str() {
            "add" => a + b,
            "subtract" => a - b,
            "multiply" => a * b,
            "divide" => {
                if b == 0.0 {
                    return Ok(ToolOutcome::Json(
                        json!({"operation": "divide", "error": "Division by zero is undefined"}),
                    ));
                }
                a / b
            }
            other => {
                return Err(HiveError::Protocol(format!(
                    "calculator: unknown operation `{other}`"
                )))
            }
        };

        Ok(ToolOutcome::Json(json!({"operation": operation, "result": result})))
    }
}

pub struct CurrentDatetimeTool;

#[async_trait]
impl Tool for CurrentDatetimeTool {
    fn name(&self) -> &str {
        "current datetime"
    }

    fn description(&self) -> &str {
        "The current date and time in UTC. No arguments."
    }

    async fn run(&self, _args: Vec<Value>, _ctx: &ToolContext) -> Result<ToolOutcome> {
        Ok(ToolOutcome::Text(chrono::Utc::now().to_rfc2822()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn calculator_adds() {
        let outcome = CalculatorTool
            .run(vec![json!("add"), json!(2), json!(3)], &ToolContext::default())
            .await
            .unwrap();
        let ToolOutcome::Json(value) = outcome else {
            panic!("expected json outcome");
        };
        assert_eq!(value["result"], 5.0);
    }

    #[tokio::test]
    async fn calculator_flags_division_by_zero() {
        let outcome = CalculatorTool
            .run(
                vec![json!("divide"), json!(1), json!(0)],
                &ToolContext::default(),
            )
            .await
            .unwrap();
        let ToolOutcome::Json(value) = outcome else {
            panic!("expected json outcome");
        };
        assert!(value["error"].is_string());
    }

    #[tokio::test]
    async fn calculator_rejects_unknown_operation() {
        let result = CalculatorTool
            .run(
                vec![json!("modulo"), json!(1), json!(2)],
                &ToolContext::default(),
            )
            .await;
        assert!(result.is_err());
    }
}
