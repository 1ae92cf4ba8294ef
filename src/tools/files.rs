//! Filesystem tools.

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;

use crate::error::{HiveError, Result};
use crate::message::ToolOutcome;
use crate::tool::{Tool, ToolContext};

fn path_arg(args: &[Value], tool: &str) -> Result<String> {
    args.first()
        .and_then(Value::as_str)
        .filter(|path| !path.is_empty())
        .map(str::to_string)
        .ok_or_else(|| HiveError::Protocol(format!("{tool}: missing path argument")))
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read file"
    }

    fn description(&self) -> &str {
        "Read the contents of a UTF-8 file. Arguments: [path]"
    }

    fn category(&self) -> &str {
        "system"
    }

    async fn run(&self, args: Vec<Value>, _ctx: &ToolContext) -> Result<ToolOutcome> {
        let path = path_arg(&args, "read file")?;
        let contents = fs::read_to_string(&path)
            .await
            .map_err(|err| HiveError::ToolInvocation {
                name: self.name().into(),
                source: Box::new(err),
            })?;
        Ok(ToolOutcome::Text(contents))
    }
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write file"
    }

    fn description(&self) -> &str {
        "Write contents to a UTF-8 file, replacing it. Arguments: [path, contents]"
    }

    fn category(&self) -> &str {
        "system"
    }

    async fn run(&self, args: Vec<Value>, _ctx: &ToolContext) -> Result<ToolOutcome> {
        let path = path_arg(&args, "write file")?;
        let contents = args
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| HiveError::Protocol("write file: missing contents argument".into()))?;

        fs::write(&path, contents)
            .await
            .map_err(|err| HiveError::ToolInvocation {
                name: self.name().into(),
                source: Box::new(err),
            })?;
        Ok(ToolOutcome::Text(format!(
            "Wrote {} bytes to {path}",
            contents.len()
        )))
    }
}
