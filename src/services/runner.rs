//! Drives one agent against one task: plan, execute tools sequentially,
//! synthesize the final answer, and record a trace for every invocation.

use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::error::ModelError;
use crate::llm::{CompletionRequest, ModelClient, extract_json};
use crate::models::{AgentDefinition, TaskResult, ToolName, ToolTrace};
use crate::tools::{ToolBox, ToolRegistry};

static CALC_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:calc(?:ulate)?|计算|算|求)[^\d()+*/-]*([\d\s.()+*/-]+)")
        .expect("invalid calculator cue regex")
});
static STANDALONE_EXPRESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\d\s.()+*/-]+$").expect("invalid expression regex"));

#[derive(Debug, Clone)]
struct PlannedCall {
    tool: ToolName,
    query: String,
    reason: String,
}

pub struct TaskRunner {
    model: Option<Arc<dyn ModelClient>>,
    registry: Arc<ToolRegistry>,
}

impl TaskRunner {
    pub fn new(model: Option<Arc<dyn ModelClient>>, registry: Arc<ToolRegistry>) -> Self {
        Self { model, registry }
    }

    pub async fn run(&self, agent: &AgentDefinition, task: &str) -> TaskResult {
        if agent.is_composite
            && let Some(model) = &self.model
        {
            return self.run_composite(model.as_ref(), agent, task).await;
        }

        let toolbox = ToolBox::new(&self.registry, &agent.tools);
        let plan = self.plan(agent, task, &toolbox).await;

        let mut traces = Vec::new();
        let mut notes = Vec::new();
        for call in plan {
            match toolbox.run(call.tool, &call.query).await {
                Ok(output) => {
                    let prefix = if call.reason.is_empty() {
                        format!("{} result", call.tool)
                    } else {
                        call.reason.clone()
                    };
                    notes.push(format!("{prefix}: {output}"));
                    traces.push(ToolTrace::success(call.tool, call.query, output));
                }
                Err(err) => {
                    let prefix = if call.reason.is_empty() {
                        format!("{} error", call.tool)
                    } else {
                        call.reason.clone()
                    };
                    notes.push(format!("{prefix}: {err}"));
                    traces.push(ToolTrace::failure(call.tool, call.query, err.to_string()));
                }
            }
        }

        let (result, raw_response) = self.compose_final(agent, task, &notes).await;
        TaskResult {
            agent_id: agent.agent_id.clone(),
            task: task.to_string(),
            result,
            tool_traces: traces,
            raw_response,
            created_at: Utc::now(),
        }
    }

    async fn plan(&self, agent: &AgentDefinition, task: &str, toolbox: &ToolBox<'_>) -> Vec<PlannedCall> {
        if toolbox.is_empty() {
            return Vec::new();
        }

        if let Some(model) = &self.model {
            match plan_via_model(model.as_ref(), agent, task, toolbox).await {
                // The model explicitly declined tools: answer directly.
                Ok(None) => return Vec::new(),
                Ok(Some(calls)) if !calls.is_empty() => return calls,
                Ok(Some(_)) => {}
                Err(err) => warn!(error = %err, "task planning via model failed, using heuristics"),
            }
        }
        heuristic_plan(task, toolbox)
    }

    async fn compose_final(
        &self,
        agent: &AgentDefinition,
        task: &str,
        notes: &[String],
    ) -> (String, Option<String>) {
        if let Some(model) = &self.model {
            let notes_section = if notes.is_empty() {
                "无额外上下文".to_string()
            } else {
                notes.join("\n")
            };
            let request = CompletionRequest::new(
                agent.prompt.clone(),
                format!("任务: {task}\n工具执行记录: {notes_section}\n请基于任务与工具结果给出最终回答。"),
            )
            .with_temperature(0.4);
            match model.complete(request).await {
                Ok(content) => return (content.clone(), Some(content)),
                Err(err) => {
                    warn!(error = %err, "final synthesis via model failed, falling back to tool outputs")
                }
            }
        }

        if notes.is_empty() {
            (task.to_string(), None)
        } else {
            (notes.join("\n"), None)
        }
    }

    /// Composite orchestration: plan steps, execute each (tool or model
    /// generation), then assemble the sections into one answer.
    async fn run_composite(
        &self,
        model: &dyn ModelClient,
        agent: &AgentDefinition,
        task: &str,
    ) -> TaskResult {
        let toolbox = ToolBox::new(&self.registry, &agent.tools);
        let mut traces = Vec::new();
        let mut sections: Vec<String> = Vec::new();

        let available_desc = if agent.tools.is_empty() {
            "(无工具，可纯LLM执行)".to_string()
        } else {
            agent
                .tools
                .iter()
                .map(|config| format!("- {}: {}", config.name, config.description))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let planner_system = "You are an orchestration planner. Given a user goal and available tools, \
produce a minimal step plan in strict JSON. Each step has: { title, action, input, tool? }. \
action in ['use_tool','llm_generate']. If a suitable tool exists, prefer 'use_tool'; otherwise use 'llm_generate'.";
        let planner_user = format!(
            "Goal: {task}\nAvailable tools:\n{available_desc}\nReturn JSON with field steps: [{{title, action, input, tool?}}] only."
        );

        let steps = match model
            .complete(CompletionRequest::new(planner_system, planner_user))
            .await
        {
            Ok(content) => extract_json(&content)
                .ok()
                .and_then(|payload| payload["steps"].as_array().cloned())
                .unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "composite planning failed, assembling without steps");
                Vec::new()
            }
        };

        for step in &steps {
            let title = step["title"].as_str().unwrap_or("步骤").to_string();
            let action = step["action"].as_str().unwrap_or("").to_lowercase();
            let input = match &step["input"] {
                Value::String(text) => text.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };

            if action == "use_tool" {
                let Some(tool) = step["tool"].as_str().and_then(ToolName::parse) else {
                    sections.push(format!("## {title}\n\n(计划缺少有效工具，跳过)"));
                    continue;
                };
                match toolbox.run(tool, &input).await {
                    Ok(output) => {
                        sections.push(format!("## {title}\n\n{output}"));
                        traces.push(ToolTrace::success(tool, input, output));
                    }
                    Err(err) => {
                        sections.push(format!("## {title}\n\n(工具执行失败) {err}"));
                        traces.push(ToolTrace::failure(tool, input, err.to_string()));
                    }
                }
            } else {
                let request = CompletionRequest::new(
                    agent.prompt.clone(),
                    format!("任务: {title}\n指引: {input}"),
                )
                .with_temperature(0.2);
                match model.complete(request).await {
                    Ok(content) => sections.push(format!("## {title}\n\n{content}")),
                    Err(err) => sections.push(format!("## {title}\n\n(模型生成失败) {err}")),
                }
            }
        }

        let assembled = if sections.is_empty() {
            "(无步骤执行结果)".to_string()
        } else {
            sections.join("\n\n")
        };
        let final_request = CompletionRequest::new(
            agent.prompt.clone(),
            format!("总体目标: {task}\n步骤结果:\n{assembled}\n请整合为最终回答（使用 Markdown）。"),
        )
        .with_temperature(0.2);
        let result = match model.complete(final_request).await {
            Ok(content) => content,
            Err(err) => {
                warn!(error = %err, "composite assembly failed, returning raw sections");
                assembled
            }
        };

        TaskResult {
            agent_id: agent.agent_id.clone(),
            task: task.to_string(),
            raw_response: Some(result.clone()),
            result,
            tool_traces: traces,
            created_at: Utc::now(),
        }
    }
}

async fn plan_via_model(
    model: &dyn ModelClient,
    agent: &AgentDefinition,
    task: &str,
    toolbox: &ToolBox<'_>,
) -> Result<Option<Vec<PlannedCall>>, ModelError> {
    let mut system = String::from(
        "You are a planning assistant. Decide how the agent should solve the user's request. Available tools:\n",
    );
    for config in agent.tools.iter() {
        system.push_str(&format!("- {}: {}\n", config.name, config.description));
    }
    system.push_str(
        "Respond with JSON containing `should_use_tools` (boolean) and `tool_calls` \
(list of objects with fields `tool`, `query`, `reason`). Use the fewest necessary tool calls. \
If tools are unnecessary, return `should_use_tools: false` and an empty list.",
    );

    let search_params = toolbox
        .config(ToolName::WebSearch)
        .map(|config| config.parameters.clone())
        .unwrap_or_default();
    let auto_search = search_params
        .get("auto_search")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let strategy = search_params
        .get("strategy")
        .and_then(Value::as_str)
        .unwrap_or("default")
        .to_string();
    let user = format!(
        "Agent persona: {}\nTask: {}\nAuto search enabled: {}\nSearch strategy hint: {}",
        agent.name, task, auto_search, strategy
    );

    let content = model.complete(CompletionRequest::new(system, user)).await?;
    let payload = extract_json(&content)?;

    if !payload["should_use_tools"].as_bool().unwrap_or(true) {
        return Ok(None);
    }
    let mut calls = Vec::new();
    for item in payload["tool_calls"].as_array().cloned().unwrap_or_default() {
        let Some(tool) = item["tool"].as_str().and_then(ToolName::parse) else {
            continue;
        };
        if toolbox.config(tool).is_none() {
            continue;
        }
        let Some(query) = item["query"].as_str().map(str::trim).filter(|q| !q.is_empty())
        else {
            continue;
        };
        calls.push(PlannedCall {
            tool,
            query: query.to_string(),
            reason: item["reason"].as_str().unwrap_or("").to_string(),
        });
    }
    Ok(Some(calls))
}

fn heuristic_plan(task: &str, toolbox: &ToolBox<'_>) -> Vec<PlannedCall> {
    let mut plan = Vec::new();
    if toolbox.config(ToolName::WebSearch).is_some() {
        let keyword = task.trim();
        if !keyword.is_empty() {
            plan.push(PlannedCall {
                tool: ToolName::WebSearch,
                query: keyword.to_string(),
                reason: "使用检索工具获取与任务相关的最新信息".to_string(),
            });
        }
    }
    if toolbox.config(ToolName::Calculator).is_some()
        && let Some(expression) = extract_expression(task)
    {
        plan.push(PlannedCall {
            tool: ToolName::Calculator,
            query: expression,
            reason: "计算表达式结果以支持回答".to_string(),
        });
    }
    plan
}

/// Pull an arithmetic expression out of the task text, either after a
/// calculation cue ("计算 1200+365") or as the whole task ("1200+365").
fn extract_expression(task: &str) -> Option<String> {
    if let Some(captures) = CALC_PATTERN.captures(task) {
        let expression = captures[1].replace('=', "");
        let expression = expression.trim();
        if !expression.is_empty() {
            return Some(expression.to_string());
        }
    }
    let trimmed = task.trim();
    if !trimmed.is_empty() && STANDALONE_EXPRESSION.is_match(trimmed) {
        return Some(trimmed.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::llm::testing::ScriptedModel;
    use crate::models::ToolConfig;
    use crate::tools::normalize_parameters;

    fn agent_with_tools(tools: Vec<ToolName>, is_composite: bool) -> AgentDefinition {
        AgentDefinition {
            agent_id: "agent-1".to_string(),
            name: "测试助手".to_string(),
            description: "测试".to_string(),
            prompt: "You are a helpful assistant.".to_string(),
            tools: tools
                .into_iter()
                .map(|name| ToolConfig {
                    name,
                    description: name.as_str().to_string(),
                    parameters: normalize_parameters(name, &serde_json::Map::new()),
                })
                .collect(),
            created_at: Utc::now(),
            is_composite,
            sub_agents: Vec::new(),
        }
    }

    fn runner(model: Option<Arc<dyn ModelClient>>) -> TaskRunner {
        let settings = Arc::new(Settings::bare("unused.json"));
        TaskRunner::new(model, Arc::new(ToolRegistry::new(settings)))
    }

    #[tokio::test]
    async fn test_arithmetic_task_without_model() {
        let runner = runner(None);
        let agent = agent_with_tools(vec![ToolName::Calculator], false);

        let result = runner.run(&agent, "1200+365").await;
        assert!(result.result.contains("1565"));
        assert_eq!(result.tool_traces.len(), 1);
        let trace = &result.tool_traces[0];
        assert_eq!(trace.tool, ToolName::Calculator);
        assert!(trace.succeeded);
        assert_eq!(trace.output, "1565");
        assert!(trace.error.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_tool_is_traced_not_fatal() {
        // web_search is configured on the agent but has no credentials.
        let runner = runner(None);
        let agent = agent_with_tools(vec![ToolName::WebSearch], false);

        let result = runner.run(&agent, "查一下今天的新闻").await;
        assert_eq!(result.tool_traces.len(), 1);
        let trace = &result.tool_traces[0];
        assert_eq!(trace.tool, ToolName::WebSearch);
        assert!(!trace.succeeded);
        assert!(trace.error.as_deref().unwrap_or("").contains("credential"));
        assert!(!result.result.is_empty());
    }

    #[tokio::test]
    async fn test_zero_tool_agent_echoes_task_without_model() {
        let runner = runner(None);
        let agent = agent_with_tools(Vec::new(), false);

        let result = runner.run(&agent, "讲个笑话").await;
        assert!(result.tool_traces.is_empty());
        assert_eq!(result.result, "讲个笑话");
        assert!(result.raw_response.is_none());
    }

    #[tokio::test]
    async fn test_model_plan_executes_in_order_and_falls_back_on_synthesis() {
        let plan = r#"{"should_use_tools": true, "tool_calls": [
            {"tool": "calculator", "query": "2+3", "reason": "加法"},
            {"tool": "calculator", "query": "10/4", "reason": "除法"}
        ]}"#;
        let model: Arc<dyn ModelClient> = Arc::new(ScriptedModel::new(vec![
            Ok(plan.to_string()),
            Err(ModelError::Provider("boom".to_string())),
        ]));
        let runner = runner(Some(model));
        let agent = agent_with_tools(vec![ToolName::Calculator], false);

        let result = runner.run(&agent, "帮我算两笔账").await;
        assert_eq!(result.tool_traces.len(), 2);
        assert_eq!(result.tool_traces[0].output, "5");
        assert_eq!(result.tool_traces[1].output, "2.5");
        // Synthesis failed, so the result is the joined tool notes.
        assert_eq!(result.result, "加法: 5\n除法: 2.5");
        assert!(result.raw_response.is_none());
    }

    #[tokio::test]
    async fn test_model_direct_answer_skips_tools() {
        let model: Arc<dyn ModelClient> = Arc::new(ScriptedModel::new(vec![
            Ok(r#"{"should_use_tools": false, "tool_calls": []}"#.to_string()),
            Ok("直接回答".to_string()),
        ]));
        let runner = runner(Some(model));
        let agent = agent_with_tools(vec![ToolName::Calculator], false);

        let result = runner.run(&agent, "你是谁").await;
        assert!(result.tool_traces.is_empty());
        assert_eq!(result.result, "直接回答");
        assert_eq!(result.raw_response.as_deref(), Some("直接回答"));
    }

    #[tokio::test]
    async fn test_planned_call_with_unknown_tool_is_dropped() {
        let plan = r#"{"should_use_tools": true, "tool_calls": [
            {"tool": "file_io", "query": "x"},
            {"tool": "calculator", "query": "7*6", "reason": ""}
        ]}"#;
        let model: Arc<dyn ModelClient> = Arc::new(ScriptedModel::new(vec![
            Ok(plan.to_string()),
            Ok("答案是42".to_string()),
        ]));
        let runner = runner(Some(model));
        let agent = agent_with_tools(vec![ToolName::Calculator], false);

        let result = runner.run(&agent, "7乘6").await;
        assert_eq!(result.tool_traces.len(), 1);
        assert_eq!(result.tool_traces[0].output, "42");
    }

    #[tokio::test]
    async fn test_composite_run_executes_steps() {
        let plan = r#"{"steps": [
            {"title": "加法", "action": "use_tool", "input": "1+1", "tool": "calculator"},
            {"title": "总结", "action": "llm_generate", "input": "写一句总结"}
        ]}"#;
        let model: Arc<dyn ModelClient> = Arc::new(ScriptedModel::new(vec![
            Ok(plan.to_string()),
            Ok("总结内容".to_string()),
            Ok("最终报告".to_string()),
        ]));
        let runner = runner(Some(model));
        let agent = agent_with_tools(vec![ToolName::Calculator], true);

        let result = runner.run(&agent, "算一下再总结").await;
        assert_eq!(result.tool_traces.len(), 1);
        assert!(result.tool_traces[0].succeeded);
        assert_eq!(result.result, "最终报告");
        assert_eq!(result.raw_response.as_deref(), Some("最终报告"));
    }

    #[tokio::test]
    async fn test_composite_without_model_uses_fallback_path() {
        let runner = runner(None);
        let agent = agent_with_tools(vec![ToolName::Calculator], true);

        let result = runner.run(&agent, "计算 12*12").await;
        assert_eq!(result.tool_traces.len(), 1);
        assert!(result.result.contains("144"));
    }

    #[test]
    fn test_extract_expression() {
        assert_eq!(extract_expression("1200+365").as_deref(), Some("1200+365"));
        assert_eq!(
            extract_expression("计算 (2+3)*4 等于多少").as_deref(),
            Some("(2+3)*4")
        );
        assert_eq!(extract_expression("calculate 7 * 6 please").as_deref(), Some("7 * 6"));
        assert_eq!(extract_expression("帮我写一首诗"), None);
    }

    #[test]
    fn test_heuristic_plan_prefers_configured_tools() {
        let settings = Arc::new(Settings::bare("unused.json"));
        let registry = ToolRegistry::new(settings);
        let agent = agent_with_tools(vec![ToolName::Calculator], false);
        let toolbox = ToolBox::new(&registry, &agent.tools);

        let plan = heuristic_plan("求 8*8", &toolbox);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].tool, ToolName::Calculator);
        assert_eq!(plan[0].query, "8*8");

        assert!(heuristic_plan("写一段文案", &toolbox).is_empty());
    }
}
