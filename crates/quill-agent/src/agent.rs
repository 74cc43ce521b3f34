//! The agent loop: plan, approve, execute, reflect

use std::sync::Arc;

use quill_ai::{ChatOptions, Message, Provider, ToolCallRequest, context_window_for};

use crate::error::{Error, Result};
use crate::format::{format_tool_call_plan, format_tool_result, separator};
use crate::host::{DisplaySink, NullSink, Operator, PlanDecision};
use crate::memory::Memory;
use crate::plan::{is_revised_plan, looks_like_plan};
use crate::tool::ToolRegistry;
use crate::turn::run_streamed_turn;

/// Immutable per-invocation configuration, threaded through the loop.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Persona text at the head of the system prompt
    pub persona: String,
    /// Optional response language appended to the persona
    pub language: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Whether tools are offered to the provider at all
    pub enable_tools: bool,
    /// Whether plans require operator approval before execution
    pub require_plan_approval: bool,
    /// Hard ceiling on tool iterations per request
    pub max_iterations: u32,
    /// Plan-shaped responses tolerated without tool execution before aborting
    pub plan_loop_limit: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            persona: "You are a helpful programming assistant embedded in a code editor.".into(),
            language: None,
            temperature: 0.7,
            max_tokens: 2000,
            enable_tools: true,
            require_plan_approval: true,
            max_iterations: 25,
            plan_loop_limit: 2,
        }
    }
}

/// Transient per-request loop state. Reconstructed for every top-level chat
/// invocation; never persisted.
#[derive(Debug)]
pub struct AgentLoopState {
    pub iteration: u32,
    pub max_iterations: u32,
    pub plan_approved: bool,
    pub in_planning_phase: bool,
    pub pending_tool_calls: Option<Vec<ToolCallRequest>>,
    pub accumulated_content: String,
    pub plan_loop_count: u32,
}

impl AgentLoopState {
    fn new(config: &AgentConfig, tools_active: bool) -> Self {
        Self {
            iteration: 0,
            max_iterations: config.max_iterations,
            plan_approved: !config.require_plan_approval,
            in_planning_phase: config.require_plan_approval && tools_active,
            pending_tool_calls: None,
            accumulated_content: String::new(),
            plan_loop_count: 0,
        }
    }
}

/// Orchestrates one conversation turn end to end: system prompt assembly,
/// history loading, the streaming/tool loop, transcript persistence, and the
/// post-turn compaction check.
pub struct Agent {
    config: AgentConfig,
    provider: Box<dyn Provider>,
    registry: ToolRegistry,
    memory: Memory,
    sink: Arc<dyn DisplaySink>,
    operator: Arc<dyn Operator>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        provider: Box<dyn Provider>,
        registry: ToolRegistry,
        memory: Memory,
        sink: Arc<dyn DisplaySink>,
        operator: Arc<dyn Operator>,
    ) -> Self {
        Self {
            config,
            provider,
            registry,
            memory,
            sink,
            operator,
        }
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    fn options(&self) -> ChatOptions {
        ChatOptions {
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    /// Handle one user request, driving the loop to completion.
    pub async fn run(&self, prompt: &str) -> Result<()> {
        let tools_active = self.config.enable_tools
            && self.provider.supports_tools()
            && !self.registry.is_empty();

        let (system, cutoff) = self.build_system_message(tools_active);

        // Character-count token approximation against the model's window,
        // reserving room for the system prompt and the response.
        let budget = context_window_for(self.provider.get_model()) as i64
            - self.config.max_tokens as i64
            - prompt.len() as i64
            - system.len() as i64;

        let mut messages = self.memory.load_recent_history(cutoff, budget);
        tracing::debug!(
            history = messages.len(),
            cutoff,
            "Starting agent loop"
        );
        messages.push(Message::user(prompt));

        self.memory.append_turn("User", prompt)?;
        self.sink
            .append(&format!("\n\n>>>User:\n{}\n\n>>>Assistant:\n", prompt));

        let mut transcript = String::new();
        let result = self
            .run_loop(tools_active, &system, &mut messages, &mut transcript)
            .await;

        if !transcript.trim().is_empty() {
            self.memory.append_turn("Assistant", transcript.trim())?;
        }

        // Compaction check runs after every completed request, regardless of
        // how the loop ended.
        if self.memory.needs_compaction() {
            if let Err(e) = self
                .memory
                .compact(self.provider.as_ref(), &self.options())
                .await
            {
                tracing::warn!("Summary compaction failed: {}", e);
            }
        }

        result
    }

    async fn run_loop(
        &self,
        tools_active: bool,
        system: &str,
        messages: &mut Vec<Message>,
        transcript: &mut String,
    ) -> Result<()> {
        let schemas = if tools_active {
            self.registry.schemas()
        } else {
            vec![]
        };
        let tools = (!schemas.is_empty()).then_some(schemas.as_slice());
        let options = self.options();

        let mut state = AgentLoopState::new(&self.config, tools_active);

        while state.iteration < state.max_iterations {
            let outcome = run_streamed_turn(
                self.provider.as_ref(),
                system,
                messages,
                &options,
                tools,
                self.sink.as_ref(),
            )
            .await?;

            state.accumulated_content = outcome.content;
            state.pending_tool_calls =
                (!outcome.tool_calls.is_empty()).then_some(outcome.tool_calls);
            transcript.push_str(&state.accumulated_content);

            let Some(calls) = state.pending_tool_calls.take() else {
                // No tool calls: either a plan presentation or the final answer
                if self.config.require_plan_approval
                    && tools_active
                    && looks_like_plan(&state.accumulated_content)
                {
                    state.plan_loop_count += 1;
                    if state.plan_loop_count > self.config.plan_loop_limit {
                        let message = "\n\nERROR: Model keeps presenting plans without \
                             executing. Try rephrasing your request or disabling plan approval.\n";
                        self.sink.append(message);
                        return Err(Error::PlanLoop(
                            "model keeps planning without executing".into(),
                        ));
                    }

                    messages.push(Message::assistant(state.accumulated_content.clone()));
                    match self.operator.review_plan(&state.accumulated_content).await {
                        PlanDecision::Reject => {
                            self.sink.append("\n\nPlan cancelled by user.\n");
                            return Ok(());
                        }
                        PlanDecision::Revise(feedback) => {
                            state.in_planning_phase = false;
                            self.sink.append("\n\nUser requested plan revision.\n");
                            messages.push(Message::user(revision_request(&feedback)));
                            continue;
                        }
                        PlanDecision::Approve => {
                            state.plan_approved = true;
                            state.in_planning_phase = false;
                            self.memory.save_plan(&state.accumulated_content)?;
                            self.sink
                                .append("\n\nPlan approved. Proceeding with execution...\n\n");
                            messages.push(Message::user(APPROVAL_INSTRUCTION));
                            continue;
                        }
                    }
                }
                return Ok(());
            };

            // Tool calls arrived before any plan was approved: gate them
            if self.config.require_plan_approval && !state.plan_approved {
                let presented =
                    format_tool_call_plan(&state.accumulated_content, &calls);
                match self.operator.review_plan(&presented).await {
                    PlanDecision::Reject => {
                        self.sink.append("\n\nPlan cancelled by user.\n");
                        return Ok(());
                    }
                    PlanDecision::Revise(feedback) => {
                        // Drop the pending calls; the assistant text (without
                        // tool calls) keeps the wire format legal.
                        if !state.accumulated_content.is_empty() {
                            messages
                                .push(Message::assistant(state.accumulated_content.clone()));
                        }
                        messages.push(Message::user(revision_request(&feedback)));
                        state.in_planning_phase = false;
                        continue;
                    }
                    PlanDecision::Approve => {
                        state.plan_approved = true;
                        state.in_planning_phase = false;
                        self.memory.save_plan(&presented)?;
                    }
                }
            } else if self.config.require_plan_approval
                && !state.in_planning_phase
                && is_revised_plan(&state.accumulated_content)
            {
                // The model revised its plan mid-execution
                let header = format!(
                    "\n\n{}\nThe agent has proposed a REVISED PLAN based on the results.\n{}\n",
                    separator('=', 70),
                    separator('=', 70)
                );
                self.sink.append(&header);
                if !self
                    .operator
                    .confirm_revised_plan(&state.accumulated_content)
                    .await
                {
                    self.sink.append("\n\nRevised plan cancelled by user.\n");
                    return Ok(());
                }
                self.sink
                    .append("\n\nRevised plan approved. Continuing execution...\n\n");
            }

            // Execute the queued tool calls and fold results back in
            state.iteration += 1;
            state.plan_loop_count = 0;
            tracing::info!(
                iteration = state.iteration,
                calls = calls.len(),
                "Executing tool calls"
            );
            self.sink.append(&format!(
                "\n\n{}\nTool Execution - Iteration {}\n{}\n",
                separator('=', 70),
                state.iteration,
                separator('=', 70)
            ));

            messages.push(Message::assistant_with_tools(
                state.accumulated_content.clone(),
                calls.clone(),
            ));

            for call in &calls {
                let output = self.registry.execute(&call.name, &call.arguments).await;
                // Providers reject empty result content
                let output = if output.trim().is_empty() {
                    "Error: tool returned no output".to_string()
                } else {
                    output
                };

                let rendered = format_tool_result(&call.name, &call.arguments, &output, 15);
                self.sink.append(&rendered);
                transcript.push_str(&rendered);

                messages.push(Message::tool_result(&call.id, &call.name, output));
            }
        }

        if state.iteration >= state.max_iterations {
            let message = format!(
                "\n\nReached the maximum of {} tool iterations; stopping here.\n",
                state.max_iterations
            );
            self.sink.append(&message);
            tracing::warn!(
                max_iterations = state.max_iterations,
                "Iteration ceiling reached"
            );
        }

        // A plan that drove at least one executed iteration is complete
        if state.plan_approved && state.iteration > 0 {
            self.memory.clear_plan();
        }

        Ok(())
    }

    /// Assemble the system prompt from persona, project context, rolling
    /// summary, active plan, and the workflow instructions. Returns the
    /// prompt and the summary's cutoff byte.
    fn build_system_message(&self, tools_active: bool) -> (String, u64) {
        let mut system = String::new();

        if tools_active {
            system.push_str(TOOL_PREAMBLE);
        }

        system.push_str(&self.config.persona);
        if let Some(language) = &self.config.language {
            system.push_str(&format!(" And respond in {}.", language));
        }

        if let Some(context) = self.memory.load_context() {
            system.push_str("\n\n## Project Context\n\n");
            system.push_str(&context);
        }

        let cutoff = self.memory.summary_cutoff();
        if let Some(summary) = self.memory.load_summary() {
            system.push_str("\n\n## Conversation Summary & User Preferences\n\n");
            system.push_str(&summary);
        }

        if let Some(plan) = self.memory.load_plan() {
            system.push_str(
                "\n\n## Current Active Plan\n\nYou previously created and the user approved \
                 this plan. Continue executing it:\n\n",
            );
            system.push_str(&plan);
        }

        if tools_active {
            system.push_str(TOOL_CAPABILITY);
            if self.config.require_plan_approval {
                system.push_str(AGENT_WORKFLOW);
            } else {
                system.push_str(DIRECT_EXECUTION);
            }
        }

        (system, cutoff)
    }
}

/// A bounded stream/execute/fold loop with no approval workflow, for
/// background tasks like project-context generation.
pub async fn run_tool_loop(
    provider: &dyn Provider,
    registry: &ToolRegistry,
    system: &str,
    prompt: &str,
    options: &ChatOptions,
    max_iterations: u32,
) -> Result<String> {
    let schemas = registry.schemas();
    let tools = (provider.supports_tools() && !schemas.is_empty()).then_some(schemas.as_slice());

    let mut messages = vec![Message::user(prompt)];
    let mut last_content = String::new();

    for _ in 0..max_iterations {
        let outcome =
            run_streamed_turn(provider, system, &messages, options, tools, &NullSink).await?;

        if !outcome.content.is_empty() {
            last_content = outcome.content.clone();
        }
        if outcome.tool_calls.is_empty() {
            break;
        }

        messages.push(Message::assistant_with_tools(
            outcome.content,
            outcome.tool_calls.clone(),
        ));
        for call in &outcome.tool_calls {
            let output = registry.execute(&call.name, &call.arguments).await;
            let output = if output.trim().is_empty() {
                "Error: tool returned no output".to_string()
            } else {
                output
            };
            messages.push(Message::tool_result(&call.id, &call.name, output));
        }
    }

    Ok(last_content)
}

fn revision_request(feedback: &str) -> String {
    format!(
        "Please present a REVISED PLAN based on this feedback: {}\n\n\
         Mark it clearly with 'REVISED PLAN' at the top.",
        feedback
    )
}

// --- System prompt blocks ---

const TOOL_PREAMBLE: &str = "\
CRITICAL: You have function/tool calling capability via the API. When you need \
to use a tool, you MUST use the API's native tool calling feature. NEVER write \
text that describes or mimics tool usage. The system handles all tool execution \
automatically.\n\n";

const TOOL_CAPABILITY: &str = "\n\n\
## TOOL CALLING CAPABILITY\n\n\
You have access to function/tool calling via the API. Tools are available \
through the native tool calling feature.\n\n\
IMPORTANT: When executing tools:\n\
- Use the API's tool/function calling feature (NOT text descriptions)\n\
- Do NOT write text that mimics tool execution like 'Success: git_status()'\n\
- Do NOT output text like 'Tool Execution' or 'Calling tool: X'\n\
- The system automatically handles and displays tool execution\n\
- Your job is to CALL the tools via the API, not describe them in text\n";

const AGENT_WORKFLOW: &str = "\n\
## AGENT WORKFLOW\n\n\
You are an agentic assistant that follows a structured workflow:\n\n\
### PHASE 1: PLANNING (when you receive a new user request)\n\
1. Analyze the user's intention - what is their goal?\n\
2. Create a detailed plan to achieve that goal\n\
3. Identify which tools (if any) are needed\n\
4. Present the plan in this EXACT format:\n\n\
```\n\
GOAL: [Clear statement of what we're trying to achieve]\n\n\
PLAN:\n\
1. [First step - include tool name if needed, e.g., \"Check repository status (git_status)\"]\n\
2. [Second step - e.g., \"Review changes (git_diff with staged=false)\"]\n\
3. [Continue with all steps...]\n\n\
TOOLS REQUIRED: [List tool names: git_status, git_diff, git_commit, etc.]\n\n\
ESTIMATED STEPS: [Number]\n\
```\n\n\
5. CRITICAL: Present ONLY the plan text - do NOT call any tools yet\n\
6. Wait for user approval\n\n\
### PHASE 2: EXECUTION (after plan approval)\n\
When the user approves the plan:\n\
1. IMMEDIATELY use your tool calling API capability - do NOT write any text or descriptions\n\
2. Your response must contain ONLY function/tool calls - NO text content\n\
3. After each tool execution completes, evaluate: \"Do the results change the plan?\"\n\
4. If the plan needs revision: present a REVISED PLAN in the same format, marked \
with 'REVISED PLAN' at the top, and wait for approval\n\
5. If the plan is on track: make the NEXT tool call (again, ONLY tool calls, NO text)\n\
6. Continue until all steps complete\n\n\
### PHASE 3: COMPLETION\n\
1. Confirm the goal has been achieved\n\
2. Summarize what was done\n\n\
CRITICAL EXECUTION RULES:\n\
- ALWAYS start with the PLANNING phase for new requests\n\
- NEVER execute tools before showing a plan\n\
- When executing: your response must be ONLY tool calls, ZERO text content\n\
- After each tool execution, EVALUATE whether the plan needs adjustment\n";

const DIRECT_EXECUTION: &str = "\n\
## DIRECT EXECUTION MODE\n\n\
CRITICAL INSTRUCTIONS:\n\
- Plan approval is DISABLED\n\
- Do NOT present plans, goals, or explain what you will do\n\
- Your FIRST response must contain ONLY tool/function calls, ZERO text\n\
- Execute the user's request IMMEDIATELY using the appropriate tools\n\
- After tools complete, you may provide a brief summary of results\n";

const APPROVAL_INSTRUCTION: &str = "\
Plan approved. Execute step 1 now.\n\n\
CRITICAL INSTRUCTIONS:\n\
- Your response must contain ONLY the tool/function call for step 1\n\
- Do NOT write ANY text content in your response\n\
- Do NOT output headers like 'Tool Execution' or '======' or 'Step 1:'\n\
- The system will automatically display the tool execution progress\n\
- Just make the actual API function call and nothing else\n\
- After the tool completes, you'll see the results and can proceed to the next step";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{DisplaySink, ToolApproval};
    use crate::tool::Tool;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use quill_ai::{EventStream, StreamEvent, ToolSchema};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Provider that replays scripted turns; when the script runs out it
    /// repeats the last entry (so "always returns tool calls" is easy to
    /// express).
    struct ScriptedProvider {
        turns: Mutex<Vec<Vec<StreamEvent>>>,
        repeat_last: bool,
        with_tools: bool,
    }

    impl ScriptedProvider {
        fn new(turns: Vec<Vec<StreamEvent>>) -> Self {
            Self {
                turns: Mutex::new(turns),
                repeat_last: false,
                with_tools: true,
            }
        }

        fn repeating(turn: Vec<StreamEvent>) -> Self {
            Self {
                turns: Mutex::new(vec![turn]),
                repeat_last: true,
                with_tools: true,
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn validate_config(&self) -> quill_ai::Result<()> {
            Ok(())
        }
        fn get_model(&self) -> &str {
            "scripted"
        }
        fn supports_tools(&self) -> bool {
            self.with_tools
        }
        fn format_tools_for_api(&self, _tools: &[ToolSchema]) -> serde_json::Value {
            serde_json::Value::Array(vec![])
        }
        fn create_messages(&self, _system: &str, _messages: &[Message]) -> serde_json::Value {
            serde_json::Value::Array(vec![])
        }
        async fn stream_chat(
            &self,
            _system: &str,
            _messages: &[Message],
            _options: &ChatOptions,
            _tools: Option<&[ToolSchema]>,
        ) -> quill_ai::Result<EventStream> {
            let mut turns = self.turns.lock();
            let events = if turns.len() == 1 && self.repeat_last {
                turns[0].clone()
            } else if turns.is_empty() {
                vec![StreamEvent::finished("stop", None)]
            } else {
                turns.remove(0)
            };
            Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
        }
    }

    struct CountingTool {
        count: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "probe"
        }
        fn description(&self) -> &str {
            "Counts invocations"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _arguments: &serde_json::Value) -> String {
            self.count.fetch_add(1, Ordering::Relaxed);
            "ok".to_string()
        }
    }

    /// Operator with a scripted sequence of plan decisions
    struct ScriptedOperator {
        decisions: Mutex<Vec<PlanDecision>>,
        reviews: AtomicU32,
    }

    impl ScriptedOperator {
        fn new(decisions: Vec<PlanDecision>) -> Self {
            Self {
                decisions: Mutex::new(decisions),
                reviews: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Operator for ScriptedOperator {
        async fn review_plan(&self, _plan: &str) -> PlanDecision {
            self.reviews.fetch_add(1, Ordering::Relaxed);
            let mut decisions = self.decisions.lock();
            if decisions.is_empty() {
                PlanDecision::Approve
            } else {
                decisions.remove(0)
            }
        }
        async fn confirm_revised_plan(&self, _plan: &str) -> bool {
            true
        }
        async fn approve_tool(&self, _name: &str, _args: &serde_json::Value) -> ToolApproval {
            ToolApproval::AlwaysAllow
        }
        async fn confirm_outside_path(&self, _path: &str, _operation: &str) -> bool {
            false
        }
    }

    struct SilentSink;
    impl DisplaySink for SilentSink {
        fn append(&self, _text: &str) {}
        fn turn_complete(&self, _finish_reason: &str) {}
    }

    fn tool_call_turn() -> Vec<StreamEvent> {
        vec![StreamEvent::finished(
            "tool_calls",
            Some(vec![ToolCallRequest::new(
                "c1",
                "probe",
                serde_json::json!({}),
            )]),
        )]
    }

    fn text_turn(text: &str) -> Vec<StreamEvent> {
        vec![
            StreamEvent::delta(text),
            StreamEvent::finished("stop", None),
        ]
    }

    const PLAN_TEXT: &str = "GOAL: test\n\nPLAN:\n1. Run the probe (probe)\n\nTOOLS REQUIRED: probe\n\nESTIMATED STEPS: 1";

    fn build_agent(
        provider: ScriptedProvider,
        operator: Arc<ScriptedOperator>,
        config: AgentConfig,
    ) -> (Agent, Arc<AtomicU32>) {
        let count = Arc::new(AtomicU32::new(0));
        let tool = CountingTool {
            count: count.clone(),
        };
        let registry = ToolRegistry::new(vec![Arc::new(tool)], operator.clone(), false);
        let agent = Agent::new(
            config,
            Box::new(provider),
            registry,
            Memory::disabled(),
            Arc::new(SilentSink),
            operator,
        );
        (agent, count)
    }

    #[tokio::test]
    async fn test_terminates_at_iteration_ceiling() {
        // A pathological model that always returns tool calls must stop at
        // the ceiling with a non-error outcome.
        let provider = ScriptedProvider::repeating(tool_call_turn());
        let operator = Arc::new(ScriptedOperator::new(vec![]));
        let config = AgentConfig {
            require_plan_approval: false,
            max_iterations: 5,
            ..Default::default()
        };
        let (agent, count) = build_agent(provider, operator, config);

        agent.run("go").await.unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 5);
    }

    #[tokio::test]
    async fn test_plain_answer_ends_loop_without_tools() {
        let provider = ScriptedProvider::new(vec![text_turn("just an answer")]);
        let operator = Arc::new(ScriptedOperator::new(vec![]));
        let (agent, count) = build_agent(provider, operator.clone(), AgentConfig::default());

        agent.run("hello").await.unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 0);
        assert_eq!(operator.reviews.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_plan_approval_then_execution() {
        let provider = ScriptedProvider::new(vec![
            text_turn(PLAN_TEXT),
            tool_call_turn(),
            text_turn("all done"),
        ]);
        let operator = Arc::new(ScriptedOperator::new(vec![PlanDecision::Approve]));
        let (agent, count) = build_agent(provider, operator.clone(), AgentConfig::default());

        agent.run("do the thing").await.unwrap();
        assert_eq!(operator.reviews.load(Ordering::Relaxed), 1);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_plan_rejection_cancels() {
        let provider = ScriptedProvider::new(vec![text_turn(PLAN_TEXT), tool_call_turn()]);
        let operator = Arc::new(ScriptedOperator::new(vec![PlanDecision::Reject]));
        let (agent, count) = build_agent(provider, operator, AgentConfig::default());

        agent.run("do the thing").await.unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 0, "no tools after rejection");
    }

    #[tokio::test]
    async fn test_plan_revision_requests_new_plan() {
        let provider = ScriptedProvider::new(vec![
            text_turn(PLAN_TEXT),
            text_turn(&format!("REVISED PLAN\n\n{}", PLAN_TEXT)),
            tool_call_turn(),
            text_turn("finished"),
        ]);
        let operator = Arc::new(ScriptedOperator::new(vec![
            PlanDecision::Revise("use fewer steps".into()),
            PlanDecision::Approve,
        ]));
        let (agent, count) = build_agent(provider, operator.clone(), AgentConfig::default());

        agent.run("do the thing").await.unwrap();
        assert_eq!(operator.reviews.load(Ordering::Relaxed), 2);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_plan_loop_guard_aborts() {
        // The model presents plan after plan and never calls a tool.
        let provider = ScriptedProvider::repeating(text_turn(PLAN_TEXT));
        let operator = Arc::new(ScriptedOperator::new(vec![]));
        let config = AgentConfig {
            plan_loop_limit: 2,
            ..Default::default()
        };
        let (agent, count) = build_agent(provider, operator, config);

        let result = agent.run("do the thing").await;
        assert!(matches!(result, Err(Error::PlanLoop(_))));
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_unapproved_tool_calls_are_gated() {
        // The model skips planning and jumps straight to tool calls; the
        // operator still gets to approve before anything runs.
        let provider = ScriptedProvider::new(vec![tool_call_turn(), text_turn("done")]);
        let operator = Arc::new(ScriptedOperator::new(vec![PlanDecision::Approve]));
        let (agent, count) = build_agent(provider, operator.clone(), AgentConfig::default());

        agent.run("just do it").await.unwrap();
        assert_eq!(operator.reviews.load(Ordering::Relaxed), 1);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_no_approval_mode_executes_directly() {
        let provider = ScriptedProvider::new(vec![tool_call_turn(), text_turn("done")]);
        let operator = Arc::new(ScriptedOperator::new(vec![]));
        let config = AgentConfig {
            require_plan_approval: false,
            ..Default::default()
        };
        let (agent, count) = build_agent(provider, operator.clone(), config);

        agent.run("list files").await.unwrap();
        assert_eq!(operator.reviews.load(Ordering::Relaxed), 0);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_run_tool_loop_folds_results() {
        let provider = ScriptedProvider::new(vec![
            tool_call_turn(),
            text_turn("# Project: quill\n\nanalysis"),
        ]);
        let operator = Arc::new(ScriptedOperator::new(vec![]));
        let count = Arc::new(AtomicU32::new(0));
        let registry = ToolRegistry::new(
            vec![Arc::new(CountingTool {
                count: count.clone(),
            })],
            operator,
            false,
        );

        let content = run_tool_loop(
            &provider,
            &registry,
            "analyze",
            "analyze this project",
            &ChatOptions::default(),
            20,
        )
        .await
        .unwrap();

        assert!(content.contains("# Project: quill"));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
