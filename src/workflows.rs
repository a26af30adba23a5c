//! Workflow orchestrator.
//!
//! A workflow is a fixed pipeline of tool calls with result-driven branching
//! that ends in one text report. Required steps abort the pipeline on failure;
//! optional steps record their failure in the trace and let it continue.
//! Workflows are exposed to MCP clients as prompts.

use std::collections::HashSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::correlator::ToolCaller;
use crate::protocol::{PromptArgument, PromptDefinition};
use crate::results::{
    plain, truncate, ElementFillResult, ExtractContentResult, HistoryResult, LinksResult,
    PageAnalyzeResult, PageElement, SelectedTextResult, TabCloseResult, TabInfo, TabListResult,
};

/// Why a workflow stopped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// No workflow with this name.
    #[error("Unknown prompt: {0}")]
    UnknownPrompt(String),

    /// A required argument was absent or empty.
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    /// A required tool call failed.
    #[error("Step '{step}' failed: {reason}")]
    StepFailed {
        /// Step label.
        step: String,
        /// Failure description.
        reason: String,
    },

    /// A step succeeded but its result rules out continuing.
    #[error("{reason}")]
    Precondition {
        /// Step label.
        step: String,
        /// What was missing.
        reason: String,
    },
}

impl WorkflowError {
    fn precondition(step: &str, reason: impl Into<String>) -> Self {
        WorkflowError::Precondition {
            step: step.into(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Named workflows offered as prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    /// Fill a social-media compose box.
    PostToSocial,
    /// Quote the current selection in a post.
    PostSelectedQuote,
    /// Summarise the current page, its links and related history.
    Research,
    /// Report on open tabs and recent history.
    AnalyzeSession,
    /// Close duplicate or stale tabs, or group them by domain.
    OrganizeTabs,
    /// Describe the form on the current page.
    FillForm,
}

impl Workflow {
    /// Every workflow, in catalog order.
    pub const ALL: [Workflow; 6] = [
        Workflow::PostToSocial,
        Workflow::PostSelectedQuote,
        Workflow::Research,
        Workflow::AnalyzeSession,
        Workflow::OrganizeTabs,
        Workflow::FillForm,
    ];

    /// Look up a workflow by prompt name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.name() == name)
    }

    /// Prompt name.
    pub fn name(self) -> &'static str {
        match self {
            Workflow::PostToSocial => "post_to_social",
            Workflow::PostSelectedQuote => "post_selected_quote",
            Workflow::Research => "research_workflow",
            Workflow::AnalyzeSession => "analyze_browsing_session",
            Workflow::OrganizeTabs => "organize_tabs",
            Workflow::FillForm => "fill_form_assistant",
        }
    }

    /// Prompt description.
    pub fn description(self) -> &'static str {
        match self {
            Workflow::PostToSocial => "Post content to social media platforms with anti-detection bypass",
            Workflow::PostSelectedQuote => "Post currently selected text as a quote with commentary",
            Workflow::Research => "Research a topic using current page and bookmarking findings",
            Workflow::AnalyzeSession => "Analyze current browsing session and provide insights",
            Workflow::OrganizeTabs => "Organize and clean up browser tabs intelligently",
            Workflow::FillForm => "Analyze and help fill out forms on the current page",
        }
    }

    /// Declared arguments.
    pub fn arguments(self) -> Vec<PromptArgument> {
        let arg = |name: &str, description: &str, required: bool| PromptArgument {
            name: name.into(),
            description: description.into(),
            required,
        };
        match self {
            Workflow::PostToSocial => vec![
                arg("content", "The content to post", true),
                arg("platform", "Target platform (twitter, linkedin, facebook)", false),
            ],
            Workflow::PostSelectedQuote => vec![arg(
                "commentary",
                "Your commentary on the selected text",
                false,
            )],
            Workflow::Research => vec![
                arg("topic", "Research topic or query", true),
                arg("depth", "Research depth: quick, thorough, comprehensive", false),
            ],
            Workflow::AnalyzeSession => vec![arg(
                "focus",
                "Analysis focus: productivity, research, trends",
                false,
            )],
            Workflow::OrganizeTabs => vec![arg(
                "strategy",
                "Organization strategy: close_duplicates, group_by_domain, archive_old",
                false,
            )],
            Workflow::FillForm => vec![arg(
                "form_type",
                "Type of form: contact, registration, survey, application",
                false,
            )],
        }
    }

    /// Listing entry for `prompts/list`.
    pub fn definition(self) -> PromptDefinition {
        PromptDefinition {
            name: self.name().into(),
            description: self.description().into(),
            arguments: self.arguments(),
        }
    }
}

/// The full prompt catalog.
pub fn prompt_catalog() -> Vec<PromptDefinition> {
    Workflow::ALL.into_iter().map(Workflow::definition).collect()
}

// ============================================================================
// Execution
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum StepStatus {
    Done,
    Failed(String),
}

#[derive(Debug, Clone)]
struct StepRecord {
    step: &'static str,
    tool: String,
    required: bool,
    status: StepStatus,
}

/// One workflow run: the caller plus the ordered outcomes of its steps.
struct WorkflowExecution<'a> {
    caller: &'a dyn ToolCaller,
    steps: Vec<StepRecord>,
}

impl<'a> WorkflowExecution<'a> {
    fn new(caller: &'a dyn ToolCaller) -> Self {
        Self {
            caller,
            steps: Vec::new(),
        }
    }

    fn record(&mut self, step: &'static str, tool: &str, required: bool, status: StepStatus) {
        self.steps.push(StepRecord {
            step,
            tool: tool.into(),
            required,
            status,
        });
    }

    /// Run a step whose failure aborts the workflow.
    async fn required<T: DeserializeOwned>(
        &mut self,
        step: &'static str,
        tool: &str,
        args: Value,
    ) -> Result<T, WorkflowError> {
        debug!(step, tool, "Workflow step");
        let value = match self.caller.call(tool, args).await {
            Ok(value) => value,
            Err(e) => {
                self.record(step, tool, true, StepStatus::Failed(e.to_string()));
                return Err(WorkflowError::StepFailed {
                    step: step.into(),
                    reason: e.to_string(),
                });
            }
        };
        match serde_json::from_value(value) {
            Ok(decoded) => {
                self.record(step, tool, true, StepStatus::Done);
                Ok(decoded)
            }
            Err(e) => {
                let reason = format!("unexpected result from {}: {}", tool, e);
                self.record(step, tool, true, StepStatus::Failed(reason.clone()));
                Err(WorkflowError::StepFailed {
                    step: step.into(),
                    reason,
                })
            }
        }
    }

    /// Run a step whose failure is noted and tolerated.
    async fn optional(&mut self, step: &'static str, tool: &str, args: Value) -> Result<Value, String> {
        debug!(step, tool, "Optional workflow step");
        match self.caller.call(tool, args).await {
            Ok(value) => {
                self.record(step, tool, false, StepStatus::Done);
                Ok(value)
            }
            Err(e) => {
                warn!(step, tool, error = %e, "Optional workflow step failed");
                self.record(step, tool, false, StepStatus::Failed(e.to_string()));
                Err(e.to_string())
            }
        }
    }

    fn trace(&self) -> String {
        let mut out = String::from("🧾 **Execution trace:**\n");
        for (i, record) in self.steps.iter().enumerate() {
            let line = match &record.status {
                StepStatus::Done => format!("{}. ✅ {} ({})", i + 1, record.step, record.tool),
                StepStatus::Failed(reason) if !record.required => format!(
                    "{}. ⚠️ {} ({}) failed, continued: {}",
                    i + 1,
                    record.step,
                    record.tool,
                    reason
                ),
                StepStatus::Failed(reason) => {
                    format!("{}. ❌ {} ({}): {}", i + 1, record.step, record.tool, reason)
                }
            };
            out.push_str(&line);
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

/// Runs named workflows against a [`ToolCaller`].
#[derive(Clone)]
pub struct WorkflowEngine {
    caller: Arc<dyn ToolCaller>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine").finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    /// Create an engine issuing calls through `caller`.
    pub fn new(caller: Arc<dyn ToolCaller>) -> Self {
        Self { caller }
    }

    /// Run the workflow `name` and return its report.
    ///
    /// Required arguments are checked before any call is issued.
    pub async fn run(&self, name: &str, args: &Map<String, Value>) -> Result<String, WorkflowError> {
        let workflow =
            Workflow::from_name(name).ok_or_else(|| WorkflowError::UnknownPrompt(name.into()))?;

        for declared in workflow.arguments().iter().filter(|a| a.required) {
            if arg(args, &declared.name).is_none() {
                return Err(WorkflowError::MissingArgument(declared.name.clone()));
            }
        }

        info!(workflow = name, "Running workflow");
        let mut exec = WorkflowExecution::new(self.caller.as_ref());
        let body = match workflow {
            Workflow::PostToSocial => {
                let content = arg(args, "content").unwrap_or_default();
                let platform = arg(args, "platform").unwrap_or_else(|| "auto".into());
                post_to_social(&mut exec, &content, &platform).await
            }
            Workflow::PostSelectedQuote => {
                let commentary = arg(args, "commentary").unwrap_or_default();
                post_selected_quote(&mut exec, &commentary).await
            }
            Workflow::Research => {
                let topic = arg(args, "topic").unwrap_or_default();
                let depth = arg(args, "depth").unwrap_or_else(|| "thorough".into());
                research(&mut exec, &topic, &depth).await
            }
            Workflow::AnalyzeSession => {
                let focus = arg(args, "focus").unwrap_or_else(|| "productivity".into());
                analyze_session(&mut exec, &focus).await
            }
            Workflow::OrganizeTabs => {
                let strategy = arg(args, "strategy").unwrap_or_else(|| "close_duplicates".into());
                organize_tabs(&mut exec, &strategy).await
            }
            Workflow::FillForm => {
                let form_type = arg(args, "form_type").unwrap_or_else(|| "auto".into());
                fill_form(&mut exec, &form_type).await
            }
        };

        match body {
            Ok(body) => Ok(format!("{}\n\n{}", body.trim_end(), exec.trace())),
            Err(e) => {
                warn!(workflow = name, error = %e, "Workflow aborted");
                Err(e)
            }
        }
    }
}

/// Non-empty argument value rendered as text.
fn arg(args: &Map<String, Value>, name: &str) -> Option<String> {
    match args.get(name)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        other => Some(plain(other)),
    }
}

fn hostname(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.host_str().unwrap_or_default().to_string(),
        Err(_) => "unknown".into(),
    }
}

fn name_has(element: &PageElement, needles: &[&str]) -> bool {
    let name = element.name.to_lowercase();
    needles.iter().any(|n| name.contains(n))
}

// ============================================================================
// Pipelines
// ============================================================================

async fn post_to_social(
    exec: &mut WorkflowExecution<'_>,
    content: &str,
    platform: &str,
) -> Result<String, WorkflowError> {
    let analysis: PageAnalyzeResult = exec
        .required(
            "analyze page",
            "page_analyze",
            json!({"intent_hint": "post_create", "phase": "discover", "max_results": 3}),
        )
        .await?;

    if analysis.elements.is_empty() {
        return Err(WorkflowError::precondition(
            "analyze page",
            "No posting elements found on current page. Please navigate to a social media platform.",
        ));
    }

    let textarea = analysis
        .elements
        .iter()
        .find(|el| el.kind == "textarea" || name_has(el, &["post", "tweet"]))
        .ok_or_else(|| {
            WorkflowError::precondition("analyze page", "No suitable posting textarea found on current page")
        })?;

    let fill: ElementFillResult = exec
        .required(
            "fill content",
            "element_fill",
            json!({"element_id": textarea.id, "value": content, "clear_first": true}),
        )
        .await?;

    if !fill.success {
        return Err(WorkflowError::StepFailed {
            step: "fill content".into(),
            reason: format!(
                "Failed to fill content: {}",
                fill.actual_value.as_deref().unwrap_or("no value reported")
            ),
        });
    }

    let submit = analysis
        .elements
        .iter()
        .find(|el| el.kind == "button" && name_has(el, &["post", "tweet", "share"]));

    let detected = analysis
        .summary
        .as_ref()
        .and_then(|s| s.anti_detection_platform.clone())
        .unwrap_or_else(|| "Generic".into());

    let mut out = String::from("✅ Successfully posted content to social media!\n\n");
    out.push_str(&format!("📝 **Content posted:** \"{}\"\n", content));
    out.push_str(&format!("🎯 **Platform detected:** {}\n", detected));
    if platform != "auto" {
        out.push_str(&format!("🎯 **Platform requested:** {}\n", platform));
    }
    out.push_str(&format!(
        "🔧 **Method used:** {}\n",
        fill.method.as_deref().unwrap_or("unknown")
    ));
    out.push_str("📊 **Fill success:** Yes\n");
    match submit {
        Some(button) => out.push_str(&format!(
            "\n💡 **Next step:** Click the \"{}\" button to publish your post.",
            button.name
        )),
        None => out.push_str(
            "\n💡 **Next step:** Look for a \"Post\" or \"Tweet\" button to publish your content.",
        ),
    }
    Ok(out)
}

async fn post_selected_quote(
    exec: &mut WorkflowExecution<'_>,
    commentary: &str,
) -> Result<String, WorkflowError> {
    let selection: SelectedTextResult = exec
        .required(
            "read selection",
            "get_selected_text",
            json!({"include_metadata": true, "max_length": 1000}),
        )
        .await?;

    if !selection.has_selection {
        return Err(WorkflowError::precondition(
            "read selection",
            "No text is currently selected. Please select some text first.",
        ));
    }

    let page = selection.page_info();
    let mut quote = format!("\"{}\"", selection.selected_text);
    if let Some(title) = page.and_then(|p| p.title.as_deref()) {
        quote.push_str(&format!("\n\n— {}", title));
    }
    if let Some(url) = page.and_then(|p| p.url.as_deref()) {
        quote.push_str(&format!("\n{}", url));
    }
    if !commentary.is_empty() {
        quote.push_str(&format!("\n\n{}", commentary));
    }

    let posted = post_to_social(exec, &quote, "auto").await?;

    let mut out = String::from("🎯 **Selected Quote Posting Workflow**\n\n");
    out.push_str(&format!(
        "📝 **Selected text:** \"{}\"\n",
        truncate(&selection.selected_text, 100)
    ));
    out.push_str(&format!(
        "📄 **Source:** {}\n",
        page.and_then(|p| p.title.as_deref()).unwrap_or("Current page")
    ));
    out.push_str(&format!(
        "💬 **Commentary:** {}\n",
        if commentary.is_empty() { "None" } else { commentary }
    ));
    out.push_str(&format!("📊 **Character count:** {}\n\n", quote.chars().count()));
    out.push_str(&posted);
    Ok(out)
}

async fn research(
    exec: &mut WorkflowExecution<'_>,
    topic: &str,
    depth: &str,
) -> Result<String, WorkflowError> {
    let page: ExtractContentResult = exec
        .required(
            "extract page content",
            "page_extract_content",
            json!({"content_type": "article", "summarize": true}),
        )
        .await?;

    let links: LinksResult = exec
        .required(
            "collect links",
            "get_page_links",
            json!({"include_internal": true, "include_external": true, "max_results": 20}),
        )
        .await?;

    let history: HistoryResult = exec
        .required(
            "search history",
            "get_history",
            json!({"keywords": topic, "max_results": 10, "sort_by": "visit_time"}),
        )
        .await?;

    let title = page.summary.as_ref().and_then(|s| s.title.clone());
    let bookmark = match (page.page_url(), title.as_deref()) {
        (Some(url), Some(title)) => Some(
            exec.optional(
                "bookmark page",
                "add_bookmark",
                json!({"title": format!("[Research: {}] {}", topic, title), "url": url}),
            )
            .await,
        ),
        _ => None,
    };

    let mut out = format!("🔍 **Research Workflow: {}**\n\n", topic);
    out.push_str("📄 **Current Page Analysis:**\n");
    if let Some(summary) = &page.summary {
        out.push_str(&format!(
            "• **Title:** {}\n",
            summary.title.as_deref().unwrap_or("N/A")
        ));
        out.push_str(&format!("• **Word count:** {}\n", summary.word_count.unwrap_or(0)));
        out.push_str(&format!(
            "• **Reading time:** {} minutes\n",
            summary.reading_time.unwrap_or(0.0)
        ));
        out.push_str(&format!(
            "• **Has media:** {}\n",
            if summary.has_media() { "Yes" } else { "No" }
        ));
        if let Some(preview) = &summary.preview {
            out.push_str(&format!("• **Preview:** {}\n", preview));
        }
    }

    out.push_str(&format!("\n🔗 **Related Links Found:** {}\n", links.returned));
    let needle = topic.to_lowercase();
    let relevant: Vec<_> = links
        .links
        .iter()
        .filter(|l| l.text.to_lowercase().contains(&needle) || l.url.to_lowercase().contains(&needle))
        .take(5)
        .collect();
    if !relevant.is_empty() {
        out.push_str("**Top relevant links:**\n");
        for (i, link) in relevant.iter().enumerate() {
            out.push_str(&format!("{}. [{}]({})\n", i + 1, link.text, link.url));
        }
    }

    out.push_str("\n📚 **Previous Research:**\n");
    if history.history_items.is_empty() {
        out.push_str("No previous research found in browsing history.\n");
    } else {
        out.push_str(&format!(
            "Found {} related pages in your history:\n",
            history.history_items.len()
        ));
        for (i, item) in history.history_items.iter().take(5).enumerate() {
            out.push_str(&format!(
                "{}. **{}** (visited {} times)\n   {}\n",
                i + 1,
                item.title,
                item.visit_count,
                item.url
            ));
        }
    }

    out.push_str("\n💡 **Next Steps:**\n");
    match depth {
        "comprehensive" => {
            out.push_str(&format!(
                "• Explore the {} links found on current page\n",
                links.returned
            ));
            out.push_str(&format!(
                "• Cross-reference with {} historical visits\n",
                history.metadata.total_found
            ));
            out.push_str("• Consider bookmarking additional relevant pages\n");
        }
        "thorough" => {
            out.push_str(&format!(
                "• Review top {} most relevant links\n",
                links.returned.min(5)
            ));
            out.push_str("• Check recent history for related content\n");
        }
        _ => out.push_str("• Focus on current page content and top 3 related links\n"),
    }

    match bookmark {
        Some(Ok(_)) => out.push_str("\n✅ **Current page bookmarked for reference**"),
        Some(Err(reason)) => out.push_str(&format!(
            "\n⚠️ **Bookmark not saved:** {}",
            reason
        )),
        None => out.push_str("\nℹ️ **Current page not bookmarked:** no URL or title reported"),
    }
    Ok(out)
}

const SOCIAL_DOMAINS: [&str; 5] = ["twitter.com", "x.com", "linkedin.com", "facebook.com", "instagram.com"];
const PRODUCTIVITY_DOMAINS: [&str; 4] = ["docs.google.com", "notion.so", "obsidian.md", "github.com"];
const NEWS_DOMAINS: [&str; 4] = ["news.google.com", "bbc.com", "cnn.com", "reuters.com"];

#[derive(Debug, Default)]
struct TabCategories<'a> {
    social: Vec<&'a TabInfo>,
    productivity: Vec<&'a TabInfo>,
    news: Vec<&'a TabInfo>,
    other: Vec<&'a TabInfo>,
}

fn categorize(tabs: &[TabInfo]) -> TabCategories<'_> {
    let matches = |tab: &TabInfo, domains: &[&str]| domains.iter().any(|d| tab.url.contains(d));
    let mut categories = TabCategories::default();
    for tab in tabs {
        let social = matches(tab, &SOCIAL_DOMAINS);
        let productivity = matches(tab, &PRODUCTIVITY_DOMAINS);
        let news = matches(tab, &NEWS_DOMAINS);
        // A tab may land in more than one category.
        if social {
            categories.social.push(tab);
        }
        if productivity {
            categories.productivity.push(tab);
        }
        if news {
            categories.news.push(tab);
        }
        if !social && !productivity && !news {
            categories.other.push(tab);
        }
    }
    categories
}

/// Tab counts per hostname, most frequent first, ties in first-seen order.
fn domain_counts(tabs: &[TabInfo]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for tab in tabs {
        let Ok(parsed) = Url::parse(&tab.url) else {
            continue;
        };
        let host = parsed.host_str().unwrap_or_default().to_string();
        match counts.iter_mut().find(|(d, _)| *d == host) {
            Some((_, n)) => *n += 1,
            None => counts.push((host, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

fn duplicate_count(tabs: &[TabInfo]) -> usize {
    let mut seen = HashSet::new();
    tabs.iter().filter(|t| !seen.insert(t.url.as_str())).count()
}

async fn analyze_session(exec: &mut WorkflowExecution<'_>, focus: &str) -> Result<String, WorkflowError> {
    let tab_list: TabListResult = exec
        .required(
            "list tabs",
            "tab_list",
            json!({"current_window_only": false, "include_details": true}),
        )
        .await?;
    let history: HistoryResult = exec
        .required(
            "read recent history",
            "get_history",
            json!({"max_results": 50, "sort_by": "visit_time", "sort_order": "desc"}),
        )
        .await?;
    let page: ExtractContentResult = exec
        .required(
            "extract page content",
            "page_extract_content",
            json!({"content_type": "article", "summarize": true}),
        )
        .await?;

    let tabs = &tab_list.tabs;
    let unique_domains: HashSet<String> = tabs.iter().map(|t| hostname(&t.url)).collect();
    let categories = categorize(tabs);
    let counts = domain_counts(tabs);
    let total_history = history.metadata.total_found;

    let mut out = String::from("📊 **Browsing Session Analysis**\n\n");
    out.push_str("🎯 **Session Overview:**\n");
    out.push_str(&format!("• **Total open tabs:** {}\n", tabs.len()));
    out.push_str(&format!("• **Unique domains:** {}\n", unique_domains.len()));
    out.push_str(&format!(
        "• **Active tab:** {}\n",
        if tab_list.active_tab.as_ref().is_some_and(|v| !v.is_null()) { "Yes" } else { "No" }
    ));
    out.push_str(&format!("• **Recent history items:** {}\n", total_history));

    out.push_str("\n📂 **Tab Categories:**\n");
    out.push_str(&format!("• **Social Media:** {} tabs\n", categories.social.len()));
    out.push_str(&format!("• **Productivity:** {} tabs\n", categories.productivity.len()));
    out.push_str(&format!("• **News/Information:** {} tabs\n", categories.news.len()));
    out.push_str(&format!("• **Other:** {} tabs\n", categories.other.len()));

    out.push_str("\n🌐 **Top Domains:**\n");
    for (domain, count) in counts.iter().take(5) {
        out.push_str(&format!(
            "• **{}:** {} tab{}\n",
            domain,
            count,
            if *count > 1 { "s" } else { "" }
        ));
    }

    match focus {
        "productivity" => {
            out.push_str("\n💼 **Productivity Analysis:**\n");
            out.push_str(&format!("• **Duplicate tabs:** {}\n", duplicate_count(tabs)));
            out.push_str(&format!(
                "• **Productivity tools:** {}\n",
                categories.productivity.len()
            ));
            out.push_str(&format!(
                "• **Social media distractions:** {}\n",
                categories.social.len()
            ));
            if !categories.productivity.is_empty() {
                out.push_str("\n**Active productivity tools:**\n");
                for tab in categories.productivity.iter().take(3) {
                    out.push_str(&format!("• {}\n", tab.title));
                }
            }
        }
        "research" => {
            out.push_str("\n🔍 **Research Analysis:**\n");
            out.push_str(&format!(
                "• **Information sources:** {}\n",
                categories.news.len() + categories.other.len()
            ));
            out.push_str(&format!(
                "• **Research depth:** {}\n",
                if total_history > 20 { "Deep" } else { "Surface" }
            ));
            if let Some(summary) = &page.summary {
                out.push_str(&format!(
                    "• **Current page type:** {}\n",
                    page.content_type.as_deref().unwrap_or("Unknown")
                ));
                out.push_str(&format!(
                    "• **Reading time:** {} minutes\n",
                    summary.reading_time.unwrap_or(0.0)
                ));
            }
        }
        _ => {}
    }

    out.push_str("\n💡 **Recommendations:**\n");
    if tabs.len() > 20 {
        out.push_str("• Consider closing some tabs to improve performance\n");
    }
    let count_of = |domain: &str| {
        counts
            .iter()
            .find(|(d, _)| d == domain)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    };
    if count_of("twitter.com") > 3 || count_of("x.com") > 3 {
        out.push_str("• Multiple social media tabs detected - consider consolidating\n");
    }
    if !categories.productivity.is_empty() && !categories.social.is_empty() {
        out.push_str("• Mix of productivity and social tabs - consider separate browsing sessions\n");
    }

    let score = if tabs.is_empty() {
        0
    } else {
        (((categories.productivity.len() + categories.news.len()) as f64 / tabs.len() as f64) * 100.0)
            .round() as u64
    };
    out.push_str(&format!("\n📈 **Session Score:** {}% productive", score));
    Ok(out)
}

async fn organize_tabs(exec: &mut WorkflowExecution<'_>, strategy: &str) -> Result<String, WorkflowError> {
    let tab_list: TabListResult = exec
        .required(
            "list tabs",
            "tab_list",
            json!({"current_window_only": false, "include_details": true}),
        )
        .await?;
    let tabs = &tab_list.tabs;

    let mut out = String::from("🗂️ **Tab Organization Workflow**\n\n");
    out.push_str(&format!("📊 **Starting with {} tabs**\n\n", tabs.len()));

    let mut closed = 0usize;
    match strategy {
        "close_duplicates" => {
            let mut seen = HashSet::new();
            let duplicates: Vec<&TabInfo> =
                tabs.iter().filter(|t| !seen.insert(t.url.as_str())).collect();
            if duplicates.is_empty() {
                out.push_str("✅ **No duplicate tabs found**\n");
            } else {
                let ids: Vec<Value> = duplicates.iter().map(|t| t.id.clone()).collect();
                let result: TabCloseResult = exec
                    .required("close duplicates", "tab_close", json!({"tab_ids": ids}))
                    .await?;
                if result.success {
                    closed = duplicates.len();
                    out.push_str(&format!("✅ **Closed {} duplicate tabs:**\n", closed));
                    for tab in &duplicates {
                        out.push_str(&format!("• {}\n", tab.title));
                    }
                }
            }
        }
        "group_by_domain" => {
            let mut groups: Vec<(String, Vec<&TabInfo>)> = Vec::new();
            for tab in tabs {
                let domain = hostname(&tab.url);
                match groups.iter_mut().find(|(d, _)| *d == domain) {
                    Some((_, members)) => members.push(tab),
                    None => groups.push((domain, vec![tab])),
                }
            }
            out.push_str("📂 **Grouped tabs by domain:**\n");
            for (domain, members) in &groups {
                out.push_str(&format!("• **{}:** {} tabs\n", domain, members.len()));
                for tab in members.iter().take(3) {
                    out.push_str(&format!("  - {}\n", tab.title));
                }
                if members.len() > 3 {
                    out.push_str(&format!("  - ... and {} more\n", members.len() - 3));
                }
            }
        }
        "archive_old" => {
            let stale: Vec<&TabInfo> = tabs
                .iter()
                .filter(|t| {
                    t.status.as_deref() == Some("complete")
                        && !t.active
                        && !t.pinned
                        && t.index.unwrap_or(0) > 10
                })
                .take(10)
                .collect();
            if stale.is_empty() {
                out.push_str("✅ **No old tabs to archive**\n");
            } else {
                let ids: Vec<Value> = stale.iter().map(|t| t.id.clone()).collect();
                let result: TabCloseResult = exec
                    .required("archive old tabs", "tab_close", json!({"tab_ids": ids}))
                    .await?;
                if result.success {
                    closed = stale.len();
                    out.push_str(&format!("✅ **Archived {} old tabs:**\n", closed));
                    for tab in &stale {
                        out.push_str(&format!("• {}\n", tab.title));
                    }
                }
            }
        }
        other => out.push_str(&format!("⚠️ **Unknown strategy '{}', no changes made**\n", other)),
    }

    let remaining = tabs.len().saturating_sub(closed);
    out.push_str("\n📈 **Organization Results:**\n");
    out.push_str(&format!("• **Tabs closed:** {}\n", closed));
    out.push_str(&format!("• **Tabs remaining:** {}\n", remaining));
    out.push_str(&format!("• **Organization strategy:** {}\n", strategy));
    if remaining > 15 {
        out.push_str("\n💡 **Recommendation:** Consider running additional organization strategies to further reduce tab count.");
    } else {
        out.push_str("\n✅ **Tab organization complete!** Your browsing session is now more organized.");
    }
    Ok(out)
}

fn suggested_field_type(name: &str) -> &'static str {
    let name = name.to_lowercase();
    if name.contains("email") {
        "Email address"
    } else if name.contains("name") {
        "Name field"
    } else if name.contains("phone") {
        "Phone number"
    } else if name.contains("password") {
        "Password"
    } else {
        "General text input"
    }
}

fn of_kind<'a>(elements: &'a [PageElement], kind: &str) -> Vec<&'a PageElement> {
    elements.iter().filter(|e| e.kind == kind).collect()
}

fn detect_form_type(elements: &[PageElement]) -> &'static str {
    let text = elements
        .iter()
        .map(|e| e.name.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    if text.contains("contact") || text.contains("get in touch") {
        "contact"
    } else if text.contains("register") || text.contains("sign up") {
        "registration"
    } else if text.contains("survey") || text.contains("feedback") {
        "survey"
    } else if text.contains("application") || text.contains("apply") {
        "application"
    } else {
        "unknown"
    }
}

async fn fill_form(exec: &mut WorkflowExecution<'_>, form_type: &str) -> Result<String, WorkflowError> {
    let analysis: PageAnalyzeResult = exec
        .required(
            "analyze form",
            "page_analyze",
            json!({
                "intent_hint": "form submit",
                "phase": "detailed",
                "focus_areas": ["forms", "buttons"],
                "max_results": 10
            }),
        )
        .await?;

    if analysis.elements.is_empty() {
        return Err(WorkflowError::precondition(
            "analyze form",
            "No form elements found on current page",
        ));
    }

    let inputs = of_kind(&analysis.elements, "input");
    let textareas = of_kind(&analysis.elements, "textarea");
    let selects = of_kind(&analysis.elements, "select");
    let buttons = of_kind(&analysis.elements, "button");

    let mut out = String::from("📝 **Form Analysis & Fill Assistant**\n\n");
    out.push_str("🔍 **Form Elements Found:**\n");
    out.push_str(&format!("• **Input fields:** {}\n", inputs.len()));
    out.push_str(&format!("• **Text areas:** {}\n", textareas.len()));
    out.push_str(&format!("• **Select dropdowns:** {}\n", selects.len()));
    out.push_str(&format!("• **Buttons:** {}\n", buttons.len()));

    if !inputs.is_empty() {
        out.push_str("\n📊 **Input Field Analysis:**\n");
        for (i, input) in inputs.iter().enumerate() {
            out.push_str(&format!("{}. **{}**\n", i + 1, input.name));
            out.push_str(&format!("   • Element ID: {}\n", input.id));
            out.push_str(&format!(
                "   • Ready: {}\n",
                if input.ready { "Yes" } else { "No" }
            ));
            out.push_str(&format!(
                "   • Required: {}\n",
                if input.name.contains('*') { "Yes" } else { "Unknown" }
            ));
            out.push_str(&format!(
                "   • **Suggested type:** {}\n",
                suggested_field_type(&input.name)
            ));
        }
    }

    if !textareas.is_empty() {
        out.push_str("\n📝 **Text Area Analysis:**\n");
        for (i, textarea) in textareas.iter().enumerate() {
            out.push_str(&format!("{}. **{}**\n", i + 1, textarea.name));
            out.push_str(&format!("   • Element ID: {}\n", textarea.id));
            out.push_str("   • **Suggested use:** Long-form text input\n");
        }
    }

    if !buttons.is_empty() {
        out.push_str("\n🔘 **Submit Buttons:**\n");
        let submits = buttons
            .iter()
            .filter(|b| name_has(b, &["submit", "send", "save"]));
        for (i, button) in submits.enumerate() {
            out.push_str(&format!("{}. **{}** (ID: {})\n", i + 1, button.name, button.id));
        }
    }

    out.push_str("\n🎯 **Detected Form Type:**\n");
    out.push_str(&format!(
        "• **Auto-detected:** {}\n",
        detect_form_type(&analysis.elements)
    ));
    out.push_str(&format!("• **User specified:** {}\n", form_type));

    out.push_str("\n💡 **Filling Recommendations:**\n");
    if !inputs.is_empty() {
        out.push_str("• Start with required fields (marked with *)\n");
        out.push_str("• Use the element IDs provided for precise filling\n");
        out.push_str("• Test form validation before final submission\n");
    }

    let ready = analysis.elements.iter().filter(|e| e.ready).count();
    out.push_str(&format!(
        "\n✅ **Ready to Fill:** {} elements are ready for interaction\n",
        ready
    ));
    if ready > 0 {
        out.push_str("**Next steps:**\n");
        out.push_str("1. Use element_fill with the provided Element IDs\n");
        out.push_str("2. Fill required fields first\n");
        out.push_str("3. Review form before submission\n");
        out.push_str("4. Click appropriate submit button when ready\n");
    }
    Ok(out)
}
