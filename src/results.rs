//! Typed extension results and their text rendering.
//!
//! Each known browser tool returns a JSON object of a known shape.
//! [`ToolResult`] decodes a raw result into the matching variant, falling back
//! to [`ToolResult::Other`] for unknown tools or shapes that do not decode.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

// ============================================================================
// Result shapes
// ============================================================================

/// Element discovered by `page_analyze`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageElement {
    /// Element id usable with other tools.
    pub id: String,
    /// Human-readable element name.
    pub name: String,
    /// Element kind (`textarea`, `button`, `input`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Match confidence in percent.
    pub conf: Option<f64>,
    /// Whether the element is ready for interaction.
    pub ready: bool,
    /// Element state (`disabled`, ...).
    pub state: Option<String>,
}

/// Summary block of `page_analyze`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalyzeSummary {
    /// Platform with special input handling, if detected.
    pub anti_detection_platform: Option<String>,
}

/// `page_analyze` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageAnalyzeResult {
    /// Relevant elements.
    pub elements: Vec<PageElement>,
    /// Analysis method.
    pub method: Option<String>,
    /// Analysis summary.
    pub summary: Option<AnalyzeSummary>,
    /// Intent the analysis looked for.
    pub intent_hint: Option<String>,
}

/// Domain entry in a search-results summary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DomainCount {
    /// Domain name.
    pub domain: String,
}

/// Summary produced by `page_extract_content` with `summarize: true`.
///
/// The populated fields depend on the content type.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContentSummary {
    /// Page title.
    pub title: Option<String>,
    /// Number of words.
    pub word_count: Option<u64>,
    /// Estimated reading time in minutes.
    pub reading_time: Option<f64>,
    /// Page contains images.
    pub has_images: bool,
    /// Page contains video.
    pub has_videos: bool,
    /// Start of the text.
    pub preview: Option<String>,
    /// Search results found.
    pub total_results: Option<u64>,
    /// Extraction quality score.
    pub quality_score: Option<f64>,
    /// Average result score.
    pub avg_score: Option<f64>,
    /// Most frequent result domains.
    pub top_domains: Vec<DomainCount>,
    /// Kinds of results found.
    pub result_types: Vec<String>,
    /// Posts found.
    pub post_count: Option<u64>,
    /// Average post length.
    pub avg_length: Option<f64>,
    /// Summed engagement counters.
    pub engagement_total: Option<u64>,
    /// Posts carrying media.
    pub has_media_count: Option<u64>,
    /// Distinct authors.
    pub authors: Option<u64>,
    /// Kinds of posts found.
    pub post_types: Vec<String>,
}

impl ContentSummary {
    /// Whether the page carries images or video.
    pub fn has_media(&self) -> bool {
        self.has_images || self.has_videos
    }
}

/// `page_extract_content` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExtractContentResult {
    /// Detected content type.
    pub content_type: Option<String>,
    /// Extraction method.
    pub method: Option<String>,
    /// Full content, either a string or an object.
    pub content: Option<Value>,
    /// Summary, when requested.
    pub summary: Option<ContentSummary>,
}

impl ExtractContentResult {
    /// URL of the extracted page, when the extension reports it.
    pub fn page_url(&self) -> Option<&str> {
        self.content.as_ref()?.get("url")?.as_str()
    }
}

/// `element_click` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ElementClickResult {
    /// Element name.
    pub element_name: Option<String>,
    /// Element id.
    pub element_id: Option<String>,
    /// Click strategy used.
    pub click_type: Option<String>,
}

/// `element_fill` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ElementFillResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Fill strategy used.
    pub method: Option<String>,
    /// Element name.
    pub element_name: Option<String>,
    /// Element id.
    pub element_id: Option<String>,
    /// Value written.
    pub value: Option<String>,
    /// Value read back from the element.
    pub actual_value: Option<String>,
    /// Raw `execCommand` outcome.
    #[serde(rename = "execCommand_result")]
    pub exec_command_result: Option<Value>,
}

/// `page_wait_for` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WaitForResult {
    /// Condition that was met.
    pub condition_type: Option<String>,
    /// Milliseconds waited.
    pub wait_time: Option<u64>,
}

/// Single browser-history entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryItem {
    /// Page title.
    pub title: String,
    /// Visited URL.
    pub url: String,
    /// Domain of the visited URL.
    pub domain: String,
    /// Number of visits.
    pub visit_count: u64,
    /// Milliseconds since the Unix epoch.
    pub last_visit_time: Option<f64>,
}

/// Parameters echoed back by `get_history`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistorySearchParams {
    /// Search keywords.
    pub keywords: Option<String>,
    /// History window.
    pub date_range: Option<String>,
    /// Domain filter.
    pub domains: Option<Vec<String>>,
    /// Minimum visit count.
    pub min_visit_count: Option<u64>,
}

/// Metadata block of `get_history`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryMetadata {
    /// Total matches before truncation.
    pub total_found: u64,
    /// Parameters the search ran with.
    pub search_params: HistorySearchParams,
}

/// `get_history` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryResult {
    /// Matching entries.
    pub history_items: Vec<HistoryItem>,
    /// Search metadata.
    pub metadata: HistoryMetadata,
}

/// Screen position.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Position {
    /// Horizontal offset.
    pub x: f64,
    /// Vertical offset.
    pub y: f64,
}

/// Element containing a selection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParentElement {
    /// Tag name.
    pub tag_name: Option<String>,
    /// CSS class list.
    pub class_name: Option<String>,
}

/// Page the selection was made on.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageInfo {
    /// Page title.
    pub title: Option<String>,
    /// Page URL.
    pub url: Option<String>,
    /// Page domain.
    pub domain: Option<String>,
}

/// Details of a text selection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SelectionMetadata {
    /// Number of words.
    pub word_count: u64,
    /// Lines in the selection.
    pub line_count: u64,
    /// Screen position of the selection.
    pub position: Option<Position>,
    /// Element containing the selection.
    pub parent_element: Option<ParentElement>,
    /// Source page.
    pub page_info: Option<PageInfo>,
}

/// `get_selected_text` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SelectedTextResult {
    /// Whether any text is selected.
    pub has_selection: bool,
    /// Selected text.
    pub selected_text: String,
    /// Length of the selection in characters.
    pub character_count: u64,
    /// Whether the text was cut short.
    pub truncated: bool,
    /// Message shown when nothing is selected.
    pub message: Option<String>,
    /// Selection details.
    pub selection_metadata: Option<SelectionMetadata>,
}

impl SelectedTextResult {
    /// Info about the page the selection came from.
    pub fn page_info(&self) -> Option<&PageInfo> {
        self.selection_metadata.as_ref()?.page_info.as_ref()
    }
}

/// Page size reported after scrolling.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageDimensions {
    /// Viewport width.
    pub width: u64,
    /// Viewport height.
    pub height: u64,
    /// Full scrollable width.
    #[serde(rename = "scrollWidth")]
    pub scroll_width: u64,
    /// Full scrollable height.
    #[serde(rename = "scrollHeight")]
    pub scroll_height: u64,
}

/// `page_scroll` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScrollResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error reported by the extension.
    pub error: Option<String>,
    /// Scroll direction.
    pub direction: Option<String>,
    /// Requested scroll amount.
    pub amount: Option<String>,
    /// Pixels scrolled.
    pub pixels: Option<i64>,
    /// Element that was scrolled instead of the page.
    pub element_scrolled: Option<String>,
    /// Scroll offset after scrolling.
    pub scroll_position: Option<Position>,
    /// Page size after scrolling.
    pub page_dimensions: Option<PageDimensions>,
    /// Milliseconds waited after scrolling.
    pub wait_time: Option<u64>,
}

/// Hyperlink found on a page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageLink {
    /// Link target.
    pub url: String,
    /// Link text.
    pub text: String,
    /// Link title attribute.
    pub title: Option<String>,
    /// Target domain.
    pub domain: Option<String>,
    /// `internal` or `external`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// `get_page_links` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LinksResult {
    /// Links found.
    pub links: Vec<PageLink>,
    /// Links returned.
    pub returned: u64,
    /// Total matches before truncation.
    pub total_found: u64,
    /// Domain of the page the links came from.
    pub current_domain: Option<String>,
}

/// Counters of a batch tab creation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BatchSummary {
    /// Tabs opened.
    pub successful: u64,
    /// Tabs requested.
    pub total_requested: u64,
    /// Total time in milliseconds.
    pub execution_time_ms: u64,
    /// Chunks completed.
    pub chunks_processed: u64,
}

/// Tab opened by a batch creation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreatedTab {
    /// Tab title.
    pub title: Option<String>,
    /// Tab id.
    pub tab_id: Value,
    /// Requested URL.
    pub url: Option<String>,
    /// URL after redirects.
    pub actual_url: Option<String>,
    /// Whether the tab became active.
    pub active: bool,
}

/// URL that failed in a batch creation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BatchFailure {
    /// URL that failed.
    pub url: String,
    /// Failure reason.
    pub error: String,
}

/// Pacing used by a batch creation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Tabs opened per chunk.
    pub chunk_size: u64,
    /// Pause between chunks in milliseconds.
    pub delay_between_chunks: u64,
    /// Pause between tabs in milliseconds.
    pub delay_between_tabs: u64,
}

/// `tab_create` result, single or batch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TabCreateResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Whether several URLs were opened.
    pub batch_operation: bool,
    /// Tab id.
    pub tab_id: Value,
    /// Opened URL.
    pub url: Option<String>,
    /// Whether the tab became active.
    pub active: bool,
    /// Tab title.
    pub title: Option<String>,
    /// Warning reported by the extension.
    pub warning: Option<String>,
    /// Error reported by the extension.
    pub error: Option<String>,
    /// Batch counters.
    pub summary: Option<BatchSummary>,
    /// Tabs opened by the batch.
    pub created_tabs: Vec<CreatedTab>,
    /// Pacing used.
    pub settings_used: Option<BatchSettings>,
    /// Warnings reported during the batch.
    pub warnings: Vec<String>,
    /// URLs that failed to open.
    pub errors: Vec<BatchFailure>,
}

/// `tab_close` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TabCloseResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Number of tabs closed.
    pub count: u64,
    /// Ids of the closed tabs.
    pub closed_tabs: Vec<Value>,
    /// Error reported by the extension.
    pub error: Option<String>,
}

/// Open browser tab.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TabInfo {
    /// Tab id.
    pub id: Value,
    /// Tab title.
    pub title: String,
    /// Tab URL.
    pub url: String,
    /// Whether the tab is active.
    pub active: bool,
    /// Whether the tab is pinned.
    pub pinned: bool,
    /// Loading status.
    pub status: Option<String>,
    /// Position in the window.
    pub index: Option<i64>,
}

/// `tab_list` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TabListResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Open tabs.
    pub tabs: Vec<TabInfo>,
    /// Number of open tabs.
    pub count: u64,
    /// Id of the active tab.
    pub active_tab: Option<Value>,
}

/// `tab_switch` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TabSwitchResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Tab id.
    pub tab_id: Value,
    /// Tab title.
    pub title: Option<String>,
    /// URL of the tab.
    pub url: Option<String>,
    /// Window holding the tab.
    pub window_id: Value,
    /// Error reported by the extension.
    pub error: Option<String>,
}

/// Interaction flags of an element.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ElementFlags {
    /// Disabled by the page.
    pub disabled: bool,
    /// Rendered and visible.
    pub visible: bool,
    /// Accepts clicks.
    pub clickable: bool,
    /// Can take focus.
    pub focusable: bool,
    /// Has text content.
    #[serde(rename = "hasText")]
    pub has_text: bool,
    /// Has no value.
    #[serde(rename = "isEmpty")]
    pub is_empty: bool,
    /// Ready for interaction.
    pub interaction_ready: bool,
}

/// `element_get_state` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ElementStateResult {
    /// Element name.
    pub element_name: Option<String>,
    /// Element id.
    pub element_id: Option<String>,
    /// Interaction flags.
    pub state: ElementFlags,
    /// Current form value.
    pub current_value: Option<String>,
}

/// `page_style` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageStyleResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Style mode.
    pub mode: Option<String>,
    /// Applied theme.
    pub theme: Option<String>,
    /// Size of the injected stylesheet.
    pub applied_css: Option<u64>,
    /// Human-readable description of the style.
    pub description: Option<String>,
    /// Whether the style persists for the domain.
    pub remember_enabled: bool,
    /// Seconds the effect stays applied.
    pub effect_duration: Option<u64>,
    /// Mood the style was picked for.
    pub mood: Option<String>,
    /// Effect intensity.
    pub intensity: Option<String>,
    /// Error reported by the extension.
    pub error: Option<String>,
    /// Warning reported by the extension.
    pub warning: Option<String>,
}

// ============================================================================
// Tagged union
// ============================================================================

/// Decoded result of a browser tool call.
#[derive(Debug, Clone)]
pub enum ToolResult {
    /// Result of `page_analyze`.
    PageAnalyze(PageAnalyzeResult),
    /// Result of `page_extract_content`.
    ExtractContent(ExtractContentResult),
    /// Result of `element_click`.
    ElementClick(ElementClickResult),
    /// Result of `element_fill`.
    ElementFill(ElementFillResult),
    /// Result of `page_wait_for`.
    WaitFor(WaitForResult),
    /// Result of `get_history`.
    History(HistoryResult),
    /// Result of `get_selected_text`.
    SelectedText(SelectedTextResult),
    /// Result of `page_scroll`.
    Scroll(ScrollResult),
    /// Result of `get_page_links`.
    Links(LinksResult),
    /// Result of `tab_create`.
    TabCreate(TabCreateResult),
    /// Result of `tab_close`.
    TabClose(TabCloseResult),
    /// Result of `tab_list`.
    TabList(TabListResult),
    /// Result of `tab_switch`.
    TabSwitch(TabSwitchResult),
    /// Result of `element_get_state`.
    ElementState(ElementStateResult),
    /// Result of `page_style`.
    PageStyle(PageStyleResult),
    /// Unknown tool or undecodable shape.
    Other(Value),
}

fn typed<T: DeserializeOwned>(value: Value, wrap: fn(T) -> ToolResult) -> ToolResult {
    match serde_json::from_value::<T>(value.clone()) {
        Ok(decoded) => wrap(decoded),
        Err(_) => ToolResult::Other(value),
    }
}

impl ToolResult {
    /// Decode the raw result of `tool`.
    pub fn from_call(tool: &str, value: Value) -> Self {
        match tool {
            "page_analyze" => typed(value, ToolResult::PageAnalyze),
            "page_extract_content" => typed(value, ToolResult::ExtractContent),
            "element_click" => typed(value, ToolResult::ElementClick),
            "element_fill" => typed(value, ToolResult::ElementFill),
            "page_wait_for" => typed(value, ToolResult::WaitFor),
            "get_history" => typed(value, ToolResult::History),
            "get_selected_text" => typed(value, ToolResult::SelectedText),
            "page_scroll" => typed(value, ToolResult::Scroll),
            "get_page_links" => typed(value, ToolResult::Links),
            "tab_create" => typed(value, ToolResult::TabCreate),
            "tab_close" => typed(value, ToolResult::TabClose),
            "tab_list" => typed(value, ToolResult::TabList),
            "tab_switch" => typed(value, ToolResult::TabSwitch),
            "element_get_state" => typed(value, ToolResult::ElementState),
            "page_style" => typed(value, ToolResult::PageStyle),
            _ => ToolResult::Other(value),
        }
    }

    /// Render the result body, without the metadata block.
    pub fn render(&self) -> String {
        match self {
            ToolResult::PageAnalyze(r) => render_page_analyze(r),
            ToolResult::ExtractContent(r) => render_extract_content(r),
            ToolResult::ElementClick(r) => format!(
                "✅ Successfully clicked element: {}\nClick type: {}",
                r.element_name.as_deref().or(r.element_id.as_deref()).unwrap_or("unknown"),
                r.click_type.as_deref().unwrap_or("left")
            ),
            ToolResult::ElementFill(r) => render_element_fill(r),
            ToolResult::WaitFor(r) => format!(
                "✅ Condition met: {}\nWait time: {}ms",
                r.condition_type.as_deref().unwrap_or("unknown"),
                r.wait_time.unwrap_or(0)
            ),
            ToolResult::History(r) => render_history(r),
            ToolResult::SelectedText(r) => render_selected_text(r),
            ToolResult::Scroll(r) => render_scroll(r),
            ToolResult::Links(r) => render_links(r),
            ToolResult::TabCreate(r) => render_tab_create(r),
            ToolResult::TabClose(r) => render_tab_close(r),
            ToolResult::TabList(r) => render_tab_list(r),
            ToolResult::TabSwitch(r) => render_tab_switch(r),
            ToolResult::ElementState(r) => render_element_state(r),
            ToolResult::PageStyle(r) => render_page_style(r),
            ToolResult::Other(value) => pretty(value),
        }
    }
}

/// Format a raw tool result as the text returned to MCP clients.
///
/// Known tools get their rendering followed by a metadata block; unknown
/// tools are pretty-printed as JSON.
pub fn format_tool_result(tool: &str, value: Value) -> String {
    let execution_time = value
        .get("execution_time")
        .cloned()
        .unwrap_or_else(|| json!(0));
    let result = ToolResult::from_call(tool, value);
    if let ToolResult::Other(_) = result {
        return result.render();
    }

    let metadata = json!({
        "tool": tool,
        "execution_time": execution_time,
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    });
    format!("{}\n\n{}", result.render(), pretty(&metadata))
}

// ============================================================================
// Helpers
// ============================================================================

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Display a JSON scalar without quoting strings.
pub(crate) fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "unknown".into(),
        other => other.to_string(),
    }
}

/// First `max` characters of `text`, with `...` appended when cut.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn yes_no(flag: bool, yes: &str, no: &str) -> String {
    if flag { yes.to_string() } else { no.to_string() }
}

fn format_date(ms: f64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms as i64)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".into())
}

// ============================================================================
// Renderers
// ============================================================================

fn render_page_analyze(r: &PageAnalyzeResult) -> String {
    let platform = r.summary.as_ref().and_then(|s| s.anti_detection_platform.as_deref());

    if r.elements.is_empty() {
        let platform_info = platform.map(|p| format!("\nPlatform: {}", p)).unwrap_or_default();
        return format!(
            "No relevant elements found for intent: \"{}\"{}",
            r.intent_hint.as_deref().unwrap_or("unknown"),
            platform_info
        );
    }

    let platform_info = platform
        .map(|p| format!("\n🎯 Anti-detection platform detected: {}", p))
        .unwrap_or_default();
    let elements = r
        .elements
        .iter()
        .map(|el| {
            let ready = if el.ready { "✅ Ready" } else { "⚠️ Not ready" };
            let disabled = if el.state.as_deref() == Some("disabled") { " (disabled)" } else { "" };
            format!(
                "• {} ({}) - Confidence: {}% {}{}\n  Element ID: {}",
                el.name,
                el.kind,
                el.conf.map(|c| c.to_string()).unwrap_or_else(|| "?".into()),
                ready,
                disabled,
                el.id
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Found {} relevant elements using {}:{}\n\n{}",
        r.elements.len(),
        r.method.as_deref().unwrap_or("unknown"),
        platform_info,
        elements
    )
}

fn render_extract_content(r: &ExtractContentResult) -> String {
    let header = format!(
        "Extracted {} content using {}:\n\n",
        r.content_type.as_deref().unwrap_or("unknown"),
        r.method.as_deref().unwrap_or("unknown")
    );

    if let Some(content) = &r.content {
        let preview = match content {
            Value::String(s) => truncate(s, 500),
            other => {
                let full = pretty(other);
                let long_body = other
                    .get("content")
                    .and_then(Value::as_str)
                    .map(|s| s.chars().count() > 1000)
                    .unwrap_or(false);
                if long_body {
                    full
                } else {
                    full.chars().take(500).collect()
                }
            }
        };
        return format!("{}{}", header, preview);
    }

    match &r.summary {
        Some(summary) => format!(
            "{}{}",
            header,
            render_content_summary(summary, r.content_type.as_deref())
        ),
        None => format!("{}No content found", header),
    }
}

fn render_content_summary(s: &ContentSummary, content_type: Option<&str>) -> String {
    let num = |v: Option<u64>| v.map(|n| n.to_string()).unwrap_or_else(|| "?".into());
    match content_type {
        Some("article") => format!(
            "📰 Article: \"{}\"\n📝 Word count: {}\n⏱️ Reading time: {} minutes\n🖼️ Has media: {}\nPreview: {}",
            s.title.as_deref().unwrap_or("Untitled"),
            num(s.word_count),
            s.reading_time.unwrap_or(0.0),
            s.has_media(),
            s.preview.as_deref().unwrap_or("")
        ),
        Some("search_results") => format!(
            "🔍 Search Results Summary:\n📊 Total results: {}\n🏆 Quality score: {}/100\n📈 Average relevance: {}%\n🌐 Top domains: {}\n📝 Result types: {}",
            num(s.total_results),
            s.quality_score.unwrap_or(0.0),
            (s.avg_score.unwrap_or(0.0) * 100.0).round(),
            s.top_domains.iter().map(|d| d.domain.as_str()).collect::<Vec<_>>().join(", "),
            s.result_types.join(", ")
        ),
        Some("posts") => format!(
            "📱 Social Posts Summary:\n📊 Post count: {}\n📝 Average length: {} characters\n❤️ Total engagement: {}\n🖼️ Posts with media: {}\n👥 Unique authors: {}\n📋 Post types: {}",
            num(s.post_count),
            s.avg_length.unwrap_or(0.0),
            num(s.engagement_total),
            num(s.has_media_count),
            num(s.authors),
            s.post_types.join(", ")
        ),
        _ => format!(
            "Title: {}\nPreview: {}",
            s.title.as_deref().unwrap_or("Untitled"),
            s.preview.as_deref().unwrap_or("")
        ),
    }
}

fn fill_method_label(method: &str) -> &str {
    match method {
        "twitter_direct_bypass" => "🐦 Twitter Direct Bypass",
        "linkedin_direct_bypass" => "💼 LinkedIn Direct Bypass",
        "facebook_direct_bypass" => "📘 Facebook Direct Bypass",
        "generic_direct_bypass" => "🎯 Generic Direct Bypass",
        "standard_fill" => "🔧 Standard Fill",
        "anti_detection_bypass" => "🛡️ Anti-Detection Bypass",
        other => other,
    }
}

fn render_element_fill(r: &ElementFillResult) -> String {
    let method = r.method.as_deref().unwrap_or("unknown");
    let bypass = method.contains("bypass");

    let mut out = format!(
        "{} Element fill {} using {}\n",
        if r.success { "✅" } else { "❌" },
        if r.success { "completed" } else { "failed" },
        fill_method_label(method)
    );
    out.push_str(&format!(
        "📝 Target: {}\n",
        r.element_name.as_deref().or(r.element_id.as_deref()).unwrap_or("unknown")
    ));
    out.push_str(&format!("💬 Input: \"{}\"\n", r.value.as_deref().unwrap_or("")));
    if let Some(actual) = r.actual_value.as_deref().filter(|s| !s.is_empty()) {
        out.push_str(&format!("📄 Result: \"{}\"\n", actual));
    }
    if bypass {
        if let Some(exec) = &r.exec_command_result {
            out.push_str(&format!("🔧 execCommand success: {}\n", plain(exec)));
        }
    }
    if !r.success && bypass {
        out.push_str(
            "\n⚠️ Direct bypass failed - page may have enhanced detection. Try refreshing the page.\n",
        );
    }
    out.trim_end().to_string()
}

fn render_history(r: &HistoryResult) -> String {
    if r.history_items.is_empty() {
        return "🕒 No history items found matching the criteria".into();
    }

    let items = r
        .history_items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                "{}. **{}**\n   [{}] Visits: {} | Last: {}\n   URL: {}",
                i + 1,
                item.title,
                item.domain,
                item.visit_count,
                item.last_visit_time.map(format_date).unwrap_or_else(|| "unknown".into()),
                item.url
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let params = &r.metadata.search_params;
    let mut filters = String::new();
    if let Some(keywords) = &params.keywords {
        filters.push_str(&format!("\n🔍 Search: \"{}\"", keywords));
    }
    if let Some(range) = &params.date_range {
        filters.push_str(&format!("\n📅 Date range: {}", range));
    }
    if let Some(domains) = &params.domains {
        filters.push_str(&format!("\n🌐 Domains: {}", domains.join(", ")));
    }
    if let Some(min) = params.min_visit_count.filter(|m| *m > 1) {
        filters.push_str(&format!("\n📊 Min visits: {}", min));
    }

    format!(
        "🕒 Found {} history items ({} total matches):\n\n{}{}",
        r.history_items.len(),
        r.metadata.total_found,
        items,
        filters
    )
}

fn render_selected_text(r: &SelectedTextResult) -> String {
    if !r.has_selection {
        return format!(
            "📝 No text selected\n\n{}",
            r.message
                .as_deref()
                .unwrap_or("No text is currently selected on the page")
        );
    }

    let mut out = format!(
        "📝 Selected Text ({} characters):\n\n\"{}\"",
        r.character_count,
        truncate(&r.selected_text, 200)
    );
    if r.truncated {
        out.push_str("\n\n⚠️ Text was truncated to fit length limit");
    }

    if let Some(meta) = &r.selection_metadata {
        out.push_str("\n\n📊 Selection Details:");
        out.push_str(&format!("\n• Word count: {}", meta.word_count));
        out.push_str(&format!("\n• Line count: {}", meta.line_count));
        if let Some(pos) = &meta.position {
            out.push_str(&format!("\n• Position: {}, {}", pos.x.round(), pos.y.round()));
        }
        if let Some(tag) = meta.parent_element.as_ref().and_then(|p| p.tag_name.as_ref()) {
            out.push_str(&format!("\n• Parent element: <{}>", tag));
            if let Some(class) = meta.parent_element.as_ref().and_then(|p| p.class_name.as_ref()) {
                out.push_str(&format!(" class=\"{}\"", class));
            }
        }
        if let Some(page) = &meta.page_info {
            out.push_str(&format!("\n• Page: {}", page.title.as_deref().unwrap_or("unknown")));
            out.push_str(&format!("\n• Domain: {}", page.domain.as_deref().unwrap_or("unknown")));
        }
    }
    out
}

fn render_scroll(r: &ScrollResult) -> String {
    if !r.success {
        return format!(
            "📜 Scroll failed: {}",
            r.error.as_deref().unwrap_or("Unknown error")
        );
    }

    let mut out = String::from("📜 Page scrolled successfully");
    if let Some(direction) = &r.direction {
        out.push_str(&format!(" {}", direction));
    }
    match (r.amount.as_deref(), r.pixels) {
        (Some(amount), _) if amount != "custom" => out.push_str(&format!(" ({})", amount)),
        (_, Some(px)) => out.push_str(&format!(" ({}px)", px)),
        _ => {}
    }
    if let Some(element) = &r.element_scrolled {
        out.push_str(&format!("\n🎯 Scrolled to element: {}", element));
    }
    if let Some(pos) = &r.scroll_position {
        out.push_str(&format!("\n📍 New position: x={}, y={}", pos.x, pos.y));
    }
    if let Some(d) = &r.page_dimensions {
        out.push_str(&format!(
            "\n📐 Page size: {}x{} (scrollable: {}x{})",
            d.width, d.height, d.scroll_width, d.scroll_height
        ));
    }
    if let Some(wait) = r.wait_time.filter(|w| *w > 0) {
        out.push_str(&format!("\n⏱️ Waited {}ms after scroll", wait));
    }
    out
}

fn render_links(r: &LinksResult) -> String {
    if r.links.is_empty() {
        return "🔗 No links found on the page".into();
    }

    let mut out = format!(
        "🔗 Found {} links ({} total on page):\n",
        r.returned, r.total_found
    );
    if let Some(domain) = &r.current_domain {
        out.push_str(&format!("\n🌐 Current domain: {}", domain));
    }
    let internal = r.links.iter().filter(|l| l.kind == "internal").count();
    let external = r.links.iter().filter(|l| l.kind == "external").count();
    if internal > 0 && external > 0 {
        out.push_str(&format!("\n📊 Internal: {}, External: {}", internal, external));
    }

    let list = r
        .links
        .iter()
        .enumerate()
        .map(|(i, link)| {
            let icon = if link.kind == "internal" { "🏠" } else { "🌐" };
            let text = truncate(&link.text, 50);
            let text = if text.is_empty() { "[No text]".to_string() } else { text };
            let domain = link.domain.as_ref().map(|d| format!(" [{}]", d)).unwrap_or_default();
            let title = link
                .title
                .as_ref()
                .filter(|t| !t.is_empty())
                .map(|t| format!("\n   Title: {}", t))
                .unwrap_or_default();
            format!("{}. {} **{}**{}{}\n   URL: {}", i + 1, icon, text, domain, title, link.url)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{}\n\n{}", out, list)
}

fn render_tab_create(r: &TabCreateResult) -> String {
    if r.batch_operation {
        let summary = r.summary.clone().unwrap_or_default();
        let mut out = format!(
            "🚀 Batch tab creation completed\n📊 Summary: {}/{} tabs created successfully\n⏱️ Execution time: {}ms\n📦 Chunks processed: {}\n",
            summary.successful,
            summary.total_requested,
            summary.execution_time_ms,
            summary.chunks_processed
        );
        if !r.warnings.is_empty() {
            out.push_str("\n⚠️ Warnings:\n");
            for warning in &r.warnings {
                out.push_str(&format!("   • {}\n", warning));
            }
        }
        if !r.created_tabs.is_empty() {
            out.push_str("\n✅ Created tabs:\n");
            for (i, tab) in r.created_tabs.iter().enumerate() {
                out.push_str(&format!(
                    "   {}. {} (ID: {})\n",
                    i + 1,
                    tab.title.as_deref().unwrap_or("New Tab"),
                    plain(&tab.tab_id)
                ));
                out.push_str(&format!(
                    "      🌐 {}\n",
                    tab.actual_url.as_deref().or(tab.url.as_deref()).unwrap_or("about:blank")
                ));
                if tab.active {
                    out.push_str("      🎯 Active tab\n");
                }
            }
        }
        if !r.errors.is_empty() {
            out.push_str("\n❌ Errors:\n");
            for (i, failure) in r.errors.iter().enumerate() {
                out.push_str(&format!("   {}. {}: {}\n", i + 1, failure.url, failure.error));
            }
        }
        if let Some(settings) = &r.settings_used {
            out.push_str(&format!(
                "\n⚙️ Settings used:\n   • Chunk size: {}\n   • Delay between chunks: {}ms\n   • Delay between tabs: {}ms\n",
                settings.chunk_size, settings.delay_between_chunks, settings.delay_between_tabs
            ));
        }
        return out.trim_end().to_string();
    }

    if !r.success {
        return format!(
            "❌ Failed to create tab: {}",
            r.error.as_deref().unwrap_or("Unknown error")
        );
    }

    let mut out = format!(
        "✅ New tab created successfully\n🆔 Tab ID: {}\n🌐 URL: {}\n🎯 Active: {}\n📝 Title: {}",
        plain(&r.tab_id),
        r.url.as_deref().unwrap_or("about:blank"),
        yes_no(r.active, "Yes", "No"),
        r.title.as_deref().unwrap_or("New Tab")
    );
    if let Some(warning) = &r.warning {
        out.push_str(&format!("\n⚠️ Warning: {}", warning));
    }
    out
}

fn render_tab_close(r: &TabCloseResult) -> String {
    if !r.success {
        return format!(
            "❌ Failed to close tabs: {}",
            r.error.as_deref().unwrap_or("Unknown error")
        );
    }
    format!(
        "✅ Successfully closed {} {}\n🆔 Closed tab IDs: {}",
        r.count,
        if r.count == 1 { "tab" } else { "tabs" },
        r.closed_tabs.iter().map(plain).collect::<Vec<_>>().join(", ")
    )
}

fn render_tab_list(r: &TabListResult) -> String {
    if !r.success || r.tabs.is_empty() {
        return "📋 No tabs found".into();
    }

    let tabs = r
        .tabs
        .iter()
        .enumerate()
        .map(|(i, tab)| {
            format!(
                "{}. {} **{}**{}{}\n   🆔 ID: {} | 🌐 {}",
                i + 1,
                if tab.active { "🟢" } else { "⚪" },
                tab.title,
                if tab.pinned { " 📌" } else { "" },
                tab.status.as_ref().map(|s| format!(" [{}]", s)).unwrap_or_default(),
                plain(&tab.id),
                tab.url
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "📋 Found {} open tabs:\n🎯 Active tab: {}\n\n{}",
        r.count,
        r.active_tab.as_ref().map(plain).unwrap_or_else(|| "None".into()),
        tabs
    )
}

fn render_tab_switch(r: &TabSwitchResult) -> String {
    if !r.success {
        return format!(
            "❌ Failed to switch tabs: {}",
            r.error.as_deref().unwrap_or("Unknown error")
        );
    }
    format!(
        "✅ Successfully switched to tab\n🆔 Tab ID: {}\n📝 Title: {}\n🌐 URL: {}\n🏠 Window ID: {}",
        plain(&r.tab_id),
        r.title.as_deref().unwrap_or(""),
        r.url.as_deref().unwrap_or(""),
        plain(&r.window_id)
    )
}

fn render_element_state(r: &ElementStateResult) -> String {
    let s = &r.state;
    let mut out = format!(
        "🔍 Element State: {}\n\n📊 **Interaction Readiness**: {}\n\n**Detailed State:**\n• Disabled: {}\n• Visible: {}\n• Clickable: {}\n• Focusable: {}\n• Has Text: {}\n• Is Empty: {}",
        r.element_name.as_deref().or(r.element_id.as_deref()).unwrap_or("Unknown element"),
        yes_no(s.interaction_ready, "✅ Ready", "❌ Not Ready"),
        yes_no(s.disabled, "❌ Yes", "✅ No"),
        yes_no(s.visible, "✅ Yes", "❌ No"),
        yes_no(s.clickable, "✅ Yes", "❌ No"),
        yes_no(s.focusable, "✅ Yes", "❌ No"),
        yes_no(s.has_text, "✅ Yes", "❌ No"),
        yes_no(s.is_empty, "❌ Yes", "✅ No"),
    );
    if let Some(value) = r.current_value.as_deref().filter(|v| !v.is_empty()) {
        out.push_str(&format!("\n📝 **Current Value**: \"{}\"", value));
    }
    out
}

fn render_page_style(r: &PageStyleResult) -> String {
    let mut out = format!(
        "🎨 Page styling {}\n\n📄 **Operation Details:**\n• **Mode:** {}\n",
        if r.success { "successfully applied" } else { "failed to apply" },
        r.mode.as_deref().unwrap_or("Unknown")
    );
    if let Some(theme) = &r.theme {
        out.push_str(&format!("• **Theme:** {}\n", theme));
    }
    if let Some(css) = r.applied_css {
        out.push_str(&format!("• **CSS Applied:** {} characters\n", css));
    }
    if let Some(description) = &r.description {
        out.push_str(&format!("• **Result:** {}\n", description));
    }
    if r.remember_enabled {
        out.push_str("• **Saved:** Style preferences saved for this domain\n");
    }
    if let Some(duration) = r.effect_duration {
        out.push_str(&format!("• **Effect Duration:** {} seconds\n", duration));
    }
    if let Some(mood) = &r.mood {
        out.push_str(&format!("• **Mood Applied:** \"{}\"\n", mood));
    }
    if let Some(intensity) = &r.intensity {
        out.push_str(&format!("• **Intensity:** {}\n", intensity));
    }
    if !r.success {
        if let Some(error) = &r.error {
            out.push_str(&format!("\n❌ **Error:** {}\n", error));
        }
    }
    if let Some(warning) = &r.warning {
        out.push_str(&format!("\n⚠️ **Warning:** {}\n", warning));
    }
    out.push_str("\n💡 **Tip:** Use mode=\"reset\" to restore original page styling");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tool_is_pretty_json_without_metadata() {
        let text = format_tool_result("get_bookmarks", json!({"bookmarks": []}));
        assert_eq!(text, "{\n  \"bookmarks\": []\n}");
    }

    #[test]
    fn known_tool_appends_metadata() {
        let text = format_tool_result(
            "element_click",
            json!({"element_id": "btn_1", "execution_time": 12}),
        );
        assert!(text.starts_with("✅ Successfully clicked element: btn_1\nClick type: left"));
        assert!(text.contains("\"tool\": \"element_click\""));
        assert!(text.contains("\"execution_time\": 12"));
    }

    #[test]
    fn undecodable_shape_falls_back_to_other() {
        let result = ToolResult::from_call("tab_list", json!("not an object"));
        assert!(matches!(result, ToolResult::Other(_)));
    }

    #[test]
    fn selected_text_without_selection() {
        let result = ToolResult::from_call("get_selected_text", json!({"has_selection": false}));
        assert!(result.render().starts_with("📝 No text selected"));
    }

    #[test]
    fn selected_text_preview_is_truncated() {
        let long = "x".repeat(250);
        let result = ToolResult::from_call(
            "get_selected_text",
            json!({"has_selection": true, "selected_text": long, "character_count": 250}),
        );
        let text = result.render();
        assert!(text.contains(&format!("\"{}...\"", "x".repeat(200))));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("hi", 5), "hi");
    }

    #[test]
    fn tab_list_renders_each_tab() {
        let result = ToolResult::from_call(
            "tab_list",
            json!({
                "success": true,
                "count": 2,
                "active_tab": 2,
                "tabs": [
                    {"id": 1, "title": "Docs", "url": "https://docs.rs", "pinned": true},
                    {"id": 2, "title": "News", "url": "https://bbc.com", "active": true, "status": "complete"}
                ]
            }),
        );
        let text = result.render();
        assert!(text.starts_with("📋 Found 2 open tabs:\n🎯 Active tab: 2"));
        assert!(text.contains("1. ⚪ **Docs** 📌\n   🆔 ID: 1 | 🌐 https://docs.rs"));
        assert!(text.contains("2. 🟢 **News** [complete]"));
    }

    #[test]
    fn fill_failure_with_bypass_warns() {
        let result = ToolResult::from_call(
            "element_fill",
            json!({"success": false, "method": "twitter_direct_bypass", "element_id": "t1", "value": "hi"}),
        );
        let text = result.render();
        assert!(text.starts_with("❌ Element fill failed using 🐦 Twitter Direct Bypass"));
        assert!(text.contains("Direct bypass failed"));
    }
}
