/// MCP tool handlers.
///
/// 1. lookup_section – fetch one section by document path + anchor slug
/// 2. search_docs    – ranked keyword search over all sections
/// 3. list_sections  – outline of every section under a path prefix
/// 4. refresh_docs   – rebuild the corpus in the background
/// 5. cache_status   – channel, version and freshness of the serving corpus
///
/// Every failure is reported as a tool result carrying
/// `{"error": {"kind", "message"}}`; no handler returns a protocol error.
use crate::config::Config;
use crate::error::RetrievalError;
use crate::mcp::server::McpContext;
use crate::serving::ServingState;
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::error;

/// Longest query accepted by `search_docs`, in characters.
pub const MAX_QUERY_CHARS: usize = 512;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct LookupSectionParams {
    /// Document path relative to the channel (e.g. 'components.md')
    #[serde(default)]
    path: String,
    /// Anchor slug of the heading (e.g. 'building-composites')
    #[serde(default)]
    slug: String,
}

#[derive(Deserialize, JsonSchema)]
struct SearchDocsParams {
    /// Keywords to search for
    #[serde(default)]
    query: String,
    /// Max results (default: 10, max: 20)
    limit: Option<i64>,
}

#[derive(Deserialize, JsonSchema)]
struct ListSectionsParams {
    /// Path prefix such as 'components.md' or a directory (all documents if omitted)
    path_prefix: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
struct RefreshDocsParams {
    /// Upstream version the refreshed cache corresponds to (optional)
    version: Option<String>,
}

// ── Handlers (pure, run against one snapshot) ────────────────────────

/// `lookup_section` against a snapshot.
pub fn handle_lookup(state: &ServingState, path: &str, slug: &str) -> Result<Value, RetrievalError> {
    if path.trim().is_empty() {
        return Err(RetrievalError::InvalidArgument("path is required".into()));
    }
    if slug.trim().is_empty() {
        return Err(RetrievalError::InvalidArgument("slug is required".into()));
    }

    let view = state.query().get_by_anchor(path, slug)?;
    Ok(json!({
        "path": view.path(),
        "slug": view.slug(),
        "heading": view.heading(),
        "depth": view.depth(),
        "content": view.content(),
    }))
}

/// `search_docs` against a snapshot.
pub fn handle_search(
    state: &ServingState,
    config: &Config,
    query: &str,
    limit: Option<i64>,
) -> Result<Value, RetrievalError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(RetrievalError::InvalidArgument("query is required".into()));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(RetrievalError::InvalidArgument(format!(
            "query is longer than {MAX_QUERY_CHARS} characters"
        )));
    }

    let max = config.search_max_limit;
    let limit = match limit {
        None => config.search_default_limit,
        Some(n) if n >= 1 && (n as u64) <= max as u64 => n as usize,
        Some(n) => {
            return Err(RetrievalError::InvalidArgument(format!(
                "limit must be between 1 and {max}, got {n}"
            )));
        }
    };

    let engine = state.query().with_excerpt_chars(config.excerpt_chars);
    let results: Vec<Value> = engine
        .search(query, limit)
        .into_iter()
        .map(|r| {
            let mut hit = json!({
                "path": r.path,
                "slug": r.slug,
                "heading": r.heading,
                "excerpt": r.excerpt,
                "score": r.score,
            });
            // Text outside any heading has no anchor to look up later.
            if let Some(view) = engine
                .get_by_anchor(&r.path, &r.slug)
                .ok()
                .filter(|v| v.section.is_synthetic())
            {
                hit["content"] = json!(view.content());
            }
            hit
        })
        .collect();

    Ok(json!({ "results": results }))
}

/// `list_sections` against a snapshot.
pub fn handle_list(state: &ServingState, prefix: &str) -> Result<Value, RetrievalError> {
    let sections: Vec<Value> = state
        .query()
        .sections_under(prefix.trim())?
        .iter()
        .map(|v| {
            json!({
                "path": v.path(),
                "slug": v.slug(),
                "heading": v.heading(),
                "depth": v.depth(),
                "modified": v.document.modified,
            })
        })
        .collect();

    Ok(json!({ "sections": sections }))
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result(value: Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )]))
}

fn error_result(err: &RetrievalError) -> Result<CallToolResult, McpError> {
    if let RetrievalError::Internal(detail) = err {
        error!("Internal retrieval error: {detail}");
    }
    Ok(CallToolResult::error(vec![Content::text(
        err.to_payload().to_string(),
    )]))
}

fn respond(result: Result<Value, RetrievalError>) -> Result<CallToolResult, McpError> {
    match result {
        Ok(value) => json_result(value),
        Err(e) => error_result(&e),
    }
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

impl AppTools {
    /// Run `f` on a blocking thread against the current snapshot. A panic
    /// inside `f` becomes an internal error.
    async fn run_query<F>(&self, f: F) -> Result<CallToolResult, McpError>
    where
        F: FnOnce(&ServingState, &Config) -> Result<Value, RetrievalError> + Send + 'static,
    {
        let state = self.ctx.manager.snapshot();
        let config = self.ctx.config.clone();
        let result = tokio::task::spawn_blocking(move || f(&state, &config))
            .await
            .unwrap_or_else(|e| Err(RetrievalError::Internal(format!("query task failed: {e}"))));
        respond(result)
    }
}

#[tool_router]
impl AppTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Fetch one section of the Glyphs handbook by document path and heading anchor slug (e.g. path 'components.md', slug 'building-composites'). Use the path and slug returned by search_docs."
    )]
    async fn lookup_section(
        &self,
        params: Parameters<LookupSectionParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        self.run_query(move |state, _| handle_lookup(state, &p.path, &p.slug))
            .await
    }

    #[tool(
        description = "Keyword search over the Glyphs handbook. Returns the best matching sections with an excerpt, their document path and anchor slug for lookup_section. Hits from text outside any heading have an empty slug and carry their full content instead."
    )]
    async fn search_docs(
        &self,
        params: Parameters<SearchDocsParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        self.run_query(move |state, config| handle_search(state, config, &p.query, p.limit))
            .await
    }

    #[tool(
        description = "List the sections (path, slug, heading, depth, modified time) of every handbook document under a path prefix."
    )]
    async fn list_sections(
        &self,
        params: Parameters<ListSectionsParams>,
    ) -> Result<CallToolResult, McpError> {
        let prefix = params.0.path_prefix.unwrap_or_default();
        self.run_query(move |state, _| handle_list(state, &prefix))
            .await
    }

    #[tool(
        description = "Reload the handbook cache from disk in the background. Queries keep being answered from the current corpus until the new one is ready."
    )]
    async fn refresh_docs(
        &self,
        params: Parameters<RefreshDocsParams>,
    ) -> Result<CallToolResult, McpError> {
        let manager = self.ctx.manager.clone();
        if let Some(version) = params.0.version {
            let version = version.trim();
            if version.is_empty() {
                return error_result(&RetrievalError::InvalidArgument(
                    "version must not be blank".into(),
                ));
            }
            manager.observe_upstream(version);
        }

        let background = manager.clone();
        tokio::spawn(async move {
            background.refresh().await;
        });

        json_result(json!({
            "success": true,
            "message": "Refresh started",
            "serving_version": manager.snapshot().manifest.version,
        }))
    }

    #[tool(description = "Report the channel, version, size and freshness of the served handbook cache")]
    async fn cache_status(&self) -> Result<CallToolResult, McpError> {
        match serde_json::to_value(self.ctx.manager.status()) {
            Ok(value) => json_result(value),
            Err(e) => error_result(&RetrievalError::Internal(format!(
                "status serialization failed: {e}"
            ))),
        }
    }
}
