use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::session::ToolDeclaration;

/// Function name the agent uses to drive in-app navigation
pub const NAVIGATE_TOOL: &str = "navigate_to_view";

/// Views the agent is allowed to navigate to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppView {
    Dashboard,
    Tasks,
    Calendar,
    Settings,
}

impl AppView {
    pub const ALL: [AppView; 4] = [
        AppView::Dashboard,
        AppView::Tasks,
        AppView::Calendar,
        AppView::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppView::Dashboard => "dashboard",
            AppView::Tasks => "tasks",
            AppView::Calendar => "calendar",
            AppView::Settings => "settings",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|view| view.as_str() == name)
    }
}

/// A request from the agent to show a view; consumed by the embedding app
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationIntent {
    pub target: AppView,
}

/// Declaration of the navigation tool advertised at session open
pub fn tool_declaration() -> ToolDeclaration {
    let views: Vec<&str> = AppView::ALL.iter().map(AppView::as_str).collect();
    ToolDeclaration {
        name: NAVIGATE_TOOL.to_string(),
        description: "Navigate the application to a named view".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "view": {
                    "type": "string",
                    "enum": views,
                }
            },
            "required": ["view"],
        }),
    }
}

/// Extract and validate the `view` argument of a navigation call
pub fn parse_view_argument(args: &serde_json::Value) -> Option<AppView> {
    args.get("view").and_then(|v| v.as_str()).and_then(AppView::parse)
}
