//! Interactive element discovery.
//!
//! The renderer owns the live document; the guide only sees it through an
//! [`ElementSource`]. Every node carrying a `data-testid` attribute is a
//! candidate. Features that want their elements discoverable as a group
//! prefix the test id with their module id (`"studio-create-deck"`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GuideError;

/// Attribute every discoverable element carries.
pub const TEST_ID_ATTRIBUTE: &str = "data-testid";

// ---------------------------------------------------------------------------
// Source side: raw nodes
// ---------------------------------------------------------------------------

/// Computed style properties relevant to visibility.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedStyle {
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
}

/// A node as reported by the renderer at scan time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomNode {
    /// Tag name, compared case-insensitively.
    pub tag: String,

    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    #[serde(default)]
    pub style: ComputedStyle,

    /// Live `value` property for form controls.
    #[serde(default)]
    pub value: Option<String>,

    /// Live `checked` property for checkboxes.
    #[serde(default)]
    pub checked: Option<bool>,
}

impl DomNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn test_id(self, id: impl Into<String>) -> Self {
        self.attr(TEST_ID_ATTRIBUTE, id)
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = Some(checked);
        self
    }

    pub fn with_style(mut self, display: Option<&str>, visibility: Option<&str>) -> Self {
        self.style = ComputedStyle {
            display: display.map(str::to_string),
            visibility: visibility.map(str::to_string),
        };
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn is_tag(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }
}

/// Anything that can enumerate the document's test-id-tagged nodes.
///
/// Errors are not caught by the registry; they surface to the caller of
/// `discover_elements`.
pub trait ElementSource: Send + Sync {
    fn tagged_elements(&self) -> Result<Vec<DomNode>, GuideError>;
}

/// In-memory document pushed by the renderer (or built by a test harness).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    #[serde(default)]
    pub nodes: Vec<DomNode>,
}

impl DocumentSnapshot {
    pub fn new(nodes: Vec<DomNode>) -> Self {
        Self { nodes }
    }

    pub fn from_json(value: Value) -> Result<Self, GuideError> {
        Ok(serde_json::from_value(value)?)
    }
}

impl ElementSource for DocumentSnapshot {
    fn tagged_elements(&self) -> Result<Vec<DomNode>, GuideError> {
        Ok(self
            .nodes
            .iter()
            .filter(|n| n.attribute(TEST_ID_ATTRIBUTE).is_some())
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Guide side: classified elements
// ---------------------------------------------------------------------------

/// Coarse interaction class of a discovered element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Button,
    Select,
    Input,
    Toggle,
    Tab,
    Center,
    Channel,
    Other,
}

/// An element the controller may act upon. Computed fresh per scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideElement {
    pub test_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub is_visible: bool,
    pub is_disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<Value>,
}

impl GuideElement {
    /// Describe a node. Returns `None` for nodes without a test id.
    pub fn from_node(node: &DomNode) -> Option<Self> {
        let test_id = node.attribute(TEST_ID_ATTRIBUTE)?.to_string();
        Some(Self {
            aria_label: node.attribute("aria-label").map(str::to_string),
            element_type: classify(node, &test_id),
            is_visible: is_visible(node),
            is_disabled: is_disabled(node),
            current_value: current_value(node),
            test_id,
        })
    }
}

/// Classify in priority order: button-like, select, input/textarea, then
/// test-id keywords.
pub fn classify(node: &DomNode, test_id: &str) -> ElementType {
    if node.is_tag("button") || node.attribute("role") == Some("button") {
        ElementType::Button
    } else if node.is_tag("select") {
        ElementType::Select
    } else if node.is_tag("input") || node.is_tag("textarea") {
        ElementType::Input
    } else if test_id.contains("toggle") {
        ElementType::Toggle
    } else if test_id.contains("tab") {
        ElementType::Tab
    } else if test_id.contains("center") {
        ElementType::Center
    } else if test_id.contains("channel") {
        ElementType::Channel
    } else {
        ElementType::Other
    }
}

fn is_visible(node: &DomNode) -> bool {
    node.style.display.as_deref() != Some("none")
        && node.style.visibility.as_deref() != Some("hidden")
}

fn is_disabled(node: &DomNode) -> bool {
    node.attribute("disabled").is_some() || node.attribute("aria-disabled") == Some("true")
}

fn current_value(node: &DomNode) -> Option<Value> {
    if node.is_tag("select") {
        return Some(Value::String(node.value.clone().unwrap_or_default()));
    }
    if node.is_tag("input") {
        let is_checkbox = node
            .attribute("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("checkbox"));
        if is_checkbox {
            return Some(Value::Bool(node.checked.unwrap_or(false)));
        }
        return Some(Value::String(node.value.clone().unwrap_or_default()));
    }
    None
}

/// Scan `source` and describe every tagged node, optionally restricted to
/// test ids prefixed `"<module_id>-"`.
pub fn discover(
    source: &dyn ElementSource,
    module_id: Option<&str>,
) -> Result<Vec<GuideElement>, GuideError> {
    let prefix = module_id.map(|id| format!("{}-", id));
    let elements = source
        .tagged_elements()?
        .iter()
        .filter_map(GuideElement::from_node)
        .filter(|el| match &prefix {
            Some(prefix) => el.test_id.starts_with(prefix.as_str()),
            None => true,
        })
        .collect();
    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify_node(node: DomNode) -> ElementType {
        GuideElement::from_node(&node).unwrap().element_type
    }

    #[test]
    fn test_classify_native_controls() {
        assert_eq!(classify_node(DomNode::new("button").test_id("studio-save")), ElementType::Button);
        assert_eq!(classify_node(DomNode::new("SELECT").test_id("studio-deck")), ElementType::Select);
        assert_eq!(
            classify_node(DomNode::new("input").attr("type", "text").test_id("studio-name")),
            ElementType::Input
        );
        assert_eq!(classify_node(DomNode::new("textarea").test_id("journal-body")), ElementType::Input);
    }

    #[test]
    fn test_classify_role_button_beats_keywords() {
        let node = DomNode::new("div").attr("role", "button").test_id("chart-toggle-grid");
        assert_eq!(classify_node(node), ElementType::Button);
    }

    #[test]
    fn test_classify_by_test_id_keywords() {
        assert_eq!(classify_node(DomNode::new("div").test_id("chart-toggle-aspects")), ElementType::Toggle);
        assert_eq!(classify_node(DomNode::new("div").test_id("studio-tab-tarot")), ElementType::Tab);
        assert_eq!(classify_node(DomNode::new("div").test_id("hd-center-sacral")), ElementType::Center);
        assert_eq!(classify_node(DomNode::new("path").test_id("hd-channel-34-20")), ElementType::Channel);
        assert_eq!(classify_node(DomNode::new("span").test_id("chart-legend")), ElementType::Other);
    }

    #[test]
    fn test_input_with_toggle_id_stays_input() {
        let node = DomNode::new("input").attr("type", "checkbox").test_id("chart-toggle-houses");
        assert_eq!(classify_node(node), ElementType::Input);
    }

    #[test]
    fn test_visibility_and_disabled() {
        let hidden = GuideElement::from_node(
            &DomNode::new("button").test_id("a").with_style(Some("none"), None),
        )
        .unwrap();
        assert!(!hidden.is_visible);

        let invisible = GuideElement::from_node(
            &DomNode::new("button").test_id("b").with_style(Some("block"), Some("hidden")),
        )
        .unwrap();
        assert!(!invisible.is_visible);

        let disabled = GuideElement::from_node(&DomNode::new("button").test_id("c").attr("disabled", "")).unwrap();
        assert!(disabled.is_disabled);
        assert!(disabled.is_visible);

        let aria = GuideElement::from_node(&DomNode::new("div").test_id("d").attr("aria-disabled", "true")).unwrap();
        assert!(aria.is_disabled);

        let aria_false =
            GuideElement::from_node(&DomNode::new("div").test_id("e").attr("aria-disabled", "false")).unwrap();
        assert!(!aria_false.is_disabled);
    }

    #[test]
    fn test_current_value_extraction() {
        let select = GuideElement::from_node(&DomNode::new("select").test_id("s").with_value("placidus")).unwrap();
        assert_eq!(select.current_value, Some(json!("placidus")));

        let checkbox = GuideElement::from_node(
            &DomNode::new("input").attr("type", "checkbox").test_id("c").with_checked(true),
        )
        .unwrap();
        assert_eq!(checkbox.current_value, Some(json!(true)));

        let text = GuideElement::from_node(&DomNode::new("input").test_id("t").with_value("Ada")).unwrap();
        assert_eq!(text.current_value, Some(json!("Ada")));

        let textarea = GuideElement::from_node(&DomNode::new("textarea").test_id("x").with_value("notes")).unwrap();
        assert_eq!(textarea.current_value, None);
    }

    #[test]
    fn test_discover_filters_by_module_prefix() {
        let doc = DocumentSnapshot::new(vec![
            DomNode::new("button").test_id("studio-save").attr("aria-label", "Save"),
            DomNode::new("button").test_id("studiox-other"),
            DomNode::new("button").test_id("chart-open"),
            DomNode::new("div"),
        ]);

        let studio = discover(&doc, Some("studio")).unwrap();
        assert_eq!(studio.len(), 1);
        assert_eq!(studio[0].test_id, "studio-save");
        assert_eq!(studio[0].aria_label.as_deref(), Some("Save"));

        let all = discover(&doc, None).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_document_snapshot_from_json() {
        let doc = DocumentSnapshot::from_json(json!({
            "nodes": [
                {"tag": "button", "attributes": {"data-testid": "chart-export"}},
                {"tag": "select", "attributes": {"data-testid": "chart-house"}, "value": "whole"}
            ]
        }))
        .unwrap();
        let elements = discover(&doc, Some("chart")).unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1].element_type, ElementType::Select);
        assert_eq!(
            serde_json::to_value(&elements[0]).unwrap(),
            json!({"testId": "chart-export", "type": "button", "isVisible": true, "isDisabled": false})
        );
    }
}
