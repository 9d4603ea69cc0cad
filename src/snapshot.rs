// ElementTree snapshot
//
// A simplified, point-in-time description of the styled document, produced
// by the host before each generation round. Addressable classes are the
// hooks the model may target; auxiliary classes exist on the page but must
// be left alone. The tree is never mutated once built.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const TEXT_EXCERPT_CHARS: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ElementNode {
    pub tag: String,
    #[serde(default)]
    pub addressable_classes: BTreeSet<String>,
    #[serde(default)]
    pub auxiliary_classes: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub children: Vec<ElementNode>,
}

impl ElementNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// Render a compact indented outline for prompt embedding.
    ///
    /// One line per element: tag, addressable classes as selectors, an
    /// excerpt of the element's own text. Auxiliary classes are appended in
    /// brackets so the model knows they exist without being invited to
    /// restyle them.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.outline_into(&mut out, 0);
        out
    }

    fn outline_into(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(&self.tag);
        for class in &self.addressable_classes {
            out.push_str(" .");
            out.push_str(class);
        }
        if !self.auxiliary_classes.is_empty() {
            let aux: Vec<&str> = self.auxiliary_classes.iter().map(String::as_str).collect();
            out.push_str(&format!(" [aux: {}]", aux.join(" ")));
        }
        if let Some(text) = &self.text {
            let excerpt = excerpt(text);
            if !excerpt.is_empty() {
                out.push_str(&format!(" \"{}\"", excerpt));
            }
        }
        out.push('\n');
        for child in &self.children {
            child.outline_into(out, depth + 1);
        }
    }

    /// All addressable classes in this subtree, deduplicated.
    pub fn all_addressable_classes(&self) -> BTreeSet<String> {
        let mut set = self.addressable_classes.clone();
        for child in &self.children {
            set.extend(child.all_addressable_classes());
        }
        set
    }
}

fn excerpt(text: &str) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= TEXT_EXCERPT_CHARS {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(TEXT_EXCERPT_CHARS).collect();
    format!("{}…", cut.trim_end())
}
