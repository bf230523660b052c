//! ASCII tree rendering for module hierarchies.

use crate::models::{Feature, Module, ParsedBrd, Priority, UserStory};

const HIGH: char = '▲';
const MEDIUM: char = '■';
const LOW: char = '▽';

fn priority_symbol(priority: Priority) -> char {
    match priority {
        Priority::High => HIGH,
        Priority::Medium => MEDIUM,
        Priority::Low => LOW,
    }
}

/// A display line and its children, independent of hierarchy level.
struct Node {
    label: String,
    priority: Priority,
    children: Vec<Node>,
}

impl From<&Feature> for Node {
    fn from(feature: &Feature) -> Self {
        let label = match feature.estimated_hours {
            Some(hours) => format!("{} ({}h)", feature.feature_name, hours),
            None => feature.feature_name.clone(),
        };
        Node {
            label,
            priority: feature.priority,
            children: Vec::new(),
        }
    }
}

impl From<&UserStory> for Node {
    fn from(story: &UserStory) -> Self {
        Node {
            label: story.title.clone(),
            priority: story.priority,
            children: story.features.iter().map(Node::from).collect(),
        }
    }
}

impl From<&Module> for Node {
    fn from(module: &Module) -> Self {
        Node {
            label: module.module_name.clone(),
            priority: module.priority,
            children: module.user_stories.iter().map(Node::from).collect(),
        }
    }
}

/// Render a hierarchy as ASCII art with priority symbols.
///
/// Example output:
/// ```text
/// Task Tracker (Web Application)
///
/// ▲ Authentication
/// ├── ▲ As a user I want to log in
/// │   ├── ▲ Login form (6h)
/// │   └── ▽ Remember me
/// └── ■ As an admin I want to reset passwords
/// ```
pub fn render_tree(tree: &ParsedBrd) -> String {
    let mut output = format!(
        "{} ({})\n",
        tree.project_overview.project_name, tree.application_type
    );
    for module in &tree.modules {
        output.push('\n');
        render_node(&mut output, &Node::from(module), "", true, true);
    }
    if !tree.business_rules.is_empty() {
        output.push_str(&format!("\nBusiness rules: {}\n", tree.business_rules.len()));
    }
    output
}

fn render_node(output: &mut String, node: &Node, prefix: &str, is_last: bool, is_root: bool) {
    if !is_root {
        output.push_str(prefix);
        output.push_str(if is_last { "└── " } else { "├── " });
    }
    output.push(priority_symbol(node.priority));
    output.push(' ');
    output.push_str(&node.label);
    output.push('\n');

    let child_prefix = if is_root {
        String::new()
    } else {
        format!("{}{}", prefix, if is_last { "    " } else { "│   " })
    };

    for (i, child) in node.children.iter().enumerate() {
        let child_is_last = i == node.children.len() - 1;
        render_node(output, child, &child_prefix, child_is_last, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(name: &str, priority: Priority, hours: Option<f64>) -> Feature {
        Feature {
            feature_name: name.to_string(),
            priority,
            estimated_hours: hours,
            ..Default::default()
        }
    }

    fn tree(modules: Vec<Module>) -> ParsedBrd {
        let mut tree = ParsedBrd {
            modules,
            ..Default::default()
        };
        tree.project_overview.project_name = "Task Tracker".to_string();
        tree
    }

    #[test]
    fn test_empty_tree() {
        assert_eq!(render_tree(&tree(vec![])), "Task Tracker (Web Application)\n");
    }

    #[test]
    fn test_nested_levels() {
        let module = Module {
            module_name: "Authentication".to_string(),
            priority: Priority::High,
            user_stories: vec![
                UserStory {
                    title: "Log in".to_string(),
                    priority: Priority::High,
                    features: vec![
                        feature("Login form", Priority::High, Some(6.0)),
                        feature("Remember me", Priority::Low, None),
                    ],
                    ..Default::default()
                },
                UserStory {
                    title: "Reset password".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let output = render_tree(&tree(vec![module]));
        let expected = "Task Tracker (Web Application)\n\n▲ Authentication\n├── ▲ Log in\n│   ├── ▲ Login form (6h)\n│   └── ▽ Remember me\n└── ■ Reset password\n";
        assert_eq!(output, expected);
    }
}
