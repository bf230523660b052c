//! Fills in `applicableTo` for business rules the backend left unscoped.

use crate::models::{BusinessRule, Module, APPLIES_TO_ALL};

/// Domain categories and the rule keywords that point at them.
///
/// A category is linked to a project module when they share a name token, or
/// when a token of the module name is itself one of the category's keywords.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Authentication",
        &[
            "password", "login", "log in", "registration", "sign up", "sign in", "signup",
            "credential", "authentication", "session", "unique user", "user identifier",
        ],
    ),
    (
        "User Management",
        &["user", "customer", "profile", "role", "permission", "account"],
    ),
    (
        "Product Catalog",
        &["product", "listing", "catalog", "inventory", "stock"],
    ),
    ("Shopping Cart", &["cart", "basket", "in-stock"]),
    (
        "Order Management",
        &["order", "shipped", "delivered", "fulfilment", "fulfillment", "workflow"],
    ),
    (
        "Payment",
        &["payment", "gateway", "pci", "card", "refund", "invoice", "billing", "cash on delivery"],
    ),
    ("Checkout", &["checkout", "order placement"]),
    ("Returns Refunds", &["return", "refund"]),
    (
        "Admin Dashboard",
        &["admin", "administrative", "approval", "audit", "moderation"],
    ),
    ("Rewards Loyalty", &["reward", "loyalty", "points", "redemption"]),
    (
        "Notifications",
        &["notification", "notify", "alert", "email", "sms", "reminder"],
    ),
    ("Search", &["search", "filter", "query", "sort"]),
    (
        "Reporting Analytics",
        &["report", "analytics", "dashboard", "export", "metric", "chart"],
    ),
    (
        "Security Compliance",
        &["security", "compliance", "encryption", "gdpr", "privacy", "audit"],
    ),
    (
        "Performance Infrastructure",
        &["performance", "uptime", "scalability", "latency", "concurrent", "availability"],
    ),
];

/// Tokens shorter than this carry no signal ("and", "of", "ui").
const MIN_TOKEN_LEN: usize = 4;

/// Module names a rule applies to, inferred from its text.
///
/// Returns `["all"]` when nothing in the rule points at a specific module.
pub fn infer_applicability(rule: &BusinessRule, modules: &[Module]) -> Vec<String> {
    let text = format!("{} {}", rule.rule_name, rule.rule_description).to_lowercase();

    let matched: Vec<String> = modules
        .iter()
        .filter(|module| {
            let tokens = tokens(&module.module_name);
            !tokens.is_empty()
                && (tokens.iter().any(|t| text.contains(t.as_str()))
                    || linked_keywords(&tokens).any(|k| text.contains(k)))
        })
        .map(|module| module.module_name.trim().to_string())
        .collect();

    if matched.is_empty() {
        vec![APPLIES_TO_ALL.to_string()]
    } else {
        matched
    }
}

/// Infer `applicableTo` for every rule that has none. Returns how many were filled.
pub fn apply_rule_applicability(rules: &mut [BusinessRule], modules: &[Module]) -> usize {
    let mut filled = 0;
    for rule in rules.iter_mut().filter(|r| r.applicable_to.is_empty()) {
        rule.applicable_to = infer_applicability(rule, modules);
        tracing::debug!(
            rule = %rule.rule_name,
            applicable_to = ?rule.applicable_to,
            "Inferred rule applicability"
        );
        filled += 1;
    }
    filled
}

fn tokens(name: &str) -> Vec<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_lowercase)
        .collect()
}

/// Keywords of every category linked to a module with these name tokens.
fn linked_keywords(module_tokens: &[String]) -> impl Iterator<Item = &'static str> + '_ {
    CATEGORY_KEYWORDS
        .iter()
        .filter(move |(category, keywords)| {
            let category_tokens = tokens(category);
            module_tokens
                .iter()
                .any(|t| category_tokens.contains(t) || keywords.contains(&t.as_str()))
        })
        .flat_map(|(_, keywords)| keywords.iter().copied())
}
