//! Selector matching against a single node snapshot
//!
//! Pure and stateless: every answer is derived from the candidate's own
//! snapshot. Rule chains need the surrounding tree and are resolved by the
//! query layer, so a chain never matches here.

use crate::selector::{AttributeSelector, Comparator, Selector};
use crate::types::DomNode;

/// Return the candidate if it matches `selector`
pub fn match_node<'a>(candidate: &'a DomNode, selector: &Selector) -> Option<&'a DomNode> {
    matches(candidate, selector).then_some(candidate)
}

pub fn matches(candidate: &DomNode, selector: &Selector) -> bool {
    match selector {
        Selector::TagName { name } if name == "*" => true,
        Selector::TagName { name } => candidate
            .tag_name()
            .is_some_and(|tag| tag.eq_ignore_ascii_case(name)),
        Selector::Id { value } => candidate.is_element() && candidate.id() == Some(value.as_str()),
        Selector::Class { names } => {
            candidate.is_element() && names.iter().all(|name| candidate.has_class(name))
        }
        Selector::Attribute(attr) => candidate.is_element() && matches_attribute(candidate, attr),
        Selector::PseudoClass { name, params } => matches_pseudo(candidate, name, params),
        Selector::CompoundRule { rules } => rules.iter().all(|rule| matches(candidate, rule)),
        Selector::RuleChain { .. } => false,
        Selector::List { selectors } => selectors.iter().any(|alt| matches(candidate, alt)),
    }
}

fn matches_pseudo(candidate: &DomNode, name: &str, params: &[Selector]) -> bool {
    match name {
        "not" => !params.iter().any(|param| matches(candidate, param)),
        "is" | "where" => params.iter().any(|param| matches(candidate, param)),
        "first-child" => {
            candidate.is_element()
                && candidate.parent_id.is_some()
                && candidate.previous_element_sibling_id.is_none()
        }
        "last-child" => {
            candidate.is_element()
                && candidate.parent_id.is_some()
                && candidate.next_element_sibling_id.is_none()
        }
        "only-child" => {
            candidate.is_element()
                && candidate.parent_id.is_some()
                && candidate.previous_element_sibling_id.is_none()
                && candidate.next_element_sibling_id.is_none()
        }
        "empty" => candidate.children_ids.is_empty(),
        "root" => candidate.is_element() && candidate.parent_element_id.is_none(),
        _ => false,
    }
}

fn matches_attribute(candidate: &DomNode, selector: &AttributeSelector) -> bool {
    let name = match selector.namespace.as_deref() {
        Some(ns) if !ns.is_empty() && ns != "*" => format!("{}:{}", ns, selector.name),
        _ => selector.name.clone(),
    };

    let Some(actual) = candidate.attr(&name) else {
        return false;
    };

    if selector.case_insensitive {
        compare(
            selector.comparator,
            &actual.to_lowercase(),
            &selector.value.to_lowercase(),
        )
    } else {
        compare(selector.comparator, actual, &selector.value)
    }
}

fn compare(comparator: Comparator, actual: &str, expected: &str) -> bool {
    match comparator {
        Comparator::Exists => true,
        Comparator::Equal => actual == expected,
        Comparator::Prefix => !expected.is_empty() && actual.starts_with(expected),
        Comparator::Suffix => !expected.is_empty() && actual.ends_with(expected),
        Comparator::Substring => !expected.is_empty() && actual.contains(expected),
        Comparator::DashMatch => {
            actual == expected
                || actual
                    .strip_prefix(expected)
                    .is_some_and(|rest| rest.starts_with('-'))
        }
        Comparator::Includes => {
            let wanted: Vec<&str> = expected.split_whitespace().collect();
            if wanted.is_empty() {
                return false;
            }
            let tokens: Vec<&str> = actual.split_whitespace().collect();
            tokens
                .windows(wanted.len())
                .any(|window| window == wanted.as_slice())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeInit, NodeType};

    fn element(init: NodeInit) -> DomNode {
        DomNode::from_init(1, init)
    }

    #[test]
    fn test_universal_matches_any_kind() {
        let text = element(NodeInit::text("hi"));
        assert!(matches(&text, &Selector::universal()));
        assert!(!matches(&text, &Selector::tag("div")));
    }

    #[test]
    fn test_tag_id_class() {
        let node = element(
            NodeInit::element("DIV")
                .with_id("x")
                .with_class("a")
                .with_class("b"),
        );
        assert!(matches(&node, &Selector::tag("div")));
        assert!(matches(&node, &Selector::id("x")));
        assert!(!matches(&node, &Selector::id("y")));
        assert!(matches(&node, &Selector::classes(&["a", "b"])));
        assert!(!matches(&node, &Selector::classes(&["a", "c"])));
        assert!(match_node(&node, &Selector::class("b")).is_some());
    }

    #[test]
    fn test_dash_match() {
        let node = element(NodeInit::element("p").with_attribute("lang", "en-US"));
        assert!(matches(&node, &Selector::attr(Comparator::DashMatch, "lang", "en")));
        assert!(matches(&node, &Selector::attr(Comparator::DashMatch, "lang", "en-US")));
        assert!(!matches(&node, &Selector::attr(Comparator::DashMatch, "lang", "en-U")));
    }

    #[test]
    fn test_includes() {
        let node = element(NodeInit::element("p").with_attribute("class", "a b c"));
        assert!(matches(&node, &Selector::attr(Comparator::Includes, "class", "b")));
        assert!(matches(&node, &Selector::attr(Comparator::Includes, "class", "b c")));
        assert!(!matches(&node, &Selector::attr(Comparator::Includes, "class", "bc")));
        assert!(!matches(&node, &Selector::attr(Comparator::Includes, "class", "")));
    }

    #[test]
    fn test_substring_family() {
        let node = element(NodeInit::element("a").with_attribute("href", "https://example.com/x.pdf"));
        assert!(matches(&node, &Selector::attr(Comparator::Prefix, "href", "https:")));
        assert!(matches(&node, &Selector::attr(Comparator::Suffix, "href", ".pdf")));
        assert!(matches(&node, &Selector::attr(Comparator::Substring, "href", "example")));
        assert!(!matches(&node, &Selector::attr(Comparator::Prefix, "href", "")));
        assert!(matches(&node, &Selector::attr(Comparator::Exists, "href", "")));
        assert!(!matches(&node, &Selector::attr(Comparator::Exists, "title", "")));
    }

    #[test]
    fn test_case_folding_and_namespace() {
        let node = element(
            NodeInit::element("use")
                .with_attribute("type", "TEXT")
                .with_attribute("xlink:href", "#icon"),
        );
        let mut folded = match Selector::attr(Comparator::Equal, "type", "text") {
            Selector::Attribute(attr) => attr,
            _ => unreachable!(),
        };
        assert!(!matches(&node, &Selector::Attribute(folded.clone())));
        folded.case_insensitive = true;
        assert!(matches(&node, &Selector::Attribute(folded)));

        let mut namespaced = match Selector::attr(Comparator::Equal, "href", "#icon") {
            Selector::Attribute(attr) => attr,
            _ => unreachable!(),
        };
        namespaced.namespace = Some("xlink".to_string());
        assert!(matches(&node, &Selector::Attribute(namespaced)));
    }

    #[test]
    fn test_not_and_compound() {
        let node = element(NodeInit::element("span").with_class("y"));
        assert!(matches(&node, &Selector::not(Selector::class("z"))));
        assert!(!matches(&node, &Selector::not(Selector::class("y"))));
        assert!(matches(
            &node,
            &Selector::compound(vec![Selector::tag("span"), Selector::class("y")])
        ));
        assert!(!matches(
            &node,
            &Selector::compound(vec![Selector::tag("div"), Selector::class("y")])
        ));
    }

    #[test]
    fn test_structural_pseudo_classes() {
        let mut node = element(NodeInit::element("li"));
        node.parent_id = Some(10);
        node.parent_element_id = Some(10);
        assert!(matches(&node, &Selector::pseudo("first-child", vec![])));
        assert!(matches(&node, &Selector::pseudo("only-child", vec![])));
        assert!(matches(&node, &Selector::pseudo("empty", vec![])));
        assert!(!matches(&node, &Selector::pseudo("root", vec![])));

        node.previous_element_sibling_id = Some(11);
        assert!(!matches(&node, &Selector::pseudo("first-child", vec![])));
        assert!(matches(&node, &Selector::pseudo("last-child", vec![])));
        assert!(!matches(&node, &Selector::pseudo("hover", vec![])));
    }

    #[test]
    fn test_chain_is_not_a_node_check() {
        let node = DomNode::new(1, NodeType::Element, "div".to_string());
        let chain = Selector::tag("div").then(
            crate::selector::Combinator::Descendant,
            Selector::tag("div"),
        );
        assert!(!matches(&node, &chain));
        assert!(matches(
            &node,
            &Selector::list(vec![chain, Selector::tag("div")])
        ));
    }
}
