//! Selector AST
//!
//! The core never parses selector text. External parsers hand over this
//! tree, either built directly or as JSON via [`Selector::from_json`].

use crate::error::Result;
use serde::{Deserialize, Deserializer, Serialize};

/// Relationship between two rules of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Combinator {
    /// `a b`
    Descendant,
    /// `a > b`
    Child,
    /// `a + b`
    AdjacentSibling,
    /// `a ~ b`
    GeneralSibling,
}

/// Attribute comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Comparator {
    /// `[name]`
    Exists,
    /// `[name=value]`
    Equal,
    /// `[name^=value]`
    Prefix,
    /// `[name$=value]`
    Suffix,
    /// `[name*=value]`
    Substring,
    /// `[name|=value]`
    DashMatch,
    /// `[name~=value]`
    Includes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeSelector {
    pub comparator: Comparator,
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// One `combinator rule` step of a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStep {
    pub combinator: Combinator,
    pub rule: Selector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Selector {
    TagName {
        name: String,
    },
    Id {
        value: String,
    },
    Class {
        #[serde(deserialize_with = "one_or_many")]
        names: Vec<String>,
    },
    Attribute(AttributeSelector),
    PseudoClass {
        name: String,
        #[serde(default)]
        params: Vec<Selector>,
    },
    CompoundRule {
        rules: Vec<Selector>,
    },
    RuleChain {
        head: Box<Selector>,
        steps: Vec<ChainStep>,
    },
    /// Comma-separated alternatives
    List {
        selectors: Vec<Selector>,
    },
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(name) => vec![name],
        OneOrMany::Many(names) => names,
    })
}

impl Selector {
    /// Decode an AST produced by an external parser
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn universal() -> Self {
        Self::tag("*")
    }

    pub fn tag(name: &str) -> Self {
        Self::TagName {
            name: name.to_string(),
        }
    }

    pub fn id(value: &str) -> Self {
        Self::Id {
            value: value.to_string(),
        }
    }

    pub fn class(name: &str) -> Self {
        Self::Class {
            names: vec![name.to_string()],
        }
    }

    pub fn classes(names: &[&str]) -> Self {
        Self::Class {
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn attr(comparator: Comparator, name: &str, value: &str) -> Self {
        Self::Attribute(AttributeSelector {
            comparator,
            name: name.to_string(),
            value: value.to_string(),
            case_insensitive: false,
            namespace: None,
        })
    }

    pub fn pseudo(name: &str, params: Vec<Selector>) -> Self {
        Self::PseudoClass {
            name: name.to_string(),
            params,
        }
    }

    pub fn not(inner: Selector) -> Self {
        Self::pseudo("not", vec![inner])
    }

    pub fn compound(rules: Vec<Selector>) -> Self {
        Self::CompoundRule { rules }
    }

    pub fn list(selectors: Vec<Selector>) -> Self {
        Self::List { selectors }
    }

    /// Start a chain at `head`; extend it with [`Selector::then`]
    pub fn chain(head: Selector) -> Self {
        Self::RuleChain {
            head: Box::new(head),
            steps: Vec::new(),
        }
    }

    /// Append a step to a chain. A non-chain selector becomes the chain head.
    pub fn then(self, combinator: Combinator, rule: Selector) -> Self {
        let (head, mut steps) = match self {
            Self::RuleChain { head, steps } => (head, steps),
            other => (Box::new(other), Vec::new()),
        };
        steps.push(ChainStep { combinator, rule });
        Self::RuleChain { head, steps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_builder() {
        let sel = Selector::id("x").then(Combinator::Child, Selector::class("y"));
        match sel {
            Selector::RuleChain { head, steps } => {
                assert_eq!(*head, Selector::id("x"));
                assert_eq!(steps.len(), 1);
                assert_eq!(steps[0].combinator, Combinator::Child);
            }
            other => panic!("expected chain, got {:?}", other),
        }
    }

    #[test]
    fn test_from_json() {
        let sel = Selector::from_json(
            r##"{
                "type": "ruleChain",
                "head": {"type": "id", "value": "x"},
                "steps": [{
                    "combinator": "child",
                    "rule": {"type": "class", "names": "y"}
                }]
            }"##,
        )
        .unwrap();
        assert_eq!(
            sel,
            Selector::id("x").then(Combinator::Child, Selector::class("y"))
        );
    }

    #[test]
    fn test_from_json_attribute() {
        let sel = Selector::from_json(
            r#"{"type": "attribute", "comparator": "dashMatch", "name": "lang", "value": "en", "caseInsensitive": true}"#,
        )
        .unwrap();
        match sel {
            Selector::Attribute(attr) => {
                assert_eq!(attr.comparator, Comparator::DashMatch);
                assert!(attr.case_insensitive);
                assert_eq!(attr.namespace, None);
            }
            other => panic!("expected attribute, got {:?}", other),
        }
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(Selector::from_json(r#"{"type": "nope"}"#).is_err());
    }
}
