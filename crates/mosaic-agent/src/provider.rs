//! The provider trait every inference call goes through

use async_trait::async_trait;
use mosaic_core::Result;
use serde::{Deserialize, Serialize};

/// What a prompt is asking the model to do
///
/// Providers may use the role to pick a system prompt or token budget; the
/// test providers use it to script responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceRole {
    /// A multi-pass planner pass (JSON out)
    Planning,
    /// Stage one of synthesis: how to build or adapt an atom
    Strategy,
    /// Stage two of synthesis: the code itself
    Implementation,
    /// Model-backed review used by external validation checks
    Review,
}

impl InferenceRole {
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::Planning => {
                "You are a software architect. Respond only with the JSON document requested."
            }
            Self::Strategy => {
                "You are a senior Rust engineer. Describe an implementation strategy in a few short steps."
            }
            Self::Implementation => {
                "You are a senior Rust engineer. Respond with a single fenced Rust code block and nothing else."
            }
            Self::Review => "You are a strict code reviewer. Answer PASS or FAIL followed by reasons.",
        }
    }
}

impl std::fmt::Display for InferenceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::Strategy => write!(f, "strategy"),
            Self::Implementation => write!(f, "implementation"),
            Self::Review => write!(f, "review"),
        }
    }
}

impl std::str::FromStr for InferenceRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "planning" => Ok(Self::Planning),
            "strategy" => Ok(Self::Strategy),
            "implementation" => Ok(Self::Implementation),
            "review" => Ok(Self::Review),
            _ => Err(format!("Invalid inference role: {}", s)),
        }
    }
}

/// A stateless text-in, text-out model endpoint
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Run one prompt and return the raw response text
    async fn infer(&self, prompt: &str, role: InferenceRole) -> Result<String>;

    /// Label used in logs and reports (usually the model name)
    fn label(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [
            InferenceRole::Planning,
            InferenceRole::Strategy,
            InferenceRole::Implementation,
            InferenceRole::Review,
        ] {
            assert_eq!(role.to_string().parse::<InferenceRole>().unwrap(), role);
        }
        assert!("chat".parse::<InferenceRole>().is_err());
    }

    #[test]
    fn test_implementation_prompt_asks_for_code_block() {
        assert!(InferenceRole::Implementation
            .system_prompt()
            .contains("fenced Rust code block"));
    }
}
