//! Closed label vocabularies assigned by the labeling backends

use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Research focus of a paper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Focus {
    Offensive,
    Defensive,
    Adversarial,
    Safety,
    Other,
}

impl Focus {
    pub const ALL: [Focus; 5] = [
        Focus::Offensive,
        Focus::Defensive,
        Focus::Adversarial,
        Focus::Safety,
        Focus::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Focus::Offensive => "Offensive",
            Focus::Defensive => "Defensive",
            Focus::Adversarial => "Adversarial",
            Focus::Safety => "Safety",
            Focus::Other => "Other",
        }
    }
}

impl fmt::Display for Focus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Focus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Focus::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| AppError::InvalidFormat {
                message: format!("unknown focus label '{}'", s),
            })
    }
}

/// Attack taxonomy label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackType {
    Evasion,
    Extraction,
    Inversion,
    Poisoning,
    #[serde(rename = "Prompt Injection")]
    PromptInjection,
    Other,
}

impl AttackType {
    pub const ALL: [AttackType; 6] = [
        AttackType::Evasion,
        AttackType::Extraction,
        AttackType::Inversion,
        AttackType::Poisoning,
        AttackType::PromptInjection,
        AttackType::Other,
    ];

    /// Display name, also the select option name in the store
    pub fn as_str(&self) -> &'static str {
        match self {
            AttackType::Evasion => "Evasion",
            AttackType::Extraction => "Extraction",
            AttackType::Inversion => "Inversion",
            AttackType::Poisoning => "Poisoning",
            AttackType::PromptInjection => "Prompt Injection",
            AttackType::Other => "Other",
        }
    }
}

impl fmt::Display for AttackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttackType {
    type Err = AppError;

    /// Accepts the display name, optionally wrapped in backticks.
    /// "Prompt-Injection" is accepted as an alias.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_matches('`').trim();
        if s == "Prompt-Injection" {
            return Ok(AttackType::PromptInjection);
        }
        AttackType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AppError::InvalidFormat {
                message: format!("unknown attack type '{}'", s),
            })
    }
}
