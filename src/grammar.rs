//! Command grammar: the closed phrase set and its actuator mapping

use std::collections::HashMap;

use crate::Result;

/// What a recognized phrase asks the craft to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuatorOperation {
    /// Drive the motor forward at a duty cycle, percent (0..=100)
    SetMotor(u8),
    /// Point the tail, centi-degrees (clamped to ±4500 when sent)
    SetTailAngle(i16),
    /// Phrase carries no actuation
    NoOp,
}

/// Duty cycle used by "ligar motor"
pub const START_DUTY: u8 = 5;

/// Tail deflection for a turn, centi-degrees
pub const TURN_ANGLE: i16 = 3000;

const SPEED_PREFIX: &str = "mudar velocidade para";

const SPEEDS: [(&str, u8); 10] = [
    ("dez", 10),
    ("vinte", 20),
    ("trinta", 30),
    ("quarenta", 40),
    ("cinquenta", 50),
    ("sessenta", 60),
    ("setenta", 70),
    ("oitenta", 80),
    ("noventa", 90),
    ("cem", 100),
];

/// Fixed phrase table, loaded once and read-only afterwards
///
/// Matching is exact and case-sensitive. `phrases` holds the spoken forms
/// handed to the recognizer; the lookup table also accepts numeric
/// spellings the recognizer may emit ("mudar velocidade para 10").
#[derive(Debug, Clone)]
pub struct CommandGrammar {
    phrases: Vec<String>,
    table: HashMap<String, ActuatorOperation>,
}

impl CommandGrammar {
    /// Build a grammar from spoken phrases and any extra accepted aliases
    ///
    /// Every spoken phrase is also a lookup key.
    #[must_use]
    pub fn new(
        spoken: Vec<(String, ActuatorOperation)>,
        aliases: Vec<(String, ActuatorOperation)>,
    ) -> Self {
        let phrases = spoken.iter().map(|(phrase, _)| phrase.clone()).collect();
        let table = spoken.into_iter().chain(aliases).collect();
        Self { phrases, table }
    }

    /// The craft's command set
    #[must_use]
    pub fn standard() -> Self {
        let mut spoken = vec![
            ("desligar motor".to_string(), ActuatorOperation::SetMotor(0)),
            (
                "ligar motor".to_string(),
                ActuatorOperation::SetMotor(START_DUTY),
            ),
        ];
        spoken.extend(SPEEDS.iter().map(|&(word, duty)| {
            (
                format!("{SPEED_PREFIX} {word}"),
                ActuatorOperation::SetMotor(duty),
            )
        }));
        spoken.extend([
            (
                "virar a direita".to_string(),
                ActuatorOperation::SetTailAngle(TURN_ANGLE),
            ),
            (
                "virar a esquerda".to_string(),
                ActuatorOperation::SetTailAngle(-TURN_ANGLE),
            ),
            (
                "seguir reto".to_string(),
                ActuatorOperation::SetTailAngle(0),
            ),
        ]);

        let aliases = SPEEDS
            .iter()
            .map(|&(_, duty)| {
                (
                    format!("{SPEED_PREFIX} {duty}"),
                    ActuatorOperation::SetMotor(duty),
                )
            })
            .collect();

        Self::new(spoken, aliases)
    }

    /// Map a finalized transcript to an operation
    ///
    /// Returns `None` for an empty transcript (no command yet) and
    /// `Some(NoOp)` for a non-empty phrase outside the table.
    #[must_use]
    pub fn lookup(&self, transcript: &str) -> Option<ActuatorOperation> {
        if transcript.is_empty() {
            return None;
        }

        let operation = self.table.get(transcript).copied();
        if operation.is_none() {
            tracing::info!(transcript, "command not recognized");
        }
        Some(operation.unwrap_or(ActuatorOperation::NoOp))
    }

    /// Spoken phrases, in recognizer grammar order
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Recognizer grammar as a JSON array of phrases
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.phrases)?)
    }
}

impl Default for CommandGrammar {
    fn default() -> Self {
        Self::standard()
    }
}
