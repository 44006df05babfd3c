use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::config::ConfigError;

/// Who the assistant is and the rules it answers by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantProfile {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub example_questions: Vec<String>,
}

impl Default for AssistantProfile {
    fn default() -> Self {
        Self {
            name: "Ders Notu Asistanı".to_string(),
            description: "You are a study-notes assistant. You answer students' questions about \
                          their course notes and can tell which topic is covered in which note."
                .to_string(),
            instructions: vec![
                "Answer questions only from the uploaded course notes".to_string(),
                "Name the PDF file each piece of information comes from".to_string(),
                "Use clear, plain language".to_string(),
            ],
            example_questions: vec![
                "Hangi konular var?".to_string(),
                "Python'da döngü nedir?".to_string(),
                "Bölüm 3'te ne anlatılıyor?".to_string(),
                "Fonksiyonları açıkla".to_string(),
                "Liste ve tuple farkı nedir?".to_string(),
            ],
        }
    }
}

impl AssistantProfile {
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let invalid = |reason: String| ConfigError::Invalid {
            key: "ASSISTANT_PROFILE".to_string(),
            value: path.display().to_string(),
            reason,
        };

        let content = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let profile = Self::from_json(&content).map_err(|e| invalid(e.to_string()))?;
        if profile.name.trim().is_empty() {
            return Err(invalid("profile name must not be empty".to_string()));
        }
        Ok(profile)
    }

    /// Loads the profile at `path`, or the built-in one when none is set.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn generate_system_prompt(&self, language: &str, not_found_message: &str) -> String {
        let mut prompt = format!("You are {}. {}\n\nRules:\n", self.name, self.description.trim());

        let mut rules = self.instructions.clone();
        rules.push(format!("Always answer in {}", language));
        rules.push(format!(
            "If the notes do not contain the answer, reply with exactly this sentence and nothing else: {}",
            not_found_message
        ));
        for (i, rule) in rules.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, rule));
        }

        prompt
    }
}
