use serde::{Deserialize, Serialize};

/// Who said a line of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Everything sent in one completion call.
///
/// `model` overrides the client default when set. `temperature` is clamped
/// to the API's accepted range.
#[derive(Debug, Clone)]
pub struct Request {
    pub model: Option<String>,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub max_tokens: usize,
    pub temperature: Option<f32>,
}

impl Request {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: None,
            system: None,
            messages,
            max_tokens: 1024,
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 1.0));
        self
    }
}

/// The model's answer with text blocks already concatenated.
#[derive(Debug, Clone)]
pub struct Response {
    pub id: String,
    pub model: String,
    pub text: String,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

impl StopReason {
    pub(crate) fn from_api(reason: Option<&str>) -> Self {
        match reason {
            Some("max_tokens") => StopReason::MaxTokens,
            Some("stop_sequence") => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let request = Request::new(vec![Message::user("Hello")])
            .with_system("You are the butler")
            .with_max_tokens(300)
            .with_temperature(1.4);

        assert_eq!(request.max_tokens, 300);
        assert_eq!(request.system.as_deref(), Some("You are the butler"));
        assert_eq!(request.temperature, Some(1.0));
        assert_eq!(request.messages[0].role, Role::User);
    }

    #[test]
    fn test_unknown_stop_reason_is_end_turn() {
        assert_eq!(StopReason::from_api(Some("refusal")), StopReason::EndTurn);
        assert_eq!(StopReason::from_api(None), StopReason::EndTurn);
        assert_eq!(StopReason::from_api(Some("max_tokens")), StopReason::MaxTokens);
    }
}
