//! Structured intent responses.
//!
//! An [`IntentResponse`] is the system's answer independent of how it is
//! rendered. Tools that execute intents hand one back inside an
//! [`IntentResponseDict`], which lets the conversation layer reuse it as the
//! base of the final result.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// The kind of answer an intent response represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentResponseType {
    /// The requested action was carried out.
    ActionDone,
    /// Only part of the requested action was carried out.
    PartialActionDone,
    /// The request was a question and this is the answer.
    QueryAnswer,
    /// The request could not be handled.
    Error,
}

/// Why an intent response is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentResponseErrorCode {
    /// No intent matched the utterance.
    NoIntentMatch,
    /// The intent matched but no targets were found.
    NoValidTargets,
    /// Handling the intent failed.
    FailedToHandle,
    /// Any other failure.
    Unknown,
}

/// How speech text should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechType {
    /// Plain text.
    Plain,
    /// Speech synthesis markup.
    Ssml,
}

/// Speech text plus optional renderer-specific data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Speech {
    /// The text to speak.
    pub speech: String,
    /// Extra data for the renderer.
    pub extra_data: Option<JsonValue>,
}

/// A structured response to an utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResponse {
    /// Language of the response.
    pub language: String,
    /// Kind of response.
    pub response_type: IntentResponseType,
    /// Error code when `response_type` is `Error`.
    pub error_code: Option<IntentResponseErrorCode>,
    /// Speech keyed by speech type.
    pub speech: BTreeMap<SpeechType, Speech>,
    /// Follow-up prompt keyed by speech type.
    pub reprompt: BTreeMap<SpeechType, Speech>,
}

impl IntentResponse {
    /// Creates an empty `action_done` response.
    #[must_use]
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            response_type: IntentResponseType::ActionDone,
            error_code: None,
            speech: BTreeMap::new(),
            reprompt: BTreeMap::new(),
        }
    }

    /// Sets the plain speech text.
    pub fn set_speech(&mut self, speech: impl Into<String>) {
        self.set_speech_typed(speech, SpeechType::Plain, None);
    }

    /// Sets speech of a specific type.
    pub fn set_speech_typed(
        &mut self,
        speech: impl Into<String>,
        speech_type: SpeechType,
        extra_data: Option<JsonValue>,
    ) {
        self.speech.insert(
            speech_type,
            Speech {
                speech: speech.into(),
                extra_data,
            },
        );
    }

    /// Sets the plain reprompt text.
    pub fn set_reprompt(&mut self, reprompt: impl Into<String>) {
        self.reprompt.insert(
            SpeechType::Plain,
            Speech {
                speech: reprompt.into(),
                extra_data: None,
            },
        );
    }

    /// Turns this into an error response with the given message as speech.
    pub fn set_error(&mut self, code: IntentResponseErrorCode, message: impl Into<String>) {
        self.response_type = IntentResponseType::Error;
        self.error_code = Some(code);
        self.set_speech(message);
    }

    /// Returns the plain speech text, if set.
    #[must_use]
    pub fn plain_speech(&self) -> Option<&str> {
        self.speech
            .get(&SpeechType::Plain)
            .map(|speech| speech.speech.as_str())
    }

    /// Renders the response as JSON.
    #[must_use]
    pub fn as_dict(&self) -> JsonValue {
        let mut dict = serde_json::json!({
            "language": self.language,
            "response_type": self.response_type,
            "speech": Self::speech_dict(&self.speech),
            "reprompt": Self::speech_dict(&self.reprompt),
        });
        if let Some(code) = self.error_code {
            dict["data"] = serde_json::json!({ "code": code });
        }
        dict
    }

    fn speech_dict(speech: &BTreeMap<SpeechType, Speech>) -> JsonValue {
        serde_json::to_value(speech).unwrap_or(JsonValue::Null)
    }
}

/// Tool result payload carrying an intent response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResponseDict {
    /// The response the tool produced.
    pub original: IntentResponse,
}

impl IntentResponseDict {
    /// Wraps an intent response.
    #[must_use]
    pub fn new(original: IntentResponse) -> Self {
        Self { original }
    }
}

impl From<IntentResponse> for IntentResponseDict {
    fn from(original: IntentResponse) -> Self {
        Self::new(original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_response_is_action_done_without_speech() {
        let response = IntentResponse::new("en");
        assert_eq!(response.response_type, IntentResponseType::ActionDone);
        assert_eq!(response.plain_speech(), None);
        assert!(response.error_code.is_none());
    }

    #[test]
    fn set_speech_replaces_plain_speech() {
        let mut response = IntentResponse::new("en");
        response.set_speech("first");
        response.set_speech("second");
        assert_eq!(response.plain_speech(), Some("second"));
        assert_eq!(response.speech.len(), 1);
    }

    #[test]
    fn set_error_changes_type() {
        let mut response = IntentResponse::new("en");
        response.set_error(IntentResponseErrorCode::Unknown, "Unable to get response");

        assert_eq!(response.response_type, IntentResponseType::Error);
        assert_eq!(response.error_code, Some(IntentResponseErrorCode::Unknown));
        assert_eq!(response.plain_speech(), Some("Unable to get response"));
    }

    #[test]
    fn as_dict_shape() {
        let mut response = IntentResponse::new("en");
        response.set_speech("Done");
        response.set_reprompt("Anything else?");

        let dict = response.as_dict();
        assert_eq!(dict["language"], "en");
        assert_eq!(dict["response_type"], "action_done");
        assert_eq!(dict["speech"]["plain"]["speech"], "Done");
        assert_eq!(dict["reprompt"]["plain"]["speech"], "Anything else?");
        assert!(dict.get("data").is_none());
    }

    #[test]
    fn as_dict_includes_error_code() {
        let mut response = IntentResponse::new("en");
        response.set_error(IntentResponseErrorCode::NoValidTargets, "No lights");
        assert_eq!(response.as_dict()["data"]["code"], "no_valid_targets");
    }

    #[test]
    fn dict_keeps_original() {
        let mut response = IntentResponse::new("fr");
        response.set_speech("Allumé");
        let dict = IntentResponseDict::from(response.clone());

        assert_eq!(dict.original, response);
    }
}
