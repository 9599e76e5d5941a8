// packages/backend/src/types.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ==============================================================================
// 1. Identities and composite keys
// ==============================================================================

/// Position in the survey. `-1` = not started, `0..N` = slide active, `N` = finished.
pub type SlideIndex = i32;

/// Sentinel value of the cursor before the presenter opens the first slide.
pub const NOT_STARTED: SlideIndex = -1;

/// Answer value -> number of submissions carrying it.
pub type Tally = BTreeMap<String, usize>;

/// Opaque per-browser identity handed over by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RespondentId(String);

impl RespondentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh identity for clients that did not present one.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RespondentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RespondentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Opaque survey instance identifier; compared by equality only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurveyToken(String);

impl SurveyToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurveyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SurveyToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// Key of an answer record: one slide of one survey instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnswerKey {
    pub token: SurveyToken,
    pub slide: SlideIndex,
}

impl AnswerKey {
    pub fn new(token: &SurveyToken, slide: SlideIndex) -> Self {
        Self {
            token: token.clone(),
            slide,
        }
    }
}

/// Key of the answered set: who answered which slide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseKey {
    pub answer: AnswerKey,
    pub respondent: RespondentId,
}

impl ResponseKey {
    pub fn new(token: &SurveyToken, slide: SlideIndex, respondent: &RespondentId) -> Self {
        Self {
            answer: AnswerKey::new(token, slide),
            respondent: respondent.clone(),
        }
    }
}

// ==============================================================================
// 2. Survey definition
// ==============================================================================

/// Slide type as written in the survey file. Kinds the server has no rules
/// for are kept verbatim so clients still see the original name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SlideKind {
    Single,
    Multiple,
    Text,
    // wordcloud, rating, ... are all single-value slides
    Other(String),
}

impl SlideKind {
    pub fn as_str(&self) -> &str {
        match self {
            SlideKind::Single => "single",
            SlideKind::Multiple => "multiple",
            SlideKind::Text => "text",
            SlideKind::Other(kind) => kind,
        }
    }

    pub fn accepts_many(&self) -> bool {
        matches!(self, SlideKind::Multiple)
    }
}

impl From<String> for SlideKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "single" => SlideKind::Single,
            "multiple" => SlideKind::Multiple,
            "text" => SlideKind::Text,
            _ => SlideKind::Other(kind),
        }
    }
}

impl From<SlideKind> for String {
    fn from(kind: SlideKind) -> Self {
        match kind {
            SlideKind::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    #[serde(rename = "type")]
    pub kind: SlideKind,
    pub question: String,
    /// How the frontend renders results (bar chart, word cloud, ...).
    #[serde(default)]
    pub result: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyDefinition {
    pub name: String,
    pub token: SurveyToken,
    /// Admin secret; never serialized back to clients.
    #[serde(skip_serializing, default)]
    pub secret: String,
    #[serde(rename = "survey", default)]
    pub slides: Vec<Slide>,
}

impl SurveyDefinition {
    pub fn slide_count(&self) -> SlideIndex {
        self.slides.len() as SlideIndex
    }

    pub fn slide(&self, index: SlideIndex) -> Option<&Slide> {
        usize::try_from(index).ok().and_then(|i| self.slides.get(i))
    }
}

// ==============================================================================
// 3. Leaderboard DTOs
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardAction {
    Spawn,
    Pop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerScore {
    pub user_id: RespondentId,
    pub spawned_count: u64,
    pub popped_count: u64,
}

impl PlayerScore {
    pub fn zeroed(user_id: RespondentId) -> Self {
        Self {
            user_id,
            spawned_count: 0,
            popped_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: RespondentId,
    pub score: u64,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardSnapshot {
    pub player_score: PlayerScore,
    pub top_scores: Vec<LeaderboardEntry>,
}

// ==============================================================================
// 4. Push-channel events
// ==============================================================================

/// Wire envelope: `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Typed view of a [`Message`]. Unknown types travel through untouched as `Other`.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    UserCount(usize),
    /// Payload is the emoji id chosen by the client.
    Emoji(serde_json::Value),
    EmojiPopped(serde_json::Value),
    NewAnswer(Tally),
    NewSlide(SlideIndex),
    Finished(bool),
    Shutdown(String),
    Other(Message),
}

impl Event {
    pub const USER_COUNT: &'static str = "userCount";
    pub const EMOJI: &'static str = "emoji";
    pub const EMOJI_POPPED: &'static str = "emojiPopped";
    pub const NEW_ANSWER: &'static str = "newAnswer";
    pub const NEW_SLIDE: &'static str = "newSlide";
    pub const FINISHED: &'static str = "finished";
    pub const SHUTDOWN: &'static str = "shutdown";

    pub fn kind(&self) -> &str {
        match self {
            Event::UserCount(_) => Self::USER_COUNT,
            Event::Emoji(_) => Self::EMOJI,
            Event::EmojiPopped(_) => Self::EMOJI_POPPED,
            Event::NewAnswer(_) => Self::NEW_ANSWER,
            Event::NewSlide(_) => Self::NEW_SLIDE,
            Event::Finished(_) => Self::FINISHED,
            Event::Shutdown(_) => Self::SHUTDOWN,
            Event::Other(msg) => &msg.kind,
        }
    }

    /// Dispatches on `type`; a known type with a payload of the wrong shape is an error.
    pub fn from_message(msg: Message) -> Result<Self, serde_json::Error> {
        let event = match msg.kind.as_str() {
            Self::USER_COUNT => Event::UserCount(serde_json::from_value(msg.payload)?),
            Self::EMOJI => Event::Emoji(msg.payload),
            Self::EMOJI_POPPED => Event::EmojiPopped(msg.payload),
            Self::NEW_ANSWER => Event::NewAnswer(serde_json::from_value(msg.payload)?),
            Self::NEW_SLIDE => Event::NewSlide(serde_json::from_value(msg.payload)?),
            Self::FINISHED => Event::Finished(serde_json::from_value(msg.payload)?),
            Self::SHUTDOWN => Event::Shutdown(serde_json::from_value(msg.payload)?),
            _ => Event::Other(msg),
        };
        Ok(event)
    }

    pub fn into_message(self) -> Result<Message, serde_json::Error> {
        let kind = self.kind().to_string();
        let payload = match self {
            Event::UserCount(count) => serde_json::to_value(count)?,
            Event::Emoji(payload) | Event::EmojiPopped(payload) => payload,
            Event::NewAnswer(tally) => serde_json::to_value(tally)?,
            Event::NewSlide(index) => serde_json::to_value(index)?,
            Event::Finished(done) => serde_json::to_value(done)?,
            Event::Shutdown(reason) => serde_json::to_value(reason)?,
            Event::Other(msg) => return Ok(msg),
        };
        Ok(Message { kind, payload })
    }

    /// Decodes one inbound text frame.
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        Self::from_message(serde_json::from_str(frame)?)
    }

    /// Encodes the event into the JSON text frame pushed to every client.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.clone().into_message()?)
    }
}

// ==============================================================================
// 5. HTTP payloads
// ==============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct RespondentQuery {
    pub respondent: Option<String>,
}

impl RespondentQuery {
    /// Clients without an identity get a fresh one.
    pub fn respondent_or_generate(&self) -> RespondentId {
        match self.respondent.as_deref() {
            Some(id) if !id.is_empty() => RespondentId::new(id),
            _ => RespondentId::generate(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitPayload {
    pub respondent: Option<String>,
    pub answers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminPayload {
    pub secret: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyStatus {
    pub survey_name: String,
    pub respondent: RespondentId,
    pub current_slide: SlideIndex,
    pub slide_count: SlideIndex,
    pub state: &'static str,
    pub slide: Option<Slide>,
    pub user_count: usize,
    pub has_answered: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsResponse {
    pub respondent: RespondentId,
    pub current_slide: SlideIndex,
    pub slide: Option<Slide>,
    pub results: Tally,
    pub respondent_count: usize,
    pub has_answered: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceResponse {
    pub current_slide: SlideIndex,
    pub finished: bool,
}
