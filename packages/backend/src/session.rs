// packages/backend/src/session.rs
//! One running survey: the cursor, the answers, the leaderboard and the hub,
//! owned together and handed to every handler by reference.

use crate::answer_store::AnswerStore;
use crate::config::Config;
use crate::error::SurveyError;
use crate::hub::{BroadcastHub, ConnectionId, HubStats, PushChannel};
use crate::leaderboard::Leaderboard;
use crate::slide_cursor::{SlideCursor, SlideState};
use crate::types::{
    Event, LeaderboardAction, LeaderboardSnapshot, RespondentId, Slide, SlideIndex,
    SurveyDefinition, SurveyToken, Tally,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

pub const SHUTDOWN_REASON: &str = "survey is being reloaded";

pub struct Session {
    /// Shared by every operation that reads the cursor or survey and then
    /// writes; held exclusively while a reset wipes state.
    gate: RwLock<()>,
    survey: RwLock<Arc<SurveyDefinition>>,
    cursor: SlideCursor,
    answers: AnswerStore,
    leaderboard: Leaderboard,
    hub: BroadcastHub,
    reset_grace: Duration,
}

impl Session {
    /// Must be called from inside a tokio runtime (spawns the hub's dispatch loop).
    pub fn new(survey: SurveyDefinition, config: &Config) -> Self {
        Self::with_settings(survey, config.hub_capacity, config.reset_grace)
    }

    pub fn with_settings(survey: SurveyDefinition, hub_capacity: usize, reset_grace: Duration) -> Self {
        info!(
            "🗳️ [SESSION] Survey '{}' loaded with {} slides",
            survey.name,
            survey.slides.len()
        );
        Self {
            gate: RwLock::new(()),
            cursor: SlideCursor::new(survey.slide_count()),
            survey: RwLock::new(Arc::new(survey)),
            answers: AnswerStore::new(),
            leaderboard: Leaderboard::new(),
            hub: BroadcastHub::start(hub_capacity),
            reset_grace,
        }
    }

    pub async fn survey(&self) -> Arc<SurveyDefinition> {
        self.survey.read().await.clone()
    }

    // ---------------------------------------------------------------------
    // Access checks (opaque comparison only)
    // ---------------------------------------------------------------------

    pub async fn check_token(&self, token: &SurveyToken) -> Result<(), SurveyError> {
        if self.survey.read().await.token == *token {
            Ok(())
        } else {
            Err(SurveyError::InvalidToken)
        }
    }

    pub async fn authorize(&self, secret: &str) -> Result<(), SurveyError> {
        if self.survey.read().await.secret == secret {
            Ok(())
        } else {
            Err(SurveyError::InvalidSecret)
        }
    }

    // ---------------------------------------------------------------------
    // Slides
    // ---------------------------------------------------------------------

    pub fn current_slide(&self) -> SlideIndex {
        self.cursor.current()
    }

    pub fn slide_state(&self) -> SlideState {
        self.cursor.state()
    }

    pub async fn current_slide_definition(&self) -> Option<Slide> {
        match self.cursor.state() {
            SlideState::Active(index) => self.survey.read().await.slide(index).cloned(),
            _ => None,
        }
    }

    /// Advances the cursor and tells every client: `newSlide` while slides
    /// remain, `finished` on the terminal step.
    pub async fn advance_slide(&self) -> Result<SlideIndex, SurveyError> {
        let _gate = self.gate.read().await;
        self.advance_locked().await
    }

    /// Secret check and advance in one step, so a reload cannot swap the
    /// survey between them.
    pub async fn advance_slide_as(&self, secret: &str) -> Result<SlideIndex, SurveyError> {
        let _gate = self.gate.read().await;
        self.authorize(secret).await?;
        self.advance_locked().await
    }

    async fn advance_locked(&self) -> Result<SlideIndex, SurveyError> {
        let index = self.cursor.advance()?;
        if index >= self.cursor.slide_count() {
            info!("🏁 [SLIDES] Survey finished");
            self.hub.publish(Event::Finished(true)).await;
        } else {
            info!("➡️ [SLIDES] Slide {} is now active", index);
            self.hub.publish(Event::NewSlide(index)).await;
        }
        Ok(index)
    }

    // ---------------------------------------------------------------------
    // Answers
    // ---------------------------------------------------------------------

    pub async fn has_answered(
        &self,
        token: &SurveyToken,
        slide: SlideIndex,
        respondent: &RespondentId,
    ) -> bool {
        self.answers.has_answered(token, slide, respondent).await
    }

    pub async fn submit_answer(
        &self,
        token: &SurveyToken,
        slide: SlideIndex,
        respondent: &RespondentId,
        values: Vec<String>,
    ) -> Result<(), SurveyError> {
        let _gate = self.gate.read().await;
        self.answers.submit(token, slide, respondent, values).await
    }

    pub async fn tally(&self, token: &SurveyToken, slide: SlideIndex) -> Tally {
        self.answers.tally(token, slide).await
    }

    pub async fn respondent_count(&self, token: &SurveyToken, slide: SlideIndex) -> usize {
        self.answers.respondent_count(token, slide).await
    }

    /// Submits against whichever slide is active right now and broadcasts the
    /// new tally.
    ///
    /// The cursor is read before the store is written: an `advance_slide`
    /// landing in between leaves the answer attributed to the slide that was
    /// active when the request arrived. A reset cannot land in between.
    pub async fn submit_current(
        &self,
        token: &SurveyToken,
        respondent: &RespondentId,
        values: Vec<String>,
    ) -> Result<Tally, SurveyError> {
        let _gate = self.gate.read().await;
        self.check_token(token).await?;
        let SlideState::Active(slide) = self.cursor.state() else {
            return Err(SurveyError::NoActiveSlide);
        };
        let accepts_many = self
            .survey
            .read()
            .await
            .slide(slide)
            .map(|s| s.kind.accepts_many())
            .ok_or(SurveyError::NoActiveSlide)?;

        if values.is_empty() {
            return Err(SurveyError::EmptyAnswer);
        }
        if !accepts_many && values.len() > 1 {
            return Err(SurveyError::TooManyValues {
                slide,
                count: values.len(),
            });
        }

        self.answers.submit(token, slide, respondent, values).await?;
        let tally = self.answers.tally(token, slide).await;
        self.hub.publish(Event::NewAnswer(tally.clone())).await;
        Ok(tally)
    }

    // ---------------------------------------------------------------------
    // Connections and events
    // ---------------------------------------------------------------------

    pub async fn register_connection(&self, conn: Arc<dyn PushChannel>) -> (ConnectionId, usize) {
        self.hub.join(conn).await
    }

    pub async fn unregister_connection(&self, id: &ConnectionId) -> usize {
        self.hub.leave(id).await
    }

    pub async fn publish_event(&self, event: Event) {
        self.hub.publish(event).await;
    }

    pub fn live_count(&self) -> usize {
        self.hub.live_count()
    }

    pub fn hub_stats(&self) -> HubStats {
        self.hub.stats()
    }

    // ---------------------------------------------------------------------
    // Leaderboard
    // ---------------------------------------------------------------------

    pub async fn record_leaderboard_action(&self, respondent: &RespondentId, action: LeaderboardAction) {
        let _gate = self.gate.read().await;
        self.leaderboard.record(respondent, action).await;
    }

    pub async fn leaderboard_snapshot(&self, respondent: &RespondentId) -> LeaderboardSnapshot {
        self.leaderboard.snapshot(respondent).await
    }

    // ---------------------------------------------------------------------
    // Reset
    // ---------------------------------------------------------------------

    /// Warns clients with `shutdown`, waits the grace period, then wipes all
    /// per-survey state in one step. Connections are not closed here.
    pub async fn reset_all(&self) {
        self.shutdown_and_clear(None).await;
    }

    /// `reset_all` that also switches to a new survey definition.
    pub async fn reload(&self, survey: SurveyDefinition) {
        self.shutdown_and_clear(Some(survey)).await;
    }

    async fn shutdown_and_clear(&self, next: Option<SurveyDefinition>) {
        info!("🧹 [RESET] Announcing shutdown, clearing state in {:?}", self.reset_grace);
        self.hub
            .publish(Event::Shutdown(SHUTDOWN_REASON.to_string()))
            .await;
        tokio::time::sleep(self.reset_grace).await;

        let _gate = self.gate.write().await;
        info!("📊 [RESET] Hub before clear: {:?}", self.hub.stats());
        self.answers.reset().await;
        self.leaderboard.reset().await;
        self.hub.clear();

        let slide_count = match next {
            Some(survey) => {
                let slide_count = survey.slide_count();
                info!("🗳️ [SESSION] Survey '{}' installed ({} slides)", survey.name, slide_count);
                *self.survey.write().await = Arc::new(survey);
                slide_count
            }
            None => self.cursor.slide_count(),
        };
        self.cursor.reset(slide_count);
        info!("🧹 [RESET] Survey state cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::test_support::{next_event, RecordingChannel};
    use crate::types::{SlideKind, NOT_STARTED};

    fn slide(kind: SlideKind) -> Slide {
        Slide {
            kind,
            question: "q".into(),
            result: "bar".into(),
            answers: vec!["A".into(), "B".into()],
        }
    }

    fn survey(slides: Vec<Slide>) -> SurveyDefinition {
        SurveyDefinition {
            name: "test".into(),
            token: "tok".into(),
            secret: "sesame".into(),
            slides,
        }
    }

    fn session(slides: Vec<Slide>) -> Session {
        Session::with_settings(survey(slides), 16, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_access_checks() {
        let s = session(vec![]);
        assert!(s.check_token(&"tok".into()).await.is_ok());
        assert_eq!(s.check_token(&"nope".into()).await, Err(SurveyError::InvalidToken));
        assert!(s.authorize("sesame").await.is_ok());
        assert_eq!(s.authorize("guess").await, Err(SurveyError::InvalidSecret));
    }

    #[tokio::test]
    async fn test_advance_publishes_slide_and_finish() {
        let s = session(vec![slide(SlideKind::Single)]);
        let (chan, mut rx) = RecordingChannel::new();
        s.register_connection(chan).await;
        assert_eq!(next_event(&mut rx).await, Event::UserCount(1));

        assert_eq!(s.advance_slide().await, Ok(0));
        assert_eq!(next_event(&mut rx).await, Event::NewSlide(0));
        assert_eq!(s.advance_slide().await, Ok(1));
        assert_eq!(next_event(&mut rx).await, Event::Finished(true));
        assert_eq!(s.advance_slide().await, Err(SurveyError::AlreadyFinished));
    }

    #[tokio::test]
    async fn test_submit_current_validates_slide_kind() {
        let s = session(vec![slide(SlideKind::Single), slide(SlideKind::Multiple)]);
        let token: SurveyToken = "tok".into();
        let u1: RespondentId = "u1".into();

        assert_eq!(
            s.submit_current(&token, &u1, vec!["A".into()]).await,
            Err(SurveyError::NoActiveSlide)
        );

        s.advance_slide().await.unwrap();
        assert_eq!(
            s.submit_current(&token, &u1, vec!["A".into(), "B".into()]).await,
            Err(SurveyError::TooManyValues { slide: 0, count: 2 })
        );
        assert_eq!(
            s.submit_current(&token, &u1, vec![]).await,
            Err(SurveyError::EmptyAnswer)
        );
        let tally = s.submit_current(&token, &u1, vec!["A".into()]).await.unwrap();
        assert_eq!(tally["A"], 1);

        s.advance_slide().await.unwrap();
        let tally = s
            .submit_current(&token, &u1, vec!["A".into(), "B".into()])
            .await
            .unwrap();
        assert_eq!(tally.len(), 2);
    }

    #[tokio::test]
    async fn test_submit_current_broadcasts_tally() {
        let s = session(vec![slide(SlideKind::Single)]);
        let (chan, mut rx) = RecordingChannel::new();
        s.register_connection(chan).await;
        next_event(&mut rx).await;
        s.advance_slide().await.unwrap();
        next_event(&mut rx).await;

        s.submit_current(&"tok".into(), &"u1".into(), vec!["B".into()])
            .await
            .unwrap();
        let mut expected = Tally::new();
        expected.insert("B".into(), 1);
        assert_eq!(next_event(&mut rx).await, Event::NewAnswer(expected));
    }

    #[tokio::test]
    async fn test_reset_all_announces_and_clears() {
        let s = session(vec![slide(SlideKind::Single)]);
        let token: SurveyToken = "tok".into();
        let u1: RespondentId = "u1".into();
        let (chan, mut rx) = RecordingChannel::new();
        s.register_connection(chan).await;
        next_event(&mut rx).await;

        s.advance_slide().await.unwrap();
        next_event(&mut rx).await;
        s.submit_current(&token, &u1, vec!["A".into()]).await.unwrap();
        next_event(&mut rx).await;
        s.record_leaderboard_action(&u1, LeaderboardAction::Pop).await;

        s.reset_all().await;

        assert_eq!(
            next_event(&mut rx).await,
            Event::Shutdown(SHUTDOWN_REASON.to_string())
        );
        assert_eq!(s.current_slide(), NOT_STARTED);
        assert!(s.tally(&token, 0).await.is_empty());
        assert!(!s.has_answered(&token, 0, &u1).await);
        let snap = s.leaderboard_snapshot(&u1).await;
        assert_eq!(snap.player_score.popped_count, 0);
        assert!(snap.top_scores.is_empty());
        assert_eq!(s.live_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_current_checks_token() {
        let s = session(vec![slide(SlideKind::Single)]);
        s.advance_slide().await.unwrap();
        assert_eq!(
            s.submit_current(&"nope".into(), &"u1".into(), vec!["A".into()]).await,
            Err(SurveyError::InvalidToken)
        );
        assert_eq!(s.respondent_count(&"nope".into(), 0).await, 0);
    }

    #[tokio::test]
    async fn test_advance_slide_as_checks_secret() {
        let s = session(vec![slide(SlideKind::Single)]);
        assert_eq!(s.advance_slide_as("guess").await, Err(SurveyError::InvalidSecret));
        assert_eq!(s.current_slide(), NOT_STARTED);
        assert_eq!(s.advance_slide_as("sesame").await, Ok(0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reset_leaves_no_stale_answers() {
        let token: SurveyToken = "tok".into();
        for _ in 0..50 {
            let s = Arc::new(Session::with_settings(
                survey(vec![slide(SlideKind::Single)]),
                1024,
                Duration::ZERO,
            ));
            s.advance_slide().await.unwrap();

            let mut writers = Vec::new();
            for w in 0..3 {
                let s = s.clone();
                let token = token.clone();
                writers.push(tokio::spawn(async move {
                    for i in 0..20 {
                        let who = RespondentId::new(format!("w{w}-{i}"));
                        let _ = s.submit_current(&token, &who, vec!["A".into()]).await;
                        let _ = s.submit_current(&token, &"fixed".into(), vec!["A".into()]).await;
                        tokio::task::yield_now().await;
                    }
                }));
            }
            tokio::task::yield_now().await;
            s.reset_all().await;
            for writer in writers {
                writer.await.unwrap();
            }

            // writers that saw the old slide finished before the wipe; the
            // cursor is back at "not started" so later attempts are refused
            assert_eq!(s.current_slide(), NOT_STARTED);
            assert!(s.tally(&token, 0).await.is_empty());
            assert!(!s.has_answered(&token, 0, &"fixed".into()).await);

            s.advance_slide().await.unwrap();
            assert!(s
                .submit_current(&token, &"fixed".into(), vec!["B".into()])
                .await
                .is_ok());
        }
    }

    #[tokio::test]
    async fn test_reload_switches_survey() {
        let s = session(vec![slide(SlideKind::Single)]);
        s.advance_slide().await.unwrap();

        let mut next = survey(vec![slide(SlideKind::Multiple); 3]);
        next.token = "fresh".into();
        next.secret = "other".into();
        s.reload(next).await;

        assert_eq!(s.current_slide(), NOT_STARTED);
        assert!(s.check_token(&"fresh".into()).await.is_ok());
        assert!(s.authorize("sesame").await.is_err());
        assert_eq!(s.advance_slide_as("sesame").await, Err(SurveyError::InvalidSecret));
        for expected in 0..3 {
            assert_eq!(s.advance_slide().await, Ok(expected));
        }
        assert_eq!(s.advance_slide().await, Ok(3));
        assert_eq!(s.current_slide_definition().await, None);
    }
}
