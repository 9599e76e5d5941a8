// packages/backend/src/answer_store.rs
use crate::error::SurveyError;
use crate::types::{AnswerKey, RespondentId, ResponseKey, SlideIndex, SurveyToken, Tally};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

// Both maps live behind one lock so a reset can never be observed half done.
#[derive(Default)]
struct AnswerBook {
    answers: HashMap<AnswerKey, Vec<String>>,
    answered: HashSet<ResponseKey>,
}

/// Submitted answers per (survey, slide) plus who already answered.
#[derive(Default)]
pub struct AnswerStore {
    book: RwLock<AnswerBook>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn has_answered(
        &self,
        token: &SurveyToken,
        slide: SlideIndex,
        respondent: &RespondentId,
    ) -> bool {
        let key = ResponseKey::new(token, slide, respondent);
        self.book.read().await.answered.contains(&key)
    }

    /// Records `values` for the respondent. The answered check and the insert
    /// happen under the same write guard, so duplicates racing each other
    /// resolve to exactly one accepted submission.
    pub async fn submit(
        &self,
        token: &SurveyToken,
        slide: SlideIndex,
        respondent: &RespondentId,
        values: Vec<String>,
    ) -> Result<(), SurveyError> {
        if values.is_empty() {
            return Err(SurveyError::EmptyAnswer);
        }

        let key = ResponseKey::new(token, slide, respondent);
        let mut book = self.book.write().await;
        if !book.answered.insert(key) {
            return Err(SurveyError::AlreadyAnswered { slide });
        }
        book.answers
            .entry(AnswerKey::new(token, slide))
            .or_default()
            .extend(values);
        Ok(())
    }

    pub async fn tally(&self, token: &SurveyToken, slide: SlideIndex) -> Tally {
        let key = AnswerKey::new(token, slide);
        let book = self.book.read().await;
        let mut tally = Tally::new();
        if let Some(values) = book.answers.get(&key) {
            for value in values {
                *tally.entry(value.clone()).or_insert(0) += 1;
            }
        }
        tally
    }

    /// Number of respondents who answered the slide.
    pub async fn respondent_count(&self, token: &SurveyToken, slide: SlideIndex) -> usize {
        let key = AnswerKey::new(token, slide);
        let book = self.book.read().await;
        book.answered.iter().filter(|r| r.answer == key).count()
    }

    pub async fn reset(&self) {
        let mut book = self.book.write().await;
        *book = AnswerBook::default();
    }
}
