use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

/// Number of questions in every quiz session.
pub const QUESTION_COUNT: usize = 5;

/// Reward points credited per correctly answered question.
pub const POINTS_PER_CORRECT_ANSWER: u32 = 10;

/// A single multiple-choice question, fixed for the lifetime of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// 1-based sequence position, assigned at load time.
    pub id: u32,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option: String,
    pub explanation: String,
}

impl QuestionRecord {
    /// A record is usable when it has a non-empty prompt, exactly four
    /// distinct options and a correct option that is one of them.
    pub fn is_well_formed(&self) -> bool {
        if self.prompt.trim().is_empty() || self.options.len() != 4 {
            return false;
        }
        let mut seen: Vec<&str> = Vec::with_capacity(4);
        for option in &self.options {
            if option.trim().is_empty() || seen.contains(&option.as_str()) {
                return false;
            }
            seen.push(option.as_str());
        }
        self.options.contains(&self.correct_option)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuizError {
    #[error("question index {0} is out of range")]
    InvalidIndex(usize),
    #[error("question {0} has already been answered")]
    AlreadyAnswered(usize),
    #[error("option is not one of the question's choices")]
    InvalidOption,
    #[error("current question has not been answered yet")]
    NotAnswered,
    #[error("already at the first question")]
    AtStart,
}

/// One quiz attempt: the fixed question sequence plus the mutable answer and
/// navigation state. The struct owns its state exclusively; callers mutate it
/// only through the methods below and persist it between requests as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSession {
    pub id: String,
    /// Present when the session was started by an authenticated user.
    pub user_id: Option<String>,
    pub topic: String,
    questions: Vec<QuestionRecord>,
    answers: Vec<Option<String>>,
    current_index: usize,
    is_complete: bool,
    points_committed: bool,
    pub started_at: DateTime<Utc>,
}

impl QuizSession {
    pub fn new(
        id: String,
        user_id: Option<String>,
        topic: String,
        questions: Vec<QuestionRecord>,
    ) -> Self {
        let answers = vec![None; questions.len()];
        Self {
            id,
            user_id,
            topic,
            questions,
            answers,
            current_index: 0,
            is_complete: false,
            points_committed: false,
            started_at: Utc::now(),
        }
    }

    pub fn questions(&self) -> &[QuestionRecord] {
        &self.questions
    }

    pub fn answers(&self) -> &[Option<String>] {
        &self.answers
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    pub fn points_committed(&self) -> bool {
        self.points_committed
    }

    /// Count of correctly answered questions, recomputed from the answers.
    pub fn score(&self) -> usize {
        self.questions
            .iter()
            .zip(&self.answers)
            .filter(|(question, answer)| answer.as_deref() == Some(question.correct_option.as_str()))
            .count()
    }

    pub fn earned_points(&self) -> u32 {
        self.score() as u32 * POINTS_PER_CORRECT_ANSWER
    }

    /// Record the answer for a question. The first selection is final: a
    /// second attempt on the same index is rejected, not overwritten.
    /// Returns whether the selected option is the correct one.
    pub fn select_answer(&mut self, index: usize, option: &str) -> Result<bool, QuizError> {
        let question = self
            .questions
            .get(index)
            .ok_or(QuizError::InvalidIndex(index))?;

        if self.answers[index].is_some() {
            return Err(QuizError::AlreadyAnswered(index));
        }
        if !question.options.iter().any(|o| o == option) {
            return Err(QuizError::InvalidOption);
        }

        self.answers[index] = Some(option.to_string());
        Ok(option == question.correct_option)
    }

    /// Move to the next question. The current question must be answered
    /// first. Returns `true` once, when advancing past the final question;
    /// that transition marks the session complete.
    pub fn advance(&mut self) -> Result<bool, QuizError> {
        if self.answers[self.current_index].is_none() {
            return Err(QuizError::NotAnswered);
        }
        if self.current_index + 1 == self.questions.len() {
            self.is_complete = true;
            return Ok(true);
        }
        self.current_index += 1;
        Ok(false)
    }

    /// Move back to the previous question. Backward navigation is allowed
    /// regardless of answer state and never clears completion.
    pub fn retreat(&mut self) -> Result<(), QuizError> {
        if self.current_index == 0 {
            return Err(QuizError::AtStart);
        }
        self.current_index -= 1;
        Ok(())
    }

    /// Fire the points side effect at most once per session lifetime.
    ///
    /// The award capability is called only when the session is complete, the
    /// score is positive, a user identity is present and no prior commit
    /// succeeded. On award failure the gate stays open so the caller can
    /// retry (at-least-once delivery; duplicate protection beyond this
    /// instance belongs to the account store's idempotency key).
    ///
    /// Returns `Ok(true)` when the award was delivered, `Ok(false)` when the
    /// call was an eligible no-op.
    pub async fn commit_points_if_eligible<F, Fut, E>(
        &mut self,
        has_identity: bool,
        award: F,
    ) -> Result<bool, E>
    where
        F: FnOnce(u32) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        if !self.is_complete || self.points_committed || !has_identity {
            return Ok(false);
        }
        let points = self.earned_points();
        if points == 0 {
            return Ok(false);
        }

        award(points).await?;
        self.points_committed = true;
        Ok(true)
    }

    /// Discard all answer and navigation state for a fresh attempt over the
    /// same question sequence. Does not re-fetch questions.
    pub fn restart(&mut self) {
        self.answers = vec![None; self.questions.len()];
        self.current_index = 0;
        self.is_complete = false;
        self.points_committed = false;
    }
}

/// Question as exposed to quiz clients: no correct option, no explanation.
/// Those are revealed per question in the answer response.
#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: u32,
    pub prompt: String,
    pub options: Vec<String>,
}

impl From<&QuestionRecord> for QuestionView {
    fn from(q: &QuestionRecord) -> Self {
        Self {
            id: q.id,
            prompt: q.prompt.clone(),
            options: q.options.clone(),
        }
    }
}

/// Progress snapshot returned by the quiz endpoints.
#[derive(Debug, Serialize)]
pub struct QuizSessionView {
    pub session_id: String,
    pub topic: String,
    pub questions: Vec<QuestionView>,
    pub answers: Vec<Option<String>>,
    pub current_index: usize,
    pub is_complete: bool,
    pub score: usize,
    pub earned_points: u32,
    pub points_committed: bool,
}

impl From<&QuizSession> for QuizSessionView {
    fn from(session: &QuizSession) -> Self {
        Self {
            session_id: session.id.clone(),
            topic: session.topic.clone(),
            questions: session.questions().iter().map(QuestionView::from).collect(),
            answers: session.answers().to_vec(),
            current_index: session.current_index(),
            is_complete: session.is_complete(),
            score: session.score(),
            earned_points: session.earned_points(),
            points_committed: session.points_committed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    fn question(id: u32, correct: &str) -> QuestionRecord {
        QuestionRecord {
            id,
            prompt: format!("Question {}?", id),
            options: vec![
                "A".to_string(),
                "B".to_string(),
                correct.to_string(),
                "D".to_string(),
            ],
            correct_option: correct.to_string(),
            explanation: "Because.".to_string(),
        }
    }

    fn session() -> QuizSession {
        let questions = (1..=5).map(|i| question(i, &format!("C{}", i))).collect();
        QuizSession::new("quiz-1".to_string(), None, "e-waste".to_string(), questions)
    }

    #[test]
    fn new_session_starts_unanswered_at_first_question() {
        let s = session();
        assert_eq!(s.current_index(), 0);
        assert!(!s.is_complete());
        assert!(!s.points_committed());
        assert!(s.answers().iter().all(|a| a.is_none()));
        assert_eq!(s.score(), 0);
        assert_eq!(s.earned_points(), 0);
    }

    #[test]
    fn select_answer_reports_correctness() {
        let mut s = session();
        assert_eq!(s.select_answer(0, "C1"), Ok(true));
        assert_eq!(s.select_answer(1, "A"), Ok(false));
        assert_eq!(s.score(), 1);
        assert_eq!(s.earned_points(), POINTS_PER_CORRECT_ANSWER);
    }

    #[test]
    fn answer_is_immutable_once_chosen() {
        let mut s = session();
        s.select_answer(0, "A").unwrap();
        assert_eq!(s.select_answer(0, "C1"), Err(QuizError::AlreadyAnswered(0)));
        assert_eq!(s.answers()[0].as_deref(), Some("A"));
        assert_eq!(s.score(), 0);
    }

    #[test]
    fn unknown_option_is_rejected_without_recording() {
        let mut s = session();
        assert_eq!(s.select_answer(2, "X"), Err(QuizError::InvalidOption));
        assert!(s.answers()[2].is_none());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut s = session();
        assert_eq!(s.select_answer(5, "A"), Err(QuizError::InvalidIndex(5)));
    }

    #[test]
    fn answering_out_of_order_is_allowed_for_unanswered_questions() {
        let mut s = session();
        assert_eq!(s.select_answer(3, "C4"), Ok(true));
        assert_eq!(s.current_index(), 0);
    }

    #[test]
    fn advance_requires_an_answer() {
        let mut s = session();
        assert_eq!(s.advance(), Err(QuizError::NotAnswered));
        assert_eq!(s.current_index(), 0);

        s.select_answer(0, "A").unwrap();
        assert_eq!(s.advance(), Ok(false));
        assert_eq!(s.current_index(), 1);
    }

    #[test]
    fn retreat_stops_at_first_question() {
        let mut s = session();
        assert_eq!(s.retreat(), Err(QuizError::AtStart));

        s.select_answer(0, "A").unwrap();
        s.advance().unwrap();
        s.retreat().unwrap();
        assert_eq!(s.current_index(), 0);
    }

    #[test]
    fn advancing_past_last_question_completes_the_session() {
        let mut s = session();
        for i in 0..5 {
            s.select_answer(i, "A").unwrap();
            let done = s.advance().unwrap();
            assert_eq!(done, i == 4);
        }
        assert!(s.is_complete());
        assert_eq!(s.current_index(), 4);

        // Completion survives backward navigation.
        s.retreat().unwrap();
        assert!(s.is_complete());
    }

    #[test]
    fn four_correct_one_wrong_scores_forty_points() {
        let mut s = session();
        for i in 0..4 {
            s.select_answer(i, &format!("C{}", i + 1)).unwrap();
            s.advance().unwrap();
        }
        s.select_answer(4, "A").unwrap();
        assert!(s.advance().unwrap());
        assert_eq!(s.score(), 4);
        assert_eq!(s.earned_points(), 40);
    }

    #[tokio::test]
    async fn commit_is_a_noop_before_completion() {
        let mut s = session();
        s.select_answer(0, "C1").unwrap();

        let calls = AtomicUsize::new(0);
        let awarded: Result<bool, anyhow::Error> = s
            .commit_points_if_eligible(true, |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(!awarded.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!s.points_committed());
    }

    #[tokio::test]
    async fn commit_is_a_noop_without_identity() {
        let mut s = session();
        for i in 0..5 {
            s.select_answer(i, &format!("C{}", i + 1)).unwrap();
            s.advance().unwrap();
        }

        let awarded: Result<bool, anyhow::Error> = s
            .commit_points_if_eligible(false, |_| async { panic!("award must not fire") })
            .await;
        assert!(!awarded.unwrap());
        assert!(!s.points_committed());
    }

    #[tokio::test]
    async fn commit_is_a_noop_with_zero_score() {
        let mut s = session();
        for i in 0..5 {
            s.select_answer(i, "A").unwrap();
            s.advance().unwrap();
        }
        assert_eq!(s.earned_points(), 0);

        let awarded: Result<bool, anyhow::Error> = s
            .commit_points_if_eligible(true, |_| async { panic!("award must not fire") })
            .await;
        assert!(!awarded.unwrap());
    }

    #[tokio::test]
    async fn commit_fires_once_and_latches() {
        let mut s = session();
        for i in 0..5 {
            s.select_answer(i, &format!("C{}", i + 1)).unwrap();
            s.advance().unwrap();
        }

        let calls = AtomicUsize::new(0);
        let delivered = AtomicU32::new(0);
        let calls = &calls;
        let delivered = &delivered;

        let awarded: Result<bool, anyhow::Error> = s
            .commit_points_if_eligible(true, |points| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                delivered.store(points, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(awarded.unwrap());
        assert_eq!(delivered.load(Ordering::SeqCst), 50);
        assert!(s.points_committed());

        // Second call after a successful commit must not call award again.
        let awarded: Result<bool, anyhow::Error> = s
            .commit_points_if_eligible(true, |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(!awarded.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_award_leaves_the_gate_open_for_retry() {
        let mut s = session();
        for i in 0..5 {
            s.select_answer(i, &format!("C{}", i + 1)).unwrap();
            s.advance().unwrap();
        }

        let result = s
            .commit_points_if_eligible(true, |_| async {
                Err(anyhow::anyhow!("account store unreachable"))
            })
            .await;
        assert!(result.is_err());
        assert!(!s.points_committed());

        // Retry succeeds and latches.
        let awarded: Result<bool, anyhow::Error> = s
            .commit_points_if_eligible(true, |_| async { Ok(()) })
            .await;
        assert!(awarded.unwrap());
        assert!(s.points_committed());
    }

    #[tokio::test]
    async fn restart_resets_state_but_keeps_questions() {
        let mut s = session();
        for i in 0..5 {
            s.select_answer(i, &format!("C{}", i + 1)).unwrap();
            s.advance().unwrap();
        }
        let awarded: Result<bool, anyhow::Error> = s
            .commit_points_if_eligible(true, |_| async { Ok(()) })
            .await;
        assert!(awarded.unwrap());

        let before: Vec<String> = s.questions().iter().map(|q| q.prompt.clone()).collect();
        s.restart();

        assert_eq!(s.current_index(), 0);
        assert!(!s.is_complete());
        assert!(!s.points_committed());
        assert!(s.answers().iter().all(|a| a.is_none()));
        assert_eq!(s.score(), 0);
        let after: Vec<String> = s.questions().iter().map(|q| q.prompt.clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn well_formedness_checks_options_and_correct_membership() {
        let q = question(1, "C1");
        assert!(q.is_well_formed());

        let mut q = question(1, "C1");
        q.correct_option = "missing".to_string();
        assert!(!q.is_well_formed());

        let mut q = question(1, "C1");
        q.options[1] = q.options[0].clone();
        assert!(!q.is_well_formed());

        let mut q = question(1, "C1");
        q.options.pop();
        assert!(!q.is_well_formed());

        let mut q = question(1, "C1");
        q.prompt = "   ".to_string();
        assert!(!q.is_well_formed());
    }

    #[test]
    fn session_view_hides_correct_options() {
        let s = session();
        let view = QuizSessionView::from(&s);
        assert_eq!(view.questions.len(), 5);
        assert_eq!(view.current_index, 0);
        let as_json = serde_json::to_value(&view).unwrap();
        assert!(as_json["questions"][0].get("correct_option").is_none());
        assert!(as_json["questions"][0].get("explanation").is_none());
    }
}
