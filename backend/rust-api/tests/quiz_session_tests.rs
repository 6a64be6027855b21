//! End-to-end walkthroughs of the quiz session state machine through the
//! public API, without any external services.

use ecorecycle_api::models::quiz::{
    QuizError, QuizSession, QuizSessionView, POINTS_PER_CORRECT_ANSWER, QUESTION_COUNT,
};
use ecorecycle_api::services::question_source::fallback_questions;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

fn new_session(user_id: Option<&str>) -> QuizSession {
    QuizSession::new(
        "session-1".to_string(),
        user_id.map(|s| s.to_string()),
        "e-waste recycling".to_string(),
        fallback_questions(),
    )
}

fn correct_option(session: &QuizSession, index: usize) -> String {
    session.questions()[index].correct_option.clone()
}

fn wrong_option(session: &QuizSession, index: usize) -> String {
    let question = &session.questions()[index];
    question
        .options
        .iter()
        .find(|o| **o != question.correct_option)
        .cloned()
        .unwrap()
}

#[test]
fn full_run_with_one_mistake_earns_forty_points() {
    let mut session = new_session(Some("user-1"));

    for i in 0..QUESTION_COUNT {
        let option = if i == 2 {
            wrong_option(&session, i)
        } else {
            correct_option(&session, i)
        };
        let correct = session.select_answer(i, &option).unwrap();
        assert_eq!(correct, i != 2);

        let done = session.advance().unwrap();
        assert_eq!(done, i == QUESTION_COUNT - 1);
    }

    assert!(session.is_complete());
    assert_eq!(session.score(), 4);
    assert_eq!(session.earned_points(), 4 * POINTS_PER_CORRECT_ANSWER);
}

#[test]
fn navigation_respects_answer_and_boundary_rules() {
    let mut session = new_session(None);

    // Cannot move forward past an unanswered question, or back from the start.
    assert_eq!(session.advance(), Err(QuizError::NotAnswered));
    assert_eq!(session.retreat(), Err(QuizError::AtStart));

    let option = correct_option(&session, 0);
    session.select_answer(0, &option).unwrap();
    assert!(!session.advance().unwrap());
    assert_eq!(session.current_index(), 1);

    // Going back to an answered question is fine; the answer stays locked.
    session.retreat().unwrap();
    assert_eq!(session.current_index(), 0);
    assert_eq!(
        session.select_answer(0, &wrong_option(&session, 0)),
        Err(QuizError::AlreadyAnswered(0))
    );
}

#[tokio::test]
async fn points_commit_fires_exactly_once_across_retries() {
    let mut session = new_session(Some("user-1"));
    for i in 0..QUESTION_COUNT {
        let option = correct_option(&session, i);
        session.select_answer(i, &option).unwrap();
        session.advance().unwrap();
    }

    let award_calls = AtomicUsize::new(0);
    let credited = AtomicI64::new(0);
    let award_calls = &award_calls;
    let credited = &credited;

    // First attempt: the account store is down.
    let result = session
        .commit_points_if_eligible(true, |_| async {
            Err(anyhow::anyhow!("account store unreachable"))
        })
        .await;
    assert!(result.is_err());
    assert!(!session.points_committed());

    // Retry succeeds and latches.
    let awarded: Result<bool, anyhow::Error> = session
        .commit_points_if_eligible(true, |points| async move {
            award_calls.fetch_add(1, Ordering::SeqCst);
            credited.store(points as i64, Ordering::SeqCst);
            Ok(())
        })
        .await;
    assert!(awarded.unwrap());
    assert_eq!(credited.load(Ordering::SeqCst), 50);

    // Further commits are eligible no-ops.
    let awarded: Result<bool, anyhow::Error> = session
        .commit_points_if_eligible(true, |_| async {
            award_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
    assert!(!awarded.unwrap());
    assert_eq!(award_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn commit_never_reports_success_while_the_credit_keeps_failing() {
    let mut session = new_session(Some("user-1"));
    for i in 0..QUESTION_COUNT {
        let option = correct_option(&session, i);
        session.select_answer(i, &option).unwrap();
        session.advance().unwrap();
    }

    let credited = AtomicI64::new(0);
    let credited = &credited;

    // A credit that fails must surface as an error on every attempt, never
    // as a quietly-successful commit over an uncredited counter.
    for _ in 0..3 {
        let result = session
            .commit_points_if_eligible(true, |_| async {
                Err(anyhow::anyhow!("account store unreachable"))
            })
            .await;
        assert!(result.is_err());
        assert!(!session.points_committed());
    }
    assert_eq!(credited.load(Ordering::SeqCst), 0);

    // The commit latches only together with an actual credit.
    let awarded: Result<bool, anyhow::Error> = session
        .commit_points_if_eligible(true, |points| async move {
            credited.fetch_add(points as i64, Ordering::SeqCst);
            Ok(())
        })
        .await;
    assert!(awarded.unwrap());
    assert!(session.points_committed());
    assert_eq!(
        credited.load(Ordering::SeqCst),
        (QUESTION_COUNT as u32 * POINTS_PER_CORRECT_ANSWER) as i64
    );
}

#[tokio::test]
async fn anonymous_completion_never_commits() {
    let mut session = new_session(None);
    for i in 0..QUESTION_COUNT {
        let option = correct_option(&session, i);
        session.select_answer(i, &option).unwrap();
        session.advance().unwrap();
    }

    let awarded: Result<bool, anyhow::Error> = session
        .commit_points_if_eligible(false, |_| async { panic!("award must not fire") })
        .await;
    assert!(!awarded.unwrap());
}

#[tokio::test]
async fn restart_allows_a_second_attempt_over_the_same_questions() {
    let mut session = new_session(Some("user-1"));
    for i in 0..QUESTION_COUNT {
        let option = wrong_option(&session, i);
        session.select_answer(i, &option).unwrap();
        session.advance().unwrap();
    }
    assert_eq!(session.earned_points(), 0);

    // Zero score means no award even for a signed-in user.
    let awarded: Result<bool, anyhow::Error> = session
        .commit_points_if_eligible(true, |_| async { panic!("award must not fire") })
        .await;
    assert!(!awarded.unwrap());

    let prompts_before: Vec<String> = session
        .questions()
        .iter()
        .map(|q| q.prompt.clone())
        .collect();

    session.restart();

    assert_eq!(session.current_index(), 0);
    assert!(!session.is_complete());
    assert!(session.answers().iter().all(|a| a.is_none()));

    // Second attempt, all correct this time.
    for i in 0..QUESTION_COUNT {
        let option = correct_option(&session, i);
        session.select_answer(i, &option).unwrap();
        session.advance().unwrap();
    }
    assert_eq!(
        session.earned_points(),
        QUESTION_COUNT as u32 * POINTS_PER_CORRECT_ANSWER
    );

    let prompts_after: Vec<String> = session
        .questions()
        .iter()
        .map(|q| q.prompt.clone())
        .collect();
    assert_eq!(prompts_before, prompts_after);
}

#[test]
fn client_view_never_leaks_answer_keys() {
    let session = new_session(None);
    let view = QuizSessionView::from(&session);
    let json = serde_json::to_value(&view).unwrap();

    let questions = json["questions"].as_array().unwrap();
    assert_eq!(questions.len(), QUESTION_COUNT);
    for question in questions {
        assert!(question.get("correct_option").is_none());
        assert!(question.get("explanation").is_none());
    }
}
