use crate::client::render::{self, RATING_VALUES};
use crate::models::{GradedDetail, Rating, SubmissionResult};
use maud::Markup;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RatingError {
    #[error("rating must be between 1 and 5, got {0}")]
    OutOfRange(u8),
    #[error("question {0} is not part of these results")]
    UnknownQuestion(usize),
    #[error("question {0} was already rated")]
    AlreadyRated(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingControl {
    Open,
    Acknowledged(u8),
}

pub struct ResultRow<'a> {
    pub detail: &'a GradedDetail,
    pub control: RatingControl,
}

/// One graded submission on screen. Rating controls live as long as this
/// view; a new view starts with every row open again.
#[derive(Debug, Clone)]
pub struct ResultsView {
    result: SubmissionResult,
    controls: Vec<RatingControl>,
}

impl ResultsView {
    pub fn new(result: SubmissionResult) -> Self {
        let controls = vec![RatingControl::Open; result.details.len()];
        Self { result, controls }
    }

    pub fn result(&self) -> &SubmissionResult {
        &self.result
    }

    pub fn score_line(&self) -> String {
        format!("Score: {}/{}", self.result.score, self.result.total)
    }

    pub fn accuracy_line(&self) -> String {
        format!("Accuracy: {:.1}%", self.result.accuracy)
    }

    pub fn rows(&self) -> impl Iterator<Item = ResultRow<'_>> {
        self.result
            .details
            .iter()
            .zip(self.controls.iter().copied())
            .map(|(detail, control)| ResultRow { detail, control })
    }

    pub fn control(&self, question_idx: usize) -> Option<RatingControl> {
        self.controls.get(question_idx).copied()
    }

    /// Swaps the row's rating buttons for an acknowledgement and returns the
    /// rating to send. Each row accepts one rating.
    pub fn activate(&mut self, question_idx: usize, rating: u8) -> Result<Rating, RatingError> {
        if !RATING_VALUES.contains(&rating) {
            return Err(RatingError::OutOfRange(rating));
        }
        let control = self
            .controls
            .get_mut(question_idx)
            .ok_or(RatingError::UnknownQuestion(question_idx))?;
        match *control {
            RatingControl::Open => {
                *control = RatingControl::Acknowledged(rating);
                Ok(Rating { question_idx, rating })
            }
            RatingControl::Acknowledged(_) => Err(RatingError::AlreadyRated(question_idx)),
        }
    }

    pub fn markup(&self) -> Markup {
        render::results(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuestionType;

    fn detail(prompt: &str, correct: bool) -> GradedDetail {
        GradedDetail {
            id: prompt.to_lowercase(),
            q_type: QuestionType::TrueFalse,
            prompt: prompt.into(),
            correct,
            correct_answer: None,
            student_answer: None,
            explanation: format!("About {prompt}"),
        }
    }

    fn result(score: u32, total: u32, accuracy: f64) -> SubmissionResult {
        SubmissionResult {
            submission_id: "s1".into(),
            score,
            total,
            correct: score,
            accuracy,
            details: (0..total).map(|i| detail(&format!("Q{i}"), i < score)).collect(),
        }
    }

    #[test]
    fn score_and_accuracy_lines() {
        let view = ResultsView::new(result(8, 10, 80.0));
        assert_eq!(view.score_line(), "Score: 8/10");
        assert_eq!(view.accuracy_line(), "Accuracy: 80.0%");
        let html = view.markup().into_string();
        assert!(html.contains("Score: 8/10"));
        assert!(html.contains("Accuracy: 80.0%"));
    }

    #[test]
    fn accuracy_rounds_to_one_decimal() {
        let view = ResultsView::new(result(2, 3, 66.666_666));
        assert_eq!(view.accuracy_line(), "Accuracy: 66.7%");
    }

    #[test]
    fn rows_keep_server_order_with_five_buttons() {
        let view = ResultsView::new(result(1, 3, 33.3));
        let prompts: Vec<_> = view.rows().map(|r| r.detail.prompt.clone()).collect();
        assert_eq!(prompts, vec!["Q0", "Q1", "Q2"]);
        let html = view.markup().into_string();
        assert_eq!(html.matches("class=\"rate\"").count(), 15);
    }

    #[test]
    fn rating_once_per_row() {
        let mut view = ResultsView::new(result(2, 2, 100.0));
        let rating = view.activate(1, 5).unwrap();
        assert_eq!(rating, Rating { question_idx: 1, rating: 5 });
        assert_eq!(view.control(1), Some(RatingControl::Acknowledged(5)));
        assert_eq!(view.activate(1, 3), Err(RatingError::AlreadyRated(1)));

        let html = view.markup().into_string();
        assert_eq!(html.matches("class=\"rate\"").count(), 5);
        assert_eq!(html.matches("rating-ack").count(), 1);
    }

    #[test]
    fn invalid_ratings_leave_controls_open() {
        let mut view = ResultsView::new(result(1, 1, 100.0));
        assert_eq!(view.activate(0, 0), Err(RatingError::OutOfRange(0)));
        assert_eq!(view.activate(0, 6), Err(RatingError::OutOfRange(6)));
        assert_eq!(view.activate(4, 3), Err(RatingError::UnknownQuestion(4)));
        assert_eq!(view.control(0), Some(RatingControl::Open));
    }

    #[test]
    fn fresh_view_allows_rating_again() {
        let res = result(1, 1, 100.0);
        let mut first = ResultsView::new(res.clone());
        first.activate(0, 4).unwrap();
        let mut second = ResultsView::new(res);
        assert!(second.activate(0, 4).is_ok());
    }
}
