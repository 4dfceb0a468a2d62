use crate::models::{AnswerKey, AnswerValue, GradedDetail, Question, QuestionType, SubmissionResult};
use std::collections::{BTreeSet, HashMap};

/// Grades one answer against its question. Anything of the wrong shape, or
/// an empty selection, is wrong.
pub fn score_answer(question: &Question, submitted: Option<&AnswerValue>) -> bool {
    match (question.q_type, question.correct.as_ref(), submitted) {
        (QuestionType::Mcq, Some(AnswerKey::Index(expected)), Some(AnswerValue::Index(value))) => {
            expected == value
        }
        (
            QuestionType::MultipleCorrect,
            Some(AnswerKey::Indices(expected)),
            Some(AnswerValue::Indices(value)),
        ) => {
            let expected: BTreeSet<_> = expected.iter().collect();
            let actual: BTreeSet<_> = value.iter().collect();
            !actual.is_empty() && expected == actual
        }
        (QuestionType::TrueFalse, Some(AnswerKey::Flag(expected)), Some(AnswerValue::Flag(value))) => {
            expected == value
        }
        (QuestionType::FillBlank, Some(AnswerKey::Text(expected)), Some(AnswerValue::Text(value))) => {
            let expected = expected.trim().to_lowercase();
            let value = value.trim().to_lowercase();
            !expected.is_empty() && !value.is_empty() && expected == value
        }
        _ => false,
    }
}

/// Keeps only the part of the submitted answer that matches the question's
/// shape, so the stored detail never echoes a mistyped value.
fn normalized_answer(question: &Question, submitted: Option<&AnswerValue>) -> Option<AnswerValue> {
    match (question.q_type, submitted) {
        (QuestionType::Mcq, Some(v @ AnswerValue::Index(_))) => Some(v.clone()),
        (QuestionType::TrueFalse, Some(v @ AnswerValue::Flag(_))) => Some(v.clone()),
        (QuestionType::MultipleCorrect, Some(AnswerValue::Indices(list))) => {
            let unique: BTreeSet<_> = list.iter().copied().collect();
            Some(AnswerValue::Indices(unique.into_iter().collect()))
        }
        (QuestionType::MultipleCorrect, _) => Some(AnswerValue::Indices(Vec::new())),
        (QuestionType::FillBlank, Some(v @ AnswerValue::Text(_))) => Some(v.clone()),
        (QuestionType::FillBlank, _) => Some(AnswerValue::Text(String::new())),
        _ => None,
    }
}

pub fn evaluate_answers(
    questions: &[Question],
    answers: &HashMap<String, Option<AnswerValue>>,
) -> SubmissionResult {
    let mut details = Vec::with_capacity(questions.len());
    for (idx, question) in questions.iter().enumerate() {
        let key = question.slot_key(idx);
        let submitted = answers.get(&key).and_then(Option::as_ref);
        details.push(GradedDetail {
            correct: score_answer(question, submitted),
            id: key,
            q_type: question.q_type,
            prompt: question.prompt.clone(),
            correct_answer: question.correct.clone(),
            student_answer: normalized_answer(question, submitted),
            explanation: question.explanation.clone().unwrap_or_default(),
        });
    }

    let total = questions.len() as u32;
    let correct = details.iter().filter(|d| d.correct).count() as u32;
    let accuracy = if total == 0 {
        0.0
    } else {
        correct as f64 * 100.0 / total as f64
    };
    SubmissionResult {
        submission_id: String::new(),
        score: correct,
        total,
        correct,
        accuracy,
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Difficulty;

    fn question(id: &str, q_type: QuestionType, correct: AnswerKey) -> Question {
        Question {
            id: id.into(),
            q_type,
            difficulty: Difficulty::Medium,
            prompt: format!("prompt {id}"),
            options: q_type
                .has_options()
                .then(|| vec!["alpha".into(), "beta".into(), "gamma".into(), "delta".into()]),
            topic: None,
            explanation: Some(format!("why {id}")),
            correct: Some(correct),
        }
    }

    fn sample() -> Vec<Question> {
        vec![
            question("q1", QuestionType::Mcq, AnswerKey::Index(2)),
            question("q2", QuestionType::MultipleCorrect, AnswerKey::Indices(vec![0, 3])),
            question("q3", QuestionType::TrueFalse, AnswerKey::Flag(false)),
            question("q4", QuestionType::FillBlank, AnswerKey::Text("Photosynthesis".into())),
        ]
    }

    #[test]
    fn all_types_graded_correct() {
        let answers = HashMap::from([
            ("q1".to_string(), Some(AnswerValue::Index(2))),
            ("q2".to_string(), Some(AnswerValue::Indices(vec![3, 0]))),
            ("q3".to_string(), Some(AnswerValue::Flag(false))),
            ("q4".to_string(), Some(AnswerValue::Text("  photosynthesis ".into()))),
        ]);
        let result = evaluate_answers(&sample(), &answers);
        assert_eq!(result.score, 4);
        assert_eq!(result.total, 4);
        assert_eq!(result.accuracy, 100.0);
        assert!(result.details.iter().all(|d| d.correct));
        assert_eq!(result.details[3].explanation, "why q4");
    }

    #[test]
    fn blanks_and_wrong_shapes_are_wrong() {
        let answers = HashMap::from([
            ("q1".to_string(), None),
            ("q2".to_string(), Some(AnswerValue::Indices(vec![]))),
            ("q3".to_string(), Some(AnswerValue::Text("false".into()))),
            ("q4".to_string(), Some(AnswerValue::Text(String::new()))),
        ]);
        let result = evaluate_answers(&sample(), &answers);
        assert_eq!(result.score, 0);
        assert_eq!(result.accuracy, 0.0);
        assert_eq!(result.details[2].student_answer, None);
        assert_eq!(result.details[3].student_answer, Some(AnswerValue::Text(String::new())));
    }

    #[test]
    fn partial_multi_selection_is_wrong() {
        let q = &sample()[1];
        assert!(!score_answer(q, Some(&AnswerValue::Indices(vec![0]))));
        assert!(!score_answer(q, Some(&AnswerValue::Indices(vec![0, 1, 3]))));
        assert!(score_answer(q, Some(&AnswerValue::Indices(vec![0, 3, 3]))));
    }

    #[test]
    fn missing_ids_fall_back_to_position() {
        let mut questions = sample();
        questions[0].id.clear();
        let answers = HashMap::from([("0".to_string(), Some(AnswerValue::Index(2)))]);
        let result = evaluate_answers(&questions, &answers);
        assert_eq!(result.details[0].id, "0");
        assert!(result.details[0].correct);
        assert_eq!(result.score, 1);
        assert_eq!(result.accuracy, 25.0);
    }

    #[test]
    fn empty_test_scores_zero() {
        let result = evaluate_answers(&[], &HashMap::new());
        assert_eq!(result.total, 0);
        assert_eq!(result.accuracy, 0.0);
    }
}
