use super::catalog::QuestionCatalog;
use super::domain::ApplicationRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityMismatch {
    pub question: String,
    pub expected: String,
    pub found: String,
}

/// Advisory comparison of an application against the catalog's expected answers.
/// It never blocks a decision; reviewers see it on the review card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EligibilityHint {
    pub mismatches: Vec<EligibilityMismatch>,
}

impl EligibilityHint {
    pub fn is_clear(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.is_clear() {
            return "Meets all screening answers".to_string();
        }

        let details: Vec<String> = self
            .mismatches
            .iter()
            .map(|mismatch| {
                format!(
                    "{} (expected {}, answered {})",
                    mismatch.question,
                    mismatch.expected,
                    if mismatch.found.is_empty() {
                        "nothing"
                    } else {
                        mismatch.found.as_str()
                    }
                )
            })
            .collect();
        format!("Check: {}", details.join("; "))
    }
}

pub fn screen(catalog: &QuestionCatalog, record: &ApplicationRecord) -> EligibilityHint {
    let mismatches = catalog
        .questions()
        .iter()
        .filter_map(|question| {
            let expected = question.expected_answer.as_ref()?;
            let found = record.answer(&question.text).unwrap_or_default().trim();
            if found.eq_ignore_ascii_case(expected.trim()) {
                None
            } else {
                Some(EligibilityMismatch {
                    question: question.text.clone(),
                    expected: expected.clone(),
                    found: found.to_string(),
                })
            }
        })
        .collect();

    EligibilityHint { mismatches }
}
