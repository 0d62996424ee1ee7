use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// How an applicant answers a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    FreeText,
    SingleSelect,
    YesNo,
}

impl ResponseType {
    fn from_config(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dropdown" | "select" | "single-select" => ResponseType::SingleSelect,
            "yes/no" | "yes-no" | "yesno" => ResponseType::YesNo,
            _ => ResponseType::FreeText,
        }
    }
}

/// Questions whose answers the review workflow reads back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionField {
    Group,
    Callsign,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub text: String,
    pub response_type: ResponseType,
    pub options: Vec<String>,
    pub field: Option<QuestionField>,
    pub expected_answer: Option<String>,
}

impl Question {
    pub fn free_text(text: impl Into<String>) -> Self {
        Self::with_type(text, ResponseType::FreeText, Vec::new())
    }

    pub fn yes_no(text: impl Into<String>) -> Self {
        Self::with_type(text, ResponseType::YesNo, Vec::new())
    }

    pub fn single_select(text: impl Into<String>, options: Vec<String>) -> Self {
        Self::with_type(text, ResponseType::SingleSelect, options)
    }

    pub fn with_field(mut self, field: QuestionField) -> Self {
        self.field = Some(field);
        self
    }

    pub fn expecting(mut self, answer: impl Into<String>) -> Self {
        self.expected_answer = Some(answer.into());
        self
    }

    fn with_type(text: impl Into<String>, response_type: ResponseType, options: Vec<String>) -> Self {
        Self {
            text: text.into(),
            response_type,
            options,
            field: None,
            expected_answer: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unable to read question catalog {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("question catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("question catalog has no questions")]
    Empty,
    #[error("first question must be a single-select group question (found {0:?})")]
    GroupQuestionNotSelect(ResponseType),
    #[error("only the first question may be the group question")]
    MisplacedGroupQuestion,
    #[error("single-select question '{0}' has no options")]
    MissingOptions(String),
    #[error("more than one question is marked as the callsign question")]
    DuplicateCallsign,
}

/// Ordered, immutable list of intake questions. Question 0 is always the group question;
/// its options come from the group directory rather than from the catalog.
#[derive(Debug, Clone)]
pub struct QuestionCatalog {
    initial_message: String,
    questions: Vec<Question>,
    callsign_index: Option<usize>,
}

impl QuestionCatalog {
    pub fn new(
        initial_message: impl Into<String>,
        mut questions: Vec<Question>,
    ) -> Result<Self, CatalogError> {
        let first = questions.first_mut().ok_or(CatalogError::Empty)?;
        if first.response_type != ResponseType::SingleSelect {
            return Err(CatalogError::GroupQuestionNotSelect(first.response_type));
        }
        first.field = Some(QuestionField::Group);

        for question in questions.iter().skip(1) {
            if question.field == Some(QuestionField::Group) {
                return Err(CatalogError::MisplacedGroupQuestion);
            }
            if question.response_type == ResponseType::SingleSelect && question.options.is_empty()
            {
                return Err(CatalogError::MissingOptions(question.text.clone()));
            }
        }

        let marked: Vec<usize> = questions
            .iter()
            .enumerate()
            .filter(|(_, question)| question.field == Some(QuestionField::Callsign))
            .map(|(index, _)| index)
            .collect();
        if marked.len() > 1 {
            return Err(CatalogError::DuplicateCallsign);
        }
        let callsign_index = marked.first().copied().or_else(|| {
            questions
                .iter()
                .position(|question| question.text.to_ascii_lowercase().contains("callsign"))
        });

        Ok(Self {
            initial_message: initial_message.into(),
            questions,
            callsign_index,
        })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let raw: RawCatalog = serde_json::from_reader(reader)?;
        let questions = raw
            .application_questions
            .into_iter()
            .map(RawQuestion::into_question)
            .collect();
        Self::new(raw.messages.initial_message, questions)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let file = File::open(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn initial_message(&self) -> &str {
        &self.initial_message
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn group_question(&self) -> &Question {
        &self.questions[0]
    }

    pub fn callsign_question(&self) -> Option<&Question> {
        self.callsign_index.map(|index| &self.questions[index])
    }

    /// Column headers for the answer portion of the application store, in catalog order.
    pub fn column_headers(&self) -> Vec<String> {
        self.questions
            .iter()
            .map(|question| question.text.clone())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    messages: RawMessages,
    application_questions: Vec<RawQuestion>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMessages {
    #[serde(default)]
    initial_message: String,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    question: String,
    #[serde(default)]
    response_type: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    expected_answer: Option<String>,
}

impl RawQuestion {
    fn into_question(self) -> Question {
        let field = match self.field.as_deref().map(str::trim) {
            Some("group") | Some("squadron") => Some(QuestionField::Group),
            Some("callsign") => Some(QuestionField::Callsign),
            _ => None,
        };

        Question {
            text: self.question,
            response_type: ResponseType::from_config(&self.response_type),
            options: self.options,
            field,
            expected_answer: self.expected_answer,
        }
    }
}
