use crate::models::Activity;
use crate::services::question_answering::QuestionAnsweringClient;
use crate::services::upstream::UpstreamError;

pub const PROMPT_FOR_QUESTION: &str = "Please type a question.";
pub const NO_ANSWER_FOUND: &str = "Sorry, I couldn't find an answer.";

/// Answers message activities from the knowledge base. Every message gets
/// exactly one reply, whatever happens upstream.
#[derive(Clone)]
pub struct QnaBot {
    qna: QuestionAnsweringClient,
}

impl QnaBot {
    pub fn new(qna: QuestionAnsweringClient) -> Self {
        QnaBot { qna }
    }

    /// Reply text for one inbound activity; `None` for non-message activities.
    pub async fn on_turn(&self, activity: &Activity) -> Option<String> {
        if !activity.is_message() {
            tracing::debug!(kind = %activity.kind, "ignoring non-message activity");
            return None;
        }
        Some(self.answer(activity.trimmed_text()).await)
    }

    pub async fn answer(&self, question: Option<&str>) -> String {
        let Some(question) = question else {
            return PROMPT_FOR_QUESTION.to_string();
        };

        match self.qna.top_answer(question).await {
            Ok(Some(answer)) => answer,
            Ok(None) => NO_ANSWER_FOUND.to_string(),
            Err(err) => {
                tracing::error!(error = %err, "question answering failed");
                failure_reply(&err)
            }
        }
    }
}

fn failure_reply(err: &UpstreamError) -> String {
    match err {
        UpstreamError::UpstreamStatus { .. } => format!("CQA error: {}", err),
        UpstreamError::Configuration(msg) => format!("CQA configuration error: {}", msg),
        UpstreamError::Transport(msg) | UpstreamError::MalformedResponse(msg) => {
            format!("CQA request failed: {}", msg)
        }
    }
}
