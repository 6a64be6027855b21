use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use super::gemini::GeminiClient;
use crate::models::quiz::{QuestionRecord, QUESTION_COUNT};

lazy_static! {
    // The model usually wraps the JSON array in prose or code fences;
    // grab the outermost array and ignore everything around it.
    static ref JSON_ARRAY_RE: Regex = Regex::new(r"\[\s*\{[\s\S]*\}\s*\]").unwrap();
}

/// Supplier of a quiz question batch for a topic.
///
/// Infallible by contract: implementations recover from any upstream failure
/// internally (the built-in fallback set ties off the worst case), so `load`
/// always yields a full batch of well-formed records.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn load(&self, topic: &str) -> Vec<QuestionRecord>;
}

/// Question source backed by the generative-language API.
pub struct GeminiQuestionSource {
    client: GeminiClient,
}

impl GeminiQuestionSource {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QuestionSource for GeminiQuestionSource {
    async fn load(&self, topic: &str) -> Vec<QuestionRecord> {
        let prompt = question_prompt(topic);

        let text = match self.client.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Question generation failed ({}), using fallback set", e);
                return fallback_questions();
            }
        };

        match parse_questions(&text) {
            Some(questions) => {
                tracing::info!(topic = %topic, "Loaded {} generated questions", questions.len());
                questions
            }
            None => {
                tracing::warn!(topic = %topic, "Generated questions unusable, using fallback set");
                fallback_questions()
            }
        }
    }
}

fn question_prompt(topic: &str) -> String {
    format!(
        "Create {count} multiple-choice quiz questions about {topic}. For each question:\n\
         - Include the question\n\
         - Provide 4 possible answers\n\
         - Mark the correct answer\n\
         - Give a brief explanation why that answer is correct\n\
         \n\
         Format your response as valid JSON with this structure:\n\
         [\n\
           {{\n\
             \"question\": \"Question text here?\",\n\
             \"options\": [\"Option A\", \"Option B\", \"Option C\", \"Option D\"],\n\
             \"correctAnswer\": \"The exact text of the correct option\",\n\
             \"explanation\": \"Brief explanation of why this answer is correct\"\n\
           }}\n\
         ]\n\
         \n\
         Make sure the questions cover topics like:\n\
         - Environmental impact of e-waste\n\
         - Proper disposal methods\n\
         - Recycling benefits\n\
         - Data security concerns\n\
         - Components of e-waste",
        count = QUESTION_COUNT,
        topic = topic
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuestion {
    question: String,
    options: Vec<String>,
    correct_answer: String,
    explanation: String,
}

/// Parse a completion into a full batch of well-formed question records.
///
/// Returns `None` whenever the text cannot yield at least `QUESTION_COUNT`
/// valid records; the caller substitutes the fallback set in that case.
pub fn parse_questions(text: &str) -> Option<Vec<QuestionRecord>> {
    let json = JSON_ARRAY_RE
        .find(text)
        .map(|m| m.as_str())
        .unwrap_or(text);

    let raw: Vec<RawQuestion> = serde_json::from_str(json).ok()?;

    let valid: Vec<QuestionRecord> = raw
        .into_iter()
        .map(|q| QuestionRecord {
            id: 0,
            prompt: q.question,
            options: q.options,
            correct_option: q.correct_answer,
            explanation: q.explanation,
        })
        .filter(QuestionRecord::is_well_formed)
        .take(QUESTION_COUNT)
        .collect();

    if valid.len() < QUESTION_COUNT {
        return None;
    }

    Some(
        valid
            .into_iter()
            .enumerate()
            .map(|(i, mut q)| {
                q.id = i as u32 + 1;
                q
            })
            .collect(),
    )
}

/// Fixed question set used whenever the question source is unavailable or
/// returns unusable data. Always well-formed, never fails.
pub fn fallback_questions() -> Vec<QuestionRecord> {
    let records = [
        (
            "What makes e-waste particularly harmful to the environment?",
            [
                "It takes up more space in landfills than other waste",
                "It contains toxic materials like lead, mercury, and cadmium",
                "It produces more methane when decomposing",
                "It's harder to collect than regular waste",
            ],
            1,
            "Electronic waste contains various toxic materials including lead, mercury, \
             cadmium, and flame retardants that can leach into soil and groundwater when \
             improperly disposed of in landfills.",
        ),
        (
            "What percentage of e-waste materials can typically be recycled or recovered?",
            [
                "Around 20-30%",
                "Around 40-50%",
                "Around 70-80%",
                "Over 90%",
            ],
            3,
            "More than 90% of the materials in electronic devices can be recovered and \
             reused, including valuable metals like gold, silver, copper, and rare earth \
             elements.",
        ),
        (
            "What should you do with your data before recycling a computer or smartphone?",
            [
                "Simply delete all files",
                "Perform a factory reset",
                "Use secure data wiping software or services",
                "Remove the hard drive or storage and keep it",
            ],
            2,
            "Simply deleting files or even performing a factory reset doesn't completely \
             remove data. Using secure data wiping software that overwrites the data \
             multiple times ensures your personal information cannot be recovered.",
        ),
        (
            "Which of these items is generally NOT considered e-waste?",
            [
                "LED light bulbs",
                "Wooden furniture with embedded LED lights",
                "Electric toothbrushes",
                "Printer ink cartridges",
            ],
            1,
            "While furniture with electronic components does contain some electronic \
             elements, it's primarily classified as furniture waste. The electronic \
             components would ideally be removed and recycled separately.",
        ),
        (
            "How much e-waste is globally generated each year?",
            [
                "Less than 10 million tons",
                "Around 20-30 million tons",
                "Around 50-60 million tons",
                "Over 100 million tons",
            ],
            2,
            "According to recent global e-waste monitors, approximately 50-60 million \
             metric tons of electronic waste is generated worldwide each year, making it \
             one of the fastest-growing waste streams.",
        ),
    ];

    records
        .into_iter()
        .enumerate()
        .map(|(i, (prompt, options, correct, explanation))| QuestionRecord {
            id: i as u32 + 1,
            prompt: prompt.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            correct_option: options[correct].to_string(),
            explanation: explanation.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json(count: usize) -> String {
        let items: Vec<String> = (0..count)
            .map(|i| {
                format!(
                    r#"{{"question": "Q{i}?", "options": ["a{i}", "b{i}", "c{i}", "d{i}"], "correctAnswer": "b{i}", "explanation": "E{i}"}}"#
                )
            })
            .collect();
        format!("[{}]", items.join(","))
    }

    #[test]
    fn parses_a_plain_json_array() {
        let questions = parse_questions(&sample_json(5)).unwrap();
        assert_eq!(questions.len(), 5);
        assert_eq!(questions[0].id, 1);
        assert_eq!(questions[4].id, 5);
        assert_eq!(questions[2].correct_option, "b2");
        assert!(questions.iter().all(QuestionRecord::is_well_formed));
    }

    #[test]
    fn extracts_the_array_from_surrounding_prose_and_fences() {
        let text = format!(
            "Here are your questions:\n```json\n{}\n```\nGood luck!",
            sample_json(5)
        );
        let questions = parse_questions(&text).unwrap();
        assert_eq!(questions.len(), 5);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_questions("not json at all").is_none());
        assert!(parse_questions("[{\"question\": \"broken\"").is_none());
    }

    #[test]
    fn rejects_batches_with_too_few_valid_records() {
        assert!(parse_questions(&sample_json(4)).is_none());

        // Five records, one with a correct answer outside its options.
        let mut json = sample_json(5);
        json = json.replace("\"correctAnswer\": \"b4\"", "\"correctAnswer\": \"z4\"");
        assert!(parse_questions(&json).is_none());
    }

    #[test]
    fn extra_records_are_truncated_to_the_batch_size() {
        let questions = parse_questions(&sample_json(7)).unwrap();
        assert_eq!(questions.len(), QUESTION_COUNT);
    }

    #[test]
    fn fallback_set_is_complete_and_well_formed() {
        let questions = fallback_questions();
        assert_eq!(questions.len(), QUESTION_COUNT);
        for (i, q) in questions.iter().enumerate() {
            assert_eq!(q.id, i as u32 + 1);
            assert!(q.is_well_formed());
        }
    }
}
