use anyhow::{Context, Result};
use chrono::Utc;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use super::gemini::{Content, GeminiClient};
use crate::metrics::CHAT_MESSAGES_TOTAL;
use crate::models::chat::{ChatMessage, ChatRole};

const HISTORY_TTL_SECONDS: u64 = 7 * 24 * 3600;
/// Most recent turns included when prompting; older turns stay in the stored
/// history but are not sent upstream.
const PROMPT_HISTORY_LIMIT: usize = 40;
/// Hard cap on the stored history length.
const STORED_HISTORY_LIMIT: usize = 100;

const FALLBACK_REPLY: &str = "Sorry, I encountered an error. Please try again later.";

const GREETING: &str = "I'm EcoBot, your friendly e-waste recycling assistant at EcoRecycle! \
    I'm here to help with any questions about our recycling services, environmental impact \
    of e-waste, or how to properly dispose of your electronic devices. How can I assist you \
    today?";

const SERVICE_KNOWLEDGE: &str = "\
EcoRecycle E-Waste Recycling Services Information:

Services Offered:
1. Residential E-Waste Collection: Free pickup service for households with electronic waste.
2. Business IT Asset Disposition: Secure data destruction and recycling for businesses.
3. E-Waste Drop-off Centers: Convenient locations for dropping off electronic waste.
4. Community Collection Events: Regular events in different neighborhoods.
5. Educational Programs: Workshops and resources about responsible e-waste management.

Accepted Items:
- Computers, laptops, and servers
- Monitors, TVs, and displays
- Printers, scanners, and fax machines
- Mobile phones and tablets
- Keyboards, mice, and peripherals
- Cables and wires
- Batteries (must be removed from devices)
- Small household electronics

Not Accepted:
- Large appliances (refrigerators, washing machines)
- Light bulbs and fluorescent tubes
- Smoke detectors
- Medical equipment
- Items with leaking batteries

Environmental Impact:
- E-waste contains toxic materials like lead, mercury, and cadmium
- Proper recycling prevents these toxins from entering landfills and water supplies
- Recycling one million laptops saves energy equivalent to electricity used by 3,500 homes in a year
- 95-98% of materials in electronics can be recovered and reused

Data Security:
- All data storage devices undergo secure data wiping or physical destruction
- Certificates of destruction available for businesses
- Compliant with all relevant data protection regulations

Locations:
- Main Recycling Center: 123 Green Street, Eco City
- Downtown Drop-off: 456 Recycle Avenue
- Westside Collection Point: 789 Sustainability Boulevard

Hours of Operation:
- Monday to Friday: 9am - 6pm
- Saturday: 10am - 4pm
- Sunday: Closed

Contact Information:
- Phone: (555) 123-4567
- Email: info@ecorecycle.com
- Website: www.ecorecycle.com";

/// EcoBot conversation service. Each conversation is keyed by a server-minted
/// session id; history lives in Redis and the generative-language handle is
/// injected at construction, so there is no shared mutable session anywhere.
pub struct ChatService {
    redis: ConnectionManager,
    gemini: GeminiClient,
}

impl ChatService {
    pub fn new(redis: ConnectionManager, gemini: GeminiClient) -> Self {
        Self { redis, gemini }
    }

    /// Append a user message, obtain the assistant reply, and persist both.
    /// Upstream failures degrade to a fixed apology reply; the conversation
    /// itself never errors out.
    pub async fn send_message(&self, session_id: &str, message: &str) -> Result<ChatMessage> {
        let mut history = self.load_history(session_id).await?;

        let contents = build_contents(&history, message);

        let reply_text = match self.gemini.generate_chat_reply(&contents).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(session_id = %session_id, "Chat completion failed: {}", e);
                FALLBACK_REPLY.to_string()
            }
        };

        let now = Utc::now();
        history.push(ChatMessage {
            id: Uuid::new_v4().to_string(),
            role: ChatRole::User,
            content: message.to_string(),
            timestamp: now,
        });
        let reply = ChatMessage {
            id: Uuid::new_v4().to_string(),
            role: ChatRole::Bot,
            content: reply_text,
            timestamp: now,
        };
        history.push(reply.clone());

        if history.len() > STORED_HISTORY_LIMIT {
            history.drain(..history.len() - STORED_HISTORY_LIMIT);
        }

        self.save_history(session_id, &history).await?;

        CHAT_MESSAGES_TOTAL.with_label_values(&["user"]).inc();
        CHAT_MESSAGES_TOTAL.with_label_values(&["bot"]).inc();

        Ok(reply)
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        self.load_history(session_id).await
    }

    /// Drop the conversation entirely; the next message starts fresh.
    pub async fn reset(&self, session_id: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        redis::cmd("DEL")
            .arg(format!("chat:history:{}", session_id))
            .query_async::<()>(&mut conn)
            .await
            .context("Failed to clear chat history")?;

        tracing::info!(session_id = %session_id, "Chat session reset");
        Ok(())
    }

    async fn load_history(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(format!("chat:history:{}", session_id))
            .query_async(&mut conn)
            .await
            .context("Failed to read chat history")?;

        match raw {
            Some(json) => serde_json::from_str(&json).context("Failed to parse chat history"),
            None => Ok(Vec::new()),
        }
    }

    async fn save_history(&self, session_id: &str, history: &[ChatMessage]) -> Result<()> {
        let mut conn = self.redis.clone();
        let json = serde_json::to_string(history).context("Failed to serialize chat history")?;

        redis::cmd("SETEX")
            .arg(format!("chat:history:{}", session_id))
            .arg(HISTORY_TTL_SECONDS)
            .arg(json)
            .query_async::<()>(&mut conn)
            .await
            .context("Failed to save chat history")?;

        Ok(())
    }
}

fn priming() -> String {
    format!(
        "You are EcoBot, an AI assistant for EcoRecycle, an e-waste recycling service. \
         Your goal is to help users with information about e-waste recycling, our services, \
         and environmental impact. Keep responses concise, friendly, and focused on e-waste \
         recycling topics.\n\nHere is information about our services that you should use to \
         answer questions:\n{}\n\nIf you don't know the answer to a question, don't make up \
         information. Instead, suggest that the user contact our customer service team for \
         more specific information.",
        SERVICE_KNOWLEDGE
    )
}

/// Assemble the upstream conversation: persona priming, the canned greeting,
/// the most recent stored turns, then the new user message.
fn build_contents(history: &[ChatMessage], message: &str) -> Vec<Content> {
    let recent = if history.len() > PROMPT_HISTORY_LIMIT {
        &history[history.len() - PROMPT_HISTORY_LIMIT..]
    } else {
        history
    };

    let mut contents = Vec::with_capacity(recent.len() + 3);
    contents.push(Content::user(priming()));
    contents.push(Content::model(GREETING));
    for turn in recent {
        contents.push(match turn.role {
            ChatRole::User => Content::user(turn.content.clone()),
            ChatRole::Bot => Content::model(turn.content.clone()),
        });
    }
    contents.push(Content::user(message));
    contents
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(role: ChatRole, content: &str) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn contents_start_with_priming_and_end_with_the_new_message() {
        let history = vec![
            message(ChatRole::User, "hello"),
            message(ChatRole::Bot, "hi there"),
        ];
        let contents = build_contents(&history, "where can I drop off a laptop?");

        assert_eq!(contents.len(), 5);
        assert_eq!(contents[0].role, "user");
        assert!(contents[0].parts[0].text.contains("You are EcoBot"));
        assert_eq!(contents[1].role, "model");
        assert_eq!(contents[2].parts[0].text, "hello");
        assert_eq!(contents[3].role, "model");
        assert_eq!(
            contents.last().unwrap().parts[0].text,
            "where can I drop off a laptop?"
        );
    }

    #[test]
    fn long_histories_are_trimmed_to_the_prompt_limit() {
        let history: Vec<ChatMessage> = (0..120)
            .map(|i| {
                let role = if i % 2 == 0 {
                    ChatRole::User
                } else {
                    ChatRole::Bot
                };
                message(role, &format!("turn {}", i))
            })
            .collect();

        let contents = build_contents(&history, "latest");

        // priming + greeting + PROMPT_HISTORY_LIMIT turns + new message
        assert_eq!(contents.len(), PROMPT_HISTORY_LIMIT + 3);
        assert_eq!(contents[2].parts[0].text, "turn 80");
    }
}
