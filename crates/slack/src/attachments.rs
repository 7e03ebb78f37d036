use chrono::{DateTime, Local};
use serde::Serialize;

pub const COLOR_SUCCESS: &str = "#4af030";
pub const COLOR_NEUTRAL: &str = "#3d3d3d";

const GREETING_KEYWORD: &str = "hello";
const GREETING_PRETEXT: &str = "Greetings";
const FALLBACK_PRETEXT: &str = "How can I be of service";
const FEEDBACK_QUESTION: &str = "Was this helpful?";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretext: Option<String>,
    pub color: String,
    pub fields: Vec<AttachmentField>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self { value: value.into(), label: label.into(), description: None }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PromptBlock {
    pub question: String,
    pub options: Vec<SelectOption>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InteractiveMessage {
    pub text: String,
    pub color: String,
    pub blocks: Vec<PromptBlock>,
}

pub struct AttachmentBuilder {
    text: String,
    pretext: Option<String>,
    color: String,
    fields: Vec<AttachmentField>,
}

impl AttachmentBuilder {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pretext: None,
            color: COLOR_NEUTRAL.to_owned(),
            fields: Vec::new(),
        }
    }

    pub fn pretext(mut self, pretext: impl Into<String>) -> Self {
        self.pretext = Some(pretext.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn field(mut self, title: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(AttachmentField { title: title.into(), value: value.into() });
        self
    }

    pub fn build(self) -> Attachment {
        Attachment { text: self.text, pretext: self.pretext, color: self.color, fields: self.fields }
    }
}

fn render_date(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%d %H:%M:%S %z").to_string()
}

/// Reply to an app mention. The tone depends on whether the mention text
/// contains the greeting keyword, case-insensitively.
pub fn mention_reply(user_name: &str, text: &str, now: DateTime<Local>) -> Attachment {
    let builder = if text.to_lowercase().contains(GREETING_KEYWORD) {
        AttachmentBuilder::new(format!("Hello {user_name}"))
            .pretext(GREETING_PRETEXT)
            .color(COLOR_SUCCESS)
    } else {
        AttachmentBuilder::new(format!("How can I help you {user_name}?"))
            .pretext(FALLBACK_PRETEXT)
            .color(COLOR_NEUTRAL)
    };

    builder.field("Date", render_date(now)).field("Initializer", user_name).build()
}

/// Reply to `/hello`, greeting whatever free text rode the command.
pub fn hello_reply(command_text: &str, user_name: &str, now: DateTime<Local>) -> Attachment {
    AttachmentBuilder::new(format!("Hello {command_text}"))
        .color(COLOR_SUCCESS)
        .field("Date", render_date(now))
        .field("Initializer", user_name)
        .build()
}

/// The `/feedback-prompt` payload: a fixed question with a Yes/No select.
/// Returned to the caller so it can ride the command acknowledgment.
pub fn feedback_prompt() -> InteractiveMessage {
    InteractiveMessage {
        text: FEEDBACK_QUESTION.to_owned(),
        color: COLOR_NEUTRAL.to_owned(),
        blocks: vec![PromptBlock {
            question: FEEDBACK_QUESTION.to_owned(),
            options: vec![
                SelectOption::new("yes", "Yes").description("Glad to hear it."),
                SelectOption::new("no", "No").description("Sorry about that."),
            ],
        }],
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};

    use super::{
        feedback_prompt, hello_reply, mention_reply, AttachmentBuilder, COLOR_NEUTRAL,
        COLOR_SUCCESS,
    };

    fn fixed_now() -> chrono::DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 15, 9, 30, 0).single().expect("valid fixed timestamp")
    }

    #[test]
    fn mention_reply_greets_when_keyword_present_in_any_case() {
        for text in ["hello there", "HELLO bot", "well HeLLo"] {
            let attachment = mention_reply("alice", text, fixed_now());
            assert_eq!(attachment.color, COLOR_SUCCESS);
            assert_eq!(attachment.pretext.as_deref(), Some("Greetings"));
            assert_eq!(attachment.text, "Hello alice");
        }
    }

    #[test]
    fn mention_reply_falls_back_without_keyword() {
        let attachment = mention_reply("alice", "what can you do?", fixed_now());
        assert_eq!(attachment.color, COLOR_NEUTRAL);
        assert_eq!(attachment.pretext.as_deref(), Some("How can I be of service"));
        assert_eq!(attachment.text, "How can I help you alice?");
    }

    #[test]
    fn replies_carry_exactly_date_and_initializer_fields() {
        let mention = mention_reply("alice", "hello", fixed_now());
        let hello = hello_reply("world", "bob", fixed_now());

        for (attachment, initializer) in [(mention, "alice"), (hello, "bob")] {
            assert_eq!(attachment.fields.len(), 2);
            assert_eq!(attachment.fields[0].title, "Date");
            assert!(attachment.fields[0].value.starts_with("2026-01-15 09:30:00"));
            assert_eq!(attachment.fields[1].title, "Initializer");
            assert_eq!(attachment.fields[1].value, initializer);
        }
    }

    #[test]
    fn hello_reply_greets_the_command_text() {
        let attachment = hello_reply("world", "alice", fixed_now());
        assert_eq!(attachment.text, "Hello world");
        assert_eq!(attachment.color, COLOR_SUCCESS);
        assert_eq!(attachment.pretext, None);
    }

    #[test]
    fn feedback_prompt_offers_yes_and_no() {
        let message = feedback_prompt();
        assert_eq!(message.blocks.len(), 1);

        let options = &message.blocks[0].options;
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].label, "Yes");
        assert_eq!(options[0].value, "yes");
        assert_eq!(options[1].label, "No");
        assert_eq!(options[1].value, "no");
    }

    #[test]
    fn attachment_without_pretext_serializes_without_the_key() {
        let attachment =
            AttachmentBuilder::new("plain").color(COLOR_NEUTRAL).field("Date", "today").build();
        let json = serde_json::to_value(&attachment).expect("serialize attachment");

        assert!(json.get("pretext").is_none());
        assert_eq!(json["color"], COLOR_NEUTRAL);
        assert_eq!(json["fields"][0]["title"], "Date");
    }
}
