use mailrelay_core::{ApprovalAction, ApprovalRequestId, RemoteConversationId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const ADAPTIVE_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";
pub const ADAPTIVE_CARD_SCHEMA: &str = "http://adaptivecards.io/schemas/adaptive-card.json";
pub const ADAPTIVE_CARD_VERSION: &str = "1.4";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextWeight {
    Bolder,
    Lighter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextSize {
    Small,
    Medium,
    Large,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spacing {
    Small,
    Medium,
    Large,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextColor {
    Good,
    Warning,
    Attention,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontType {
    Monospace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStyle {
    Positive,
    Destructive,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBlock {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<TextWeight>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<TextSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrap: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spacing: Option<Spacing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<TextColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_type: Option<FontType>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CardElement {
    TextBlock(TextBlock),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CardAction {
    #[serde(rename = "Action.OpenUrl")]
    OpenUrl {
        title: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<ActionStyle>,
    },
    #[serde(rename = "Action.Submit")]
    Submit {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<ActionStyle>,
        #[serde(default)]
        disabled: bool,
        data: Value,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptiveCard {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "type")]
    pub card_type: String,
    pub version: String,
    pub body: Vec<CardElement>,
    pub actions: Vec<CardAction>,
}

impl AdaptiveCard {
    pub fn text_blocks(&self) -> impl Iterator<Item = &TextBlock> {
        self.body.iter().map(|element| match element {
            CardElement::TextBlock(block) => block,
        })
    }
}

#[derive(Default)]
pub struct CardBuilder {
    body: Vec<CardElement>,
    actions: Vec<CardAction>,
}

impl CardBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text<F>(mut self, text: impl Into<String>, style: F) -> Self
    where
        F: FnOnce(&mut TextBlockBuilder),
    {
        let mut builder = TextBlockBuilder::new(text.into());
        style(&mut builder);
        self.body.push(CardElement::TextBlock(builder.build()));
        self
    }

    pub fn open_url(
        mut self,
        title: impl Into<String>,
        url: impl Into<String>,
        style: Option<ActionStyle>,
    ) -> Self {
        self.actions.push(CardAction::OpenUrl { title: title.into(), url: url.into(), style });
        self
    }

    pub fn submit(mut self, title: impl Into<String>, style: Option<ActionStyle>, data: Value) -> Self {
        self.actions.push(CardAction::Submit { title: title.into(), style, disabled: false, data });
        self
    }

    pub fn build(self) -> AdaptiveCard {
        AdaptiveCard {
            schema: ADAPTIVE_CARD_SCHEMA.to_string(),
            card_type: "AdaptiveCard".to_string(),
            version: ADAPTIVE_CARD_VERSION.to_string(),
            body: self.body,
            actions: self.actions,
        }
    }
}

pub struct TextBlockBuilder {
    block: TextBlock,
}

impl TextBlockBuilder {
    fn new(text: String) -> Self {
        Self { block: TextBlock { text, ..TextBlock::default() } }
    }

    pub fn bolder(&mut self) -> &mut Self {
        self.block.weight = Some(TextWeight::Bolder);
        self
    }

    pub fn size(&mut self, size: TextSize) -> &mut Self {
        self.block.size = Some(size);
        self
    }

    pub fn wrap(&mut self) -> &mut Self {
        self.block.wrap = Some(true);
        self
    }

    pub fn spacing(&mut self, spacing: Spacing) -> &mut Self {
        self.block.spacing = Some(spacing);
        self
    }

    pub fn color(&mut self, color: TextColor) -> &mut Self {
        self.block.color = Some(color);
        self
    }

    pub fn monospace(&mut self) -> &mut Self {
        self.block.font_type = Some(FontType::Monospace);
        self
    }

    fn build(self) -> TextBlock {
        self.block
    }
}

pub fn oauth_consent_card(consent_link: &str, service_name: &str) -> AdaptiveCard {
    let step = |builder: &mut TextBlockBuilder| {
        builder.wrap().spacing(Spacing::Small).size(TextSize::Small);
    };

    CardBuilder::new()
        .text("Authorization Required", |block| {
            block.bolder().size(TextSize::Large);
        })
        .text(
            format!(
                "The agent needs authorization to access {service_name}. Click the button below to grant permission."
            ),
            |block| {
                block.wrap().spacing(Spacing::Medium);
            },
        )
        .text("1. Click 'Authorize' to open the authorization page", step)
        .text("2. Complete the authorization process", step)
        .text("3. Return to Teams and send 'retry' to continue", step)
        .text("You will be redirected to authorize the application.", |block| {
            block.wrap().spacing(Spacing::Medium).size(TextSize::Small).color(TextColor::Warning);
        })
        .open_url(format!("Authorize {service_name}"), consent_link, Some(ActionStyle::Positive))
        .build()
}

pub fn approval_card(
    request_name: &str,
    request_arguments: &Value,
    request_id: &ApprovalRequestId,
    conversation_id: &RemoteConversationId,
) -> AdaptiveCard {
    CardBuilder::new()
        .text("Action Approval Required", |block| {
            block.bolder().size(TextSize::Large);
        })
        .text(format!("The agent needs your approval to perform: {request_name}"), |block| {
            block.wrap().spacing(Spacing::Medium);
        })
        .text("Details:", |block| {
            block.bolder().spacing(Spacing::Small);
        })
        .text(pretty_arguments(request_arguments), |block| {
            block.wrap().monospace().size(TextSize::Small);
        })
        .submit(
            "✓ Approve",
            Some(ActionStyle::Positive),
            submission_data(ApprovalAction::Approve, request_id, conversation_id),
        )
        .submit(
            "✗ Deny",
            Some(ActionStyle::Destructive),
            submission_data(ApprovalAction::Deny, request_id, conversation_id),
        )
        .build()
}

fn submission_data(
    action: ApprovalAction,
    request_id: &ApprovalRequestId,
    conversation_id: &RemoteConversationId,
) -> Value {
    json!({
        "action": action.label(),
        "requestId": request_id.0,
        "conversationId": conversation_id.0,
    })
}

/// Tool arguments often arrive as a JSON-encoded string; those are decoded
/// before pretty-printing so the card shows structure rather than escapes.
pub fn pretty_arguments(arguments: &Value) -> String {
    let decoded = match arguments {
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .ok()
            .filter(|parsed| parsed.is_object() || parsed.is_array()),
        _ => None,
    };
    let target = decoded.as_ref().unwrap_or(arguments);
    serde_json::to_string_pretty(target).unwrap_or_else(|_| target.to_string())
}
