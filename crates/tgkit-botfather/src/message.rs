//! Normalized shape of messages received from BotFather.
//!
//! Every source (MTProto updates, recorded JSON payloads) is converted into
//! [`InboundMessage`] once, at the channel boundary. Parsers and the button
//! interpreter only ever see this shape.

use serde_json::Value;

pub use tgkit_core::domain::MessageId;

/// One styled run of text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
}

/// The text of a message, in whichever representation the source delivered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MessageText {
    #[default]
    None,
    Plain(String),
    Spans(Vec<TextSpan>),
}

/// Opaque payload attached to an inline button; sent back verbatim to "press" it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallbackData(pub Vec<u8>);

impl From<&str> for CallbackData {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    /// `None` for buttons that cannot be clicked through a callback (URL, reply keyboard).
    pub data: Option<CallbackData>,
}

impl Button {
    pub fn callback(label: impl Into<String>, data: impl Into<CallbackData>) -> Self {
        Self {
            label: label.into(),
            data: Some(data.into()),
        }
    }

    pub fn plain(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ButtonGrid {
    pub rows: Vec<Vec<Button>>,
}

impl ButtonGrid {
    pub fn new(rows: Vec<Vec<Button>>) -> Self {
        Self { rows }
    }

    /// Buttons in reading order (row by row, left to right).
    pub fn iter(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: MessageId,
    /// Edits keep the original id; paginated lists arrive this way.
    pub edited: bool,
    pub text: MessageText,
    pub buttons: ButtonGrid,
}

impl InboundMessage {
    pub fn new(id: i32) -> Self {
        Self {
            id: MessageId(id),
            edited: false,
            text: MessageText::None,
            buttons: ButtonGrid::default(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = MessageText::Plain(text.into());
        self
    }

    pub fn with_buttons(mut self, rows: Vec<Vec<Button>>) -> Self {
        self.buttons = ButtonGrid::new(rows);
        self
    }

    pub fn edited(mut self) -> Self {
        self.edited = true;
        self
    }

    /// Normalize a raw JSON payload.
    ///
    /// Text is probed in order: `message` (string or array of spans), then `text`
    /// (string or array of spans). Buttons come from `reply_markup.rows`, where a
    /// row is either an array of buttons or `{ "buttons": [...] }`. Returns `None`
    /// only when the payload carries no usable id.
    pub fn from_json(raw: &Value) -> Option<Self> {
        let id = raw.get("id")?.as_i64()?;
        let id = i32::try_from(id).ok()?;

        let edited = raw.get("edited").and_then(Value::as_bool).unwrap_or(false)
            || raw.get("edit_date").map(|v| !v.is_null()).unwrap_or(false);

        let text = ["message", "text"]
            .iter()
            .find_map(|key| text_from_json(raw.get(*key)?))
            .unwrap_or_default();

        let buttons = raw
            .get("reply_markup")
            .and_then(|m| m.get("rows"))
            .and_then(Value::as_array)
            .map(|rows| ButtonGrid::new(rows.iter().map(row_from_json).collect()))
            .unwrap_or_default();

        Some(Self {
            id: MessageId(id),
            edited,
            text,
            buttons,
        })
    }
}

fn text_from_json(v: &Value) -> Option<MessageText> {
    match v {
        Value::String(s) => Some(MessageText::Plain(s.clone())),
        Value::Array(items) => Some(MessageText::Spans(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(_) => item.get("text")?.as_str().map(str::to_string),
                    _ => None,
                })
                .map(|text| TextSpan { text })
                .collect(),
        )),
        _ => None,
    }
}

fn row_from_json(row: &Value) -> Vec<Button> {
    let buttons = match row {
        Value::Array(items) => items.as_slice(),
        Value::Object(_) => row
            .get("buttons")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    buttons
        .iter()
        .filter_map(|b| {
            let label = b.get("text")?.as_str()?.to_string();
            let data = b.get("data").and_then(data_from_json);
            Some(Button { label, data })
        })
        .collect()
}

fn data_from_json(v: &Value) -> Option<CallbackData> {
    match v {
        Value::String(s) => Some(CallbackData(s.as_bytes().to_vec())),
        Value::Array(items) => items
            .iter()
            .map(|x| x.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect::<Option<Vec<u8>>>()
            .map(CallbackData),
        _ => None,
    }
}
