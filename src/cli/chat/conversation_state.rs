pub const GREETING_TEXT: &str = "ہیلو! میں آپ کے لیے اردو کہانیاں تیار کر سکتا ہوں۔ کوئی بھی شروعاتی الفاظ لکھیں (مثلاً: ایک دفعہ کا ذکر ہے)۔";

pub const GENERATION_ERROR_TEXT: &str =
    "معذرت، کہانی تیار کرتے وقت کچھ غلطی ہو گئی۔ براہ کرم دوبارہ کوشش کریں۔";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Ai,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Ai => "Story AI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub is_urdu: bool,
}

impl Message {
    fn greeting() -> Self {
        Self {
            role: Role::Ai,
            content: GREETING_TEXT.to_string(),
            is_urdu: true,
        }
    }
}

/// Ordered message list. Only the trailing reply is ever rewritten, and
/// only while a generation is running.
#[derive(Debug)]
pub struct ConversationState {
    messages: Vec<Message>,
    reply_open: bool,
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            messages: vec![Message::greeting()],
            reply_open: false,
        }
    }

    pub fn add_user_message(&mut self, message: &str) {
        self.messages.push(Message {
            role: Role::User,
            content: message.to_string(),
            is_urdu: true,
        });
    }

    /// Append the empty placeholder that a streamed reply fills in.
    pub fn begin_reply(&mut self) {
        self.messages.push(Message {
            role: Role::Ai,
            content: String::new(),
            is_urdu: true,
        });
        self.reply_open = true;
    }

    /// Replace the placeholder content. Ignored when no reply is open.
    pub fn update_reply(&mut self, content: &str) {
        if let Some(reply) = self.open_reply() {
            reply.content.clear();
            reply.content.push_str(content);
        }
    }

    pub fn fail_reply(&mut self, error_text: &str) {
        self.update_reply(error_text);
        self.finish_reply();
    }

    pub fn finish_reply(&mut self) {
        self.reply_open = false;
    }

    pub fn is_reply_open(&self) -> bool {
        self.reply_open
    }

    fn open_reply(&mut self) -> Option<&mut Message> {
        if !self.reply_open {
            return None;
        }
        self.messages.last_mut().filter(|message| message.role == Role::Ai)
    }

    pub fn get_messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Back to the greeting alone.
    pub fn clear(&mut self) {
        self.messages.truncate(1);
        self.reply_open = false;
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}
