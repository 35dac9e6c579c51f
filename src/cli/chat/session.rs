use std::future::Future;

use futures::StreamExt;
use tracing::{debug, info, warn};

use super::auth::AuthState;
use super::conversation_state::{ConversationState, GENERATION_ERROR_TEXT};
use super::sidebar::SidebarState;
use crate::story_client::{StoryApiError, StoryBackend};

/// What a renderer is told while a reply streams in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyEvent<'a> {
    Chunk(&'a str),
    Finished,
    Cancelled,
    Failed(&'a str),
}

#[derive(Debug)]
pub enum SendOutcome {
    /// Nothing was sent: loading, or the input was blank.
    Rejected,
    Completed,
    Cancelled,
    Failed(StoryApiError),
}

/// Clears the loading flag when dropped, whichever way the send ends.
struct LoadingGuard<'a>(&'a mut bool);

impl<'a> LoadingGuard<'a> {
    fn engage(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

/// Top-level UI state: the conversation plus everything the regions toggle.
#[derive(Debug)]
pub struct ChatSession {
    conversation: ConversationState,
    input: String,
    is_loading: bool,
    sidebar: SidebarState,
    auth: AuthState,
}

impl ChatSession {
    pub fn new(terminal_columns: u16) -> Self {
        Self {
            conversation: ConversationState::new(),
            input: String::new(),
            is_loading: false,
            sidebar: SidebarState::for_width(terminal_columns),
            auth: AuthState::new(),
        }
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn sidebar(&self) -> &SidebarState {
        &self.sidebar
    }

    pub fn sidebar_mut(&mut self) -> &mut SidebarState {
        &mut self.sidebar
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn auth_mut(&mut self) -> &mut AuthState {
        &mut self.auth
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: &str) {
        self.input.clear();
        self.input.push_str(input);
    }

    pub fn can_send(&self) -> bool {
        !self.is_loading && !self.input.trim().is_empty()
    }

    pub fn new_story(&mut self) {
        self.conversation.clear();
        self.sidebar.on_new_story();
        info!("started a new story");
    }

    /// Send the current input and stream the reply into the conversation.
    ///
    /// The reply text is the prompt, a space, then every chunk in arrival
    /// order. If `cancel` resolves first the stream is dropped and whatever
    /// arrived is kept. On error the reply is replaced by the fixed error
    /// message.
    pub async fn send<C, F>(
        &mut self,
        backend: &dyn StoryBackend,
        cancel: C,
        mut on_event: F,
    ) -> SendOutcome
    where
        C: Future<Output = ()>,
        F: FnMut(ReplyEvent<'_>),
    {
        if !self.can_send() {
            debug!(loading = self.is_loading, "send ignored");
            return SendOutcome::Rejected;
        }

        debug_assert!(!self.conversation.is_reply_open());
        let prompt = std::mem::take(&mut self.input);
        let _loading = LoadingGuard::engage(&mut self.is_loading);
        let conversation = &mut self.conversation;

        conversation.add_user_message(&prompt);
        conversation.begin_reply();

        let mut story = format!("{prompt} ");
        let mut chunk_count = 0usize;

        let streamed = async {
            let mut chunks = backend.stream_story(&prompt).await?;
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                story.push_str(&chunk);
                conversation.update_reply(&story);
                chunk_count += 1;
                on_event(ReplyEvent::Chunk(&chunk));
            }
            Ok::<(), StoryApiError>(())
        };

        let result = tokio::select! {
            result = streamed => Some(result),
            () = cancel => None,
        };

        match result {
            Some(Ok(())) => {
                debug!(chunks = chunk_count, "story finished");
                conversation.finish_reply();
                on_event(ReplyEvent::Finished);
                SendOutcome::Completed
            }
            None => {
                info!(chunks = chunk_count, "story cancelled");
                conversation.finish_reply();
                on_event(ReplyEvent::Cancelled);
                SendOutcome::Cancelled
            }
            Some(Err(err)) => {
                warn!(error = %err, "story generation failed");
                conversation.fail_reply(GENERATION_ERROR_TEXT);
                on_event(ReplyEvent::Failed(GENERATION_ERROR_TEXT));
                SendOutcome::Failed(err)
            }
        }
    }
}
