//! Unread dialog aggregation over the paginated `messages.getDialogs` call.
//!
//! The server paginates by message, not by offset: every page must yield an
//! anchor message (the top message of the oldest dialog that can be resolved)
//! to position the next request. Top messages arrive in a flat sibling list,
//! so each page is joined through a [`MessageIndex`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::remote::RemoteError;
use crate::retry::{FloodRetry, RetryError};

/// Page size of every `getDialogs` request.
pub const DIALOGS_LIMIT: i32 = 100;

/// Index key shared by every non-channel peer.
const OTHER_PEER_ID: i64 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Peer {
    User(i64),
    Chat(i64),
    Channel(i64),
}

impl Peer {
    /// Channels key by their id; every other peer kind shares one key, so
    /// message ids of different users and groups can collide.
    pub fn normalized_id(&self) -> i64 {
        match self {
            Peer::Channel(channel_id) => *channel_id,
            Peer::User(_) | Peer::Chat(_) => OTHER_PEER_ID,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dialog {
    pub peer: Peer,
    pub folder_id: i32,
    pub unread_mark: bool,
    pub unread_count: i32,
    pub unread_mentions_count: i32,
    /// Unix seconds until which notifications are muted.
    pub mute_until: Option<i64>,
    pub top_message: i32,
}

impl Dialog {
    pub fn is_unread(&self) -> bool {
        self.unread_mark || self.unread_count > 0
    }

    pub fn is_muted_at(&self, now: DateTime<Utc>) -> bool {
        self.mute_until.is_some_and(|until| until > now.timestamp())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialogItem {
    Dialog(Dialog),
    /// Folder pseudo-dialog (e.g. the archive entry).
    Folder,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Message {
    pub peer: Peer,
    pub id: i32,
    pub date: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageItem {
    Message(Message),
    /// Empty or service messages; never indexed.
    Other,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DialogPage {
    pub dialogs: Vec<DialogItem>,
    pub messages: Vec<MessageItem>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialogsResponse {
    /// One page of a longer list.
    Slice(DialogPage),
    /// The whole list fits in this response. Not paginated, so the walk
    /// stops on it like on any other non-slice answer.
    Complete(DialogPage),
    NotModified,
}

/// Pagination cursor. The offset peer is always the empty peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialogsRequest {
    pub offset_id: i32,
    pub offset_date: i32,
    pub limit: i32,
    pub exclude_pinned: bool,
}

impl Default for DialogsRequest {
    fn default() -> Self {
        Self {
            offset_id: 0,
            offset_date: 0,
            limit: DIALOGS_LIMIT,
            exclude_pinned: false,
        }
    }
}

#[async_trait]
pub trait DialogsApi: Send {
    async fn get_dialogs(&mut self, request: &DialogsRequest) -> Result<DialogsResponse, RemoteError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UnreadCounts {
    pub unread: u32,
    pub mentions: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub peer_id: i64,
    pub message_id: i32,
}

impl MessageKey {
    fn of_message(message: &Message) -> Self {
        Self {
            peer_id: message.peer.normalized_id(),
            message_id: message.id,
        }
    }

    fn of_top_message(dialog: &Dialog) -> Self {
        Self {
            peer_id: dialog.peer.normalized_id(),
            message_id: dialog.top_message,
        }
    }
}

/// Per-page join from a dialog to its top message.
pub struct MessageIndex {
    messages: HashMap<MessageKey, Message>,
}

impl MessageIndex {
    /// Later entries win on key collisions.
    pub fn build(items: &[MessageItem]) -> Self {
        let mut messages = HashMap::with_capacity(items.len());
        for item in items {
            if let MessageItem::Message(message) = item {
                messages.insert(MessageKey::of_message(message), *message);
            }
        }
        Self { messages }
    }

    pub fn top_message(&self, dialog: &Dialog) -> Option<&Message> {
        self.messages.get(&MessageKey::of_top_message(dialog))
    }

    /// Top message of the last dialog in page order that resolves.
    pub fn anchor<'a>(&'a self, dialogs: &[DialogItem]) -> Option<&'a Message> {
        dialogs.iter().rev().find_map(|item| match item {
            DialogItem::Dialog(dialog) => self.top_message(dialog),
            DialogItem::Folder => None,
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AggregateOptions {
    pub only_unmuted: bool,
    /// Reference time for the mute filter, captured at process start.
    pub now: DateTime<Utc>,
    pub retry: FloodRetry,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Fetching,
    Done,
}

pub struct DialogAggregator<'a, D: DialogsApi + ?Sized> {
    api: &'a mut D,
    options: AggregateOptions,
}

impl<'a, D: DialogsApi + ?Sized> DialogAggregator<'a, D> {
    pub fn new(api: &'a mut D, options: AggregateOptions) -> Self {
        Self { api, options }
    }

    /// Walks the dialog list until a short page or an unrecognized response.
    pub async fn run(mut self) -> Result<UnreadCounts, RetryError> {
        let mut request = DialogsRequest::default();
        let mut counts = UnreadCounts::default();
        let mut pages = 0usize;
        let mut state = State::Fetching;

        while state == State::Fetching {
            pages += 1;
            state = self.step(&mut request, &mut counts, pages).await?;
        }

        tracing::debug!(pages, unread = counts.unread, mentions = counts.mentions, "dialog walk finished");
        Ok(counts)
    }

    async fn step(
        &mut self,
        request: &mut DialogsRequest,
        counts: &mut UnreadCounts,
        page_number: usize,
    ) -> Result<State, RetryError> {
        let response = self.options.retry.get_dialogs(&mut *self.api, request).await?;
        let page = match response {
            DialogsResponse::Slice(page) => page,
            DialogsResponse::Complete(page) => {
                tracing::debug!(page = page_number, dialogs = page.dialogs.len(), "complete dialog list, stopping");
                return Ok(State::Done);
            }
            DialogsResponse::NotModified => {
                tracing::debug!(page = page_number, "unexpected getDialogs result, stopping");
                return Ok(State::Done);
            }
        };

        let index = MessageIndex::build(&page.messages);
        // A short page ends the walk before it is counted.
        if page.dialogs.len() < request.limit.max(0) as usize {
            tracing::debug!(page = page_number, dialogs = page.dialogs.len(), "short dialog page, stopping");
            return Ok(State::Done);
        }

        self.count_page(&page, counts);
        tracing::debug!(
            page = page_number,
            dialogs = page.dialogs.len(),
            messages = page.messages.len(),
            unread = counts.unread,
            mentions = counts.mentions,
            "processed dialog page"
        );

        match index.anchor(&page.dialogs) {
            Some(anchor) => {
                request.offset_id = anchor.id;
                request.offset_date = anchor.date;
            }
            None => {
                tracing::warn!(page = page_number, "no resolvable top message, keeping previous offset");
            }
        }
        request.exclude_pinned = true;
        Ok(State::Fetching)
    }

    fn count_page(&self, page: &DialogPage, counts: &mut UnreadCounts) {
        for item in &page.dialogs {
            let DialogItem::Dialog(dialog) = item else {
                continue;
            };
            if dialog.folder_id != 0 {
                continue;
            }
            let muted = self.options.only_unmuted && dialog.is_muted_at(self.options.now);
            if !muted && dialog.is_unread() {
                counts.unread += 1;
            }
            if dialog.unread_mentions_count > 0 {
                counts.mentions += 1;
            }
        }
    }
}
