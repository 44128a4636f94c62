use async_trait::async_trait;
use grammers_client::types::{LoginToken, PasswordToken};
use grammers_client::{Client, Config as ClientConfig, InitParams, InvocationError, SignInError};
use grammers_session::Session;
use grammers_tl_types as tl;

use crate::config::Config;
use crate::dialogs::{
    Dialog, DialogItem, DialogPage, DialogsApi, DialogsRequest, DialogsResponse, Message, MessageItem, Peer,
};
use crate::login::{AuthClient, SignInOutcome};
use crate::remote::RemoteError;
use crate::session::{SessionError, SessionStore};

/// Telegram client bound to the session file it was started from.
pub struct TelegramClient {
    client: Client,
    login_token: Option<LoginToken>,
    password_token: Option<PasswordToken>,
}

impl TelegramClient {
    pub async fn connect(config: &Config, store: &SessionStore) -> Result<Self, Box<dyn std::error::Error>> {
        let session = match store.load() {
            Ok(data) => Session::load(&data).unwrap_or_else(|_| {
                tracing::warn!(path = %store.path().display(), "stored session is unreadable, starting fresh");
                Session::new()
            }),
            Err(SessionError::NotFound) => Session::new(),
            Err(err) => return Err(err.into()),
        };

        let client = Client::connect(ClientConfig {
            session,
            api_id: config.api_id,
            api_hash: config.api_hash.clone(),
            params: InitParams::default(),
        })
        .await
        .map_err(|err| RemoteError::Transport(err.to_string()))?;
        tracing::debug!("connected to telegram");

        Ok(Self {
            client,
            login_token: None,
            password_token: None,
        })
    }

    /// Writes the client's current session (auth key, data center) back to disk.
    pub fn save_session(&self, store: &SessionStore) -> Result<(), SessionError> {
        store.store(&self.client.session().save())
    }
}

#[async_trait]
impl AuthClient for TelegramClient {
    async fn is_authorized(&mut self) -> Result<bool, RemoteError> {
        self.client.is_authorized().await.map_err(remote_error)
    }

    async fn request_code(&mut self, phone: &str) -> Result<(), RemoteError> {
        let token = self
            .client
            .request_login_code(phone)
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        self.login_token = Some(token);
        Ok(())
    }

    async fn sign_in(&mut self, code: &str) -> Result<SignInOutcome, RemoteError> {
        let token = self
            .login_token
            .as_ref()
            .ok_or_else(|| RemoteError::Transport("no login code was requested".to_string()))?;

        match self.client.sign_in(token, code).await {
            Ok(_) => Ok(SignInOutcome::Authorized),
            Err(SignInError::PasswordRequired(password_token)) => {
                let hint = password_token.hint().map(|hint| hint.to_string());
                self.password_token = Some(password_token);
                Ok(SignInOutcome::PasswordRequired { hint })
            }
            Err(SignInError::SignUpRequired { .. }) => Ok(SignInOutcome::SignUpRequired),
            Err(SignInError::InvalidCode) => Ok(SignInOutcome::InvalidCode),
            Err(SignInError::Other(err)) => Err(remote_error(err)),
            Err(err) => Err(RemoteError::Transport(err.to_string())),
        }
    }

    async fn check_password(&mut self, password: &str) -> Result<bool, RemoteError> {
        let token = self
            .password_token
            .take()
            .ok_or_else(|| RemoteError::Transport("server did not ask for a password".to_string()))?;

        match self.client.check_password(token, password).await {
            Ok(_) => Ok(true),
            Err(SignInError::InvalidPassword) => Ok(false),
            Err(SignInError::Other(err)) => Err(remote_error(err)),
            Err(err) => Err(RemoteError::Transport(err.to_string())),
        }
    }
}

#[async_trait]
impl DialogsApi for TelegramClient {
    async fn get_dialogs(&mut self, request: &DialogsRequest) -> Result<DialogsResponse, RemoteError> {
        let call = tl::functions::messages::GetDialogs {
            exclude_pinned: request.exclude_pinned,
            folder_id: None,
            offset_date: request.offset_date,
            offset_id: request.offset_id,
            offset_peer: tl::enums::InputPeer::Empty,
            limit: request.limit,
            hash: 0,
        };

        let result = self.client.invoke(&call).await.map_err(remote_error)?;
        Ok(match result {
            tl::enums::messages::Dialogs::Slice(slice) => DialogsResponse::Slice(dialog_page(slice.dialogs, slice.messages)),
            tl::enums::messages::Dialogs::Dialogs(all) => DialogsResponse::Complete(dialog_page(all.dialogs, all.messages)),
            tl::enums::messages::Dialogs::NotModified(_) => DialogsResponse::NotModified,
        })
    }
}

fn remote_error(err: InvocationError) -> RemoteError {
    match err {
        InvocationError::Rpc(rpc) => RemoteError::from_rpc(rpc.code, &rpc.name, rpc.value),
        other => RemoteError::Transport(other.to_string()),
    }
}

fn dialog_page(dialogs: Vec<tl::enums::Dialog>, messages: Vec<tl::enums::Message>) -> DialogPage {
    DialogPage {
        dialogs: dialogs.into_iter().map(dialog_item).collect(),
        messages: messages.into_iter().map(message_item).collect(),
    }
}

fn dialog_item(dialog: tl::enums::Dialog) -> DialogItem {
    match dialog {
        tl::enums::Dialog::Dialog(dialog) => DialogItem::Dialog(Dialog {
            peer: peer_from_tl(&dialog.peer),
            folder_id: dialog.folder_id.unwrap_or(0),
            unread_mark: dialog.unread_mark,
            unread_count: dialog.unread_count,
            unread_mentions_count: dialog.unread_mentions_count,
            mute_until: mute_until(&dialog.notify_settings),
            top_message: dialog.top_message,
        }),
        tl::enums::Dialog::Folder(_) => DialogItem::Folder,
    }
}

fn message_item(message: tl::enums::Message) -> MessageItem {
    match message {
        tl::enums::Message::Message(message) => MessageItem::Message(Message {
            peer: peer_from_tl(&message.peer_id),
            id: message.id,
            date: message.date,
        }),
        tl::enums::Message::Empty(_) | tl::enums::Message::Service(_) => MessageItem::Other,
    }
}

fn mute_until(settings: &tl::enums::PeerNotifySettings) -> Option<i64> {
    let tl::enums::PeerNotifySettings::Settings(settings) = settings;
    settings.mute_until.map(i64::from)
}

fn peer_from_tl(peer: &tl::enums::Peer) -> Peer {
    match peer {
        tl::enums::Peer::User(user) => Peer::User(user.user_id),
        tl::enums::Peer::Chat(chat) => Peer::Chat(chat.chat_id),
        tl::enums::Peer::Channel(channel) => Peer::Channel(channel.channel_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peers_map_to_matching_variants() {
        let user = tl::enums::Peer::User(tl::types::PeerUser { user_id: 11 });
        let chat = tl::enums::Peer::Chat(tl::types::PeerChat { chat_id: 22 });
        let channel = tl::enums::Peer::Channel(tl::types::PeerChannel { channel_id: 33 });

        assert_eq!(peer_from_tl(&user), Peer::User(11));
        assert_eq!(peer_from_tl(&chat), Peer::Chat(22));
        assert_eq!(peer_from_tl(&channel), Peer::Channel(33));
        assert_eq!(peer_from_tl(&channel).normalized_id(), 33);
        assert_eq!(peer_from_tl(&user).normalized_id(), -1);
    }
}
