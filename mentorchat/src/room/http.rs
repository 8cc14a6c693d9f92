//! REST client for the chat server's room endpoints.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use mentorchat_proto::message::{ClientRef, ConversationId, Sequence, UserId, WireMessage};
use mentorchat_proto::rest::{ResolveRoomRequest, ResolveRoomResponse, SendMessageRequest};

use super::{RoomError, RoomService};

/// [`RoomService`] backed by the server's JSON API.
#[derive(Debug, Clone)]
pub struct HttpRoomService {
    client: Client,
    base: String,
    auth_token: Option<String>,
}

impl HttpRoomService {
    /// Build a client for the server at `base_url`.
    ///
    /// Every request is bounded by `request_timeout`. When `auth_token` is
    /// set it is sent as a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &Url,
        request_timeout: Duration,
        auth_token: Option<String>,
    ) -> Result<Self, RoomError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RoomError::Unavailable(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base: base_url.as_str().trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    fn rooms_url(&self) -> String {
        format!("{}/api/chat/rooms", self.base)
    }

    fn messages_url(&self, conversation: ConversationId) -> String {
        format!("{}/api/chat/rooms/{conversation}/messages", self.base)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, RoomError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| RoomError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RoomError::NotAuthorized);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RoomError::Unavailable(format!("HTTP {status}: {text}")));
        }
        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RoomError> {
        self.execute(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| RoomError::Malformed(e.to_string()))
    }
}

impl RoomService for HttpRoomService {
    async fn resolve_room(
        &self,
        counterpart: &UserId,
        viewer: &UserId,
    ) -> Result<ConversationId, RoomError> {
        let body = ResolveRoomRequest {
            counterpart_id: counterpart.clone(),
            viewer_id: Some(viewer.clone()),
        };
        let response: ResolveRoomResponse = self
            .fetch(self.client.post(self.rooms_url()).json(&body))
            .await?;
        tracing::debug!(conversation = %response.room_id, counterpart = %counterpart, "resolved room");
        Ok(response.room_id)
    }

    async fn recent_messages(
        &self,
        conversation: ConversationId,
    ) -> Result<Vec<WireMessage>, RoomError> {
        self.fetch(self.client.get(self.messages_url(conversation)))
            .await
    }

    async fn missed_messages(
        &self,
        conversation: ConversationId,
        since: Sequence,
    ) -> Result<Vec<WireMessage>, RoomError> {
        let url = format!("{}/missed", self.messages_url(conversation));
        self.fetch(self.client.get(url).query(&[("since", since.get())]))
            .await
    }

    async fn send_message(
        &self,
        conversation: ConversationId,
        sender: &UserId,
        body: &str,
        client_ref: ClientRef,
    ) -> Result<(), RoomError> {
        let request = SendMessageRequest {
            sender_id: sender.clone(),
            content: body.to_string(),
            client_ref,
        };
        self.execute(
            self.client
                .post(self.messages_url(conversation))
                .json(&request),
        )
        .await?;
        Ok(())
    }
}
