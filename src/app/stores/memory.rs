//! In-memory fakes for the four stores, used in tests so the pipeline's
//! properties (spec §8) can be exercised without a live Postgres
//! instance. Mirrors the teacher's `MemoryQueueDriver` /
//! `MemoryCache` convention of keeping a production driver and an
//! in-memory driver behind the same trait.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::app::errors::StoreError;
use crate::app::models::conversation::{participant_key, Conversation, NewConversation};
use crate::app::models::message::{ChatMessage, ChatMessageWithSender, NewChatMessage, Page, SenderInfo};
use crate::app::models::planned_message::{NewPlannedMessage, PlannedMessage};
use crate::app::models::user::{ActiveUser, NewUser, User};
use crate::app::models::DieselUlid;
use crate::app::stores::{ConversationStore, MessageStore, PlannedMessageStore, UserStore};

#[derive(Default, Clone)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<DieselUlid, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, new_user: NewUser) -> User {
        self.create(new_user).await.expect("in-memory create cannot fail")
    }

    /// Exposes the backing map so `InMemoryMessageStore` can resolve
    /// sender info without a second source of truth in tests.
    pub fn shared(&self) -> Arc<RwLock<HashMap<DieselUlid, User>>> {
        Arc::clone(&self.users)
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_active_users(&self) -> Result<Vec<ActiveUser>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .filter(|u| u.is_active)
            .map(|u| ActiveUser {
                id: u.id,
                username: u.username.clone(),
                email: u.email.clone(),
            })
            .collect())
    }

    async fn find_by_id(&self, id: DieselUlid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let now = Utc::now();
        let user = User {
            id: new_user.id,
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            is_active: new_user.is_active,
            created_at: now,
            updated_at: now,
        };
        self.users.write().await.insert(user.id, user.clone());
        Ok(user)
    }
}

/// Wraps an `InMemoryUserStore`, failing the `n`th `find_by_id` call
/// (1-indexed, across both sender and receiver lookups) with a
/// transient error before delegating every other call through, so the
/// consumer's retry path can be exercised without a real, flaky database.
pub struct FlakyUserStore {
    inner: InMemoryUserStore,
    lookup_count: AtomicUsize,
    fail_at_lookup: usize,
}

impl FlakyUserStore {
    pub fn new(inner: InMemoryUserStore, fail_at_lookup: usize) -> Self {
        Self {
            inner,
            lookup_count: AtomicUsize::new(0),
            fail_at_lookup,
        }
    }
}

#[async_trait]
impl UserStore for FlakyUserStore {
    async fn find_active_users(&self) -> Result<Vec<ActiveUser>, StoreError> {
        self.inner.find_active_users().await
    }

    async fn find_by_id(&self, id: DieselUlid) -> Result<Option<User>, StoreError> {
        let call = self.lookup_count.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_at_lookup {
            return Err(StoreError::Conflict("injected transient failure".to_string()));
        }
        self.inner.find_by_id(id).await
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        self.inner.create(new_user).await
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPlannedMessageStore {
    items: Arc<RwLock<HashMap<DieselUlid, PlannedMessage>>>,
}

impl InMemoryPlannedMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<PlannedMessage> {
        self.items.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl PlannedMessageStore for InMemoryPlannedMessageStore {
    async fn bulk_insert(&self, new_items: Vec<NewPlannedMessage>) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut items = self.items.write().await;
        let count = new_items.len();
        for item in new_items {
            items.insert(
                item.id,
                PlannedMessage {
                    id: item.id,
                    sender_id: item.sender_id,
                    receiver_id: item.receiver_id,
                    content: item.content,
                    send_date: item.send_date,
                    is_queued: item.is_queued,
                    is_sent: item.is_sent,
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        Ok(count)
    }

    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<PlannedMessage>, StoreError> {
        let items = self.items.read().await;
        let mut due: Vec<PlannedMessage> = items.values().filter(|m| m.is_due(now)).cloned().collect();
        due.sort_by_key(|m| m.send_date);
        Ok(due)
    }

    async fn mark_queued(&self, ids: &[DieselUlid]) -> Result<usize, StoreError> {
        let mut items = self.items.write().await;
        let mut updated = 0;
        for id in ids {
            if let Some(item) = items.get_mut(id) {
                item.is_queued = true;
                item.updated_at = Utc::now();
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn mark_sent(&self, id: DieselUlid) -> Result<bool, StoreError> {
        let mut items = self.items.write().await;
        match items.get_mut(&id) {
            Some(item) => {
                item.is_sent = true;
                item.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_by_id(&self, id: DieselUlid) -> Result<Option<PlannedMessage>, StoreError> {
        Ok(self.items.read().await.get(&id).cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryConversationStore {
    conversations: Arc<RwLock<HashMap<DieselUlid, Conversation>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn find_between_users(&self, a: DieselUlid, b: DieselUlid) -> Result<Option<Conversation>, StoreError> {
        let key = participant_key(a, b);
        let conversations = self.conversations.read().await;
        Ok(conversations.values().find(|c| c.participant_key == key).cloned())
    }

    async fn create(&self, a: DieselUlid, b: DieselUlid) -> Result<Conversation, StoreError> {
        let new_conversation = NewConversation::between(a, b).map_err(|e| StoreError::Conflict(e.to_string()))?;
        let mut conversations = self.conversations.write().await;

        if let Some(existing) = conversations.values().find(|c| c.participant_key == new_conversation.participant_key) {
            // Lost the race (spec §9): converge on the existing row.
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let conversation = Conversation {
            id: new_conversation.id,
            participant_a: new_conversation.participant_a,
            participant_b: new_conversation.participant_b,
            participant_key: new_conversation.participant_key,
            last_message_content: None,
            last_message_sender_id: None,
            last_message_timestamp: None,
            created_at: now,
            updated_at: now,
        };
        conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn update_last_message(
        &self,
        conversation_id: DieselUlid,
        content: &str,
        sender_id: DieselUlid,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations.get_mut(&conversation_id).ok_or(StoreError::NotFound)?;
        conversation.last_message_content = Some(content.to_string());
        conversation.last_message_sender_id = Some(sender_id);
        conversation.last_message_timestamp = Some(timestamp);
        conversation.updated_at = timestamp;
        Ok(())
    }

    async fn find_by_id(&self, id: DieselUlid) -> Result<Option<Conversation>, StoreError> {
        Ok(self.conversations.read().await.get(&id).cloned())
    }
}

#[derive(Clone)]
pub struct InMemoryMessageStore {
    messages: Arc<RwLock<Vec<ChatMessage>>>,
    users: Arc<RwLock<HashMap<DieselUlid, User>>>,
}

impl InMemoryMessageStore {
    pub fn new(users: Arc<RwLock<HashMap<DieselUlid, User>>>) -> Self {
        Self {
            messages: Arc::new(RwLock::new(Vec::new())),
            users,
        }
    }

    pub async fn count(&self) -> usize {
        self.messages.read().await.len()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create(&self, new_message: NewChatMessage) -> Result<ChatMessage, StoreError> {
        let now = Utc::now();
        let message = ChatMessage {
            id: new_message.id,
            conversation_id: new_message.conversation_id,
            sender_id: new_message.sender_id,
            content: new_message.content,
            is_read: new_message.is_read,
            created_at: now,
            updated_at: now,
        };
        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn find_by_conversation_id(
        &self,
        conversation_id: DieselUlid,
        page: i64,
        limit: i64,
    ) -> Result<Page<ChatMessageWithSender>, StoreError> {
        let messages = self.messages.read().await;
        let users = self.users.read().await;

        let mut matching: Vec<&ChatMessage> = messages.iter().filter(|m| m.conversation_id == conversation_id).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let page = page.max(1);
        let limit = limit.max(1);
        let offset = ((page - 1) * limit) as usize;

        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .map(|message| {
                let sender = users.get(&message.sender_id).cloned();
                ChatMessageWithSender {
                    message: message.clone(),
                    sender: SenderInfo {
                        id: message.sender_id,
                        username: sender.as_ref().map(|u| u.username.clone()).unwrap_or_default(),
                        email: sender.as_ref().map(|u| u.email.clone()).unwrap_or_default(),
                    },
                }
            })
            .collect();

        Ok(Page { items, total })
    }
}
