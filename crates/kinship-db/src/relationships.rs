//! Relationship store: friend requests and friendships.
//!
//! A pending request holds the unordered-pair key `min:max`, so a second
//! request in either direction loses the conditional insert instead of racing
//! a read. Each friendship edge holds `owner>friend`.

use kinship_common::error::{KinshipError, KinshipResult};
use kinship_common::models::{FriendRequest, Friendship, Identity};
use uuid::Uuid;

use crate::codec::{decode_all, from_document, to_document};
use crate::collections::{FRIENDSHIPS, FRIEND_REQUESTS};
use crate::document::{DocumentStore, Filter, FindOptions, SortOrder};
use crate::Database;

#[derive(Debug, Clone)]
pub struct RelationshipStore {
    db: Database,
    max_friends: u32,
}

fn pair_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

fn edge_key(owner: Uuid, friend: Uuid) -> String {
    format!("{owner}>{friend}")
}

fn request_filter(sender: Uuid, target: Uuid) -> Filter {
    Filter::new()
        .eq("senderUUID", sender.to_string())
        .eq("targetUUID", target.to_string())
}

fn edge_filter(owner: Uuid, friend: Uuid) -> Filter {
    Filter::new()
        .eq("playerUUID", owner.to_string())
        .eq("friendUUID", friend.to_string())
}

impl RelationshipStore {
    pub fn new(db: Database, max_friends: u32) -> Self {
        Self { db, max_friends }
    }

    pub async fn send_request(&self, sender: &Identity, target: &Identity) -> KinshipResult<FriendRequest> {
        if sender.id == target.id {
            return Err(KinshipError::invalid_state(
                "You cannot send a friend request to yourself",
            ));
        }
        if self.are_friends(sender.id, target.id).await? {
            return Err(KinshipError::already_exists(format!(
                "Friendship with {}",
                target.name
            )));
        }
        if self.count(sender.id).await? >= u64::from(self.max_friends) {
            return Err(KinshipError::full("Your friend list"));
        }

        let request = FriendRequest::new(sender, target);
        let inserted = self
            .db
            .insert_unique(FRIEND_REQUESTS, &pair_key(sender.id, target.id), to_document(&request)?)
            .await?;
        if !inserted {
            return Err(KinshipError::already_exists(format!(
                "Friend request between you and {}",
                target.name
            )));
        }

        tracing::debug!(sender = %sender.id, target = %target.id, "Friend request created");
        Ok(request)
    }

    /// `target` accepts the request `sender` sent them. Returns the edge owned
    /// by `target`.
    ///
    /// Not crash-atomic: the two edges and the request deletion are separate
    /// writes. A failed second edge removes the first before returning.
    pub async fn accept(&self, target: &Identity, sender: Uuid) -> KinshipResult<Friendship> {
        let request: FriendRequest = match self
            .db
            .find_one(FRIEND_REQUESTS, &request_filter(sender, target.id))
            .await?
        {
            Some(doc) => from_document(doc)?,
            None => return Err(KinshipError::not_found("Friend request")),
        };

        if self.count(target.id).await? >= u64::from(self.max_friends) {
            return Err(KinshipError::full("Your friend list"));
        }

        let (mine, theirs) = Friendship::pair(target, &request.sender());
        self.insert_edge(&mine).await?;
        if let Err(e) = self.insert_edge(&theirs).await {
            self.db
                .delete_one(FRIENDSHIPS, &edge_filter(target.id, sender))
                .await?;
            return Err(e);
        }

        self.db
            .delete_one(FRIEND_REQUESTS, &request_filter(sender, target.id))
            .await?;

        tracing::info!(player = %target.id, friend = %sender, "Friendship created");
        Ok(mine)
    }

    async fn insert_edge(&self, edge: &Friendship) -> KinshipResult<bool> {
        self.db
            .insert_unique(
                FRIENDSHIPS,
                &edge_key(edge.owner_id, edge.friend_id),
                to_document(edge)?,
            )
            .await
    }

    /// `target` declines the request from `sender`. `false` when nothing was pending.
    pub async fn deny(&self, target: Uuid, sender: Uuid) -> KinshipResult<bool> {
        self.db
            .delete_one(FRIEND_REQUESTS, &request_filter(sender, target))
            .await
    }

    /// `sender` withdraws their request to `target`.
    pub async fn cancel(&self, sender: Uuid, target: Uuid) -> KinshipResult<bool> {
        self.db
            .delete_one(FRIEND_REQUESTS, &request_filter(sender, target))
            .await
    }

    /// Remove both edges. Returns whether anything was removed.
    pub async fn remove(&self, a: Uuid, b: Uuid) -> KinshipResult<bool> {
        let ab = self.db.delete_one(FRIENDSHIPS, &edge_filter(a, b)).await?;
        let ba = self.db.delete_one(FRIENDSHIPS, &edge_filter(b, a)).await?;
        if ab || ba {
            tracing::info!(player = %a, friend = %b, "Friendship removed");
        }
        Ok(ab || ba)
    }

    pub async fn are_friends(&self, a: Uuid, b: Uuid) -> KinshipResult<bool> {
        Ok(self.db.count(FRIENDSHIPS, &edge_filter(a, b)).await? > 0)
    }

    /// Edges owned by `owner`, oldest first.
    pub async fn list(&self, owner: Uuid) -> KinshipResult<Vec<Friendship>> {
        let docs = self
            .db
            .find(
                FRIENDSHIPS,
                &Filter::new().eq("playerUUID", owner.to_string()),
                FindOptions::sorted("timestamp", SortOrder::Ascending),
            )
            .await?;
        Ok(decode_all(FRIENDSHIPS, docs))
    }

    pub async fn pending_incoming(&self, owner: Uuid) -> KinshipResult<Vec<FriendRequest>> {
        let docs = self
            .db
            .find(
                FRIEND_REQUESTS,
                &Filter::new().eq("targetUUID", owner.to_string()),
                FindOptions::sorted("timestamp", SortOrder::Ascending),
            )
            .await?;
        Ok(decode_all(FRIEND_REQUESTS, docs))
    }

    pub async fn pending_outgoing(&self, owner: Uuid) -> KinshipResult<Vec<FriendRequest>> {
        let docs = self
            .db
            .find(
                FRIEND_REQUESTS,
                &Filter::new().eq("senderUUID", owner.to_string()),
                FindOptions::sorted("timestamp", SortOrder::Ascending),
            )
            .await?;
        Ok(decode_all(FRIEND_REQUESTS, docs))
    }

    pub async fn count(&self, owner: Uuid) -> KinshipResult<u64> {
        self.db
            .count(FRIENDSHIPS, &Filter::new().eq("playerUUID", owner.to_string()))
            .await
    }
}
