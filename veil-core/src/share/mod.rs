//! The Sharing Coordinator (spec §4.G): grants and revokes access to a
//! collection by re-wrapping its key for a recipient, and propagates that
//! change down the collection's descendant subtree.
//!
//! Grounded on the teacher's `sync::share_grant` and `sync::membership`:
//! a grant inserts a `Membership` sealed for the recipient's public key;
//! a revoke removes it and, for every descendant that inherited it,
//! removes the inherited copy too rather than leaving it dangling.
use std::sync::Arc;

use crypto_box::PublicKey;
use tracing::info;

use crate::cloud::CloudClient;
use crate::crypto::chain::collection_key_candidates;
use crate::crypto::sealed_box;
use crate::crypto::Key32;
use crate::error::SyncError;
use crate::model::collection::{Collection, Membership, PermissionLevel};
use crate::model::ids::{CollectionId, UserId};
use crate::store::{decode, encode, keyspace, KvStore};

pub struct Coordinator {
    store: Arc<dyn KvStore>,
    cloud: Arc<dyn CloudClient>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn KvStore>, cloud: Arc<dyn CloudClient>) -> Self {
        Self { store, cloud }
    }

    fn load(&self, id: &CollectionId) -> Result<Collection, SyncError> {
        let bytes = self
            .store
            .get(keyspace::COLLECTIONS, id.as_str().as_bytes())?
            .ok_or_else(|| SyncError::Validation(format!("no such collection: {id}")))?;
        Ok(decode(&bytes)?)
    }

    fn save(&self, collection: &Collection) -> Result<(), SyncError> {
        self.store.put(
            keyspace::COLLECTIONS,
            collection.id.as_str().as_bytes(),
            &encode(collection)?,
        )?;
        Ok(())
    }

    fn descendants(&self, root: &CollectionId) -> Result<Vec<Collection>, SyncError> {
        let mut out = Vec::new();
        for (_, value) in self.store.iter_from(keyspace::COLLECTIONS, None)? {
            let candidate: Collection = decode(&value)?;
            if candidate.ancestor_ids.contains(root) {
                out.push(candidate);
            }
        }
        Ok(out)
    }

    /// Spec §4.G step 1: the caller must be the owner, or hold an `Admin`
    /// membership, to share or unshare a collection.
    fn require_caller_is_admin_or_owner(
        &self,
        collection: &Collection,
        caller: &UserId,
    ) -> Result<(), SyncError> {
        if &collection.owner_id == caller {
            return Ok(());
        }
        let is_admin = collection
            .members
            .iter()
            .any(|m| &m.user_id == caller && m.permission_level == PermissionLevel::Admin);
        if is_admin {
            return Ok(());
        }
        Err(SyncError::Validation(format!(
            "{caller} is not the owner or an admin of {}",
            collection.id
        )))
    }

    /// Unwrap `collection`'s own current collection key under the caller's
    /// master key (spec §4.G step 2 / §4.B chain traversal). Each collection
    /// -- root or descendant -- carries its own independent
    /// `encrypted_collection_key`, so this must be done per-collection
    /// rather than reusing the root's key for its descendants.
    fn unwrap_collection_key(
        &self,
        collection: &Collection,
        master_key: &Key32,
    ) -> Result<Key32, SyncError> {
        collection_key_candidates(master_key, &collection.encrypted_collection_key, &collection.previous_keys)
            .into_iter()
            .next()
            .ok_or_else(|| {
                SyncError::Validation(format!(
                    "could not unwrap the collection key for {}",
                    collection.id
                ))
            })
    }

    /// Grant `permission_level` on `collection_id` to `recipient`, sealing
    /// the collection's own current key under the recipient's public
    /// encryption key, then -- when `with_descendants` is set -- propagating
    /// an inherited membership to every descendant, each sealed with that
    /// descendant's own key (spec §4.G, scenario 5).
    #[allow(clippy::too_many_arguments)]
    pub async fn share(
        &self,
        caller_id: &UserId,
        collection_id: &CollectionId,
        master_key: &Key32,
        recipient: &UserId,
        recipient_public_key: &PublicKey,
        permission_level: PermissionLevel,
        with_descendants: bool,
    ) -> Result<(), SyncError> {
        let mut collection = self.load(collection_id)?;
        self.require_caller_is_admin_or_owner(&collection, caller_id)?;

        let collection_key = self.unwrap_collection_key(&collection, master_key)?;
        let sealed_key = sealed_box::seal(collection_key.as_ref(), recipient_public_key);

        self.cloud
            .share_collection(
                collection_id,
                recipient.as_str(),
                permission_str(permission_level),
                sealed_key.clone(),
                with_descendants,
            )
            .await?;

        collection.remove_membership(recipient);
        collection
            .add_membership(Membership {
                user_id: recipient.clone(),
                permission_level,
                sealed_key_for_recipient: sealed_key,
                is_inherited: false,
                inherited_from_id: None,
            })
            .map_err(|e| SyncError::Validation(e.to_string()))?;
        self.save(&collection)?;

        if with_descendants {
            for mut descendant in self.descendants(collection_id)? {
                let descendant_key = self.unwrap_collection_key(&descendant, master_key)?;
                let sealed_for_descendant =
                    sealed_box::seal(descendant_key.as_ref(), recipient_public_key);

                descendant.remove_membership(recipient);
                descendant
                    .add_membership(Membership {
                        user_id: recipient.clone(),
                        permission_level,
                        sealed_key_for_recipient: sealed_for_descendant,
                        is_inherited: true,
                        inherited_from_id: Some(collection_id.clone()),
                    })
                    .map_err(|e| SyncError::Validation(e.to_string()))?;
                self.save(&descendant)?;
            }
        }

        info!(collection_id = %collection_id, recipient = %recipient, "share granted");
        Ok(())
    }

    /// Revoke `recipient`'s access to `collection_id`, removing both the
    /// direct membership and every inherited copy on descendants. The
    /// server returns success even if the membership was inherited
    /// (spec §4.G), so this is not gated on `with_descendants`.
    pub async fn unshare(
        &self,
        caller_id: &UserId,
        collection_id: &CollectionId,
        recipient: &UserId,
    ) -> Result<(), SyncError> {
        let mut collection = self.load(collection_id)?;
        self.require_caller_is_admin_or_owner(&collection, caller_id)?;

        self.cloud
            .unshare_collection(collection_id, recipient.as_str())
            .await?;

        collection.remove_membership(recipient);
        self.save(&collection)?;

        for mut descendant in self.descendants(collection_id)? {
            let was_inherited_from_here = descendant
                .members
                .iter()
                .any(|m| &m.user_id == recipient && m.inherited_from_id.as_ref() == Some(collection_id));
            if was_inherited_from_here {
                descendant.remove_membership(recipient);
                self.save(&descendant)?;
            }
        }

        info!(collection_id = %collection_id, recipient = %recipient, "share revoked");
        Ok(())
    }
}

fn permission_str(level: PermissionLevel) -> &'static str {
    match level {
        PermissionLevel::ReadOnly => "read_only",
        PermissionLevel::ReadWrite => "read_write",
        PermissionLevel::Admin => "admin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::fake::FakeCloudClient;
    use crate::crypto::aead;
    use crate::model::collection::CollectionType;
    use crate::model::state::EntityState;
    use crate::model::SyncStatus;
    use crate::store::sled_store::SledStore;
    use chrono::Utc;
    use crypto_box::{aead::OsRng, SecretKey};
    use zeroize::Zeroizing;

    fn sealed() -> crate::crypto::Sealed {
        crate::crypto::Sealed {
            ciphertext: vec![1, 2, 3],
            nonce: [0u8; 24],
        }
    }

    fn collection_with_key(
        id: &str,
        parent: Option<&str>,
        ancestors: Vec<&str>,
        owner: &str,
        encrypted_collection_key: crate::crypto::Sealed,
    ) -> Collection {
        Collection {
            id: CollectionId::from(id),
            owner_id: UserId::from(owner),
            created_by_user_id: UserId::from(owner),
            modified_by_user_id: UserId::from(owner),
            parent_id: parent.map(CollectionId::from),
            ancestor_ids: ancestors.into_iter().map(CollectionId::from).collect(),
            collection_type: CollectionType::Folder,
            encrypted_name: sealed(),
            encrypted_collection_key,
            previous_keys: vec![],
            members: vec![],
            state: EntityState::Active,
            version: 1,
            tombstone_version: 0,
            tombstone_expiry: None,
            created_at: Utc::now(),
            modified_at: Utc::now(),
            sync_status: SyncStatus::Synced,
            name: None,
        }
    }

    #[tokio::test]
    async fn scenario_5_share_propagates_distinct_keys_to_descendants() {
        let master_key: Key32 = Zeroizing::new([1u8; 32]);
        let root_key = [7u8; 32];
        let child_key = [8u8; 32];

        let store = Arc::new(SledStore::temporary().unwrap());
        store
            .put(
                keyspace::COLLECTIONS,
                b"root",
                &encode(&collection_with_key(
                    "root",
                    None,
                    vec![],
                    "owner",
                    aead::seal(&master_key, &root_key),
                ))
                .unwrap(),
            )
            .unwrap();
        store
            .put(
                keyspace::COLLECTIONS,
                b"child",
                &encode(&collection_with_key(
                    "child",
                    Some("root"),
                    vec!["root"],
                    "owner",
                    aead::seal(&master_key, &child_key),
                ))
                .unwrap(),
            )
            .unwrap();

        let cloud = Arc::new(FakeCloudClient::new());
        let coordinator = Coordinator::new(store.clone(), cloud);
        let recipient_sk = SecretKey::generate(&mut OsRng);
        let recipient_pk = recipient_sk.public_key();

        coordinator
            .share(
                &UserId::from("owner"),
                &CollectionId::from("root"),
                &master_key,
                &UserId::from("bob"),
                &recipient_pk,
                PermissionLevel::ReadOnly,
                true,
            )
            .await
            .unwrap();

        let root: Collection =
            decode(&store.get(keyspace::COLLECTIONS, b"root").unwrap().unwrap()).unwrap();
        let child: Collection =
            decode(&store.get(keyspace::COLLECTIONS, b"child").unwrap().unwrap()).unwrap();
        assert_eq!(child.members.len(), 1);
        assert!(child.members[0].is_inherited);
        assert_ne!(
            root.members[0].sealed_key_for_recipient,
            child.members[0].sealed_key_for_recipient,
            "each descendant's key must be sealed independently, not reused from the root"
        );

        coordinator
            .unshare(
                &UserId::from("owner"),
                &CollectionId::from("root"),
                &UserId::from("bob"),
            )
            .await
            .unwrap();
        let child: Collection =
            decode(&store.get(keyspace::COLLECTIONS, b"child").unwrap().unwrap()).unwrap();
        assert!(child.members.is_empty());
    }

    #[tokio::test]
    async fn non_admin_non_owner_caller_is_rejected() {
        let master_key: Key32 = Zeroizing::new([1u8; 32]);
        let store = Arc::new(SledStore::temporary().unwrap());
        store
            .put(
                keyspace::COLLECTIONS,
                b"root",
                &encode(&collection_with_key(
                    "root",
                    None,
                    vec![],
                    "owner",
                    aead::seal(&master_key, &[7u8; 32]),
                ))
                .unwrap(),
            )
            .unwrap();

        let cloud = Arc::new(FakeCloudClient::new());
        let coordinator = Coordinator::new(store, cloud);
        let recipient_sk = SecretKey::generate(&mut OsRng);

        let result = coordinator
            .share(
                &UserId::from("not-owner"),
                &CollectionId::from("root"),
                &master_key,
                &UserId::from("bob"),
                &recipient_sk.public_key(),
                PermissionLevel::ReadOnly,
                false,
            )
            .await;
        assert!(matches!(result, Err(SyncError::Validation(_))));
    }

    #[tokio::test]
    async fn share_without_descendants_does_not_propagate() {
        let master_key: Key32 = Zeroizing::new([1u8; 32]);
        let store = Arc::new(SledStore::temporary().unwrap());
        store
            .put(
                keyspace::COLLECTIONS,
                b"root",
                &encode(&collection_with_key(
                    "root",
                    None,
                    vec![],
                    "owner",
                    aead::seal(&master_key, &[7u8; 32]),
                ))
                .unwrap(),
            )
            .unwrap();
        store
            .put(
                keyspace::COLLECTIONS,
                b"child",
                &encode(&collection_with_key(
                    "child",
                    Some("root"),
                    vec!["root"],
                    "owner",
                    aead::seal(&master_key, &[8u8; 32]),
                ))
                .unwrap(),
            )
            .unwrap();

        let cloud = Arc::new(FakeCloudClient::new());
        let coordinator = Coordinator::new(store.clone(), cloud);
        let recipient_sk = SecretKey::generate(&mut OsRng);

        coordinator
            .share(
                &UserId::from("owner"),
                &CollectionId::from("root"),
                &master_key,
                &UserId::from("bob"),
                &recipient_sk.public_key(),
                PermissionLevel::ReadOnly,
                false,
            )
            .await
            .unwrap();

        let child: Collection =
            decode(&store.get(keyspace::COLLECTIONS, b"child").unwrap().unwrap()).unwrap();
        assert!(child.members.is_empty());
    }
}
