//! DTO <-> domain-model conversions for the sync boundary.
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::cloud::{CollectionDto, EncryptedPayloadDto, FileDto, KeyWrappingDto, MembershipDto};
use crate::crypto::Sealed;
use crate::error::SyncError;
use crate::model::collection::{Collection, CollectionType, KeyWrapping, Membership, PermissionLevel};
use crate::model::file::{File, StorageMode};
use crate::model::ids::UserId;
use crate::model::state::validate_state;
use crate::model::SyncStatus;

pub fn sealed_to_dto(sealed: &Sealed) -> EncryptedPayloadDto {
    EncryptedPayloadDto {
        ciphertext: STANDARD.encode(&sealed.ciphertext),
        nonce: STANDARD.encode(sealed.nonce),
    }
}

pub fn dto_to_sealed(dto: &EncryptedPayloadDto) -> Result<Sealed, SyncError> {
    let ciphertext = STANDARD
        .decode(&dto.ciphertext)
        .map_err(|e| SyncError::Validation(format!("invalid ciphertext encoding: {e}")))?;
    let nonce_bytes = STANDARD
        .decode(&dto.nonce)
        .map_err(|e| SyncError::Validation(format!("invalid nonce encoding: {e}")))?;
    let nonce: [u8; 24] = nonce_bytes
        .try_into()
        .map_err(|_| SyncError::Validation("nonce must be 24 bytes".to_string()))?;
    Ok(Sealed { ciphertext, nonce })
}

fn collection_type_to_str(t: CollectionType) -> &'static str {
    match t {
        CollectionType::Folder => "folder",
        CollectionType::Album => "album",
    }
}

fn collection_type_from_str(s: &str) -> Result<CollectionType, SyncError> {
    match s {
        "folder" => Ok(CollectionType::Folder),
        "album" => Ok(CollectionType::Album),
        other => Err(SyncError::Validation(format!(
            "unknown collection_type: {other}"
        ))),
    }
}

fn permission_to_str(p: PermissionLevel) -> &'static str {
    match p {
        PermissionLevel::ReadOnly => "read_only",
        PermissionLevel::ReadWrite => "read_write",
        PermissionLevel::Admin => "admin",
    }
}

fn permission_from_str(s: &str) -> Result<PermissionLevel, SyncError> {
    match s {
        "read_only" => Ok(PermissionLevel::ReadOnly),
        "read_write" => Ok(PermissionLevel::ReadWrite),
        "admin" => Ok(PermissionLevel::Admin),
        other => Err(SyncError::Validation(format!(
            "unknown permission_level: {other}"
        ))),
    }
}

pub fn collection_to_dto(c: &Collection) -> Result<CollectionDto, SyncError> {
    Ok(CollectionDto {
        id: c.id.clone(),
        owner_id: c.owner_id.to_string(),
        created_by_user_id: c.created_by_user_id.to_string(),
        modified_by_user_id: c.modified_by_user_id.to_string(),
        parent_id: c.parent_id.clone(),
        ancestor_ids: c.ancestor_ids.clone(),
        collection_type: collection_type_to_str(c.collection_type).to_string(),
        encrypted_name: sealed_to_dto(&c.encrypted_name),
        encrypted_collection_key: sealed_to_dto(&c.encrypted_collection_key),
        previous_keys: c
            .previous_keys
            .iter()
            .map(|w| KeyWrappingDto {
                key_version: w.key_version,
                sealed: sealed_to_dto(&w.sealed),
                rotated_at: w.rotated_at.clone(),
                rotated_reason: w.rotated_reason.clone(),
                algorithm: w.algorithm.clone(),
            })
            .collect(),
        members: c
            .members
            .iter()
            .map(|m| MembershipDto {
                user_id: m.user_id.to_string(),
                permission_level: permission_to_str(m.permission_level).to_string(),
                sealed_key_for_recipient: STANDARD.encode(&m.sealed_key_for_recipient),
                is_inherited: m.is_inherited,
                inherited_from_id: m.inherited_from_id.clone(),
            })
            .collect(),
        state: format!("{:?}", c.state).to_lowercase(),
        version: c.version,
        tombstone_version: c.tombstone_version,
        tombstone_expiry: c.tombstone_expiry,
        created_at: c.created_at,
        modified_at: c.modified_at,
    })
}

pub fn dto_to_collection(dto: &CollectionDto) -> Result<Collection, SyncError> {
    let mut previous_keys = Vec::with_capacity(dto.previous_keys.len());
    for w in &dto.previous_keys {
        previous_keys.push(KeyWrapping {
            key_version: w.key_version,
            sealed: dto_to_sealed(&w.sealed)?,
            rotated_at: w.rotated_at.clone(),
            rotated_reason: w.rotated_reason.clone(),
            algorithm: w.algorithm.clone(),
        });
    }

    let mut members = Vec::with_capacity(dto.members.len());
    for m in &dto.members {
        members.push(Membership {
            user_id: UserId::from(m.user_id.as_str()),
            permission_level: permission_from_str(&m.permission_level)?,
            sealed_key_for_recipient: STANDARD
                .decode(&m.sealed_key_for_recipient)
                .map_err(|e| SyncError::Validation(format!("invalid membership key: {e}")))?,
            is_inherited: m.is_inherited,
            inherited_from_id: m.inherited_from_id.clone(),
        });
    }

    Ok(Collection {
        id: dto.id.clone(),
        owner_id: UserId::from(dto.owner_id.as_str()),
        created_by_user_id: UserId::from(dto.created_by_user_id.as_str()),
        modified_by_user_id: UserId::from(dto.modified_by_user_id.as_str()),
        parent_id: dto.parent_id.clone(),
        ancestor_ids: dto.ancestor_ids.clone(),
        collection_type: collection_type_from_str(&dto.collection_type)?,
        encrypted_name: dto_to_sealed(&dto.encrypted_name)?,
        encrypted_collection_key: dto_to_sealed(&dto.encrypted_collection_key)?,
        previous_keys,
        members,
        state: validate_state(&dto.state)?,
        version: dto.version,
        tombstone_version: dto.tombstone_version,
        tombstone_expiry: dto.tombstone_expiry,
        created_at: dto.created_at,
        modified_at: dto.modified_at,
        sync_status: SyncStatus::Synced,
        name: None,
    })
}

pub fn file_to_dto(f: &File) -> FileDto {
    FileDto {
        id: f.id.clone(),
        collection_id: f.collection_id.clone(),
        owner_id: f.owner_id.to_string(),
        created_by_user_id: f.created_by_user_id.to_string(),
        modified_by_user_id: f.modified_by_user_id.to_string(),
        encrypted_file_key: sealed_to_dto(&f.encrypted_file_key),
        encrypted_metadata: sealed_to_dto(&f.encrypted_metadata),
        content_hash: f.content_hash.clone(),
        size_bytes: f.size_bytes,
        state: format!("{:?}", f.state).to_lowercase(),
        version: f.version,
        tombstone_version: f.tombstone_version,
        tombstone_expiry: f.tombstone_expiry,
        created_at: f.created_at,
        modified_at: f.modified_at,
    }
}

pub fn dto_to_file(dto: &FileDto) -> Result<File, SyncError> {
    Ok(File {
        id: dto.id.clone(),
        collection_id: dto.collection_id.clone(),
        owner_id: UserId::from(dto.owner_id.as_str()),
        created_by_user_id: UserId::from(dto.created_by_user_id.as_str()),
        modified_by_user_id: UserId::from(dto.modified_by_user_id.as_str()),
        encrypted_file_key: dto_to_sealed(&dto.encrypted_file_key)?,
        encrypted_metadata: dto_to_sealed(&dto.encrypted_metadata)?,
        storage_mode: StorageMode::EncryptedOnly,
        encrypted_blob_path: None,
        decrypted_blob_path: None,
        content_hash: dto.content_hash.clone(),
        size_bytes: dto.size_bytes,
        state: validate_state(&dto.state)?,
        version: dto.version,
        tombstone_version: dto.tombstone_version,
        tombstone_expiry: dto.tombstone_expiry,
        created_at: dto.created_at,
        modified_at: dto.modified_at,
        sync_status: SyncStatus::Synced,
        decrypted_metadata: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_round_trips_through_dto() {
        let sealed = Sealed {
            ciphertext: vec![1, 2, 3, 4],
            nonce: [9u8; 24],
        };
        let dto = sealed_to_dto(&sealed);
        let back = dto_to_sealed(&dto).unwrap();
        assert_eq!(sealed, back);
    }
}
