//! `veil`: the command-line front end for the sync engine.
//!
//! Grounded on the teacher's `bae-server` `main.rs`: a `clap::Parser` with
//! `env` fallbacks for anything that's also sensibly a config file field,
//! `tracing-subscriber` initialized from `RUST_LOG`, and a `main` that maps
//! the library's typed error straight onto a process exit code.
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rand::RngCore;
use tokio_util::sync::CancellationToken;
use tracing::error;

use veil_core::cloud::http::HttpCloudClient;
use veil_core::cloud::CloudClient;
use veil_core::crypto::{aead, chain, kdf, Key32};
use veil_core::model::collection::{Collection, CollectionType, PermissionLevel};
use veil_core::model::ids::{CollectionId, UserId};
use veil_core::model::state::{check_transition, EntityState};
use veil_core::model::user::User;
use veil_core::model::SyncStatus;
use veil_core::share::Coordinator;
use veil_core::store::sled_store::SledStore;
use veil_core::store::{decode, encode, keyspace, KvStore};
use veil_core::sync::{convert, Orchestrator};
use veil_core::{Config, SyncError};

#[derive(Parser)]
#[command(name = "veil", version, about = "End-to-end encrypted file sync")]
struct Args {
    /// Path to the YAML config file.
    #[arg(long, env = "VEIL_CONFIG", default_value = "veil.yaml")]
    config: PathBuf,

    /// Cloud API base URL; overrides the value from the config file.
    #[arg(long, env = "VEIL_CLOUD_BASE_URL")]
    cloud_base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sync loop against the cloud.
    Sync {
        #[command(subcommand)]
        target: SyncTarget,
        /// The account password, used to unwrap the master key that
        /// decrypts collection names and file metadata as they sync.
        #[arg(long)]
        password: String,
    },
    /// Create, inspect, and manage locally-known collections.
    Collections {
        #[command(subcommand)]
        action: CollectionsAction,
    },
}

#[derive(Subcommand)]
enum SyncTarget {
    /// Pull and reconcile collections only.
    Collections,
    /// Pull and reconcile files only.
    Files,
    /// Collections, then files.
    Full,
    /// Run a full sync and print per-entity-kind counters instead of just
    /// a summary line.
    Debug,
}

#[derive(Subcommand)]
enum CollectionsAction {
    /// Create a new collection and push it to the cloud.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long = "type", value_enum, default_value = "folder")]
        collection_type: CollectionTypeArg,
        #[arg(long)]
        parent: Option<String>,
        /// The account password, used to unwrap the master key.
        #[arg(long)]
        password: String,
    },
    /// List every locally-known collection id and its state.
    List,
    /// Move a collection to the `deleted` state.
    Delete {
        id: String,
        #[arg(long)]
        password: String,
        /// Also delete every descendant collection.
        #[arg(long = "with-children")]
        with_children: bool,
        /// Allow the transition even if it isn't normally legal
        /// (e.g. restoring deletion of an already-archived collection).
        #[arg(long)]
        force: bool,
    },
    /// Move a `deleted` collection back to `active`.
    Restore {
        id: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        force: bool,
    },
    /// List a collection's memberships.
    Members { id: String },
    /// Grant another user access to a collection.
    Share {
        collection_id: String,
        recipient_user_id: String,
        /// The recipient's X25519 public key, hex-encoded.
        recipient_public_key_hex: String,
        /// The account password, used to unwrap the master key that in
        /// turn unwraps the collection key being shared.
        #[arg(long)]
        password: String,
        #[arg(long, value_enum, default_value = "read-only")]
        permission: PermissionArg,
        /// Also share with every descendant collection.
        #[arg(long = "with-children")]
        with_children: bool,
    },
    /// Revoke another user's access to a collection.
    Unshare {
        collection_id: String,
        recipient_user_id: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum CollectionTypeArg {
    Folder,
    Album,
}

impl From<CollectionTypeArg> for CollectionType {
    fn from(value: CollectionTypeArg) -> Self {
        match value {
            CollectionTypeArg::Folder => CollectionType::Folder,
            CollectionTypeArg::Album => CollectionType::Album,
        }
    }
}

#[derive(Clone, clap::ValueEnum)]
enum PermissionArg {
    ReadOnly,
    ReadWrite,
    Admin,
}

impl From<PermissionArg> for PermissionLevel {
    fn from(value: PermissionArg) -> Self {
        match value {
            PermissionArg::ReadOnly => PermissionLevel::ReadOnly,
            PermissionArg::ReadWrite => PermissionLevel::ReadWrite,
            PermissionArg::Admin => PermissionLevel::Admin,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "veil exited with an error");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run() -> Result<(), SyncError> {
    let args = Args::parse();

    let contents = std::fs::read_to_string(&args.config)
        .map_err(|e| SyncError::Validation(format!("failed to read {:?}: {e}", args.config)))?;
    let mut config = Config::from_yaml_str(&contents)
        .map_err(|e| SyncError::Validation(format!("invalid config: {e}")))?;
    if let Some(base_url) = args.cloud_base_url {
        config.cloud_base_url = base_url;
    }

    let store = Arc::new(SledStore::open(&config.data_dir)?);
    let cloud = Arc::new(HttpCloudClient::new(
        config.cloud_base_url.clone(),
        config.http_timeout(),
    )?);

    match args.command {
        Command::Sync { target, password } => run_sync(store, cloud, config, target, &password).await,
        Command::Collections { action } => run_collections(store, cloud, action).await,
    }
}

async fn run_sync(
    store: Arc<SledStore>,
    cloud: Arc<HttpCloudClient>,
    config: Config,
    target: SyncTarget,
    password: &str,
) -> Result<(), SyncError> {
    let master_key = unwrap_master_key(&store, password)?;
    let orchestrator = Orchestrator::new(store, cloud, config);
    let cancel = CancellationToken::new();

    match target {
        SyncTarget::Collections => {
            let report = orchestrator.sync_collections(&master_key, &cancel).await?;
            println!("{report:?}");
        }
        SyncTarget::Files => {
            let report = orchestrator.sync_files(&master_key, &cancel).await?;
            println!("{report:?}");
        }
        SyncTarget::Full => {
            let (collections, files) = orchestrator.full_sync(&master_key, &cancel).await?;
            println!(
                "collections: {} added, {} updated, {} deleted, {} conflicts",
                collections.added, collections.updated, collections.deleted, collections.conflicts
            );
            println!(
                "files: {} added, {} updated, {} deleted, {} conflicts",
                files.added, files.updated, files.deleted, files.conflicts
            );
        }
        SyncTarget::Debug => {
            let (collections, files) = orchestrator.full_sync(&master_key, &cancel).await?;
            println!("collections: {collections:#?}");
            println!("files: {files:#?}");
        }
    }
    Ok(())
}

fn load_user(store: &SledStore) -> Result<User, SyncError> {
    let bytes = store
        .get(keyspace::USER, keyspace::SINGLETON_KEY)?
        .ok_or_else(|| SyncError::Validation("no local user record; log in first".to_string()))?;
    decode(&bytes).map_err(Into::into)
}

/// `password --derive--> KEK --unwrap--> master_key` (spec §4.B), the
/// common first step for any CLI operation that touches key material.
fn unwrap_master_key(store: &SledStore, password: &str) -> Result<Key32, SyncError> {
    let user = load_user(store)?;
    let kek = kdf::derive_kek(password, &user.password_salt)?;
    let master_key = chain::unwrap_master_key(&kek, &user.encrypted_master_key)?;
    Ok(master_key)
}

fn load_collection(store: &SledStore, id: &CollectionId) -> Result<Collection, SyncError> {
    let bytes = store
        .get(keyspace::COLLECTIONS, id.as_str().as_bytes())?
        .ok_or_else(|| SyncError::Validation(format!("no such collection: {id}")))?;
    decode(&bytes).map_err(Into::into)
}

fn save_collection(store: &SledStore, collection: &Collection) -> Result<(), SyncError> {
    store.put(
        keyspace::COLLECTIONS,
        collection.id.as_str().as_bytes(),
        &encode(collection)?,
    )?;
    Ok(())
}

fn generate_local_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("local-{}", hex::encode(bytes))
}

async fn run_collections(
    store: Arc<SledStore>,
    cloud: Arc<HttpCloudClient>,
    action: CollectionsAction,
) -> Result<(), SyncError> {
    match action {
        CollectionsAction::Create {
            name,
            collection_type,
            parent,
            password,
        } => create_collection(&store, cloud, &name, collection_type.into(), parent, &password).await?,
        CollectionsAction::List => {
            for (key, _) in store.iter_from(keyspace::COLLECTIONS, None)? {
                println!("{}", String::from_utf8_lossy(&key));
            }
        }
        CollectionsAction::Delete {
            id,
            password,
            with_children,
            force,
        } => {
            unwrap_master_key(&store, &password)?;
            delete_collection(&store, cloud, &CollectionId::from(id.as_str()), with_children, force)
                .await?;
        }
        CollectionsAction::Restore { id, password, force } => {
            unwrap_master_key(&store, &password)?;
            restore_collection(&store, cloud, &CollectionId::from(id.as_str()), force).await?;
        }
        CollectionsAction::Members { id } => {
            let collection = load_collection(&store, &CollectionId::from(id.as_str()))?;
            let json = serde_json::to_string_pretty(&collection.members)
                .expect("memberships are always JSON-serializable");
            println!("{json}");
        }
        CollectionsAction::Share {
            collection_id,
            recipient_user_id,
            recipient_public_key_hex,
            password,
            permission,
            with_children,
        } => {
            let recipient_pk_bytes: [u8; 32] = hex::decode(&recipient_public_key_hex)
                .map_err(|e| SyncError::Validation(format!("bad public key hex: {e}")))?
                .try_into()
                .map_err(|_| SyncError::Validation("public key must be 32 bytes".to_string()))?;
            let recipient_pk = crypto_box::PublicKey::from(recipient_pk_bytes);
            let master_key = unwrap_master_key(&store, &password)?;
            let user = load_user(&store)?;

            Coordinator::new(store, cloud)
                .share(
                    &user.id,
                    &CollectionId::from(collection_id.as_str()),
                    &master_key,
                    &UserId::from(recipient_user_id.as_str()),
                    &recipient_pk,
                    permission.into(),
                    with_children,
                )
                .await?;
        }
        CollectionsAction::Unshare {
            collection_id,
            recipient_user_id,
            password,
        } => {
            // Confirms the caller actually holds the account before
            // revoking someone else's access; unshare doesn't need the key.
            unwrap_master_key(&store, &password)?;
            let user = load_user(&store)?;

            Coordinator::new(store, cloud)
                .unshare(
                    &user.id,
                    &CollectionId::from(collection_id.as_str()),
                    &UserId::from(recipient_user_id.as_str()),
                )
                .await?;
        }
    }
    Ok(())
}

async fn create_collection(
    store: &Arc<SledStore>,
    cloud: Arc<HttpCloudClient>,
    name: &str,
    collection_type: CollectionType,
    parent: Option<String>,
    password: &str,
) -> Result<(), SyncError> {
    let master_key = unwrap_master_key(store, password)?;
    let user = load_user(store)?;

    let (parent_id, ancestor_ids) = match &parent {
        Some(parent_id) => {
            let parent_id = CollectionId::from(parent_id.as_str());
            let parent_collection = load_collection(store, &parent_id)?;
            let mut ancestors = parent_collection.ancestor_ids.clone();
            ancestors.push(parent_id.clone());
            (Some(parent_id), ancestors)
        }
        None => (None, vec![]),
    };

    let mut collection_key_bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut collection_key_bytes);
    let collection_key: Key32 = zeroize::Zeroizing::new(collection_key_bytes);

    let now = chrono::Utc::now();
    let mut collection = Collection {
        id: CollectionId::from(generate_local_id().as_str()),
        owner_id: user.id.clone(),
        created_by_user_id: user.id.clone(),
        modified_by_user_id: user.id.clone(),
        parent_id,
        ancestor_ids,
        collection_type,
        encrypted_name: aead::seal(&collection_key, name.as_bytes()),
        encrypted_collection_key: aead::seal(&master_key, collection_key.as_ref()),
        previous_keys: vec![],
        members: vec![],
        state: EntityState::Active,
        version: 1,
        tombstone_version: 0,
        tombstone_expiry: None,
        created_at: now,
        modified_at: now,
        sync_status: SyncStatus::LocalOnly,
        name: Some(name.to_string()),
    };
    collection
        .validate_ancestry()
        .map_err(|e| SyncError::Validation(e.to_string()))?;

    let dto = convert::collection_to_dto(&collection)?;
    let pushed = cloud.push_collection(dto).await?;
    let mut materialized = convert::dto_to_collection(&pushed)?;
    materialized.sync_status = SyncStatus::Synced;
    materialized.name = Some(name.to_string());

    save_collection(store, &materialized)?;
    println!("{}", materialized.id);
    Ok(())
}

async fn delete_collection(
    store: &Arc<SledStore>,
    cloud: Arc<HttpCloudClient>,
    id: &CollectionId,
    with_children: bool,
    force: bool,
) -> Result<(), SyncError> {
    let mut collection = load_collection(store, id)?;
    transition_and_push(store, &cloud, &mut collection, EntityState::Deleted, force).await?;

    if with_children {
        for (_, value) in store.iter_from(keyspace::COLLECTIONS, None)? {
            let candidate: Collection = decode(&value)?;
            if candidate.ancestor_ids.contains(id) && candidate.state != EntityState::Deleted {
                let mut descendant = candidate;
                transition_and_push(store, &cloud, &mut descendant, EntityState::Deleted, force)
                    .await?;
            }
        }
    }
    Ok(())
}

async fn restore_collection(
    store: &Arc<SledStore>,
    cloud: Arc<HttpCloudClient>,
    id: &CollectionId,
    force: bool,
) -> Result<(), SyncError> {
    let mut collection = load_collection(store, id)?;
    transition_and_push(store, &cloud, &mut collection, EntityState::Active, force).await?;
    Ok(())
}

async fn transition_and_push(
    store: &Arc<SledStore>,
    cloud: &Arc<HttpCloudClient>,
    collection: &mut Collection,
    to: EntityState,
    force: bool,
) -> Result<(), SyncError> {
    let from = collection.state;
    if !force {
        check_transition(from, to)?;
    }

    collection.state = to;
    collection.version += 1;
    collection.tombstone_version = match to {
        EntityState::Deleted => collection.version,
        _ => 0,
    };
    collection.modified_at = chrono::Utc::now();
    collection.sync_status = SyncStatus::ModifiedLocally;

    let dto = convert::collection_to_dto(collection)?;
    let pushed = cloud.push_collection(dto).await?;
    let mut materialized = convert::dto_to_collection(&pushed)?;
    materialized.sync_status = SyncStatus::Synced;
    materialized.name = collection.name.clone();

    save_collection(store, &materialized)?;
    *collection = materialized;
    Ok(())
}
