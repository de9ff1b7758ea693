use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use inkroom_shared::RoomId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::StoreError;

const MAX_ROOM_ID_LEN: usize = 64;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShapeRecord {
    pub id: Uuid,
    pub room_id: RoomId,
    pub user_id: String,
    pub created_at: u64,
    pub shape: Value,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    pub id: Uuid,
    pub room_id: RoomId,
    pub user_id: String,
    pub created_at: u64,
    pub message: String,
}

impl ShapeRecord {
    pub fn new(room_id: RoomId, user_id: impl Into<String>, shape: Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            room_id,
            user_id: user_id.into(),
            created_at: now_millis(),
            shape,
        }
    }
}

impl ChatRecord {
    pub fn new(room_id: RoomId, user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            room_id,
            user_id: user_id.into(),
            created_at: now_millis(),
            message: message.into(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Rooms double as storage keys, so only a conservative alphabet is allowed.
pub fn validate_room_id(room_id: &RoomId) -> Result<(), StoreError> {
    let value = room_id.as_str();
    let valid = !value.is_empty()
        && value.len() <= MAX_ROOM_ID_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidRoom(value.to_string()))
    }
}

/// Append/list access to the durable per-room shape and chat logs.
/// Lists are newest-first and hold at most `limit` records.
#[async_trait]
pub trait Store: Send + Sync {
    async fn append_shape(&self, record: ShapeRecord) -> Result<(), StoreError>;
    async fn list_shapes(
        &self,
        room_id: &RoomId,
        limit: usize,
    ) -> Result<Vec<ShapeRecord>, StoreError>;
    async fn append_chat(&self, record: ChatRecord) -> Result<(), StoreError>;
    async fn list_chats(&self, room_id: &RoomId, limit: usize)
        -> Result<Vec<ChatRecord>, StoreError>;
}

#[derive(Clone, Copy, Debug)]
enum LogKind {
    Shapes,
    Chats,
}

impl LogKind {
    fn name(self) -> &'static str {
        match self {
            LogKind::Shapes => "shapes",
            LogKind::Chats => "chats",
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    shapes: RwLock<HashMap<RoomId, Vec<ShapeRecord>>>,
    chats: RwLock<HashMap<RoomId, Vec<ChatRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T: Clone>(records: Option<&Vec<T>>, limit: usize) -> Vec<T> {
    records
        .map(|records| records.iter().rev().take(limit).cloned().collect())
        .unwrap_or_default()
}

#[async_trait]
impl Store for MemoryStore {
    async fn append_shape(&self, record: ShapeRecord) -> Result<(), StoreError> {
        validate_room_id(&record.room_id)?;
        let mut shapes = self.shapes.write().await;
        shapes.entry(record.room_id.clone()).or_default().push(record);
        Ok(())
    }

    async fn list_shapes(
        &self,
        room_id: &RoomId,
        limit: usize,
    ) -> Result<Vec<ShapeRecord>, StoreError> {
        validate_room_id(room_id)?;
        Ok(newest_first(self.shapes.read().await.get(room_id), limit))
    }

    async fn append_chat(&self, record: ChatRecord) -> Result<(), StoreError> {
        validate_room_id(&record.room_id)?;
        let mut chats = self.chats.write().await;
        chats.entry(record.room_id.clone()).or_default().push(record);
        Ok(())
    }

    async fn list_chats(
        &self,
        room_id: &RoomId,
        limit: usize,
    ) -> Result<Vec<ChatRecord>, StoreError> {
        validate_room_id(room_id)?;
        Ok(newest_first(self.chats.read().await.get(room_id), limit))
    }
}

/// One JSON-lines file per room and log kind under `data_dir`. Appends to
/// the same file are serialized; different files never wait on each other.
pub struct FileStore {
    data_dir: PathBuf,
    write_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FileStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn write_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        self.write_locks
            .lock()
            .await
            .entry(path.to_path_buf())
            .or_default()
            .clone()
    }

    fn log_path(&self, room_id: &RoomId, kind: LogKind) -> Result<PathBuf, StoreError> {
        validate_room_id(room_id)?;
        Ok(self
            .data_dir
            .join(room_id.as_str())
            .join(format!("{}.jsonl", kind.name())))
    }

    async fn append<T: Serialize + Sync>(
        &self,
        room_id: &RoomId,
        kind: LogKind,
        record: &T,
    ) -> Result<(), StoreError> {
        let path = self.log_path(room_id, kind)?;
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let lock = self.write_lock(&path).await;
        let _guard = lock.lock().await;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn list<T: DeserializeOwned>(
        &self,
        room_id: &RoomId,
        kind: LogKind,
        limit: usize,
    ) -> Result<Vec<T>, StoreError> {
        let path = self.log_path(room_id, kind)?;
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };
        let mut records = Vec::new();
        for line in contents.lines().rev() {
            if records.len() >= limit {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(line) {
                Ok(record) => records.push(record),
                Err(error) => {
                    tracing::warn!(
                        room = %room_id,
                        log = kind.name(),
                        %error,
                        "skipping corrupt log line"
                    );
                }
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl Store for FileStore {
    async fn append_shape(&self, record: ShapeRecord) -> Result<(), StoreError> {
        self.append(&record.room_id, LogKind::Shapes, &record).await
    }

    async fn list_shapes(
        &self,
        room_id: &RoomId,
        limit: usize,
    ) -> Result<Vec<ShapeRecord>, StoreError> {
        self.list(room_id, LogKind::Shapes, limit).await
    }

    async fn append_chat(&self, record: ChatRecord) -> Result<(), StoreError> {
        self.append(&record.room_id, LogKind::Chats, &record).await
    }

    async fn list_chats(
        &self,
        room_id: &RoomId,
        limit: usize,
    ) -> Result<Vec<ChatRecord>, StoreError> {
        self.list(room_id, LogKind::Chats, limit).await
    }
}

#[derive(Clone, Debug)]
pub struct S3StoreConfig {
    pub bucket: String,
    pub prefix: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl S3StoreConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: None,
            region: None,
            endpoint_url: None,
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

/// One object per record. Keys end in a UUID v7, so key order is
/// append order.
pub struct S3Store {
    bucket: String,
    prefix: String,
    client: Client,
}

impl S3Store {
    pub async fn new(config: S3StoreConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let (Some(access_key_id), Some(secret_access_key)) = (
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
        ) {
            let creds = Credentials::new(access_key_id, secret_access_key, None, None, "static");
            loader = loader.credentials_provider(creds);
        }
        if let Some(region) = config.region.clone() {
            loader = loader.region(aws_config::Region::new(region));
        }
        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint_url) = config.endpoint_url.as_ref() {
            builder = builder.endpoint_url(endpoint_url);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        let client = Client::from_conf(builder.build());
        let prefix = config
            .prefix
            .unwrap_or_default()
            .trim_matches('/')
            .to_string();
        Self {
            bucket: config.bucket,
            prefix,
            client,
        }
    }

    fn log_prefix(&self, room_id: &RoomId, kind: LogKind) -> Result<String, StoreError> {
        validate_room_id(room_id)?;
        Ok(if self.prefix.is_empty() {
            format!("{room_id}/{}/", kind.name())
        } else {
            format!("{}/{room_id}/{}/", self.prefix, kind.name())
        })
    }

    async fn append<T: Serialize + Sync>(
        &self,
        room_id: &RoomId,
        kind: LogKind,
        id: Uuid,
        record: &T,
    ) -> Result<(), StoreError> {
        let key = format!("{}{id}.json", self.log_prefix(room_id, kind)?);
        let body = ByteStream::from(serde_json::to_vec(record)?);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/json")
            .body(body)
            .send()
            .await
            .map_err(|error| StoreError::S3(format!("{error:?}")))?;
        Ok(())
    }

    async fn list<T: DeserializeOwned>(
        &self,
        room_id: &RoomId,
        kind: LogKind,
        limit: usize,
    ) -> Result<Vec<T>, StoreError> {
        let prefix = self.log_prefix(room_id, kind)?;
        let mut keys = Vec::new();
        let mut continuation = None;
        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|error| StoreError::S3(format!("{error:?}")))?;
            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );
            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        keys.sort();

        let mut records = Vec::new();
        for key in keys.into_iter().rev().take(limit) {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|error| StoreError::S3(format!("{error:?}")))?;
            let bytes = output
                .body
                .collect()
                .await
                .map_err(|error| StoreError::S3(format!("{error:?}")))?
                .into_bytes();
            records.push(serde_json::from_slice(&bytes)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl Store for S3Store {
    async fn append_shape(&self, record: ShapeRecord) -> Result<(), StoreError> {
        self.append(&record.room_id, LogKind::Shapes, record.id, &record)
            .await
    }

    async fn list_shapes(
        &self,
        room_id: &RoomId,
        limit: usize,
    ) -> Result<Vec<ShapeRecord>, StoreError> {
        self.list(room_id, LogKind::Shapes, limit).await
    }

    async fn append_chat(&self, record: ChatRecord) -> Result<(), StoreError> {
        self.append(&record.room_id, LogKind::Chats, record.id, &record)
            .await
    }

    async fn list_chats(
        &self,
        room_id: &RoomId,
        limit: usize,
    ) -> Result<Vec<ChatRecord>, StoreError> {
        self.list(room_id, LogKind::Chats, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkroom_shared::{Point, Shape};

    fn every_variant() -> Vec<Shape> {
        vec![
            Shape::rectangle_from_drag(Point::new(10.0, 10.0), Point::new(-5.0, 60.5)),
            Shape::freehand(vec![
                Point::new(0.0, 0.0),
                Point::new(1.5, 2.5),
                Point::new(3.0, -4.0),
            ]),
            Shape::circle_from_drag(Point::new(0.0, 0.0), Point::new(30.0, 10.0)),
            Shape::text(Point::new(7.0, 8.0), "hello room").unwrap(),
        ]
    }

    async fn assert_round_trip(store: &dyn Store) {
        let room = RoomId::new("42");
        for shape in every_variant() {
            let value = serde_json::to_value(&shape).unwrap();
            store
                .append_shape(ShapeRecord::new(room.clone(), "user-a", value))
                .await
                .unwrap();
        }
        let listed = store.list_shapes(&room, 100).await.unwrap();
        let mut decoded = listed
            .into_iter()
            .map(|record| serde_json::from_value::<Shape>(record.shape).unwrap())
            .collect::<Vec<_>>();
        decoded.reverse();
        assert_eq!(decoded, every_variant());
    }

    #[tokio::test]
    async fn memory_store_round_trips_every_shape() {
        assert_round_trip(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn file_store_round_trips_every_shape() {
        let dir = tempfile::tempdir().unwrap();
        assert_round_trip(&FileStore::new(dir.path().to_path_buf())).await;
    }

    #[tokio::test]
    async fn lists_are_newest_first_and_limited() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf());
        let room = RoomId::new("lobby");
        for index in 0..5 {
            store
                .append_chat(ChatRecord::new(room.clone(), "u", format!("m{index}")))
                .await
                .unwrap();
        }
        let chats = store.list_chats(&room, 2).await.unwrap();
        let messages = chats.iter().map(|c| c.message.as_str()).collect::<Vec<_>>();
        assert_eq!(messages, ["m4", "m3"]);
        assert!(store
            .list_chats(&RoomId::new("empty"), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn busy_room_does_not_block_other_rooms() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf());
        let busy = store.log_path(&"busy".into(), LogKind::Chats).unwrap();
        let lock = store.write_lock(&busy).await;
        let held = lock.lock().await;

        let other = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            store.append_chat(ChatRecord::new("quiet".into(), "u", "hi")),
        )
        .await;
        assert!(matches!(other, Ok(Ok(()))));

        let same_room = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            store.append_chat(ChatRecord::new("busy".into(), "u", "wait")),
        )
        .await;
        assert!(same_room.is_err());
        drop(held);
        store
            .append_chat(ChatRecord::new("busy".into(), "u", "now"))
            .await
            .unwrap();
        assert_eq!(store.list_chats(&"busy".into(), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let store = MemoryStore::new();
        store
            .append_shape(ShapeRecord::new("a".into(), "u", serde_json::json!({"type": "rect"})))
            .await
            .unwrap();
        assert!(store.list_shapes(&"b".into(), 10).await.unwrap().is_empty());
        assert_eq!(store.list_shapes(&"a".into(), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn path_like_room_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf());
        let result = store
            .append_chat(ChatRecord::new("../etc".into(), "u", "x"))
            .await;
        assert!(matches!(result, Err(StoreError::InvalidRoom(_))));
    }
}
