//! Status document shape: hubs, sub-environments and sub-resources

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::{StorageError, StorageResult};
use crate::error::ErrorRecord;

/// Key under which a serialized failure is nested inside a field
pub const FAILED_KEY: &str = "failed";

/// Child map key on hub records
pub const SUB_ENVS_KEY: &str = "sub_envs";

/// Child map key on sub-environment records
pub const SUB_RESOURCES_KEY: &str = "sub_resources";

/// Field names written by the provisioning stages.
///
/// The set is open: any non-reserved key may be stored without a code change.
pub mod fields {
    // Hub
    pub const CREATED: &str = "created";
    pub const ENABLED: &str = "enabled";
    pub const AUTHED: &str = "authed";
    pub const HUB_ORG_ID: &str = "hubOrgId";
    pub const CONNECT_APP: &str = "connectApp";

    // Sub-resource
    pub const ID: &str = "id";
    pub const RETRIEVED_PACKAGES: &str = "retrievedPackages";
    pub const INTEGRATION_SETUP: &str = "integrationSetup";
    pub const MEMBER_LIST_UPDATED: &str = "memberListUpdatedCommunityActive";
    pub const ADMIN_USER_MAPPED: &str = "adminUserMapped";
    pub const PRODUCTS_IMPORTED: &str = "productsImported";
    pub const BUYER_GROUP_NAME: &str = "buyerGroupName";
    pub const ACCOUNT_ID: &str = "accountId";
    pub const BUYER_USERNAME: &str = "buyerUsername";
    pub const COMMUNITY_PUBLISHED: &str = "communityPublished";
    pub const PUSHED_SOURCES: &str = "pushedSources";
    pub const INDEX_CREATED: &str = "indexCreated";
    pub const DONE: &str = "done";
    pub const USER_INFO: &str = "userInfo";
    pub const FULL_STORE_URL: &str = "fullStoreUrl";
}

/// A single recorded status value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Text(String),
    /// A recorded failure; encoded as `{failed: {...}}`
    Error(ErrorRecord),
    /// A `{failed: ...}` payload that is not a full record, such as
    /// `{failed: [reason]}` or a hand-edited entry
    Failed(serde_json::Value),
    Json(serde_json::Value),
}

impl FieldValue {
    /// Whether this value marks the stage as completed.
    ///
    /// `false`, empty text, null and recorded failures all read as "not done",
    /// the same as an absent field.
    pub fn is_done(&self) -> bool {
        match self {
            FieldValue::Bool(b) => *b,
            FieldValue::Text(s) => !s.is_empty(),
            FieldValue::Error(_) | FieldValue::Failed(_) => false,
            FieldValue::Json(v) => !v.is_null(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FieldValue::Error(_) | FieldValue::Failed(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorRecord> {
        match self {
            FieldValue::Error(record) => Some(record),
            _ => None,
        }
    }

    /// Restore a structured value written from a serializable type
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> StorageResult<T> {
        serde_json::from_value(self.to_json()).map_err(StorageError::serialization)
    }

    /// Encode any serializable value, keeping booleans and strings as plain scalars
    pub fn encode<T: Serialize>(value: &T) -> StorageResult<Self> {
        let json = serde_json::to_value(value).map_err(StorageError::serialization)?;
        Ok(Self::from_json(json))
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Text(s) => serde_json::Value::String(s.clone()),
            FieldValue::Error(record) => {
                serde_json::json!({ FAILED_KEY: record })
            }
            FieldValue::Failed(reason) => serde_json::json!({ FAILED_KEY: reason }),
            FieldValue::Json(v) => v.clone(),
        }
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(b) => FieldValue::Bool(b),
            serde_json::Value::String(s) => FieldValue::Text(s),
            serde_json::Value::Object(mut map)
                if map.len() == 1 && map.contains_key(FAILED_KEY) =>
            {
                let reason = map.remove(FAILED_KEY).unwrap_or_default();
                match serde_json::from_value::<ErrorRecord>(reason.clone()) {
                    Ok(record) => FieldValue::Error(record),
                    Err(_) => FieldValue::Failed(reason),
                }
            }
            other => FieldValue::Json(other),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Error(record) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(FAILED_KEY, record)?;
                map.end()
            }
            FieldValue::Failed(reason) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(FAILED_KEY, reason)?;
                map.end()
            }
            FieldValue::Json(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(FieldValue::from_json(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<ErrorRecord> for FieldValue {
    fn from(value: ErrorRecord) -> Self {
        FieldValue::Error(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Error(record) => write!(f, "failed: [{}] {}", record.kind, record.message),
            FieldValue::Failed(reason) => write!(f, "failed: {}", reason),
            FieldValue::Json(v) => write!(f, "{}", v),
        }
    }
}

/// Named fields of one hierarchy record
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Root of the persisted status file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusDocument {
    #[serde(default)]
    pub hubs: BTreeMap<String, HubStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HubStatus {
    #[serde(flatten)]
    pub fields: FieldMap,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_envs: BTreeMap<String, SubEnvStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubEnvStatus {
    #[serde(flatten)]
    pub fields: FieldMap,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_resources: BTreeMap<String, SubResourceStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubResourceStatus {
    #[serde(flatten)]
    pub fields: FieldMap,
}

/// Caller-supplied identity triple; same string means same entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub hub: String,
    pub sub_env: String,
    pub sub_resource: String,
}

impl Identity {
    pub fn new(
        hub: impl Into<String>,
        sub_env: impl Into<String>,
        sub_resource: impl Into<String>,
    ) -> Self {
        Self {
            hub: hub.into(),
            sub_env: sub_env.into(),
            sub_resource: sub_resource.into(),
        }
    }

    /// Identity addressing only hub-level fields
    pub fn hub(hub: impl Into<String>) -> Self {
        Self::new(hub, "", "")
    }

    fn validate(&self, level: Level) -> StorageResult<()> {
        let parts = [
            ("hub", &self.hub),
            ("sub-environment", &self.sub_env),
            ("sub-resource", &self.sub_resource),
        ];
        for (name, value) in parts.iter().take(level.position() as usize) {
            if value.is_empty() {
                return Err(StorageError::invalid_key(format!(
                    "{} identifier is required for {} fields",
                    name, level
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.hub, self.sub_env, self.sub_resource)
    }
}

/// Hierarchy level a field lives at. Never inferred from the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Level {
    Hub,
    SubEnv,
    SubResource,
}

impl Level {
    /// Positional number: 1 hub field, 2 sub-env field, 3 sub-resource field
    pub fn position(self) -> u8 {
        match self {
            Level::Hub => 1,
            Level::SubEnv => 2,
            Level::SubResource => 3,
        }
    }

    pub fn from_position(position: u8) -> Option<Self> {
        match position {
            1 => Some(Level::Hub),
            2 => Some(Level::SubEnv),
            3 => Some(Level::SubResource),
            _ => None,
        }
    }

    fn reserved_key(self) -> Option<&'static str> {
        match self {
            Level::Hub => Some(SUB_ENVS_KEY),
            Level::SubEnv => Some(SUB_RESOURCES_KEY),
            Level::SubResource => None,
        }
    }

    pub fn validate_key(self, key: &str) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::invalid_key("field key must not be empty"));
        }
        if self.reserved_key() == Some(key) {
            return Err(StorageError::invalid_key(format!(
                "'{}' is reserved at {} level",
                key, self
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Hub => "hub",
            Level::SubEnv => "sub-env",
            Level::SubResource => "sub-resource",
        };
        f.write_str(name)
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hub" | "1" => Ok(Level::Hub),
            "sub-env" | "subenv" | "2" => Ok(Level::SubEnv),
            "sub-resource" | "subresource" | "3" => Ok(Level::SubResource),
            other => Err(format!(
                "unknown level '{}', expected hub, sub-env or sub-resource",
                other
            )),
        }
    }
}

impl StatusDocument {
    /// Look up a field. Any missing ancestor yields `None`.
    pub fn field(&self, identity: &Identity, level: Level, key: &str) -> Option<&FieldValue> {
        let hub = self.hubs.get(&identity.hub)?;
        match level {
            Level::Hub => hub.fields.get(key),
            Level::SubEnv => hub.sub_envs.get(&identity.sub_env)?.fields.get(key),
            Level::SubResource => hub
                .sub_envs
                .get(&identity.sub_env)?
                .sub_resources
                .get(&identity.sub_resource)?
                .fields
                .get(key),
        }
    }

    /// Write one leaf field, creating missing ancestor records along the path
    pub fn set_field(
        &mut self,
        identity: &Identity,
        level: Level,
        key: &str,
        value: FieldValue,
    ) -> StorageResult<()> {
        level.validate_key(key)?;
        let fields = self.record_mut(identity, level)?;
        fields.insert(key.to_string(), value);
        Ok(())
    }

    /// Create the record at `level` (and its ancestors) without writing a field
    pub fn touch(&mut self, identity: &Identity, level: Level) -> StorageResult<()> {
        self.record_mut(identity, level).map(|_| ())
    }

    fn record_mut(&mut self, identity: &Identity, level: Level) -> StorageResult<&mut FieldMap> {
        identity.validate(level)?;
        let hub = self.hubs.entry(identity.hub.clone()).or_default();
        if level == Level::Hub {
            return Ok(&mut hub.fields);
        }
        let sub_env = hub.sub_envs.entry(identity.sub_env.clone()).or_default();
        if level == Level::SubEnv {
            return Ok(&mut sub_env.fields);
        }
        let sub_resource = sub_env
            .sub_resources
            .entry(identity.sub_resource.clone())
            .or_default();
        Ok(&mut sub_resource.fields)
    }
}

/// Buyer user details captured after user creation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    #[serde(default)]
    pub access_token: Option<String>,
    pub id: String,
    #[serde(default)]
    pub instance_url: Option<String>,
    #[serde(default)]
    pub login_url: Option<String>,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub profile_name: Option<String>,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}
