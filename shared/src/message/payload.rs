use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Collection;

/// 变更载荷 (后端 -> 客户端)
///
/// Body of a change frame. `record` is the row after the change, absent for
/// deletes; `old_record` is the row before it, absent for inserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePayload {
    pub collection: Collection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_record: Option<Value>,
    pub commit_timestamp: i64,
}
