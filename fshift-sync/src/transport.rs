//! The network boundary: one entity request in, one JSON value out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::dedup::dedup_key;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    List {
        sort: Option<String>,
        limit: Option<u32>,
    },
    Get {
        id: String,
    },
    Create {
        data: Value,
    },
    Update {
        id: String,
        data: Value,
    },
    Delete {
        id: String,
    },
    Query {
        filter: Value,
    },
    BulkCreate {
        items: Vec<Value>,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::List { .. } => "list",
            Operation::Get { .. } => "get",
            Operation::Create { .. } => "create",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
            Operation::Query { .. } => "query",
            Operation::BulkCreate { .. } => "bulk_create",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Operation::List { .. } | Operation::Get { .. } | Operation::Query { .. }
        )
    }

    /// Arguments that identify a read
    fn args(&self) -> Value {
        match self {
            Operation::List { sort, limit } => json!({ "sort": sort, "limit": limit }),
            Operation::Get { id } => json!({ "id": id }),
            Operation::Query { filter } => filter.clone(),
            Operation::Create { data } => data.clone(),
            Operation::Update { id, data } => json!({ "id": id, "data": data }),
            Operation::Delete { id } => json!({ "id": id }),
            Operation::BulkCreate { items } => Value::Array(items.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    /// Entity name, e.g. `Shift` or `Debt`
    pub entity: String,
    #[serde(flatten)]
    pub operation: Operation,
}

impl ApiRequest {
    pub fn new(entity: impl Into<String>, operation: Operation) -> Self {
        Self {
            entity: entity.into(),
            operation,
        }
    }

    pub fn dedup_key(&self) -> String {
        dedup_key(&self.entity, self.operation.name(), &self.operation.args())
    }

    /// Prefix shared by every key for this request's entity
    pub fn entity_prefix(&self) -> String {
        format!("{}:", self.entity)
    }
}

/// Something that can carry an entity request to the backend.
#[async_trait]
pub trait EntityTransport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<Value>;
}
